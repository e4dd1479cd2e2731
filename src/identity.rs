//! Bearer-token identity decoding.
//!
//! DESIGN
//! ======
//! The backend's token payload shape changed over time (plain `sub`/`name`
//! claims, Portuguese field names, ASP.NET claim URIs). Each attribute is
//! resolved through an ordered table of `(field, extractor)` pairs; the first
//! field that is present and extracts cleanly wins. The signature is never
//! verified here: the identity only drives client-side presentation and
//! route gating, and the server re-checks every request.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::trace;

const MS_NAME_CLAIM: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";
const MS_NAME_ID_CLAIM: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
const MS_ROLE_CLAIM: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";

/// base64url that accepts payloads with or without `=` padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Role {
    Administrator,
    WarehouseKeeper,
    /// A role tag this client does not know.
    Other(String),
    /// The token carries no role claim.
    Unspecified,
}

impl Role {
    /// Map a raw role claim onto the known tags, case-insensitively.
    #[must_use]
    pub fn from_claim(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "" => Self::Unspecified,
            "admin" | "administrator" | "administrador" => Self::Administrator,
            "almoxarife" | "warehousekeeper" | "storekeeper" => Self::WarehouseKeeper,
            _ => Self::Other(raw.trim().to_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub id: i64,
    pub name: String,
    pub role: Role,
    pub work_site_id: Option<i64>,
}

impl UserIdentity {
    #[must_use]
    pub fn has_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }
}

// =============================================================================
// ALIAS TABLES
// =============================================================================

type Extractor<T> = fn(&Value) -> Option<T>;

const NAME_ALIASES: &[(&str, Extractor<String>)] = &[
    ("sub", extract_text),
    ("name", extract_text),
    ("nome", extract_text),
    ("unique_name", extract_text),
    (MS_NAME_CLAIM, extract_text),
];

const ROLE_ALIASES: &[(&str, Extractor<Role>)] = &[
    ("role", extract_role),
    ("roles", extract_role),
    ("perfil", extract_role),
    (MS_ROLE_CLAIM, extract_role),
];

const ID_ALIASES: &[(&str, Extractor<i64>)] = &[
    ("id", extract_integer),
    ("userId", extract_integer),
    ("user_id", extract_integer),
    ("nameid", extract_integer),
    (MS_NAME_ID_CLAIM, extract_integer),
];

const WORK_SITE_ALIASES: &[(&str, Extractor<i64>)] = &[
    ("workSiteId", extract_integer),
    ("work_site_id", extract_integer),
    ("obraId", extract_integer),
    ("idObra", extract_integer),
];

fn resolve<T>(claims: &Map<String, Value>, aliases: &[(&str, Extractor<T>)]) -> Option<T> {
    aliases
        .iter()
        .find_map(|(field, extract)| claims.get(*field).and_then(*extract))
}

fn extract_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Single string, or the first string of an array (multi-role tokens).
fn extract_role(value: &Value) -> Option<Role> {
    let raw = match value {
        Value::Array(items) => items.iter().find_map(extract_text)?,
        other => extract_text(other)?,
    };
    Some(Role::from_claim(&raw))
}

/// Integer claim, tolerating numeric strings.
fn extract_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// =============================================================================
// DECODE
// =============================================================================

/// Decode a bearer token's payload into a user identity.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON-object payload carrying a usable name claim. A missing id
/// resolves to `0`; a missing role to [`Role::Unspecified`].
#[must_use]
pub fn decode(token: &str) -> Option<UserIdentity> {
    let claims = decode_claims(token)?;
    let Some(name) = resolve(&claims, NAME_ALIASES) else {
        trace!("token payload carries no usable name claim");
        return None;
    };

    Some(UserIdentity {
        id: resolve(&claims, ID_ALIASES).unwrap_or(0),
        name,
        role: resolve(&claims, ROLE_ALIASES).unwrap_or(Role::Unspecified),
        work_site_id: resolve(&claims, WORK_SITE_ALIASES),
    })
}

fn decode_claims(token: &str) -> Option<Map<String, Value>> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        trace!(segments = parts.len(), "token is not a three-segment JWT");
        return None;
    }

    let bytes = match PAYLOAD_ENGINE.decode(parts[1]) {
        Ok(bytes) => bytes,
        Err(e) => {
            trace!(error = %e, "token payload is not base64url");
            return None;
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Some(claims),
        Ok(_) => {
            trace!("token payload is not a JSON object");
            None
        }
        Err(e) => {
            trace!(error = %e, "token payload is not JSON");
            None
        }
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
