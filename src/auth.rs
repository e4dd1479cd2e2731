//! Credential login and logout.
//!
//! Login posts `{identifier, secret}` to the login endpoint through the
//! regular pipeline (which exempts it from bearer attachment and refresh),
//! stores the returned tokens and hands back the decoded identity.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ErrorCode, RequestError};
use crate::http::ApiRequest;
use crate::identity::{self, UserIdentity};
use crate::pipeline::ApiClient;

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub identifier: &'a str,
    pub secret: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("role not permitted to use this client")]
    RoleNotPermitted,

    #[error("login rejected with status {status}")]
    Rejected { status: u16, body: String },

    #[error("login request failed: {0}")]
    Request(RequestError),

    #[error("login response malformed: {0}")]
    Malformed(String),

    #[error("access token carries no usable identity")]
    UndecodableToken,
}

impl ErrorCode for LoginError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "E_INVALID_CREDENTIALS",
            Self::RoleNotPermitted => "E_ROLE_NOT_PERMITTED",
            Self::Rejected { .. } => "E_LOGIN_REJECTED",
            Self::Request(e) => e.error_code(),
            Self::Malformed(_) => "E_LOGIN_MALFORMED",
            Self::UndecodableToken => "E_UNDECODABLE_TOKEN",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Request(e) => e.retryable(),
            Self::Rejected { status, .. } => matches!(status, 429 | 500..=599),
            _ => false,
        }
    }
}

impl From<RequestError> for LoginError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Status { status: 401, .. } => Self::InvalidCredentials,
            RequestError::Status { status: 403, .. } => Self::RoleNotPermitted,
            RequestError::Status { status, body } => Self::Rejected { status, body },
            other => Self::Request(other),
        }
    }
}

impl ApiClient {
    /// Exchange credentials for a session.
    ///
    /// When the login response carries no refresh token, the access token is
    /// stored in both slots so a later refresh still has something to send.
    ///
    /// # Errors
    ///
    /// See [`LoginError`]. Nothing is stored on failure.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<UserIdentity, LoginError> {
        let request = ApiRequest::post(self.endpoints().login_path.as_str())
            .with_json(&LoginRequest { identifier, secret })
            .map_err(|e| LoginError::Request(RequestError::Encode(e.to_string())))?;

        let response = self.request(request).await?;
        let body: LoginResponse = response
            .json()
            .map_err(|e| LoginError::Malformed(e.to_string()))?;

        let Some(identity) = identity::decode(&body.access_token) else {
            warn!("login: access token could not be decoded");
            return Err(LoginError::UndecodableToken);
        };

        let refresh = match body.refresh_token.as_deref().map(str::trim) {
            Some(refresh) if !refresh.is_empty() => refresh.to_owned(),
            _ => {
                warn!("login: response carried no refresh token, reusing access token");
                body.access_token.clone()
            }
        };

        self.session().store_credentials(&body.access_token, &refresh);
        info!(user_id = identity.id, role = ?identity.role, "login: session established");
        Ok(identity)
    }

    /// Drop the stored session without navigating.
    pub fn logout(&self) {
        info!("logout");
        self.session().clear();
    }

    /// Identity decoded from the stored access token.
    #[must_use]
    pub fn current_identity(&self) -> Option<UserIdentity> {
        self.session().identity()
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
