//! Session configuration parsed from environment variables.

use std::path::PathBuf;

use crate::error::ErrorCode;

pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_REFRESH_PATH: &str = "/refresh-token/";
pub const DEFAULT_REFRESH_HEADER: &str = "x-refresh-token";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required config: env var {var} not set")]
    Missing { var: String },

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "E_CONFIG_MISSING",
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub api_base_url: String,
    pub login_path: String,
    pub refresh_path: String,
    pub refresh_header: String,
    pub login_route: String,
    pub timeouts: HttpTimeouts,
    pub token_file: PathBuf,
}

impl SessionConfig {
    /// Build typed session config from environment variables.
    ///
    /// Required:
    /// - `STOCKGATE_API_BASE_URL`
    ///
    /// Optional:
    /// - `STOCKGATE_LOGIN_PATH`: default `/login`
    /// - `STOCKGATE_REFRESH_PATH`: default `/refresh-token/`
    /// - `STOCKGATE_REFRESH_HEADER`: default `x-refresh-token`
    /// - `STOCKGATE_LOGIN_ROUTE`: default `/login`
    /// - `STOCKGATE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `STOCKGATE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `STOCKGATE_TOKEN_FILE`: default `$HOME/.stockgate/session.json`
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or any value is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SessionConfig::from_env`] but reading through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is missing or any value is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let api_base_url = var("STOCKGATE_API_BASE_URL")
            .ok_or_else(|| ConfigError::Missing { var: "STOCKGATE_API_BASE_URL".into() })?;
        let api_base_url = parse_base_url(&api_base_url)?;

        let login_path = normalize_path(&var("STOCKGATE_LOGIN_PATH").unwrap_or_else(|| DEFAULT_LOGIN_PATH.into()));
        let refresh_path =
            normalize_path(&var("STOCKGATE_REFRESH_PATH").unwrap_or_else(|| DEFAULT_REFRESH_PATH.into()));
        let login_route = normalize_path(&var("STOCKGATE_LOGIN_ROUTE").unwrap_or_else(|| DEFAULT_LOGIN_ROUTE.into()));
        let refresh_header =
            parse_header_name(&var("STOCKGATE_REFRESH_HEADER").unwrap_or_else(|| DEFAULT_REFRESH_HEADER.into()))?;

        let timeouts = HttpTimeouts {
            request_secs: parse_secs(var("STOCKGATE_REQUEST_TIMEOUT_SECS"), "STOCKGATE_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_secs(var("STOCKGATE_CONNECT_TIMEOUT_SECS"), "STOCKGATE_CONNECT_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        let token_file = var("STOCKGATE_TOKEN_FILE")
            .map_or_else(|| default_token_file(lookup("HOME")), PathBuf::from);

        Ok(Self { api_base_url, login_path, refresh_path, refresh_header, login_route, timeouts, token_file })
    }
}

fn parse_base_url(raw: &str) -> Result<String, ConfigError> {
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(ConfigError::ConfigParse(format!(
            "STOCKGATE_API_BASE_URL must start with http:// or https://, got '{raw}'"
        )));
    }
    Ok(raw.trim_end_matches('/').to_owned())
}

fn parse_header_name(raw: &str) -> Result<String, ConfigError> {
    reqwest::header::HeaderName::from_bytes(raw.as_bytes())
        .map(|name| name.as_str().to_owned())
        .map_err(|_| ConfigError::ConfigParse(format!("invalid STOCKGATE_REFRESH_HEADER: {raw}")))
}

fn parse_secs(raw: Option<String>, key: &str) -> Result<Option<u64>, ConfigError> {
    raw.map(|v| {
        v.parse::<u64>()
            .map_err(|_| ConfigError::ConfigParse(format!("{key} must be a whole number of seconds, got '{v}'")))
    })
    .transpose()
}

/// Ensure a leading `/`; trailing slashes are kept as configured.
fn normalize_path(raw: &str) -> String {
    if raw.starts_with('/') { raw.to_owned() } else { format!("/{raw}") }
}

fn default_token_file(home: Option<String>) -> PathBuf {
    let base = home.map_or_else(PathBuf::new, PathBuf::from);
    base.join(".stockgate").join("session.json")
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
