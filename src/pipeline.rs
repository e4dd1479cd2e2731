//! Authorized request pipeline.
//!
//! ARCHITECTURE
//! ============
//! Every request flows through `ApiClient::request`:
//!
//! ```text
//! attach bearer ─► send ─► 2xx/4xx/5xx (not 401) ─► caller
//!                     └─► 401 ─► join refresh ─┬─ leader:   call refresh, settle, replay
//!                                              └─ follower: await outcome, replay
//! ```
//!
//! The login endpoint never carries a bearer and its 401s are never treated
//! as an expired session. A request is replayed at most once; a replay that
//! still answers 401 goes straight back to the caller.
//!
//! A 401 only starts a refresh when the token it was sent with is still the
//! stored one. If the session has ended since (forced logout already ran) the
//! 401 is returned as-is; if the token has rotated since, the request is
//! replayed with the current token. Either way a late 401 never triggers a
//! second refresh or a second navigation.
//!
//! TRADE-OFFS
//! ==========
//! Refresh coordination lives in the injected `SessionManager`, so two
//! clients sharing one session share one refresh, and tests get a fresh
//! session per case.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DEFAULT_LOGIN_PATH, DEFAULT_REFRESH_HEADER, DEFAULT_REFRESH_PATH, SessionConfig};
use crate::error::{ErrorCode, RefreshError, RequestError};
use crate::http::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};
use crate::session::{Navigator, RefreshTicket, SessionManager};
use crate::token_store::TokenStore;

/// Backend paths the pipeline treats specially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub login_path: String,
    pub refresh_path: String,
    pub refresh_header: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login_path: DEFAULT_LOGIN_PATH.into(),
            refresh_path: DEFAULT_REFRESH_PATH.into(),
            refresh_header: DEFAULT_REFRESH_HEADER.into(),
        }
    }
}

impl Endpoints {
    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            login_path: config.login_path.clone(),
            refresh_path: config.refresh_path.clone(),
            refresh_header: config.refresh_header.clone(),
        }
    }

    /// Whether `path` targets the login endpoint, ignoring query string and
    /// trailing slash.
    #[must_use]
    pub fn is_login(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        path.trim_end_matches('/') == self.login_path.trim_end_matches('/')
    }
}

#[derive(Debug, Deserialize)]
struct RefreshedTokens {
    access_token: String,
    refresh_token: String,
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    transport: Arc<dyn Transport>,
    session: Arc<SessionManager>,
    endpoints: Endpoints,
}

impl ApiClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionManager>, endpoints: Endpoints) -> Self {
        Self { transport, session, endpoints }
    }

    /// Build a reqwest-backed client for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn from_config(
        config: &SessionConfig,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config.api_base_url, config.timeouts)?;
        let session = SessionManager::new(store, navigator, config.login_route.clone());
        Ok(Self::new(Arc::new(transport), Arc::new(session), Endpoints::from_config(config)))
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Send `request` with the stored bearer, recovering an expired session
    /// through a single shared refresh.
    ///
    /// # Errors
    ///
    /// Returns the final outcome after any recovery: a non-2xx status, a
    /// transport failure, or the refresh failure that ended the session.
    pub async fn request(&self, mut request: ApiRequest) -> Result<ApiResponse, RequestError> {
        let request_id = Uuid::new_v4();
        self.attach_token(&mut request);
        debug!(%request_id, method = %request.method, path = %request.path, "api: send");

        let response = self.transport.send(&request).await?;
        self.intercept(request_id, request, response).await
    }

    fn attach_token(&self, request: &mut ApiRequest) {
        if self.endpoints.is_login(&request.path) {
            return;
        }
        if let Some(token) = self.session.access_token() {
            request.set_header("Authorization", &format!("Bearer {token}"));
            request.sent_token = Some(token);
        }
    }

    async fn intercept(
        &self,
        request_id: Uuid,
        mut request: ApiRequest,
        response: ApiResponse,
    ) -> Result<ApiResponse, RequestError> {
        if response.status != 401 || self.endpoints.is_login(&request.path) || request.retried {
            return into_result(response);
        }

        info!(%request_id, path = %request.path, "api: 401 observed");
        request.retried = true;

        let Some(current) = self.session.access_token() else {
            debug!(%request_id, "api: session already ended");
            return into_result(response);
        };
        if request.sent_token.as_deref() != Some(current.as_str()) {
            debug!(%request_id, "api: token rotated since send");
            return self.replay(request_id, request, &current).await;
        }

        match self.session.join_refresh() {
            RefreshTicket::Follower(outcome) => {
                debug!(%request_id, "api: waiting on in-flight refresh");
                let access = outcome.await.unwrap_or(Err(RefreshError::Abandoned))?;
                self.replay(request_id, request, &access).await
            }
            RefreshTicket::Leader(leader) => {
                let Some(refresh_token) = self.session.refresh_token() else {
                    warn!(%request_id, "api: no refresh token stored");
                    leader.settle(&Err(RefreshError::MissingRefreshToken));
                    self.session.force_logout();
                    return into_result(response);
                };

                match self.call_refresh(&refresh_token).await {
                    Ok(tokens) => {
                        info!(%request_id, "api: token refresh succeeded");
                        self.session.store_credentials(&tokens.access_token, &tokens.refresh_token);
                        leader.settle(&Ok(tokens.access_token.clone()));
                        self.replay(request_id, request, &tokens.access_token).await
                    }
                    Err(e) => {
                        warn!(%request_id, code = e.error_code(), error = %e, "api: token refresh failed");
                        leader.settle(&Err(e.clone()));
                        self.session.force_logout();
                        Err(RequestError::Refresh(e))
                    }
                }
            }
        }
    }

    async fn call_refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, RefreshError> {
        let request = ApiRequest::post(self.endpoints.refresh_path.as_str())
            .with_header(&self.endpoints.refresh_header, refresh_token);

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        if !response.is_success() {
            return Err(RefreshError::Rejected { status: response.status, body: response.body });
        }

        let tokens: RefreshedTokens = response
            .json()
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;
        if tokens.access_token.trim().is_empty() {
            return Err(RefreshError::Malformed("empty access_token".into()));
        }
        if tokens.refresh_token.trim().is_empty() {
            return Err(RefreshError::Malformed("empty refresh_token".into()));
        }
        Ok(tokens)
    }

    /// Re-send a retried request with `access`. The replay is final.
    async fn replay(
        &self,
        request_id: Uuid,
        mut request: ApiRequest,
        access: &str,
    ) -> Result<ApiResponse, RequestError> {
        request.set_header("Authorization", &format!("Bearer {access}"));
        debug!(%request_id, path = %request.path, "api: replay");
        let response = self.transport.send(&request).await?;
        into_result(response)
    }

    // =========================================================================
    // JSON HELPERS
    // =========================================================================

    /// # Errors
    ///
    /// Any [`RequestError`] from the pipeline, or `Decode` for a body that is
    /// not `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let response = self.request(ApiRequest::get(path)).await?;
        decode_body(&response)
    }

    /// # Errors
    ///
    /// Any [`RequestError`] from the pipeline, `Encode` for an unserializable
    /// body, or `Decode` for a response that is not `T`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(path)
            .with_json(body)
            .map_err(|e| RequestError::Encode(e.to_string()))?;
        let response = self.request(request).await?;
        decode_body(&response)
    }

    /// # Errors
    ///
    /// Same as [`ApiClient::post_json`].
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, RequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::put(path)
            .with_json(body)
            .map_err(|e| RequestError::Encode(e.to_string()))?;
        let response = self.request(request).await?;
        decode_body(&response)
    }

    /// # Errors
    ///
    /// Any [`RequestError`] from the pipeline.
    pub async fn delete(&self, path: &str) -> Result<(), RequestError> {
        self.request(ApiRequest::delete(path)).await?;
        Ok(())
    }
}

fn into_result(response: ApiResponse) -> Result<ApiResponse, RequestError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(RequestError::Status { status: response.status, body: response.body })
    }
}

fn decode_body<T: DeserializeOwned>(response: &ApiResponse) -> Result<T, RequestError> {
    response.json().map_err(|e| RequestError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
