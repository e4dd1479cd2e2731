//! Client-side session and request authorization for the warehouse
//! inventory API.
//!
//! `ApiClient` attaches the stored bearer token to every request, recovers
//! expired sessions through a single shared refresh, and forces a logout
//! when the session cannot be recovered. `RouteGuard` and `identity::decode`
//! gate navigation on the stored token.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod pipeline;
pub mod route_guard;
pub mod session;
pub mod token_store;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use auth::LoginError;
pub use config::{ConfigError, HttpTimeouts, SessionConfig};
pub use error::{ErrorCode, RefreshError, RequestError};
pub use http::{ApiRequest, ApiResponse, HttpTransport, Method, Transport, TransportError};
pub use identity::{Role, UserIdentity};
pub use pipeline::{ApiClient, Endpoints};
pub use route_guard::{RouteDecision, RouteGuard};
pub use session::{Navigator, SessionManager};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenKind, TokenStore};
