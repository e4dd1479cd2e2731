//! Shared fixtures for unit tests: token minting, a recording navigator and
//! a scripted transport.

use std::sync::{Arc, Mutex};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tokio::sync::watch;

use crate::config::{DEFAULT_LOGIN_ROUTE, DEFAULT_REFRESH_PATH};
use crate::http::{ApiRequest, ApiResponse, Transport, TransportError};
use crate::pipeline::{ApiClient, Endpoints};
use crate::session::{Navigator, SessionManager};
use crate::token_store::MemoryTokenStore;

/// Mint an unsigned three-segment token around `claims`.
#[must_use]
pub fn make_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

// =============================================================================
// NAVIGATOR
// =============================================================================

#[derive(Default)]
pub struct RecordingNavigator {
    pub redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn hard_redirect(&self, route: &str) {
        self.redirects.lock().unwrap().push(route.to_owned());
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

type Routes = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync>;

/// Scripted transport. Every request is logged, then answered by `routes`.
///
/// With a refresh gate of `n`, calls to the refresh endpoint block until `n`
/// 401 responses have been served, which lets tests pile up concurrent
/// callers behind one in-flight refresh deterministically.
pub struct MockTransport {
    pub requests: Mutex<Vec<ApiRequest>>,
    routes: Routes,
    unauthorized_served: watch::Sender<usize>,
    refresh_gate: usize,
}

impl MockTransport {
    pub fn new<F>(routes: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static,
    {
        let (unauthorized_served, _) = watch::channel(0);
        Self { requests: Mutex::new(Vec::new()), routes: Box::new(routes), unauthorized_served, refresh_gate: 0 }
    }

    #[must_use]
    pub fn with_refresh_gate(mut self, unauthorized_count: usize) -> Self {
        self.refresh_gate = unauthorized_count;
        self
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        if request.path == DEFAULT_REFRESH_PATH && self.refresh_gate > 0 {
            let mut rx = self.unauthorized_served.subscribe();
            let gate = self.refresh_gate;
            let _ = rx.wait_for(|served| *served >= gate).await;
        }

        let response = (self.routes)(request)?;
        if response.status == 401 {
            self.unauthorized_served.send_modify(|served| *served += 1);
        }
        Ok(response)
    }
}

/// Resource server accepting only `Bearer <valid>`; echoes the path on 200.
/// The refresh endpoint answers with `refresh`.
pub fn resource_server(
    valid: &'static str,
    refresh: ApiResponse,
) -> impl Fn(&ApiRequest) -> Result<ApiResponse, TransportError> + Send + Sync + 'static {
    move |request| {
        if request.path == DEFAULT_REFRESH_PATH {
            return Ok(refresh.clone());
        }
        let expected = format!("Bearer {valid}");
        if request.header("Authorization") == Some(expected.as_str()) {
            Ok(ApiResponse::new(200, serde_json::json!({ "path": request.path }).to_string()))
        } else {
            Ok(ApiResponse::new(401, r#"{"message":"token expired"}"#))
        }
    }
}

pub fn refresh_ok(access: &str, refresh: &str) -> ApiResponse {
    ApiResponse::new(200, serde_json::json!({ "access_token": access, "refresh_token": refresh }).to_string())
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct Harness {
    pub client: ApiClient,
    pub transport: Arc<MockTransport>,
    pub store: Arc<MemoryTokenStore>,
    pub navigator: Arc<RecordingNavigator>,
}

pub fn harness(transport: MockTransport, store: MemoryTokenStore) -> Harness {
    harness_with_store(transport, Arc::new(store))
}

/// Harness over a store the transport's routes can also reach, for scripting
/// token changes that land while a request is in flight.
pub fn harness_with_store(transport: MockTransport, store: Arc<MemoryTokenStore>) -> Harness {
    let transport = Arc::new(transport);
    let navigator = Arc::new(RecordingNavigator::default());
    let session = Arc::new(SessionManager::new(store.clone(), navigator.clone(), DEFAULT_LOGIN_ROUTE));
    let client = ApiClient::new(transport.clone(), session, Endpoints::default());
    Harness { client, transport, store, navigator }
}
