//! Session state: stored credentials, forced logout, and refresh coordination.
//!
//! ARCHITECTURE
//! ============
//! `SessionManager` owns the single refresh-in-progress flag and the queue of
//! callers waiting on it. A caller that finds no refresh running becomes the
//! leader and receives a [`RefreshLeader`] guard; everyone else receives a
//! oneshot receiver. The leader settles the refresh exactly once, which
//! clears the flag and drains the queue in the same critical section, so a
//! caller can never enqueue onto a refresh that has already settled.
//!
//! TRADE-OFFS
//! ==========
//! The lock is a plain `std::sync::Mutex` held only for flag and queue
//! bookkeeping, never across an `.await`. Waiters are woken after the lock is
//! released.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::identity::{self, Role, UserIdentity};
use crate::route_guard::{RouteDecision, RouteGuard};
use crate::token_store::{TokenKind, TokenStore};

/// Result every queued caller receives: the new access token or the failure.
pub type RefreshOutcome = Result<String, RefreshError>;

/// Full navigation to a route, discarding in-memory application state.
pub trait Navigator: Send + Sync {
    fn hard_redirect(&self, route: &str);
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

pub struct SessionManager {
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    guard: RouteGuard,
    refresh: Mutex<RefreshState>,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, navigator: Arc<dyn Navigator>, login_route: impl Into<String>) -> Self {
        Self { store, navigator, guard: RouteGuard::new(login_route), refresh: Mutex::new(RefreshState::default()) }
    }

    // =========================================================================
    // CREDENTIALS
    // =========================================================================

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.store.get(TokenKind::Access)
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(TokenKind::Refresh)
    }

    #[must_use]
    pub fn has_access_token(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn store_credentials(&self, access: &str, refresh: &str) {
        self.store.set(TokenKind::Access, access);
        self.store.set(TokenKind::Refresh, refresh);
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Drop both tokens and hard-navigate to the login route.
    pub fn force_logout(&self) {
        info!(route = self.guard.login_route(), "forcing logout");
        self.store.clear();
        self.navigator.hard_redirect(self.guard.login_route());
    }

    /// Identity decoded from the stored access token, if any.
    #[must_use]
    pub fn identity(&self) -> Option<UserIdentity> {
        self.access_token().as_deref().and_then(identity::decode)
    }

    // =========================================================================
    // ROUTE GATING
    // =========================================================================

    #[must_use]
    pub fn route_guard(&self) -> &RouteGuard {
        &self.guard
    }

    #[must_use]
    pub fn authorize_route(&self) -> RouteDecision {
        self.guard.authorize(self.has_access_token())
    }

    #[must_use]
    pub fn authorize_role(&self, allowed: &[Role]) -> RouteDecision {
        self.guard.authorize_role(self.identity().as_ref(), allowed)
    }

    // =========================================================================
    // REFRESH COORDINATION
    // =========================================================================

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.lock_refresh().in_flight
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock_refresh().waiters.len()
    }

    /// Become the refresh leader, or queue behind the refresh in flight.
    pub(crate) fn join_refresh(&self) -> RefreshTicket<'_> {
        let mut state = self.lock_refresh();
        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            debug!(pending = state.waiters.len(), "queued behind in-flight refresh");
            RefreshTicket::Follower(rx)
        } else {
            state.in_flight = true;
            debug!("starting token refresh");
            RefreshTicket::Leader(RefreshLeader { session: self, settled: false })
        }
    }

    fn settle(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = self.lock_refresh();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "refresh settled");
        for waiter in waiters {
            // A waiter whose caller was dropped has nothing to receive.
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock_refresh(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) enum RefreshTicket<'a> {
    Leader(RefreshLeader<'a>),
    Follower(oneshot::Receiver<RefreshOutcome>),
}

/// Held by the caller performing the refresh. Settling is mandatory; a
/// leader dropped unsettled releases its waiters with
/// [`RefreshError::Abandoned`].
pub(crate) struct RefreshLeader<'a> {
    session: &'a SessionManager,
    settled: bool,
}

impl RefreshLeader<'_> {
    pub(crate) fn settle(mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        self.session.settle(outcome);
    }
}

impl Drop for RefreshLeader<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresh leader dropped before settling");
            self.session.settle(&Err(RefreshError::Abandoned));
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
