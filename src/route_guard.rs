//! Navigation gating.
//!
//! Guards are a point-in-time presence check. An expired token that is still
//! stored passes here and gets rejected later by the request pipeline, which
//! is the only place token validity can actually be learned.

use crate::identity::{Role, UserIdentity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    /// Not signed in; send the user to the login route.
    Redirect { to: String },
    /// Signed in, but the identity lacks every allowed role.
    Forbidden,
}

impl RouteDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    login_route: String,
}

impl RouteGuard {
    #[must_use]
    pub fn new(login_route: impl Into<String>) -> Self {
        Self { login_route: login_route.into() }
    }

    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Allow a protected destination iff an access token is present.
    #[must_use]
    pub fn authorize(&self, has_token: bool) -> RouteDecision {
        if has_token { RouteDecision::Allow } else { self.redirect() }
    }

    /// Gate a role-restricted destination on the decoded identity.
    /// An empty `allowed` list admits any signed-in identity.
    #[must_use]
    pub fn authorize_role(&self, identity: Option<&UserIdentity>, allowed: &[Role]) -> RouteDecision {
        match identity {
            None => self.redirect(),
            Some(_) if allowed.is_empty() => RouteDecision::Allow,
            Some(identity) if identity.has_role(allowed) => RouteDecision::Allow,
            Some(_) => RouteDecision::Forbidden,
        }
    }

    fn redirect(&self) -> RouteDecision {
        RouteDecision::Redirect { to: self.login_route.clone() }
    }
}

#[cfg(test)]
#[path = "route_guard_test.rs"]
mod tests;
