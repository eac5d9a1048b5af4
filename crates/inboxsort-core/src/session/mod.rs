//! Per-request session token lifecycle
//!
//! Every inbound request materializes its session exactly once through
//! [`resolve_session`]. The decision is made from the token carried in the
//! request (plus an authorization grant when the request is the sign-in
//! callback) and the current time; there is no background refresh and no
//! server-side token store.

mod cookie;

pub use cookie::{read_cookie, SessionCodec};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::models::{AuthorizationGrant, SessionToken};
use crate::oauth::{refresh_session_token, TokenEndpoint};

/// Which way the state machine went for this request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Seeded from a new authorization grant
    Fresh,
    /// Cached token still usable, returned untouched
    Valid,
    /// Cached token was stale and has been refreshed
    Refreshed,
    /// Cached token was stale and the refresh failed just now
    RefreshFailed,
    /// Cached token had already failed to refresh
    Errored,
}

/// Result of materializing a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub token: SessionToken,
    pub transition: Transition,
}

impl ResolvedSession {
    /// Whether the token differs from what the client sent (cookie must be re-issued)
    pub fn changed(&self) -> bool {
        matches!(
            self.transition,
            Transition::Fresh | Transition::Refreshed | Transition::RefreshFailed
        )
    }
}

/// Decide what to do with the session token for this request.
///
/// Returns `None` when there is neither a cached token nor a grant.
pub async fn resolve_session(
    endpoint: &dyn TokenEndpoint,
    cached: Option<SessionToken>,
    grant: Option<&AuthorizationGrant>,
    now: DateTime<Utc>,
    buffer_ms: i64,
) -> Option<ResolvedSession> {
    // Initial sign-in: save tokens and expiry, ignoring anything cached
    if let Some(grant) = grant {
        return Some(seed(grant, now));
    }

    let token = cached?;

    if token.is_errored() {
        debug!("Session token is in terminal error state");
        return Some(ResolvedSession {
            token,
            transition: Transition::Errored,
        });
    }

    if token.is_usable_at(now, buffer_ms) {
        debug!("Access token still valid");
        return Some(ResolvedSession {
            token,
            transition: Transition::Valid,
        });
    }

    info!("Access token expired or expiring, refreshing");
    let token = refresh_session_token(endpoint, token, now).await;
    let transition = if token.is_errored() {
        warn!("Session marked as errored after failed refresh");
        Transition::RefreshFailed
    } else {
        Transition::Refreshed
    };

    Some(ResolvedSession { token, transition })
}

fn seed(grant: &AuthorizationGrant, now: DateTime<Utc>) -> ResolvedSession {
    debug!("Seeding session from authorization grant");
    ResolvedSession {
        token: SessionToken::from_grant(grant, now),
        transition: Transition::Fresh,
    }
}

/// Session resolution bound to a token endpoint and the wall clock
#[derive(Clone)]
pub struct SessionManager {
    endpoint: Arc<dyn TokenEndpoint>,
    buffer_ms: i64,
}

impl SessionManager {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, buffer_ms: i64) -> Self {
        Self {
            endpoint,
            buffer_ms,
        }
    }

    /// Materialize the session for a request carrying `cached`
    pub async fn resolve(&self, cached: Option<SessionToken>) -> Option<ResolvedSession> {
        resolve_session(self.endpoint.as_ref(), cached, None, Utc::now(), self.buffer_ms).await
    }

    /// Materialize the session at the end of a sign-in
    pub fn sign_in(&self, grant: &AuthorizationGrant) -> ResolvedSession {
        seed(grant, Utc::now())
    }
}
