//! OAuth session token structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal failure marker on a session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenError {
    /// The refresh exchange failed; the user must sign in again
    RefreshFailed,
}

/// OAuth tokens carried in the session cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    /// Access token for API calls
    pub access_token: String,

    /// Refresh token for obtaining new access tokens (may be empty)
    #[serde(default)]
    pub refresh_token: String,

    /// Access token expiry (Unix milliseconds)
    pub access_token_expires_at: i64,

    /// Set once a refresh has failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TokenError>,
}

impl SessionToken {
    /// Seed a session token from an authorization grant issued at `now`
    pub fn from_grant(grant: &AuthorizationGrant, now: DateTime<Utc>) -> Self {
        Self {
            access_token: grant.access_token.clone(),
            refresh_token: grant.refresh_token.clone().unwrap_or_default(),
            access_token_expires_at: expiry_millis(now, grant.expires_in.unwrap_or(0)),
            error: None,
        }
    }

    /// Whether the access token can still be used at `now`, leaving `buffer_ms` of headroom
    pub fn is_usable_at(&self, now: DateTime<Utc>, buffer_ms: i64) -> bool {
        now.timestamp_millis() < self.access_token_expires_at.saturating_sub(buffer_ms)
    }

    /// Whether a refresh has already failed for this token
    pub fn is_errored(&self) -> bool {
        self.error.is_some()
    }

    /// Copy of this token marked as terminally errored
    pub fn into_errored(self) -> Self {
        Self {
            error: Some(TokenError::RefreshFailed),
            ..self
        }
    }
}

/// Unix milliseconds `expires_in` seconds after `now`, saturating on absurd lifetimes
pub fn expiry_millis(now: DateTime<Utc>, expires_in: i64) -> i64 {
    now.timestamp_millis()
        .saturating_add(expires_in.saturating_mul(1000))
}

/// Tokens returned by the authorization-code exchange at sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    pub expires_in: Option<i64>,
}
