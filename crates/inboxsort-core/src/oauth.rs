//! OAuth 2.0 flow for Google authentication

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, Secrets};
use crate::error::{Error, Result};
use crate::models::{expiry_millis, AuthorizationGrant, SessionToken};

/// Required OAuth scopes for inboxsort
pub const OAUTH_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/gmail.readonly", // Read-only Gmail access
];

/// Google OAuth configuration
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    /// OAuth client ID
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Redirect URI for OAuth callback
    pub redirect_uri: String,

    /// Authorization endpoint
    pub auth_url: String,

    /// Token endpoint
    pub token_url: String,

    /// Requested scopes
    pub scopes: Vec<String>,
}

impl GoogleOAuthConfig {
    /// Build from file configuration plus environment secrets
    pub fn from_config(config: &Config, secrets: &Secrets) -> Self {
        Self {
            client_id: secrets.google_client_id.clone(),
            client_secret: secrets.google_client_secret.clone(),
            redirect_uri: config.server.redirect_uri(),
            auth_url: config.oauth.auth_url.clone(),
            token_url: config.oauth.token_url.clone(),
            scopes: config.oauth.scopes.clone(),
        }
    }
}

/// Response from Google token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// The identity provider's refresh-token grant
///
/// Split out from [`OAuthManager`] so the session state machine can be driven
/// without a network.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse>;
}

/// Refresh an expired session token.
///
/// Never fails: any problem with the exchange comes back as the original
/// token marked [`crate::models::TokenError::RefreshFailed`].
pub async fn refresh_session_token(
    endpoint: &dyn TokenEndpoint,
    token: SessionToken,
    now: DateTime<Utc>,
) -> SessionToken {
    if token.refresh_token.is_empty() {
        warn!("Session token has no refresh token, cannot refresh");
        return token.into_errored();
    }

    match endpoint.refresh_grant(&token.refresh_token).await {
        Ok(response) => {
            let expires_in = response.expires_in.unwrap_or(0);
            info!("Refreshed access token (expires in {}s)", expires_in);
            SessionToken {
                access_token: response.access_token,
                access_token_expires_at: expiry_millis(now, expires_in),
                // Keep the old refresh token if not rotated
                refresh_token: response.refresh_token.unwrap_or(token.refresh_token),
                error: None,
            }
        }
        Err(e) => {
            error!("Token refresh error: {}", e);
            token.into_errored()
        }
    }
}

/// OAuth manager for handling Google authentication
pub struct OAuthManager {
    config: GoogleOAuthConfig,
    client: Client,
}

impl OAuthManager {
    /// Create with a shared HTTP client
    pub fn new(config: GoogleOAuthConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Generate a random CSRF state value
    pub fn new_state() -> String {
        format!("inboxsort_{}", uuid::Uuid::new_v4())
    }

    /// Generate the OAuth authorization URL
    pub fn authorization_url(&self, state: &str) -> String {
        let scopes = self.config.scopes.join(" ");
        format!(
            "{}?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             scope={}&\
             access_type=offline&\
             prompt=consent&\
             state={}",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<AuthorizationGrant> {
        info!("Exchanging authorization code for tokens");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {} - {}", status, body);
            return Err(Error::OAuth(format!(
                "Token exchange failed: {} - {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        debug!("Token exchange successful");

        if token_response.refresh_token.is_none() {
            warn!("No refresh token in code exchange response; session cannot be refreshed");
        }

        Ok(AuthorizationGrant {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_in: token_response.expires_in,
        })
    }
}

#[async_trait]
impl TokenEndpoint for OAuthManager {
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse> {
        debug!("Refreshing access token");

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Token refresh failed: {} - {}", status, body);
            return Err(Error::OAuth(format!(
                "Token refresh failed: {} - {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}
