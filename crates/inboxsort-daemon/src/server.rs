//! HTTP routes
//!
//! Every request carries its own session in a signed cookie; handlers share
//! only immutable state.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use inboxsort_core::error::Error;
use inboxsort_core::oauth::OAuthManager;
use inboxsort_core::pipeline::{authorize, InboxPipeline};
use inboxsort_core::session::{read_cookie, SessionCodec, SessionManager};

/// Shared, read-only handler state
#[derive(Clone)]
pub struct AppState {
    pub oauth: Arc<OAuthManager>,
    pub sessions: SessionManager,
    pub codec: SessionCodec,
    pub pipeline: InboxPipeline,
}

/// Core error rendered as an HTTP response
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.requires_reauth() {
            let message = match self.0 {
                Error::TokenRefreshFailed => {
                    "Authentication error: Token refresh failed. Please sign in again."
                }
                _ => "Not Authenticated. Please sign in.",
            };
            info!("Sign-in required [{}]", self.0.error_code());
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response();
        }

        let (status, body) = match &self.0 {
            Error::PermissionDenied(detail) => {
                warn!("Permission denied by Google: {}", detail);
                (
                    StatusCode::FORBIDDEN,
                    json!({ "error": "Permission denied by Google. Check your scopes or token expiry." }),
                )
            }
            other => {
                error!("Request failed [{}]: {}", other.error_code(), other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "An unexpected error occurred during processing.",
                        "details": other.to_string(),
                    }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/fetchEmails", get(fetch_emails))
        .route("/api/auth/signin", get(sign_in))
        .route("/api/auth/callback/google", get(oauth_callback))
        .route("/api/auth/signout", get(sign_out))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn fetch_emails(State(app): State<AppState>, headers: HeaderMap) -> Response {
    let cached = cookie_header(&headers).and_then(|h| app.codec.from_cookie_header(h));
    let session = app.sessions.resolve(cached).await;

    let result = match authorize(session.as_ref().map(|s| &s.token)) {
        Ok(access_token) => app.pipeline.run(access_token).await,
        Err(e) => Err(e),
    };

    let mut response = match result {
        Ok(report) => Json(report).into_response(),
        Err(e) => ApiError(e).into_response(),
    };

    // Refreshed or newly errored tokens go back to the browser
    if let Some(session) = session.filter(|s| s.changed()) {
        match app.codec.set_cookie(&session.token) {
            Ok(cookie) => append_cookie(&mut response, &cookie),
            Err(e) => error!("Failed to re-issue session cookie: {}", e),
        }
    }

    response
}

async fn sign_in(State(app): State<AppState>) -> Response {
    let csrf = OAuthManager::new_state();
    let mut response = Redirect::to(&app.oauth.authorization_url(&csrf)).into_response();
    append_cookie(&mut response, &app.codec.set_state_cookie(&csrf));
    response
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn oauth_callback(
    State(app): State<AppState>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error {
        warn!("Google returned OAuth error: {}", error);
        return Ok(bad_request(&format!("OAuth error: {}", error)));
    }

    let state_cookie = app.codec.state_cookie_name();
    let expected = cookie_header(&headers).and_then(|h| read_cookie(h, &state_cookie));
    match (params.state.as_deref(), expected) {
        (Some(got), Some(want)) if !got.is_empty() && got == want => {}
        _ => {
            warn!("OAuth state mismatch on callback");
            return Ok(bad_request("Invalid OAuth state"));
        }
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return Ok(bad_request("Missing OAuth code"));
    };

    let grant = app.oauth.exchange_code(&code).await?;
    let session = app.sessions.sign_in(&grant);
    info!(
        "Signed in, access token valid for {}s",
        grant.expires_in.unwrap_or(0)
    );

    let mut response = Redirect::to("/").into_response();
    append_cookie(&mut response, &app.codec.set_cookie(&session.token)?);
    append_cookie(&mut response, &app.codec.clear_state_cookie());
    Ok(response)
}

async fn sign_out(State(app): State<AppState>) -> Response {
    let mut response = Redirect::to("/").into_response();
    append_cookie(&mut response, &app.codec.clear_cookie());
    response
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn cookie_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::COOKIE).and_then(|v| v.to_str().ok())
}

fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => error!("Invalid Set-Cookie value: {}", e),
    }
}
