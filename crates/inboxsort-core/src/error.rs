//! Error types for inboxsort

use thiserror::Error;

/// Result type alias using inboxsort's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for inboxsort
#[derive(Error, Debug)]
pub enum Error {
    // Authentication errors
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Token refresh failed")]
    TokenRefreshFailed,

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    // Mail provider errors
    #[error("Permission denied by mail provider: {0}")]
    PermissionDenied(String),

    #[error("Gmail API returned {status}: {body}")]
    Gmail { status: u16, body: String },

    // Classification errors
    #[error("Completion provider returned {status}: {body}")]
    Completion { status: u16, body: String },

    #[error("Completion response had no content")]
    EmptyCompletion,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing secret: {0}")]
    MissingSecret(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns true if this error indicates the user needs to sign in again
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Error::NotAuthenticated | Error::TokenRefreshFailed | Error::InvalidSession(_)
        )
    }

    /// Returns a stable error code suitable for logs and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::NotAuthenticated | Error::InvalidSession(_) => "AUTH_MISSING",
            Error::TokenRefreshFailed => "AUTH_EXPIRED",
            Error::PermissionDenied(_) => "PERMISSION_DENIED",
            Error::Gmail { .. } => "MAIL_PROVIDER_ERROR",
            Error::Completion { .. } | Error::EmptyCompletion => "CLASSIFIER_ERROR",
            Error::Config(_) | Error::MissingSecret(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}
