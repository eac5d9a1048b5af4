//! Configuration management for inboxsort

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Inbound HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Google OAuth endpoints and session lifetime
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Gmail API settings
    #[serde(default)]
    pub gmail: GmailConfig,

    /// LLM classification settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for daily-rotated log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

/// Inbound HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Externally visible base URL, used to build the OAuth redirect URI
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Name of the signed session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Mark cookies `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,

    /// Session cookie lifetime (seconds)
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_url: default_public_url(),
            cookie_name: default_cookie_name(),
            secure_cookies: false,
            session_max_age_secs: default_session_max_age(),
        }
    }
}

impl ServerConfig {
    /// OAuth redirect URI registered with Google
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}/api/auth/callback/google",
            self.public_url.trim_end_matches('/')
        )
    }
}

/// Google OAuth settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Authorization endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Token endpoint (code exchange and refresh)
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Requested scopes
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// An access token is treated as expired this long before its real expiry (ms)
    #[serde(default = "default_refresh_buffer_ms")]
    pub refresh_buffer_ms: i64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            scopes: default_scopes(),
            refresh_buffer_ms: default_refresh_buffer_ms(),
        }
    }
}

/// Gmail API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    /// API base URL
    #[serde(default = "default_gmail_api_base")]
    pub api_base: String,

    /// Maximum messages listed per request
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Gmail search query for the listing
    #[serde(default = "default_query")]
    pub query: String,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: default_gmail_api_base(),
            max_results: default_max_results(),
            query: default_query(),
        }
    }
}

/// LLM classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Chat completions API base URL (OpenAI-compatible)
    #[serde(default = "default_classifier_api_base")]
    pub api_base: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Completion token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Number of body characters embedded in the prompt
    #[serde(default = "default_body_snippet_chars")]
    pub body_snippet_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_base: default_classifier_api_base(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            body_snippet_chars: default_body_snippet_chars(),
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Upper bound for every outbound request (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_cookie_name() -> String {
    "inboxsort.session".to_string()
}

fn default_session_max_age() -> u64 {
    30 * 24 * 60 * 60
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_scopes() -> Vec<String> {
    crate::oauth::OAUTH_SCOPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_refresh_buffer_ms() -> i64 {
    5_000
}

fn default_gmail_api_base() -> String {
    "https://gmail.googleapis.com".to_string()
}

fn default_max_results() -> u32 {
    5
}

fn default_query() -> String {
    "is:unread".to_string()
}

fn default_classifier_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    50
}

fn default_body_snippet_chars() -> usize {
    1000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Get the config directory (XDG: ~/.config/inboxsort)
fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(crate::APP_NAME)
}

impl Config {
    /// Default config file path
    pub fn default_path() -> PathBuf {
        get_config_dir().join("config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            info!("No config file found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

/// Secrets read from the environment, never from the config file
#[derive(Clone)]
pub struct Secrets {
    pub google_client_id: String,
    pub google_client_secret: String,
    pub session_secret: String,
    pub openai_api_key: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("google_client_id", &self.google_client_id)
            .finish_non_exhaustive()
    }
}

impl Secrets {
    /// Load secrets from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load secrets through an arbitrary lookup (first non-empty name wins)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| -> Result<String> {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
                .ok_or_else(|| Error::MissingSecret(names.join(" or ")))
        };

        Ok(Self {
            google_client_id: first(&["INBOXSORT_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID"])?,
            google_client_secret: first(&[
                "INBOXSORT_GOOGLE_CLIENT_SECRET",
                "GOOGLE_CLIENT_SECRET",
            ])?,
            session_secret: first(&["INBOXSORT_SESSION_SECRET", "NEXTAUTH_SECRET"])?,
            openai_api_key: first(&["INBOXSORT_OPENAI_API_KEY", "OPENAI_API_KEY"])?,
        })
    }
}
