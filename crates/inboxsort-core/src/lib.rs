//! Inboxsort Core Library
//!
//! Google sign-in with per-request token refresh, unread Gmail retrieval,
//! MIME body decoding and LLM classification of each message.

pub mod classify;
pub mod config;
pub mod decode;
pub mod error;
pub mod gmail;
pub mod models;
pub mod oauth;
pub mod pipeline;
pub mod session;

pub use config::{Config, Secrets};
pub use error::{Error, Result};
pub use models::*;

/// Application name for config paths
pub const APP_NAME: &str = "inboxsort";
