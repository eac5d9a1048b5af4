//! Gmail API integration
//!
//! This module provides:
//! - Gmail REST response types
//! - The [`MailSource`] seam and its HTTP implementation
//! - Unread retrieval with all-or-nothing fan-out

mod client;

pub use client::GmailClient;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::error::Result;
use api::{GmailMessage, MessageRef};

/// Gmail API response types
pub mod api {
    use serde::Deserialize;

    /// Response from listing messages
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: Option<String>,
    }

    /// Full message from Gmail API
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: Option<String>,
        pub snippet: Option<String>,
        pub payload: Option<MessagePart>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Part body; `data` is base64url when inline, absent for attachments
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub size: Option<u64>,
        pub data: Option<String>,
        pub attachment_id: Option<String>,
    }

    /// A MIME part; the top-level payload is a part too
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    impl MessagePart {
        /// Inline body data, if any
        pub fn data(&self) -> Option<&str> {
            self.body.as_ref()?.data.as_deref()
        }

        /// Whether the MIME type matches `mime` (parameters ignored)
        pub fn is_mime(&self, mime: &str) -> bool {
            self.mime_type.as_deref().is_some_and(|m| {
                m.split(';')
                    .next()
                    .is_some_and(|base| base.trim().eq_ignore_ascii_case(mime))
            })
        }
    }
}

/// Source of unread mail for one bearer token
#[async_trait]
pub trait MailSource: Send + Sync {
    /// List unread message references (capped at the configured page size)
    async fn list_unread(&self, access_token: &str) -> Result<Vec<MessageRef>>;

    /// Fetch a full message by id
    async fn get_message(&self, access_token: &str, id: &str) -> Result<GmailMessage>;
}

/// List unread messages and fetch them all concurrently.
///
/// Fails as a whole if any single fetch fails.
pub async fn fetch_unread(source: &dyn MailSource, access_token: &str) -> Result<Vec<GmailMessage>> {
    let refs = source.list_unread(access_token).await?;
    if refs.is_empty() {
        debug!("No unread messages listed");
        return Ok(Vec::new());
    }

    info!("Fetching {} unread messages", refs.len());
    let messages =
        try_join_all(refs.iter().map(|r| source.get_message(access_token, &r.id))).await?;
    debug!("Fetched {} messages", messages.len());

    Ok(messages)
}
