//! Gmail API HTTP client

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, error, warn};

use super::api::{GmailMessage, ListMessagesResponse, MessageRef};
use super::MailSource;
use crate::config::GmailConfig;
use crate::error::{Error, Result};

/// Gmail API client for reading the signed-in user's mailbox
pub struct GmailClient {
    client: Client,
    api_base: String,
    max_results: u32,
    query: String,
}

impl GmailClient {
    /// Create a new Gmail client sharing `client`'s connection pool and timeout
    pub fn new(client: Client, config: &GmailConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_results: config.max_results,
            query: config.query.clone(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/gmail/v1/users/me/messages", self.api_base)
    }

    /// Turn a non-success response into the matching error
    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::FORBIDDEN {
            warn!("Gmail denied {}: {}", what, body);
            return Err(Error::PermissionDenied(body));
        }

        error!("Gmail {} failed: {} - {}", what, status, body);
        Err(Error::Gmail {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl MailSource for GmailClient {
    async fn list_unread(&self, access_token: &str) -> Result<Vec<MessageRef>> {
        debug!("Listing up to {} messages matching {:?}", self.max_results, self.query);

        let response = self
            .client
            .get(self.messages_url())
            .bearer_auth(access_token)
            .query(&[
                ("maxResults", self.max_results.to_string()),
                ("q", self.query.clone()),
            ])
            .send()
            .await?;

        let list: ListMessagesResponse = Self::check(response, "message list").await?.json().await?;
        let mut refs = list.messages.unwrap_or_default();
        if refs.len() > self.max_results as usize {
            warn!("Listing returned {} messages, keeping {}", refs.len(), self.max_results);
            refs.truncate(self.max_results as usize);
        }
        Ok(refs)
    }

    async fn get_message(&self, access_token: &str, id: &str) -> Result<GmailMessage> {
        debug!("Fetching message {}", id);

        let response = self
            .client
            .get(format!("{}/{}", self.messages_url(), urlencoding::encode(id)))
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await?;

        Ok(Self::check(response, "message fetch").await?.json().await?)
    }
}
