//! Fetch, decode and classify pipeline
//!
//! One run per request: list unread mail, fetch every message (all or
//! nothing), decode each, classify each (per-item isolation), and zip the
//! results back together in listing order.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::classify::EmailClassifier;
use crate::decode::decode_message;
use crate::error::{Error, Result};
use crate::gmail::{fetch_unread, MailSource};
use crate::models::{ClassifiedEmail, DecodedEmail, SessionToken};

/// Response body of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub success: bool,
    pub message: String,
    pub count: usize,
    pub emails: Vec<ClassifiedEmail>,
}

impl FetchReport {
    fn empty() -> Self {
        Self {
            success: true,
            message: "No unread emails found.".to_string(),
            count: 0,
            emails: Vec::new(),
        }
    }

    fn with_emails(emails: Vec<ClassifiedEmail>) -> Self {
        Self {
            success: true,
            message: format!(
                "Successfully fetched, parsed, and classified {} unread emails.",
                emails.len()
            ),
            count: emails.len(),
            emails,
        }
    }
}

/// Pick the bearer token out of a resolved session
pub fn authorize(session: Option<&SessionToken>) -> Result<&str> {
    let token = session.ok_or(Error::NotAuthenticated)?;
    if token.is_errored() {
        return Err(Error::TokenRefreshFailed);
    }
    if token.access_token.is_empty() {
        return Err(Error::NotAuthenticated);
    }
    Ok(&token.access_token)
}

/// Runs the inbox pipeline against a mail source and a classifier
#[derive(Clone)]
pub struct InboxPipeline {
    mail: Arc<dyn MailSource>,
    classifier: EmailClassifier,
}

impl InboxPipeline {
    pub fn new(mail: Arc<dyn MailSource>, classifier: EmailClassifier) -> Self {
        Self { mail, classifier }
    }

    /// Fetch, decode and classify the unread mail visible to `access_token`
    pub async fn run(&self, access_token: &str) -> Result<FetchReport> {
        let messages = fetch_unread(self.mail.as_ref(), access_token).await?;
        if messages.is_empty() {
            info!("No unread emails found");
            return Ok(FetchReport::empty());
        }

        let decoded: Vec<DecodedEmail> = messages.iter().map(decode_message).collect();
        debug!("Decoded {} messages", decoded.len());

        let categories = self.classifier.classify_all(&decoded).await;
        let degraded = categories.iter().filter(|c| c.is_degraded()).count();

        let emails: Vec<ClassifiedEmail> = decoded
            .into_iter()
            .zip(categories)
            .map(|(email, classification)| ClassifiedEmail {
                email,
                classification,
            })
            .collect();

        info!(
            "Classified {} unread emails ({} degraded)",
            emails.len(),
            degraded
        );
        Ok(FetchReport::with_emails(emails))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CompletionProvider;
    use crate::gmail::api::{GmailMessage, Header, MessageBody, MessagePart, MessageRef};
    use crate::models::Category;
    use async_trait::async_trait;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Mailbox {
        messages: Vec<GmailMessage>,
        forbidden: bool,
        fetches: AtomicUsize,
    }

    impl Mailbox {
        fn new(messages: Vec<GmailMessage>) -> Self {
            Self {
                messages,
                forbidden: false,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MailSource for Mailbox {
        async fn list_unread(&self, _access_token: &str) -> Result<Vec<MessageRef>> {
            if self.forbidden {
                return Err(Error::PermissionDenied("insufficient scopes".to_string()));
            }
            Ok(self
                .messages
                .iter()
                .map(|m| MessageRef {
                    id: m.id.clone(),
                    thread_id: None,
                })
                .collect())
        }

        async fn get_message(&self, _access_token: &str, id: &str) -> Result<GmailMessage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| Error::Gmail {
                    status: 404,
                    body: "not found".to_string(),
                })
        }
    }

    /// Classifies by keyword in the prompt
    struct KeywordProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionProvider for KeywordProvider {
        async fn complete_json(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let category = if prompt.contains("WINNER") {
                "Spam"
            } else {
                "Important"
            };
            Ok(format!(r#"{{"category": "{}"}}"#, category))
        }
    }

    fn message(id: &str, subject: &str, body: &str) -> GmailMessage {
        GmailMessage {
            id: id.to_string(),
            thread_id: None,
            snippet: None,
            payload: Some(MessagePart {
                mime_type: Some("text/plain".to_string()),
                headers: Some(vec![
                    Header {
                        name: "Subject".to_string(),
                        value: subject.to_string(),
                    },
                    Header {
                        name: "From".to_string(),
                        value: "someone@example.com".to_string(),
                    },
                ]),
                body: Some(MessageBody {
                    data: Some(URL_SAFE_NO_PAD.encode(body)),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }

    fn pipeline(mailbox: Arc<Mailbox>, provider: Arc<KeywordProvider>) -> InboxPipeline {
        InboxPipeline::new(mailbox, EmailClassifier::new(provider, 1000))
    }

    fn provider() -> Arc<KeywordProvider> {
        Arc::new(KeywordProvider {
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_authorize() {
        assert!(matches!(authorize(None), Err(Error::NotAuthenticated)));

        let token = SessionToken {
            access_token: "ya29.a".to_string(),
            refresh_token: "r".to_string(),
            access_token_expires_at: 0,
            error: None,
        };
        assert_eq!(authorize(Some(&token)).unwrap(), "ya29.a");

        let errored = token.clone().into_errored();
        assert!(matches!(authorize(Some(&errored)), Err(Error::TokenRefreshFailed)));

        let blank = SessionToken {
            access_token: String::new(),
            ..token
        };
        assert!(matches!(authorize(Some(&blank)), Err(Error::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_empty_inbox_short_circuits() {
        let mailbox = Arc::new(Mailbox::new(vec![]));
        let provider = provider();

        let report = pipeline(mailbox.clone(), provider.clone())
            .run("token")
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.message, "No unread emails found.");
        assert_eq!(report.count, 0);
        assert!(report.emails.is_empty());
        assert_eq!(mailbox.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classifies_in_listing_order() {
        let mailbox = Arc::new(Mailbox::new(vec![
            message("m1", "Contract renewal", "Please sign by Friday"),
            message("m2", "You are a WINNER", "Claim your prize"),
        ]));
        let provider = provider();

        let report = pipeline(mailbox.clone(), provider.clone())
            .run("token")
            .await
            .unwrap();

        assert_eq!(report.count, 2);
        assert_eq!(
            report.message,
            "Successfully fetched, parsed, and classified 2 unread emails."
        );
        assert_eq!(report.emails[0].email.id, "m1");
        assert_eq!(report.emails[0].email.body, "Please sign by Friday");
        assert_eq!(report.emails[0].classification, Category::Important);
        assert_eq!(report.emails[1].email.id, "m2");
        assert_eq!(report.emails[1].classification, Category::Spam);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_report_json_shape() {
        let mailbox = Arc::new(Mailbox::new(vec![message("m1", "Hi", "Body")]));
        let report = pipeline(mailbox, provider()).run("token").await.unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["count"], 1);
        let email = &json["emails"][0];
        assert_eq!(email["id"], "m1");
        assert_eq!(email["Subject"], "Hi");
        assert_eq!(email["From"], "someone@example.com");
        assert_eq!(email["Date"], "Unknown Date");
        assert_eq!(email["body"], "Body");
        assert_eq!(email["classification"], "Important");
    }

    #[tokio::test]
    async fn test_permission_denied_propagates() {
        let mut mailbox = Mailbox::new(vec![message("m1", "Hi", "Body")]);
        mailbox.forbidden = true;
        let provider = provider();

        let err = pipeline(Arc::new(mailbox), provider.clone())
            .run("token")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PermissionDenied(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
