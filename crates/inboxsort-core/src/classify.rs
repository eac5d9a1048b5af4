//! LLM email classification
//!
//! Each email is sent to a chat completion endpoint with a fixed prompt and a
//! JSON response format. Failures never propagate: a failed call yields
//! [`Category::ApiError`], an unusable answer yields [`Category::Unclassified`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::models::{Category, DecodedEmail};

/// A completion backend that answers with a JSON object
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Return the raw message content produced for `prompt`
    async fn complete_json(&self, prompt: &str) -> Result<String>;
}

/// Request body for the /chat/completions endpoint
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Response body from the /chat/completions endpoint
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions API
pub struct OpenAiClient {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(client: Client, config: &ClassifierConfig, api_key: String) -> Self {
        Self {
            client,
            url: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete_json(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Completion {
                status: status.as_u16(),
                body,
            });
        }

        let result: ChatResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(Error::EmptyCompletion)
    }
}

/// Classifies decoded emails through a [`CompletionProvider`]
#[derive(Clone)]
pub struct EmailClassifier {
    provider: Arc<dyn CompletionProvider>,
    snippet_chars: usize,
}

impl EmailClassifier {
    pub fn new(provider: Arc<dyn CompletionProvider>, snippet_chars: usize) -> Self {
        Self {
            provider,
            snippet_chars,
        }
    }

    /// Build the classification prompt; only the start of the body is included
    pub fn prompt(&self, email: &DecodedEmail) -> String {
        let snippet: String = email.body.chars().take(self.snippet_chars).collect();
        format!(
            "Classify the following email into one of these categories: \
             'Important', 'Promotions', 'Social', 'Marketing', 'Spam', or 'General'. \
             Respond ONLY with a JSON object like {{\"category\": \"ClassificationName\"}}.\n\n\
             Email Subject: {}\n\
             Email Sender: {}\n\
             Email Body Snippet: {}...\n",
            email.headers.subject, email.headers.from, snippet
        )
    }

    /// Classify one email; never fails
    pub async fn classify(&self, email: &DecodedEmail) -> Category {
        match self.provider.complete_json(&self.prompt(email)).await {
            Ok(content) => {
                let category = parse_verdict(&content);
                debug!("Classified {} as {}", email.id, category);
                category
            }
            Err(e) => {
                error!("Classification error for {}: {}", email.id, e);
                Category::ApiError
            }
        }
    }

    /// Classify all emails concurrently; results are in input order
    pub async fn classify_all(&self, emails: &[DecodedEmail]) -> Vec<Category> {
        join_all(emails.iter().map(|email| self.classify(email))).await
    }
}

/// Read the `category` field of a JSON verdict
pub fn parse_verdict(content: &str) -> Category {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Classifier returned invalid JSON: {}", e);
            return Category::Unclassified;
        }
    };

    match value.get("category").and_then(|c| c.as_str()) {
        Some(name) => Category::from_choice(name).unwrap_or_else(|| {
            warn!("Classifier returned unknown category {:?}", name);
            Category::Unclassified
        }),
        None => {
            warn!("Classifier response has no category field");
            Category::Unclassified
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailHeaders;
    use mockito::Matcher;
    use serde_json::json;

    /// Answers by subject: "fail" errors, otherwise echoes a canned verdict
    struct ScriptedProvider;

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete_json(&self, prompt: &str) -> Result<String> {
            if prompt.contains("Email Subject: fail") {
                return Err(Error::Completion {
                    status: 500,
                    body: "upstream".to_string(),
                });
            }
            if prompt.contains("Email Subject: sale") {
                return Ok(r#"{"category": "Promotions"}"#.to_string());
            }
            Ok(r#"{"category": "General"}"#.to_string())
        }
    }

    fn email(id: &str, subject: &str, body: &str) -> DecodedEmail {
        DecodedEmail {
            id: id.to_string(),
            headers: EmailHeaders {
                subject: subject.to_string(),
                from: "sender@example.com".to_string(),
                date: "Unknown Date".to_string(),
            },
            body: body.to_string(),
        }
    }

    #[test]
    fn test_prompt_truncates_body() {
        let classifier = EmailClassifier::new(Arc::new(ScriptedProvider), 1000);
        let body = "é".repeat(1500);
        let prompt = classifier.prompt(&email("m1", "Hello", &body));

        assert!(prompt.contains("Email Subject: Hello"));
        assert!(prompt.contains("Email Sender: sender@example.com"));
        assert!(prompt.contains(r#"{"category": "ClassificationName"}"#));
        assert_eq!(prompt.matches('é').count(), 1000);
    }

    #[test]
    fn test_parse_verdict() {
        assert_eq!(parse_verdict(r#"{"category":"Spam"}"#), Category::Spam);
        assert_eq!(parse_verdict(r#"{"category":"social"}"#), Category::Social);
        assert_eq!(parse_verdict(r#"{"label":"Spam"}"#), Category::Unclassified);
        assert_eq!(parse_verdict(r#"{"category":42}"#), Category::Unclassified);
        assert_eq!(parse_verdict(r#"{"category":"Receipts"}"#), Category::Unclassified);
        assert_eq!(parse_verdict("not json"), Category::Unclassified);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let classifier = EmailClassifier::new(Arc::new(ScriptedProvider), 1000);
        let emails = vec![
            email("m1", "sale", "50% off"),
            email("m2", "fail", "x"),
            email("m3", "hello", "lunch?"),
        ];

        let categories = classifier.classify_all(&emails).await;
        assert_eq!(
            categories,
            vec![Category::Promotions, Category::ApiError, Category::General]
        );
    }

    #[tokio::test]
    async fn test_openai_wire_format() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 50,
                "response_format": {"type": "json_object"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "chatcmpl-1",
                    "choices": [{
                        "index": 0,
                        "message": {"role": "assistant", "content": "{\"category\": \"Important\"}"},
                        "finish_reason": "stop"
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let config = ClassifierConfig {
            api_base: format!("{}/v1", server.url()),
            ..ClassifierConfig::default()
        };
        let provider = OpenAiClient::new(Client::new(), &config, "sk-test".to_string());
        let classifier = EmailClassifier::new(Arc::new(provider), config.body_snippet_chars);

        let category = classifier.classify(&email("m1", "Board meeting", "Agenda")).await;

        mock.assert_async().await;
        assert_eq!(category, Category::Important);
    }

    #[tokio::test]
    async fn test_missing_category_field() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"content":"{\"verdict\":\"Spam\"}"}}]}"#)
            .create_async()
            .await;

        let config = ClassifierConfig {
            api_base: server.url(),
            ..ClassifierConfig::default()
        };
        let provider = OpenAiClient::new(Client::new(), &config, "k".to_string());
        let classifier = EmailClassifier::new(Arc::new(provider), 1000);

        let category = classifier.classify(&email("m1", "s", "b")).await;
        assert_eq!(category, Category::Unclassified);
        assert_eq!(category.as_str(), "Unclassified (Error)");
    }

    #[tokio::test]
    async fn test_provider_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key provided"}}"#)
            .create_async()
            .await;

        let config = ClassifierConfig {
            api_base: server.url(),
            ..ClassifierConfig::default()
        };
        let provider = OpenAiClient::new(Client::new(), &config, "bad".to_string());
        let classifier = EmailClassifier::new(Arc::new(provider), 1000);

        let category = classifier.classify(&email("m1", "s", "b")).await;
        assert_eq!(category, Category::ApiError);
        assert_eq!(category.as_str(), "Unclassified (API Error)");
    }

    #[tokio::test]
    async fn test_empty_choices_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let config = ClassifierConfig {
            api_base: server.url(),
            ..ClassifierConfig::default()
        };
        let provider = OpenAiClient::new(Client::new(), &config, "k".to_string());
        let err = provider.complete_json("prompt").await.unwrap_err();
        assert!(matches!(err, Error::EmptyCompletion));
    }
}
