//! Gmail payload decoding
//!
//! Reduces a full Gmail message to the headers the classifier needs and a
//! plain-text body.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use tracing::{debug, warn};

use crate::gmail::api::{GmailMessage, Header, MessagePart};
use crate::models::{DecodedEmail, EmailHeaders};

/// Returned when a multipart message has no text anywhere in its tree
pub const NO_TEXT_BODY: &str = "No recognizable text body.";

/// Deepest part nesting searched for a text body
pub const MAX_PART_DEPTH: usize = 16;

/// Gmail sends base64url with or without padding
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a full message into headers and body
pub fn decode_message(message: &GmailMessage) -> DecodedEmail {
    let (headers, body) = match &message.payload {
        Some(payload) => (
            parse_headers(payload.headers.as_deref().unwrap_or_default()),
            decode_body(payload),
        ),
        None => {
            warn!("Message {} has no payload", message.id);
            (EmailHeaders::default(), String::new())
        }
    };

    DecodedEmail {
        id: message.id.clone(),
        headers,
        body,
    }
}

/// Extract Subject, From and Date, falling back to placeholders
pub fn parse_headers(headers: &[Header]) -> EmailHeaders {
    // Later duplicates win
    let find = |name: &str| {
        headers
            .iter()
            .rev()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };

    let defaults = EmailHeaders::default();
    EmailHeaders {
        subject: find("Subject").unwrap_or(defaults.subject),
        from: find("From").unwrap_or(defaults.from),
        date: find("Date").unwrap_or(defaults.date),
    }
}

/// Extract the plain-text body of a payload.
///
/// A single-part payload yields its own body (empty when absent). A multipart
/// payload yields its first direct `text/plain` child, else the first text
/// body found depth-first, else [`NO_TEXT_BODY`].
pub fn decode_body(payload: &MessagePart) -> String {
    let Some(parts) = &payload.parts else {
        return payload.data().and_then(decode_data).unwrap_or_default();
    };

    if let Some(text) = parts
        .iter()
        .filter(|p| p.is_mime("text/plain"))
        .find_map(|p| p.data().and_then(decode_data).filter(|s| !s.is_empty()))
    {
        return text;
    }

    parts
        .iter()
        .find_map(|p| find_text(p, 1))
        .unwrap_or_else(|| {
            debug!("No text body in {} parts", parts.len());
            NO_TEXT_BODY.to_string()
        })
}

/// Depth-first search of one part's subtree for a non-empty text body
fn find_text(part: &MessagePart, depth: usize) -> Option<String> {
    if depth > MAX_PART_DEPTH {
        warn!("Part nesting deeper than {}, giving up", MAX_PART_DEPTH);
        return None;
    }

    match &part.parts {
        None => {
            if !is_text(part) {
                return None;
            }
            part.data().and_then(decode_data).filter(|s| !s.is_empty())
        }
        Some(children) => children
            .iter()
            .find(|c| c.is_mime("text/plain") && c.data().is_some())
            .and_then(|c| c.data().and_then(decode_data))
            .filter(|s| !s.is_empty())
            .or_else(|| children.iter().find_map(|c| find_text(c, depth + 1))),
    }
}

/// Text leaves are `text/*`; a leaf with no MIME type is given the benefit of the doubt
fn is_text(part: &MessagePart) -> bool {
    match part.mime_type.as_deref() {
        None => true,
        Some(m) => m.trim().to_ascii_lowercase().starts_with("text/"),
    }
}

/// Decode base64url body data; invalid UTF-8 is replaced, invalid base64 is dropped
fn decode_data(data: &str) -> Option<String> {
    match BASE64URL.decode(data.trim()) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!("Failed to decode body data: {}", e);
            None
        }
    }
}
