//! Email data structures

use serde::{Deserialize, Serialize};

/// Fallback values for missing headers
pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_SENDER: &str = "Unknown Sender";
pub const UNKNOWN_DATE: &str = "Unknown Date";

/// Headers the classifier cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailHeaders {
    #[serde(rename = "Subject")]
    pub subject: String,

    #[serde(rename = "From")]
    pub from: String,

    #[serde(rename = "Date")]
    pub date: String,
}

impl Default for EmailHeaders {
    fn default() -> Self {
        Self {
            subject: NO_SUBJECT.to_string(),
            from: UNKNOWN_SENDER.to_string(),
            date: UNKNOWN_DATE.to_string(),
        }
    }
}

/// A message reduced to headers and plain-text body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEmail {
    /// Gmail message id
    pub id: String,

    #[serde(flatten)]
    pub headers: EmailHeaders,

    /// Plain text body
    pub body: String,
}

/// Category assigned to an email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Important,
    Promotions,
    Social,
    Marketing,
    Spam,
    General,
    /// The provider answered but gave no usable category
    #[serde(rename = "Unclassified (Error)")]
    Unclassified,
    /// The provider call itself failed
    #[serde(rename = "Unclassified (API Error)")]
    ApiError,
}

impl Category {
    /// Categories the model is asked to choose from
    pub const CHOICES: [Category; 6] = [
        Category::Important,
        Category::Promotions,
        Category::Social,
        Category::Marketing,
        Category::Spam,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Important => "Important",
            Category::Promotions => "Promotions",
            Category::Social => "Social",
            Category::Marketing => "Marketing",
            Category::Spam => "Spam",
            Category::General => "General",
            Category::Unclassified => "Unclassified (Error)",
            Category::ApiError => "Unclassified (API Error)",
        }
    }

    /// Match a model-supplied category name (case-insensitive, choices only)
    pub fn from_choice(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::CHOICES
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }

    /// Whether this is one of the degraded sentinel values
    pub fn is_degraded(&self) -> bool {
        matches!(self, Category::Unclassified | Category::ApiError)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded email with its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEmail {
    #[serde(flatten)]
    pub email: DecodedEmail,

    pub classification: Category,
}
