//! Data models for inboxsort
//!
//! Session tokens carried in the signed cookie, and the email values that
//! flow through the fetch-decode-classify pipeline.

mod email;
mod token;

pub use email::*;
pub use token::*;
