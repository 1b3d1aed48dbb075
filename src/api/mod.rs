//! Upstream API access
//!
//! This module contains everything that knows about the remote API:
//! - Building the HTTP client
//! - Classifying responses into success, transient and terminal failures
//! - Wire types and their conversion into `RawPost` / `AuthorProfile`
//! - The `FeedSource` and `ProfileSource` traits the crawl engine depends on

mod http;
pub mod models;
mod source;

pub use http::{build_http_client, classify_status, parse_retry_after};
pub use source::{FeedSource, ProfileSource, TagPage};

use std::time::Duration;
use thiserror::Error;

/// Classified failure of a single upstream request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Network error, timeout, rate limit or server error; worth retrying
    #[error("transient failure: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The requested resource does not exist
    #[error("not found")]
    NotFound,

    /// The request was refused for good (blocked tag, restricted account)
    #[error("blocked: {0}")]
    Blocked(String),

    /// The session is not (or no longer) authenticated
    #[error("session expired or not authenticated")]
    Unauthorized,

    /// The upstream wants a two-factor or checkpoint flow
    #[error("challenge required: {message}")]
    Challenge {
        message: String,
        checkpoint_url: Option<String>,
    },

    /// The response could not be understood
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns true if the request may succeed when retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Server-provided hint for how long to wait before retrying
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classifies a transport-level reqwest error
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::Decode(error.to_string());
        }

        let message = if error.is_timeout() {
            "request timeout".to_string()
        } else if error.is_connect() {
            format!("connection failed: {}", error)
        } else {
            error.to_string()
        };

        Self::Transient {
            message,
            retry_after: None,
        }
    }
}
