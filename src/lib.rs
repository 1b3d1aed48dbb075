//! Hashtag Crawler: collects posts for hashtags and hashtag AND-groups
//!
//! This crate implements a crawl engine over an authenticated, rate-limited,
//! paginated social-media API. It handles session acquisition, paginated
//! traversal with stopping conditions, multi-hashtag intersection and
//! incremental JSON output.

pub mod api;
pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod session;

use std::fmt;
use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Hashtag #{tag} is unavailable: {reason}")]
    TargetUnavailable {
        tag: String,
        reason: UnavailableReason,
    },

    #[error("Fetching #{tag} failed after {attempts} attempts ({cursor}): {message}")]
    Fetch {
        tag: String,
        attempts: u32,
        cursor: model::Cursor,
        message: String,
    },

    #[error("Crawl of {target} was cancelled")]
    Cancelled { target: String },

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Output error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Returns true if this error must stop a whole batch rather than a single target
    pub fn aborts_batch(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Auth(_) | Self::Cancelled { .. } | Self::Sink(_) | Self::Io(_)
        )
    }
}

/// Why the upstream refused to list a hashtag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The hashtag does not exist
    NotFound,

    /// The hashtag or the account is blocked
    Blocked(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Blocked(message) if message.is_empty() => write!(f, "blocked"),
            Self::Blocked(message) => write!(f, "blocked ({})", message),
        }
    }
}

/// Authentication and session errors
///
/// None of these are retried: repeating a rejected login risks locking the account.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials for {username}: {message}")]
    InvalidCredentials { username: String, message: String },

    #[error("Login challenge required ({message}); complete it in a browser and retry with a session or cookie file")]
    ChallengeRequired {
        message: String,
        checkpoint_url: Option<String>,
    },

    #[error("Session rejected by upstream: {0}")]
    SessionRejected(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Upstream unavailable while checking the session: {0}")]
    Unavailable(String),

    #[error("Missing required cookies: {}", .0.join(", "))]
    MissingCookies(Vec<String>),

    #[error("Failed to read cookie file {path}: {message}")]
    CookieFile { path: String, message: String },

    #[error("Session file error: {0}")]
    SessionFile(String),

    #[error("HTTP error during authentication: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected authentication response: {0}")]
    Unexpected(String),
}

impl AuthError {
    /// Returns true if the upstream asked for out-of-band user action
    pub fn is_challenge(&self) -> bool {
        matches!(self, Self::ChallengeRequired { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Author profile lookup failure
///
/// Reported per post; the post is still emitted without profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to fetch profile for user {user_id}: {message}")]
pub struct ProfileFetchError {
    pub user_id: String,
    pub message: String,
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{CrawlConfig, Settings};
pub use crawler::{run, CancelHandle, CancelToken, CrawlDriver, CrawlOutcome, CrawlResult, RunError};
pub use model::{AuthorProfile, Post, RawPost, Target};
pub use session::{LoginSource, Session, SessionManager};
