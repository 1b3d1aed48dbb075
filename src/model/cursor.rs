use chrono::{DateTime, Utc};
use std::fmt;

/// Per-hashtag pagination state
///
/// Owned by one paginator and discarded when it finishes. A copy travels with
/// fetch errors so callers can log how far a hashtag got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Opaque continuation token for the next page (None before the first page)
    pub token: Option<String>,

    /// Whether the upstream reported more pages after the last one fetched
    pub more_available: bool,

    /// Number of pages fetched so far
    pub pages_fetched: u32,

    /// Number of posts yielded so far
    pub yielded: usize,

    /// Timestamp of the oldest post yielded so far
    pub oldest_seen: Option<DateTime<Utc>>,
}

impl Cursor {
    /// Creates a cursor positioned before the first page
    pub fn new() -> Self {
        Self {
            token: None,
            more_available: true,
            pages_fetched: 0,
            yielded: 0,
            oldest_seen: None,
        }
    }

    /// Advances past a fetched page
    pub fn advance(&mut self, next_token: Option<String>, more_available: bool) {
        self.pages_fetched += 1;
        self.more_available = more_available && next_token.is_some();
        self.token = next_token;
    }

    /// Records a yielded post
    pub fn record_yield(&mut self, taken_at: DateTime<Utc>) {
        self.yielded += 1;
        self.oldest_seen = Some(match self.oldest_seen {
            Some(oldest) if oldest <= taken_at => oldest,
            _ => taken_at,
        });
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page {}, {} posts, token {}",
            self.pages_fetched,
            self.yielded,
            self.token.as_deref().unwrap_or("<start>")
        )
    }
}
