use crate::model::Target;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A single image
    Image,

    /// A single video
    Video,

    /// A carousel of several media items
    Carousel,

    /// Anything the upstream reports that we do not recognize
    Other,
}

/// An upstream listing entry for one hashtag
///
/// Ephemeral: produced by a paginator and consumed by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    /// Upstream unique identifier of the post
    pub shortcode: String,

    /// Author's user id
    pub owner_id: String,

    /// Author's username, when the listing includes it
    pub owner_username: Option<String>,

    /// When the post was published
    pub taken_at: DateTime<Utc>,

    pub like_count: u64,

    pub comment_count: u64,

    /// Caption text, empty if the post has none
    pub caption: String,

    /// Hashtags found in the caption plus the listing tag(s) that produced this entry
    pub tags: BTreeSet<String>,

    /// URL of the media (first image candidate)
    pub media_url: String,

    pub media_kind: MediaKind,
}

/// Author profile fields, fetched once per distinct author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub username: String,
    pub full_name: String,
    pub profile_pic_url: String,
    pub media_count: u64,
    pub follower_count: u64,
    pub following_count: u64,
}

/// Canonical, persisted post record
///
/// `profile` is `None` when the author lookup failed, which is distinct from a
/// fetched profile whose fields happen to be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub shortcode: String,
    pub user_id: String,
    pub username: String,
    pub like_count: u64,
    pub comment_count: u64,
    pub caption: String,
    pub tags: BTreeSet<String>,
    pub pic_url: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    pub profile: Option<AuthorProfile>,
}

impl Post {
    /// Returns true if the author profile was fetched successfully
    pub fn has_profile(&self) -> bool {
        self.profile.is_some()
    }

    /// Returns true if this post carries every tag of the target
    pub fn covers(&self, target: &Target) -> bool {
        target.tags().iter().all(|tag| self.tags.contains(tag))
    }
}

fn hashtag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#(\w+)").expect("hashtag pattern is valid"))
}

/// Extracts the hashtags written in a caption
///
/// Tags are lower-cased and returned without the `#`.
pub fn extract_hashtags(caption: &str) -> BTreeSet<String> {
    hashtag_pattern()
        .captures_iter(caption)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}
