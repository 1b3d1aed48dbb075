//! Data model for crawl targets and posts
//!
//! # Components
//!
//! - `Target`: one crawl unit, a single hashtag or an AND-group of hashtags
//! - `RawPost`: an upstream listing entry, consumed by the normalizer
//! - `Post`: the canonical, persisted post record
//! - `Cursor`: per-hashtag pagination state

mod cursor;
mod post;
mod target;

pub use cursor::Cursor;
pub use post::{extract_hashtags, AuthorProfile, MediaKind, Post, RawPost};
pub use target::{normalize_tag, parse_target_list, Target, TAG_SEPARATOR};
