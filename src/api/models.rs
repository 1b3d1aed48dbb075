//! Wire types for the upstream API
//!
//! Only the fields the crawler needs are modeled; unknown fields are ignored.

use crate::api::ApiError;
use crate::model::{extract_hashtags, AuthorProfile, MediaKind, RawPost};
use chrono::{TimeZone, Utc};
use serde::Deserialize;

/// User ids arrive as numbers from some endpoints and strings from others
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(u64),
    Text(String),
}

impl WireId {
    pub fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// Error payload returned alongside non-success statuses
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    pub message: Option<String>,
    #[serde(default)]
    pub two_factor_required: bool,
    pub checkpoint_url: Option<String>,
    pub error_type: Option<String>,
}

impl ErrorBody {
    /// Returns true if the payload asks for a two-factor or checkpoint flow
    pub fn is_challenge(&self) -> bool {
        let message = self.message.as_deref().unwrap_or_default();
        let error_type = self.error_type.as_deref().unwrap_or_default();
        self.two_factor_required
            || self.checkpoint_url.is_some()
            || message.contains("checkpoint_required")
            || message.contains("challenge_required")
            || error_type.contains("checkpoint")
    }
}

/// Response of `POST accounts/login/`
#[derive(Debug, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub authenticated: bool,
    pub user_id: Option<WireId>,
    pub message: Option<String>,
    #[serde(default)]
    pub two_factor_required: bool,
    pub checkpoint_url: Option<String>,
}

impl LoginResponse {
    pub fn is_challenge(&self) -> bool {
        let message = self.message.as_deref().unwrap_or_default();
        self.two_factor_required
            || self.checkpoint_url.is_some()
            || message.contains("checkpoint_required")
            || message.contains("challenge_required")
    }
}

/// Response of `GET accounts/current_user/`
#[derive(Debug, Deserialize)]
pub struct CurrentUserResponse {
    pub user: CurrentUser,
}

#[derive(Debug, Deserialize)]
pub struct CurrentUser {
    pub pk: WireId,
    pub username: String,
}

/// Response of `GET tags/{tag}/feed/`
#[derive(Debug, Deserialize)]
pub struct TagFeedResponse {
    #[serde(default)]
    pub items: Vec<FeedItem>,
    #[serde(default)]
    pub more_available: bool,
    pub next_max_id: Option<String>,
}

/// One entry of a hashtag feed
#[derive(Debug, Deserialize)]
pub struct FeedItem {
    pub code: String,
    pub taken_at: i64,
    #[serde(default)]
    pub media_type: u8,
    pub user: FeedUser,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    pub caption: Option<FeedCaption>,
    pub image_versions2: Option<ImageVersions>,
}

#[derive(Debug, Deserialize)]
pub struct FeedUser {
    pub pk: WireId,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedCaption {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageVersions {
    #[serde(default)]
    pub candidates: Vec<ImageCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct ImageCandidate {
    pub url: String,
}

impl FeedItem {
    /// Converts a wire item into a `RawPost`
    ///
    /// The tag set holds the caption's hashtags; the paginator adds the
    /// listing tag afterwards.
    pub fn into_raw_post(self) -> Result<RawPost, ApiError> {
        let taken_at = Utc
            .timestamp_opt(self.taken_at, 0)
            .single()
            .ok_or_else(|| {
                ApiError::Decode(format!("invalid timestamp {} on {}", self.taken_at, self.code))
            })?;

        let caption = self.caption.map(|c| c.text).unwrap_or_default();
        let tags = extract_hashtags(&caption);
        let media_url = self
            .image_versions2
            .and_then(|v| v.candidates.into_iter().next())
            .map(|c| c.url)
            .unwrap_or_default();

        let media_kind = match self.media_type {
            1 => MediaKind::Image,
            2 => MediaKind::Video,
            8 => MediaKind::Carousel,
            _ => MediaKind::Other,
        };

        Ok(RawPost {
            shortcode: self.code,
            owner_id: self.user.pk.into_string(),
            owner_username: self.user.username,
            taken_at,
            like_count: self.like_count,
            comment_count: self.comment_count,
            caption,
            tags,
            media_url,
            media_kind,
        })
    }
}

/// Response of `GET users/{id}/info/`
#[derive(Debug, Deserialize)]
pub struct UserInfoResponse {
    pub user: UserInfo,
}

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub profile_pic_url: String,
    #[serde(default)]
    pub media_count: u64,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub following_count: u64,
}

impl From<UserInfo> for AuthorProfile {
    fn from(user: UserInfo) -> Self {
        Self {
            username: user.username,
            full_name: user.full_name,
            profile_pic_url: user.profile_pic_url,
            media_count: user.media_count,
            follower_count: user.follower_count,
            following_count: user.following_count,
        }
    }
}
