use crate::api::models::{TagFeedResponse, UserInfoResponse};
use crate::api::ApiError;
use crate::model::{AuthorProfile, RawPost};
use crate::session::{ApiRequest, Session};
use async_trait::async_trait;

/// One page of a hashtag listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPage {
    /// Posts on this page, newest first
    pub posts: Vec<RawPost>,

    /// Continuation token for the next page
    pub next_cursor: Option<String>,

    /// Whether the upstream reports further pages
    pub more_available: bool,
}

/// Source of paginated hashtag listings
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetches one page of the listing for `tag`, starting at `cursor`
    async fn fetch_tag_page(&self, tag: &str, cursor: Option<&str>) -> Result<TagPage, ApiError>;
}

/// Source of author profiles
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetches the profile of the user with the given id
    async fn fetch_profile(&self, user_id: &str) -> Result<AuthorProfile, ApiError>;
}

#[async_trait]
impl FeedSource for Session {
    async fn fetch_tag_page(&self, tag: &str, cursor: Option<&str>) -> Result<TagPage, ApiError> {
        let mut request = ApiRequest::get(format!("tags/{}/feed/", tag));
        if let Some(cursor) = cursor {
            request = request.query("max_id", cursor);
        }

        let response: TagFeedResponse = self.authenticated_fetch(request).await?;
        let posts = response
            .items
            .into_iter()
            .map(|item| item.into_raw_post())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TagPage {
            posts,
            next_cursor: response.next_max_id,
            more_available: response.more_available,
        })
    }
}

#[async_trait]
impl ProfileSource for Session {
    async fn fetch_profile(&self, user_id: &str) -> Result<AuthorProfile, ApiError> {
        let request = ApiRequest::get(format!("users/{}/info/", user_id));
        let response: UserInfoResponse = self.authenticated_fetch(request).await?;
        Ok(response.user.into())
    }
}
