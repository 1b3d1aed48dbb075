//! Conversion of raw listing entries into canonical posts
//!
//! Author profiles are looked up once per distinct user id and run. Concurrent
//! lookups of the same unseen user share one request: the first caller
//! fetches, the others wait on the same cell and reuse its outcome.

use crate::api::ProfileSource;
use crate::crawler::retry::{Backoff, RetryPolicy};
use crate::model::{AuthorProfile, Post, RawPost};
use crate::ProfileFetchError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;

type ProfileCell = Arc<OnceCell<Result<AuthorProfile, ProfileFetchError>>>;

/// Builds `Post`s from `RawPost`s, enriching them with cached author profiles
pub struct Normalizer {
    source: Arc<dyn ProfileSource>,
    cache: Mutex<HashMap<String, ProfileCell>>,
    retry: RetryPolicy,
    profile_delay: Duration,
    fetches: AtomicUsize,
    failures: AtomicUsize,
}

impl Normalizer {
    pub fn new(source: Arc<dyn ProfileSource>, retry: RetryPolicy, profile_delay: Duration) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
            retry,
            profile_delay,
            fetches: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Normalizes a post, failing if its author's profile cannot be fetched
    pub async fn normalize(&self, raw: RawPost) -> Result<Post, ProfileFetchError> {
        let profile = self.profile(&raw.owner_id).await?;
        Ok(build_post(raw, Some(profile)))
    }

    /// Normalizes a post, leaving `profile` empty if the lookup fails
    ///
    /// The failure is logged and counted, never escalated.
    pub async fn normalize_lenient(&self, raw: RawPost) -> Post {
        match self.profile(&raw.owner_id).await {
            Ok(profile) => build_post(raw, Some(profile)),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Post {}: {}", raw.shortcode, e);
                build_post(raw, None)
            }
        }
    }

    /// Number of profile requests sent upstream, retries included
    pub fn profile_fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Number of posts emitted without a profile
    pub fn profile_failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Number of distinct authors looked up so far
    pub fn cached_profiles(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn profile(&self, user_id: &str) -> Result<AuthorProfile, ProfileFetchError> {
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.entry(user_id.to_string()).or_default().clone()
        };

        cell.get_or_init(|| self.fetch_profile(user_id))
            .await
            .clone()
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<AuthorProfile, ProfileFetchError> {
        let mut backoff = Backoff::new(self.retry);

        loop {
            if !self.profile_delay.is_zero() {
                tokio::time::sleep(self.profile_delay).await;
            }

            self.fetches.fetch_add(1, Ordering::Relaxed);
            match self.source.fetch_profile(user_id).await {
                Ok(profile) => {
                    tracing::debug!("Fetched profile of {} ({})", profile.username, user_id);
                    return Ok(profile);
                }
                Err(e) if e.is_transient() => match backoff.next_delay(e.retry_after()) {
                    Some(delay) => {
                        tracing::debug!("Profile {} failed ({}), retrying in {:?}", user_id, e, delay);
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(ProfileFetchError {
                            user_id: user_id.to_string(),
                            message: format!("{} (after {} attempts)", e, backoff.attempts()),
                        })
                    }
                },
                Err(e) => {
                    return Err(ProfileFetchError {
                        user_id: user_id.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
    }
}

/// Assembles the canonical post from a raw entry and an optional profile
pub fn build_post(raw: RawPost, profile: Option<AuthorProfile>) -> Post {
    let username = raw
        .owner_username
        .filter(|name| !name.is_empty())
        .or_else(|| profile.as_ref().map(|p| p.username.clone()))
        .unwrap_or_default();

    Post {
        shortcode: raw.shortcode,
        user_id: raw.owner_id,
        username,
        like_count: raw.like_count,
        comment_count: raw.comment_count,
        caption: raw.caption,
        tags: raw.tags,
        pic_url: raw.media_url,
        date: raw.taken_at,
        profile,
    }
}
