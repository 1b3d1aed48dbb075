//! Paginated traversal of one hashtag's listing
//!
//! A `Paginator` is an explicit state machine:
//!
//! ```text
//! Idle -> FetchingPage -> EmittingPage -> FetchingPage -> ... -> Exhausted
//!              |                                                   ^
//!              +----------------------> Failed                     |
//!                                       EmittingPage --------------+
//! ```
//!
//! Pages are fetched strictly one after another. Transient failures are
//! retried with this paginator's own backoff; everything else ends the stream.

use crate::api::{ApiError, FeedSource, TagPage};
use crate::crawler::retry::{Backoff, RetryPolicy};
use crate::model::{Cursor, MediaKind, RawPost};
use crate::{AuthError, CrawlError, UnavailableReason};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Why a paginator stopped without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `max_items` posts were yielded
    MaxItems,

    /// A post older than `since` was observed
    SinceCutoff,

    /// The upstream reported no further pages
    EndOfFeed,
}

/// Lifecycle of a paginator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginatorState {
    /// Created, nothing fetched yet
    Idle,

    /// The next page is being requested
    FetchingPage,

    /// Posts of the last page are being handed out
    EmittingPage,

    /// Finished normally
    Exhausted(StopReason),

    /// Finished with an error; the error was returned once
    Failed,
}

/// Bounds and pacing of one paginated stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    /// Maximum posts yielded
    pub max_items: usize,

    /// Stop at the first post older than this
    pub since: Option<DateTime<Utc>>,

    /// Only yield single-image posts
    pub images_only: bool,

    /// Pause between page fetches
    pub page_delay: Duration,

    pub retry: RetryPolicy,
}

impl StreamOptions {
    /// Options with only an item cap, everything else off
    pub fn with_max_items(max_items: usize) -> Self {
        Self {
            max_items,
            since: None,
            images_only: false,
            page_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}

/// Lazy, finite, non-restartable sequence of one hashtag's posts
pub struct Paginator<S: FeedSource + ?Sized> {
    source: Arc<S>,
    tag: String,
    options: StreamOptions,
    state: PaginatorState,
    cursor: Cursor,
    buffer: VecDeque<RawPost>,
    seen: HashSet<String>,
    backoff: Backoff,
}

/// Opens a paginated stream over `tag`
///
/// Nothing is fetched until the first call to `next_post`.
pub fn stream<S: FeedSource + ?Sized>(
    source: Arc<S>,
    tag: impl Into<String>,
    options: StreamOptions,
) -> Paginator<S> {
    Paginator::new(source, tag, options)
}

impl<S: FeedSource + ?Sized> Paginator<S> {
    pub fn new(source: Arc<S>, tag: impl Into<String>, options: StreamOptions) -> Self {
        let backoff = Backoff::new(options.retry);
        Self {
            source,
            tag: tag.into(),
            options,
            state: PaginatorState::Idle,
            cursor: Cursor::new(),
            buffer: VecDeque::new(),
            seen: HashSet::new(),
            backoff,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn state(&self) -> PaginatorState {
        self.state
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Produces the next post, or `None` when the stream is finished
    ///
    /// For every buffered post the `since` cutoff is checked before the item
    /// cap, so a stale post ends the stream as `SinceCutoff` even when the
    /// cap would also have been reached.
    pub async fn next_post(&mut self) -> Result<Option<RawPost>, CrawlError> {
        loop {
            match self.state {
                PaginatorState::Exhausted(_) | PaginatorState::Failed => return Ok(None),

                PaginatorState::Idle => {
                    if self.options.max_items == 0 {
                        self.finish(StopReason::MaxItems);
                    } else {
                        self.state = PaginatorState::FetchingPage;
                    }
                }

                PaginatorState::FetchingPage => match self.fetch_page().await {
                    Ok(page) => self.accept_page(page),
                    Err(e) => {
                        self.state = PaginatorState::Failed;
                        return Err(e);
                    }
                },

                PaginatorState::EmittingPage => {
                    let Some(mut post) = self.buffer.pop_front() else {
                        if self.cursor.yielded >= self.options.max_items {
                            self.finish(StopReason::MaxItems);
                        } else if self.cursor.more_available {
                            if !self.options.page_delay.is_zero() {
                                tokio::time::sleep(self.options.page_delay).await;
                            }
                            self.state = PaginatorState::FetchingPage;
                        } else {
                            self.finish(StopReason::EndOfFeed);
                        }
                        continue;
                    };

                    if let Some(since) = self.options.since {
                        if post.taken_at < since {
                            self.finish(StopReason::SinceCutoff);
                            continue;
                        }
                    }

                    if self.cursor.yielded >= self.options.max_items {
                        self.finish(StopReason::MaxItems);
                        continue;
                    }

                    if self.options.images_only && post.media_kind != MediaKind::Image {
                        continue;
                    }

                    if !self.seen.insert(post.shortcode.clone()) {
                        tracing::debug!("#{}: skipping repeated post {}", self.tag, post.shortcode);
                        continue;
                    }

                    post.tags.insert(self.tag.clone());
                    self.cursor.record_yield(post.taken_at);
                    return Ok(Some(post));
                }
            }
        }
    }

    /// Turns the paginator into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = Result<RawPost, CrawlError>>
    where
        S: 'static,
    {
        futures::stream::try_unfold(self, |mut paginator| async move {
            let next = paginator.next_post().await?;
            Ok::<_, CrawlError>(next.map(|post| (post, paginator)))
        })
    }

    fn accept_page(&mut self, page: TagPage) {
        tracing::debug!(
            "#{}: page {} with {} posts (more: {})",
            self.tag,
            self.cursor.pages_fetched + 1,
            page.posts.len(),
            page.more_available
        );
        self.cursor.advance(page.next_cursor, page.more_available);
        self.buffer.extend(page.posts);
        self.state = PaginatorState::EmittingPage;
    }

    fn finish(&mut self, reason: StopReason) {
        tracing::debug!("#{}: stream finished ({:?}, {})", self.tag, reason, self.cursor);
        self.buffer.clear();
        self.state = PaginatorState::Exhausted(reason);
    }

    /// Fetches the page at the current cursor, retrying transient failures
    async fn fetch_page(&mut self) -> Result<TagPage, CrawlError> {
        loop {
            let result = self
                .source
                .fetch_tag_page(&self.tag, self.cursor.token.as_deref())
                .await;

            match result {
                Ok(page) => {
                    self.backoff.reset();
                    return Ok(page);
                }
                Err(e) if e.is_transient() => match self.backoff.next_delay(e.retry_after()) {
                    Some(delay) => {
                        tracing::warn!(
                            "#{}: attempt {} failed ({}), retrying in {:?}",
                            self.tag,
                            self.backoff.attempts(),
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(CrawlError::Fetch {
                            tag: self.tag.clone(),
                            attempts: self.backoff.attempts(),
                            cursor: self.cursor.clone(),
                            message: e.to_string(),
                        })
                    }
                },
                Err(e) => return Err(self.terminal_error(e)),
            }
        }
    }

    fn terminal_error(&self, error: ApiError) -> CrawlError {
        match error {
            ApiError::NotFound => CrawlError::TargetUnavailable {
                tag: self.tag.clone(),
                reason: UnavailableReason::NotFound,
            },
            ApiError::Blocked(message) => CrawlError::TargetUnavailable {
                tag: self.tag.clone(),
                reason: UnavailableReason::Blocked(message),
            },
            ApiError::Unauthorized => CrawlError::Auth(AuthError::SessionExpired),
            ApiError::Challenge {
                message,
                checkpoint_url,
            } => CrawlError::Auth(AuthError::ChallengeRequired {
                message,
                checkpoint_url,
            }),
            other => CrawlError::Fetch {
                tag: self.tag.clone(),
                attempts: self.backoff.attempts() + 1,
                cursor: self.cursor.clone(),
                message: other.to_string(),
            },
        }
    }
}
