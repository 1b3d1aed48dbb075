//! Crawl driver - runs one target to completion
//!
//! The driver wires a feed source and the post normalizer into the
//! intersector, then:
//! - Collects posts in discovery order, keeping the first of each shortcode
//! - Stops once `max_posts` posts are collected
//! - Flags the result as insufficient below `min_posts`
//! - Fails with `Cancelled` on a cancel signal or when the run timeout elapses

use crate::api::{FeedSource, ProfileSource};
use crate::config::CrawlConfig;
use crate::crawler::intersector::intersect;
use crate::crawler::normalizer::Normalizer;
use crate::model::{Post, Target};
use crate::session::Session;
use crate::{AuthError, CrawlError};
use futures::TryStreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Policy outcome of a finished crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// At least `min_posts` posts were collected
    Complete,

    /// Fewer than `min_posts` posts were collected; they are still returned
    Insufficient { required: usize, collected: usize },
}

/// Posts collected for one target
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlResult {
    /// Output key of the target, e.g. `food_AND_pizza`
    pub target_key: String,

    /// Posts in discovery order, unique by shortcode
    pub posts: Vec<Post>,

    pub outcome: CrawlOutcome,

    /// Number of posts emitted without an author profile
    pub profile_failures: usize,
}

impl CrawlResult {
    pub fn is_insufficient(&self) -> bool {
        matches!(self.outcome, CrawlOutcome::Insufficient { .. })
    }
}

/// A failed crawl, tagged with the target it belongs to
#[derive(Debug, Error)]
#[error("{target_key}: {source}")]
pub struct RunError {
    pub target_key: String,
    #[source]
    pub source: CrawlError,
}

impl RunError {
    /// Returns true if the remaining targets of a batch must not be attempted
    pub fn aborts_batch(&self) -> bool {
        self.source.aborts_batch()
    }
}

/// Sending side of a cancel signal
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Returns a token observing this handle
    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.sender.subscribe(),
        }
    }

    /// Signals every token; safe to call more than once
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a cancel signal
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        let (_, receiver) = watch::channel(false);
        Self { receiver }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Completes once the signal is sent; never completes otherwise
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Runs targets against one feed source with one immutable configuration
pub struct CrawlDriver {
    feed: Arc<dyn FeedSource>,
    normalizer: Arc<Normalizer>,
    config: CrawlConfig,
}

impl CrawlDriver {
    /// Creates a driver over explicit feed and profile sources
    pub fn new(
        feed: Arc<dyn FeedSource>,
        profiles: Arc<dyn ProfileSource>,
        config: CrawlConfig,
    ) -> Self {
        let normalizer = Arc::new(Normalizer::new(
            profiles,
            config.retry,
            config.profile_delay,
        ));
        Self {
            feed,
            normalizer,
            config,
        }
    }

    /// Creates a driver fetching everything through `session`
    pub fn for_session(session: Arc<Session>, config: CrawlConfig) -> Self {
        Self::new(session.clone(), session, config)
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Shared normalizer; its profile cache lives as long as the driver
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Crawls `target` until it is exhausted, `max_posts` are collected,
    /// the run timeout elapses or `cancel` fires
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlResult)` - Collected posts; check `outcome` for insufficiency
    /// * `Err(RunError)` - The crawl failed; the error carries the target key
    pub async fn run(&self, target: &Target, cancel: &CancelToken) -> Result<CrawlResult, RunError> {
        let target_key = target.key();
        tracing::info!("Crawling {} (max {} posts)", target, self.config.max_posts);

        let timeout = async {
            match self.config.run_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let collected = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Crawl of {} cancelled", target);
                Err(CrawlError::Cancelled { target: target_key.clone() })
            }
            _ = timeout => {
                tracing::warn!("Crawl of {} timed out", target);
                Err(CrawlError::Cancelled { target: target_key.clone() })
            }
            result = self.collect(target) => result,
        };

        let posts = collected.map_err(|source| RunError {
            target_key: target_key.clone(),
            source,
        })?;

        let outcome = if posts.len() < self.config.min_posts {
            tracing::warn!(
                "Only {} posts found for {}, wanted at least {}",
                posts.len(),
                target,
                self.config.min_posts
            );
            CrawlOutcome::Insufficient {
                required: self.config.min_posts,
                collected: posts.len(),
            }
        } else {
            CrawlOutcome::Complete
        };

        let profile_failures = posts.iter().filter(|p| !p.has_profile()).count();
        tracing::info!("Collected {} posts for {}", posts.len(), target);

        Ok(CrawlResult {
            target_key,
            posts,
            outcome,
            profile_failures,
        })
    }

    async fn collect(&self, target: &Target) -> crate::Result<Vec<Post>> {
        let mut stream = intersect(
            self.feed.clone(),
            self.normalizer.clone(),
            target,
            self.config.stream_options(),
        );

        let mut posts = Vec::new();
        let mut seen = HashSet::new();

        while posts.len() < self.config.max_posts {
            let Some(post) = stream.try_next().await? else {
                break;
            };

            if !seen.insert(post.shortcode.clone()) {
                continue;
            }
            posts.push(post);

            if posts.len() % 10 == 0 {
                tracing::info!("Progress: {} posts collected for {}", posts.len(), target);
            }
        }

        Ok(posts)
    }
}

/// Crawls one target through an authenticated session
///
/// Convenience wrapper over `CrawlDriver` for single runs; a batch should
/// reuse one driver so the profile cache is shared.
pub async fn run(
    target: &Target,
    session: Arc<Session>,
    config: &CrawlConfig,
    cancel: &CancelToken,
) -> Result<CrawlResult, RunError> {
    if !session.is_valid() {
        return Err(RunError {
            target_key: target.key(),
            source: CrawlError::Auth(AuthError::SessionExpired),
        });
    }

    CrawlDriver::for_session(session, config.clone())
        .run(target, cancel)
        .await
}
