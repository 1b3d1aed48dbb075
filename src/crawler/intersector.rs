//! Multi-tag intersection
//!
//! A single-tag target is a plain `normalize(stream(tag))`. For an AND-group
//! every tag gets its own paginator task; all tasks feed one channel and the
//! consuming side keeps an arena of candidates indexed by shortcode. Each
//! candidate carries one seen flag per tag and a confirmation counter, and
//! is emitted exactly once, when the counter reaches the group size.

use crate::api::FeedSource;
use crate::crawler::normalizer::Normalizer;
use crate::crawler::paginator::{Paginator, PaginatorState, StopReason, StreamOptions};
use crate::model::{Post, RawPost, Target};
use crate::CrawlError;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Capacity of the arrival channel, per tag
const ARRIVALS_PER_TAG: usize = 32;

/// Lazy, finite stream of normalized posts for one target
///
/// Ends after the first error. Dropping the stream aborts every paginator
/// task it started.
pub struct PostStream {
    inner: BoxStream<'static, Result<Post, CrawlError>>,
}

/// Starts the crawl of `target`
///
/// Every tag's paginator is bounded by `options`, which caps how far each
/// feed is explored rather than how many posts the intersection yields.
pub fn intersect(
    feed: Arc<dyn FeedSource>,
    normalizer: Arc<Normalizer>,
    target: &Target,
    options: StreamOptions,
) -> PostStream {
    let inner = if target.is_and_group() {
        let group = GroupStream::start(feed, normalizer, target, options);
        stream::try_unfold(group, |mut group| async move {
            let next = group.next().await?;
            Ok::<_, CrawlError>(next.map(|post| (post, group)))
        })
        .boxed()
    } else {
        let tag = target.tags()[0].clone();
        Paginator::new(feed, tag, options)
            .into_stream()
            .and_then(move |raw| {
                let normalizer = normalizer.clone();
                async move { Ok(normalizer.normalize_lenient(raw).await) }
            })
            .boxed()
    };
    PostStream { inner }
}

impl Stream for PostStream {
    type Item = Result<Post, CrawlError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// What a paginator task reports to the consumer
#[derive(Debug)]
enum Arrival {
    Post { tag_index: usize, post: RawPost },
    Finished { tag_index: usize, reason: StopReason },
    Failed(CrawlError),
}

/// A shortcode observed in at least one tag's feed
#[derive(Debug)]
struct Candidate {
    raw: Option<RawPost>,
    seen: Vec<bool>,
    confirmations: usize,
}

impl Candidate {
    fn is_emitted(&self) -> bool {
        self.raw.is_none()
    }
}

struct GroupStream {
    tags: Vec<String>,
    normalizer: Arc<Normalizer>,
    arrivals: mpsc::Receiver<Arrival>,
    tasks: JoinSet<()>,
    candidates: Vec<Candidate>,
    index: HashMap<String, usize>,
    ready: VecDeque<RawPost>,
    finished: Vec<bool>,
    done: bool,
}

impl GroupStream {
    fn start(
        feed: Arc<dyn FeedSource>,
        normalizer: Arc<Normalizer>,
        target: &Target,
        options: StreamOptions,
    ) -> Self {
        let tags = target.tags().to_vec();
        let (sender, arrivals) = mpsc::channel(ARRIVALS_PER_TAG * tags.len());
        let mut tasks = JoinSet::new();

        for (tag_index, tag) in tags.iter().enumerate() {
            let paginator = Paginator::new(feed.clone(), tag.clone(), options.clone());
            tasks.spawn(run_paginator(tag_index, paginator, sender.clone()));
        }

        tracing::debug!("Started {} paginators for {}", tags.len(), target);

        Self {
            finished: vec![false; tags.len()],
            tags,
            normalizer,
            arrivals,
            tasks,
            candidates: Vec::new(),
            index: HashMap::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    async fn next(&mut self) -> Result<Option<Post>, CrawlError> {
        loop {
            if let Some(raw) = self.ready.pop_front() {
                return Ok(Some(self.normalizer.normalize_lenient(raw).await));
            }

            if self.done {
                return Ok(None);
            }

            match self.arrivals.recv().await {
                Some(Arrival::Post { tag_index, post }) => self.observe(tag_index, post),
                Some(Arrival::Finished { tag_index, reason }) => {
                    tracing::debug!("#{} finished ({:?})", self.tags[tag_index], reason);
                    self.finished[tag_index] = true;
                }
                Some(Arrival::Failed(e)) => {
                    self.stop();
                    return Err(e);
                }
                None => self.done = true,
            }

            if !self.done && !self.can_still_confirm() {
                tracing::debug!("No candidate can be confirmed any more, stopping paginators");
                self.stop();
            }
        }
    }

    /// Records that `post` was seen in the feed of tag `tag_index`
    fn observe(&mut self, tag_index: usize, post: RawPost) {
        let group_size = self.tags.len();

        let Some(&slot) = self.index.get(&post.shortcode) else {
            // A finished tag can no longer confirm a new shortcode
            if self.finished.iter().any(|&f| f) {
                return;
            }
            let mut seen = vec![false; group_size];
            seen[tag_index] = true;
            self.index.insert(post.shortcode.clone(), self.candidates.len());
            self.candidates.push(Candidate {
                raw: Some(post),
                seen,
                confirmations: 1,
            });
            return;
        };

        let candidate = &mut self.candidates[slot];
        if candidate.seen[tag_index] {
            return;
        }

        candidate.seen[tag_index] = true;
        candidate.confirmations += 1;
        if let Some(raw) = candidate.raw.as_mut() {
            raw.tags.extend(post.tags);
        }

        if candidate.confirmations == group_size {
            if let Some(raw) = candidate.raw.take() {
                tracing::debug!("{} confirmed in all {} feeds", raw.shortcode, group_size);
                self.ready.push_back(raw);
            }
        }
    }

    /// Returns false once every remaining candidate misses a finished tag
    fn can_still_confirm(&self) -> bool {
        if !self.finished.iter().any(|&f| f) {
            return true;
        }

        self.candidates.iter().any(|candidate| {
            !candidate.is_emitted()
                && self
                    .finished
                    .iter()
                    .zip(&candidate.seen)
                    .all(|(&finished, &seen)| !finished || seen)
        })
    }

    fn stop(&mut self) {
        self.done = true;
        self.tasks.abort_all();
        self.arrivals.close();
    }
}

async fn run_paginator(
    tag_index: usize,
    mut paginator: Paginator<dyn FeedSource>,
    sender: mpsc::Sender<Arrival>,
) {
    loop {
        let arrival = match paginator.next_post().await {
            Ok(Some(post)) => Arrival::Post { tag_index, post },
            Ok(None) => {
                let reason = match paginator.state() {
                    PaginatorState::Exhausted(reason) => reason,
                    _ => StopReason::EndOfFeed,
                };
                let _ = sender.send(Arrival::Finished { tag_index, reason }).await;
                return;
            }
            Err(e) => {
                let _ = sender.send(Arrival::Failed(e)).await;
                return;
            }
        };

        if sender.send(arrival).await.is_err() {
            return;
        }
    }
}
