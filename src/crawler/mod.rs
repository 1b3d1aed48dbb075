//! Crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Paginated traversal of one hashtag with retry and backoff
//! - Post normalization with a shared author-profile cache
//! - AND-group intersection across concurrent paginators
//! - Per-target driving, cancellation and batch runs

mod batch;
mod driver;
mod intersector;
mod normalizer;
mod paginator;
mod retry;

pub use batch::run_batch;
pub use driver::{run, CancelHandle, CancelToken, CrawlDriver, CrawlOutcome, CrawlResult, RunError};
pub use intersector::{intersect, PostStream};
pub use normalizer::{build_post, Normalizer};
pub use paginator::{stream, Paginator, PaginatorState, StopReason, StreamOptions};
pub use retry::{Backoff, RetryPolicy};
