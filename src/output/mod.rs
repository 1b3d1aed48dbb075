//! Output module for persisting crawl results
//!
//! This module handles:
//! - The `Sink` contract a batch writes finished targets through
//! - Writing per-target JSON artifacts
//! - Recording and printing batch statistics

mod json_sink;
pub mod stats;
mod traits;

pub use json_sink::{load_posts, JsonFileSink};
pub use stats::{print_summary, BatchSummary, TargetReport, TargetStatus};
pub use traits::{Sink, SinkError, SinkResult};
