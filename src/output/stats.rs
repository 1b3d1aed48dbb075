//! Batch statistics
//!
//! This module records what happened to every target of a batch and prints
//! the end-of-run summary.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Final status of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetStatus {
    /// Artifact written with at least `min_posts` posts
    Written { posts: usize },

    /// Artifact written, but with fewer than `min_posts` posts
    WrittenInsufficient { posts: usize, required: usize },

    /// The upstream does not list the hashtag (or blocks it)
    Unavailable(String),

    /// Fetching failed after retries; no artifact was written
    Failed(String),

    /// An artifact already existed and the batch runs in resume mode
    Skipped,
}

/// Outcome of one target in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target_key: String,
    pub status: TargetStatus,

    /// Posts emitted without an author profile
    pub profile_failures: usize,

    /// Where the artifact was written, if it was
    pub path: Option<PathBuf>,
}

impl TargetReport {
    pub fn new(target_key: impl Into<String>, status: TargetStatus) -> Self {
        Self {
            target_key: target_key.into(),
            status,
            profile_failures: 0,
            path: None,
        }
    }

    /// Number of posts written for this target
    pub fn posts(&self) -> usize {
        match self.status {
            TargetStatus::Written { posts } | TargetStatus::WrittenInsufficient { posts, .. } => {
                posts
            }
            _ => 0,
        }
    }
}

/// Reports of every target attempted in a batch
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reports: Vec<TargetReport>,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            reports: Vec::new(),
        }
    }

    pub fn record(&mut self, report: TargetReport) {
        self.reports.push(report);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_seconds())
    }

    /// Targets with a written artifact, insufficient ones included
    pub fn written(&self) -> usize {
        self.count(|s| {
            matches!(
                s,
                TargetStatus::Written { .. } | TargetStatus::WrittenInsufficient { .. }
            )
        })
    }

    pub fn insufficient(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::WrittenInsufficient { .. }))
    }

    pub fn unavailable(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::Unavailable(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, TargetStatus::Skipped))
    }

    pub fn total_posts(&self) -> usize {
        self.reports.iter().map(TargetReport::posts).sum()
    }

    pub fn profile_failures(&self) -> usize {
        self.reports.iter().map(|r| r.profile_failures).sum()
    }

    /// Percentage of attempted (non-skipped) targets that produced an artifact
    pub fn success_rate(&self) -> f64 {
        let attempted = self.reports.len() - self.skipped();
        if attempted == 0 {
            return 0.0;
        }
        (self.written() as f64 / attempted as f64) * 100.0
    }

    fn count(&self, predicate: impl Fn(&TargetStatus) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.status)).count()
    }
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints the batch summary to stdout in a formatted manner
pub fn print_summary(summary: &BatchSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Targets:");
    for report in &summary.reports {
        let line = match &report.status {
            TargetStatus::Written { posts } => format!("{} posts", posts),
            TargetStatus::WrittenInsufficient { posts, required } => {
                format!("{} posts (insufficient, wanted {})", posts, required)
            }
            TargetStatus::Unavailable(reason) => format!("unavailable: {}", reason),
            TargetStatus::Failed(reason) => format!("failed: {}", reason),
            TargetStatus::Skipped => "skipped (already written)".to_string(),
        };
        println!("  {}: {}", report.target_key, line);
    }
    println!();

    println!("Overview:");
    println!("  Written: {} ({} insufficient)", summary.written(), summary.insufficient());
    println!("  Unavailable: {}", summary.unavailable());
    println!("  Failed: {}", summary.failed());
    println!("  Skipped: {}", summary.skipped());
    println!("  Total posts: {}", summary.total_posts());
    if summary.profile_failures() > 0 {
        println!("  Posts without profile: {}", summary.profile_failures());
    }
    if let Some(seconds) = summary.duration_seconds() {
        println!("  Duration: {}s", seconds);
    }
    println!();

    println!("Success Rate: {:.1}%", summary.success_rate());
}
