//! Sink trait and error types
//!
//! A sink receives the collected posts of one target and persists them as a
//! named artifact. Implementations must be thread-safe.

use crate::model::Post;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while persisting posts
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to serialize posts: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Destination of per-target post collections
pub trait Sink: Send + Sync {
    /// Location the artifact of `target_key` is (or would be) written to
    fn path_for(&self, target_key: &str) -> PathBuf;

    /// Returns true if an artifact for `target_key` already exists
    ///
    /// Used to skip finished targets when a batch is resumed.
    fn exists(&self, target_key: &str) -> bool;

    /// Persists `posts` as the artifact of `target_key`, replacing any previous one
    ///
    /// # Arguments
    ///
    /// * `target_key` - Output key of the target, e.g. `food_AND_pizza`
    /// * `posts` - Posts in discovery order
    ///
    /// # Returns
    ///
    /// * `Ok(PathBuf)` - Where the artifact was written
    /// * `Err(SinkError)` - The artifact could not be written
    fn write(&self, target_key: &str, posts: &[Post]) -> SinkResult<PathBuf>;
}
