use crate::crawler::driver::{CancelToken, CrawlDriver, CrawlOutcome, RunError};
use crate::model::Target;
use crate::output::{BatchSummary, Sink, TargetReport, TargetStatus};
use crate::CrawlError;

/// Runs targets one after another, writing each artifact as soon as it is done
///
/// In resume mode, targets whose artifact already exists are skipped.
/// Unavailable targets and fetch failures are recorded and the batch moves
/// on; authentication failures, cancellation and output errors stop it.
///
/// # Arguments
///
/// * `driver` - Driver shared by all targets (and so is its profile cache)
/// * `targets` - Targets in the order they are crawled
/// * `sink` - Where finished targets are written
/// * `resume` - Skip targets that already have an artifact
/// * `cancel` - Stops the batch, including the target in progress
///
/// # Returns
///
/// * `Ok(BatchSummary)` - Every target was attempted or skipped
/// * `Err(RunError)` - The batch was aborted at the named target
pub async fn run_batch(
    driver: &CrawlDriver,
    targets: &[Target],
    sink: &dyn Sink,
    resume: bool,
    cancel: &CancelToken,
) -> Result<BatchSummary, RunError> {
    let mut summary = BatchSummary::new();

    for (position, target) in targets.iter().enumerate() {
        let target_key = target.key();

        if cancel.is_cancelled() {
            return Err(RunError {
                source: CrawlError::Cancelled {
                    target: target_key.clone(),
                },
                target_key,
            });
        }

        if resume && sink.exists(&target_key) {
            tracing::info!(
                "Skipping {}: {} already exists",
                target,
                sink.path_for(&target_key).display()
            );
            summary.record(TargetReport::new(target_key, TargetStatus::Skipped));
            continue;
        }

        tracing::info!("Target {}/{}: {}", position + 1, targets.len(), target);

        let report = match driver.run(target, cancel).await {
            Ok(result) => {
                let path = sink.write(&result.target_key, &result.posts).map_err(|e| RunError {
                    target_key: result.target_key.clone(),
                    source: CrawlError::Sink(e),
                })?;

                let posts = result.posts.len();
                let status = match result.outcome {
                    CrawlOutcome::Complete => TargetStatus::Written { posts },
                    CrawlOutcome::Insufficient { required, .. } => {
                        TargetStatus::WrittenInsufficient { posts, required }
                    }
                };

                TargetReport {
                    target_key: result.target_key,
                    status,
                    profile_failures: result.profile_failures,
                    path: Some(path),
                }
            }
            Err(e) if e.aborts_batch() => return Err(e),
            Err(e) => {
                let status = match &e.source {
                    CrawlError::TargetUnavailable { tag, reason } => {
                        tracing::warn!("{}: #{} is {}", target, tag, reason);
                        TargetStatus::Unavailable(format!("#{} {}", tag, reason))
                    }
                    other => {
                        tracing::error!("{}: {}", target, other);
                        TargetStatus::Failed(other.to_string())
                    }
                };
                TargetReport::new(e.target_key, status)
            }
        };

        summary.record(report);
    }

    summary.finish();
    Ok(summary)
}
