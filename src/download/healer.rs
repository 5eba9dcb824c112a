//! Staleness healing.
//!
//! A status poll is the only moment anyone is looking at a job, so it
//! doubles as the health check: if a job has been active with no emitted
//! progress past the stale threshold, the poll reconciles against the
//! filesystem before answering. A finished file on disk heals the job to
//! completion; otherwise the job is failed as timed out, so a wedged
//! engine process can never leave a job downloading forever.

use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config;
use crate::download::cleanup;
use crate::job::{CompletedArtifact, JobRegistry, JobSnapshot};

/// Returns the job's snapshot, applying staleness healing first when due.
///
/// `base_name` is the artifact base name recorded at submission; healing
/// prefers a file matching it and falls back to the most recent video in
/// the output directory.
pub async fn check(
    registry: &Arc<JobRegistry>,
    output_dir: &Path,
    id: &str,
    base_name: Option<&str>,
) -> Option<JobSnapshot> {
    check_with_threshold(registry, output_dir, id, base_name, config::stale::STALE_AFTER_SECS).await
}

async fn check_with_threshold(
    registry: &Arc<JobRegistry>,
    output_dir: &Path,
    id: &str,
    base_name: Option<&str>,
    stale_after_secs: u64,
) -> Option<JobSnapshot> {
    let snapshot = registry.snapshot(id).await?;

    if !snapshot.status.is_active() {
        return Some(snapshot);
    }

    let stale_secs = registry.seconds_since_update(id).await.unwrap_or(0);
    if stale_secs < stale_after_secs {
        return Some(snapshot);
    }

    // Completion may have been recorded after the snapshot above was
    // taken; adopt it instead of re-scanning the filesystem.
    if registry.completed_artifact(id).await.is_some() {
        return registry.snapshot(id).await;
    }

    warn!("Job {} stale for {}s, reconciling against filesystem", id, stale_secs);

    let window = Duration::from_secs(config::stale::RECENT_FILE_WINDOW_SECS);
    let found = base_name
        .and_then(|base| cleanup::find_completed_file(output_dir, base, window))
        .or_else(|| cleanup::most_recent_video(output_dir, window));

    match found {
        Some(path) => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            info!("Job {} healed: adopting {}", id, filename);
            registry.complete(id, CompletedArtifact::new(filename, path)).await;
            if let Some(base) = base_name {
                cleanup::cleanup_intermediate_files(output_dir, base);
            }
        }
        None => {
            warn!("Job {} timed out with no artifact on disk", id);
            registry
                .fail(id, "Download timeout - please try again", "Download timed out")
                .await;
        }
    }

    registry.snapshot(id).await
}
