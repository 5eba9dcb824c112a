//! Progress reconciliation.
//!
//! Raw events from the extraction engine arrive at line rate; the
//! reconciler coalesces them into debounced registry updates and decides
//! when a reported completion is real (final artifact) versus a fragment
//! finishing mid-merge. Completion triggers a best-effort sweep of
//! transient files.

use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;

use crate::core::config;
use crate::download::cleanup;
use crate::job::{CompletedArtifact, JobId, JobRegistry};

/// Raw event emitted by a fetch in progress.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    Downloading {
        bytes_done: u64,
        bytes_total: Option<u64>,
        /// Percent as reported by the engine, when it prints one.
        percent_hint: Option<f64>,
        speed_mbs: Option<f64>,
        eta_seconds: Option<u64>,
    },
    /// The engine reported a file finished. May be a fragment.
    Finished { filename: String },
    Error { message: String },
}

/// Per-job event-to-registry reconciler.
///
/// Owned by the job's event loop, so its debounce state needs no locking.
pub struct ProgressReconciler {
    registry: Arc<JobRegistry>,
    job_id: JobId,
    base_name: String,
    output_dir: PathBuf,
    last_emit: Option<Instant>,
    last_percent: f64,
}

impl ProgressReconciler {
    pub fn new(registry: Arc<JobRegistry>, job_id: JobId, base_name: String, output_dir: PathBuf) -> Self {
        Self {
            registry,
            job_id,
            base_name,
            output_dir,
            last_emit: None,
            last_percent: 0.0,
        }
    }

    /// Applies one raw event. Returns true if completion was recorded.
    pub async fn apply(&mut self, event: FetchEvent) -> bool {
        match event {
            FetchEvent::Downloading {
                bytes_done,
                bytes_total,
                percent_hint,
                speed_mbs,
                eta_seconds,
            } => {
                // Byte counts are authoritative when the engine knows the
                // total; its printed percent is the fallback.
                let percent = match bytes_total {
                    Some(total) if total > 0 => (bytes_done as f64 / total as f64) * 100.0,
                    _ => percent_hint.unwrap_or(self.last_percent),
                };
                if self.should_emit(percent) {
                    self.registry
                        .update_progress(&self.job_id, percent, speed_mbs, eta_seconds)
                        .await;
                    self.last_emit = Some(Instant::now());
                    self.last_percent = self.last_percent.max(percent);
                }
                false
            }
            FetchEvent::Finished { filename } => self.handle_finished(filename).await,
            FetchEvent::Error { message } => {
                warn!("Job {}: fetch error: {}", self.job_id, message);
                self.registry
                    .fail(&self.job_id, &message, "Download failed")
                    .await;
                false
            }
        }
    }

    /// Debounce: emit on meaningful percent movement or elapsed time.
    /// Movement counts in either direction, since each fragment of a
    /// multi-stream download restarts its percent at zero. The first
    /// event always passes.
    fn should_emit(&self, percent: f64) -> bool {
        match self.last_emit {
            None => true,
            Some(at) => {
                (percent - self.last_percent).abs() >= config::progress::PERCENT_THRESHOLD
                    || at.elapsed().as_secs_f64() >= config::progress::TIME_THRESHOLD_SECS
            }
        }
    }

    async fn handle_finished(&mut self, filename: String) -> bool {
        let name = std::path::Path::new(&filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&filename)
            .to_string();

        if cleanup::is_intermediate_artifact(&name) {
            debug!("Job {}: fragment finished, still merging: {}", self.job_id, name);
            return false;
        }

        let filepath = if std::path::Path::new(&filename).is_absolute() {
            PathBuf::from(&filename)
        } else {
            self.output_dir.join(&name)
        };

        let recorded = self
            .registry
            .complete(&self.job_id, CompletedArtifact::new(name.clone(), filepath))
            .await;

        if recorded {
            info!("Job {}: completed with artifact {}", self.job_id, name);
            // Fire-and-forget sweep of leftover fragments
            let dir = self.output_dir.clone();
            let base = self.base_name.clone();
            tokio::task::spawn_blocking(move || {
                cleanup::cleanup_intermediate_files(&dir, &base);
            });
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{new_job_id, JobStatus};
    use pretty_assertions::assert_eq;
    use tokio::time::Duration;

    async fn setup() -> (Arc<JobRegistry>, JobId, ProgressReconciler, tempfile::TempDir) {
        let registry = Arc::new(JobRegistry::new());
        let id = new_job_id();
        registry.create(id.clone()).await;
        registry.mark_downloading(&id, "Starting download...").await;
        let dir = tempfile::TempDir::new().unwrap();
        let rec = ProgressReconciler::new(
            Arc::clone(&registry),
            id.clone(),
            "My_Clip".to_string(),
            dir.path().to_path_buf(),
        );
        (registry, id, rec, dir)
    }

    fn downloading(percent: f64) -> FetchEvent {
        FetchEvent::Downloading {
            bytes_done: 0,
            bytes_total: None,
            percent_hint: Some(percent),
            speed_mbs: Some(1.5),
            eta_seconds: Some(10),
        }
    }

    // ==================== Debounce Tests ====================

    #[tokio::test]
    async fn test_first_event_always_emits() {
        let (registry, id, mut rec, _dir) = setup().await;
        rec.apply(downloading(0.2)).await;
        let snap = registry.snapshot(&id).await.unwrap();
        assert_eq!(snap.speed, Some(1.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_delta_suppressed() {
        let (registry, id, mut rec, _dir) = setup().await;
        rec.apply(downloading(20.0)).await;
        // +0.5% within the time window: no emission
        rec.apply(FetchEvent::Downloading {
            bytes_done: 0,
            bytes_total: None,
            percent_hint: Some(20.5),
            speed_mbs: Some(9.9),
            eta_seconds: None,
        })
        .await;
        let snap = registry.snapshot(&id).await.unwrap();
        assert_eq!(snap.percent, 20.0);
        assert_eq!(snap.speed, Some(1.5));
    }

    #[tokio::test]
    async fn test_percent_delta_emits() {
        let (registry, id, mut rec, _dir) = setup().await;
        rec.apply(downloading(20.0)).await;
        rec.apply(downloading(21.5)).await;
        assert_eq!(registry.snapshot(&id).await.unwrap().percent, 21.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_elapse_emits_despite_small_delta() {
        let (registry, id, mut rec, _dir) = setup().await;
        rec.apply(downloading(20.0)).await;
        tokio::time::advance(Duration::from_secs(3)).await;
        rec.apply(downloading(20.3)).await;
        assert_eq!(registry.snapshot(&id).await.unwrap().percent, 20.3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragment_restart_keeps_speed_fresh() {
        let (registry, id, mut rec, _dir) = setup().await;
        rec.apply(downloading(50.0)).await;

        // The next fragment restarts near zero. The drop is movement too:
        // speed/eta must keep tracking without waiting out the time window.
        rec.apply(FetchEvent::Downloading {
            bytes_done: 0,
            bytes_total: None,
            percent_hint: Some(2.0),
            speed_mbs: Some(9.9),
            eta_seconds: Some(4),
        })
        .await;

        let snap = registry.snapshot(&id).await.unwrap();
        // Stored percent never regresses, but the rest of the update lands
        assert_eq!(snap.percent, 50.0);
        assert_eq!(snap.speed, Some(9.9));
        assert_eq!(snap.eta, Some(4));
    }

    #[tokio::test]
    async fn test_percent_computed_from_bytes() {
        let (registry, id, mut rec, _dir) = setup().await;
        rec.apply(FetchEvent::Downloading {
            bytes_done: 25,
            bytes_total: Some(100),
            percent_hint: None,
            speed_mbs: None,
            eta_seconds: None,
        })
        .await;
        assert_eq!(registry.snapshot(&id).await.unwrap().percent, 25.0);
    }

    // ==================== Finished Tests ====================

    #[tokio::test]
    async fn test_fragment_finished_does_not_complete() {
        let (registry, id, mut rec, _dir) = setup().await;
        let done = rec.apply(FetchEvent::Finished {
            filename: "My_Clip.f137.mp4".to_string(),
        })
        .await;
        assert!(!done);
        assert_eq!(registry.snapshot(&id).await.unwrap().status, JobStatus::Downloading);
    }

    #[tokio::test]
    async fn test_final_file_completes_job() {
        let (registry, id, mut rec, _dir) = setup().await;
        let done = rec.apply(FetchEvent::Finished {
            filename: "My_Clip.mp4".to_string(),
        })
        .await;
        assert!(done);
        let snap = registry.snapshot(&id).await.unwrap();
        assert_eq!(snap.status, JobStatus::Finished);
        assert_eq!(snap.percent, 100.0);
        assert_eq!(snap.filename.as_deref(), Some("My_Clip.mp4"));
    }

    #[tokio::test]
    async fn test_completion_sweeps_fragments() {
        let (registry, id, mut rec, dir) = setup().await;
        std::fs::write(dir.path().join("My_Clip.f137.mp4"), b"frag").unwrap();
        std::fs::write(dir.path().join("My_Clip.mp4"), b"final").unwrap();

        rec.apply(FetchEvent::Finished {
            filename: "My_Clip.mp4".to_string(),
        })
        .await;

        // Sweep runs on the blocking pool; give it a moment
        for _ in 0..50 {
            if !dir.path().join("My_Clip.f137.mp4").exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!dir.path().join("My_Clip.f137.mp4").exists());
        assert!(dir.path().join("My_Clip.mp4").exists());
        assert_eq!(registry.snapshot(&id).await.unwrap().status, JobStatus::Finished);
    }

    // ==================== Error Tests ====================

    #[tokio::test]
    async fn test_error_event_fails_job() {
        let (registry, id, mut rec, _dir) = setup().await;
        rec.apply(downloading(60.0)).await;
        rec.apply(FetchEvent::Error {
            message: "Requested format is not available".to_string(),
        })
        .await;
        let snap = registry.snapshot(&id).await.unwrap();
        assert_eq!(snap.status, JobStatus::Error);
        assert_eq!(snap.percent, 0.0);
        assert_eq!(snap.error.as_deref(), Some("Requested format is not available"));
    }

    #[tokio::test]
    async fn test_late_progress_after_completion_ignored() {
        let (registry, id, mut rec, _dir) = setup().await;
        rec.apply(FetchEvent::Finished {
            filename: "My_Clip.mp4".to_string(),
        })
        .await;
        rec.apply(downloading(55.0)).await;
        let snap = registry.snapshot(&id).await.unwrap();
        assert_eq!(snap.status, JobStatus::Finished);
        assert_eq!(snap.percent, 100.0);
    }
}
