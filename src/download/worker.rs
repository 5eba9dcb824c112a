//! Download orchestration.
//!
//! [`DownloadService`] owns the whole submit-to-artifact pipeline: URL
//! validation, job creation, the bounded worker pool, cancellation, the
//! per-job event loop, and post-run filesystem verification. Submission
//! returns immediately; all engine work happens on spawned tasks.

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::core::validation;
use crate::download::cleanup;
use crate::download::fetcher::{Fetcher, ProbeInfo};
use crate::download::filename::FilenameResolver;
use crate::download::formats::{self, FormatOption};
use crate::download::healer;
use crate::download::planner;
use crate::download::progress::{FetchEvent, ProgressReconciler};
use crate::job::{is_valid_job_id, new_job_id, CompletedArtifact, JobId, JobRegistry, JobSnapshot};

/// Video metadata plus the processed format catalog, as returned to
/// format-inspection callers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VideoInfo {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    pub formats: Vec<FormatOption>,
}

/// Orchestrates downloads end to end.
///
/// Cheap to clone; clones share all state, so background tasks hold
/// their own handle.
#[derive(Clone)]
pub struct DownloadService {
    registry: Arc<JobRegistry>,
    fetcher: Arc<dyn Fetcher>,
    filenames: Arc<FilenameResolver>,
    output_dir: PathBuf,
    permits: Arc<Semaphore>,
    cancel_tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
    base_names: Arc<Mutex<HashMap<JobId, String>>>,
}

impl DownloadService {
    pub fn new(fetcher: Arc<dyn Fetcher>, output_dir: PathBuf) -> Self {
        Self::with_concurrency(fetcher, output_dir, *config::download::MAX_CONCURRENT_DOWNLOADS)
    }

    pub fn with_concurrency(fetcher: Arc<dyn Fetcher>, output_dir: PathBuf, max_concurrent: usize) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            fetcher,
            filenames: Arc::new(FilenameResolver::default()),
            output_dir,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel_tokens: Arc::new(Mutex::new(HashMap::new())),
            base_names: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    /// Probes a URL and returns metadata with the processed format catalog.
    pub async fn video_info(&self, raw_url: &str) -> AppResult<VideoInfo> {
        let normalized = validation::normalize_facebook_url(raw_url)?;
        let url = Url::parse(&normalized)?;

        let probe = self.fetcher.probe(&url).await?;
        let catalog = formats::build_catalog(&probe.formats);
        if catalog.is_empty() {
            return Err(AppError::Fetch(
                "No downloadable video formats found. The video may be private or restricted.".to_string(),
            ));
        }

        Ok(VideoInfo {
            title: if probe.title.is_empty() {
                "Facebook Video".to_string()
            } else {
                probe.title
            },
            thumbnail: probe.thumbnail,
            duration: probe.duration,
            uploader: probe.uploader,
            view_count: probe.view_count,
            formats: catalog,
        })
    }

    /// Validates the URL, creates a job and spawns the background fetch.
    /// Returns the new job ID immediately.
    pub async fn submit(&self, raw_url: &str, format_descriptor: &str) -> AppResult<JobId> {
        let normalized = validation::normalize_facebook_url(raw_url)?;
        let url = Url::parse(&normalized)?;

        let id = new_job_id();
        if !self.registry.create(id.clone()).await {
            return Err(AppError::Busy(
                "Server is at capacity. Please try again later.".to_string(),
            ));
        }

        let token = CancellationToken::new();
        self.cancel_tokens.lock().await.insert(id.clone(), token.clone());

        info!("Job {} submitted: {} ({})", id, url, format_descriptor);

        let service = self.clone();
        let job_id = id.clone();
        let descriptor = format_descriptor.to_string();
        tokio::spawn(async move {
            service.run_job(job_id, url, descriptor, token).await;
        });

        Ok(id)
    }

    /// Returns the job's status snapshot, applying staleness healing when
    /// due. `Ok(None)` means the ID was never seen (or already swept).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for structurally invalid IDs.
    pub async fn status(&self, id: &str) -> AppResult<Option<JobSnapshot>> {
        if !is_valid_job_id(id) {
            return Err(AppError::Validation("Invalid download ID".to_string()));
        }
        let base_name = self.base_names.lock().await.get(id).cloned();
        Ok(healer::check(&self.registry, &self.output_dir, id, base_name.as_deref()).await)
    }

    /// Cancels an active job. Returns false when the job is unknown or
    /// already terminal.
    pub async fn cancel(&self, id: &str) -> bool {
        let token = self.cancel_tokens.lock().await.get(id).cloned();
        match token {
            Some(token) => {
                let still_active = matches!(
                    self.registry.status(id).await,
                    Some(status) if !status.is_terminal()
                );
                if still_active {
                    info!("Job {} cancellation requested", id);
                    token.cancel();
                }
                still_active
            }
            None => false,
        }
    }

    /// Periodic maintenance: sweeps expired terminal jobs and drops
    /// bookkeeping for jobs the registry no longer knows.
    pub async fn maintain(&self) {
        self.registry.sweep(config::registry::terminal_ttl()).await;

        let mut tokens = self.cancel_tokens.lock().await;
        let mut stale: Vec<JobId> = Vec::new();
        for id in tokens.keys() {
            if self.registry.status(id).await.is_none() {
                stale.push(id.clone());
            }
        }
        for id in &stale {
            tokens.remove(id);
        }
        drop(tokens);

        let mut names = self.base_names.lock().await;
        let mut stale_names: Vec<JobId> = Vec::new();
        for id in names.keys() {
            if self.registry.status(id).await.is_none() {
                stale_names.push(id.clone());
            }
        }
        for id in &stale_names {
            names.remove(id);
        }
    }

    /// Outer job boundary: any error escaping the pipeline lands in the
    /// registry as a terminal failure instead of being lost with the task.
    async fn run_job(&self, id: JobId, url: Url, descriptor: String, token: CancellationToken) {
        if let Err(e) = self.execute(&id, url, descriptor, &token).await {
            error!("Job {} failed: {}", id, e);
            self.registry.fail(&id, &e.to_string(), "Download failed").await;
        }
        self.cancel_tokens.lock().await.remove(&id);
    }

    async fn execute(&self, id: &JobId, url: Url, descriptor: String, token: &CancellationToken) -> AppResult<()> {
        // Queue on the worker pool; cancellation while queued is honored
        let permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| AppError::Fetch("Worker pool shut down".to_string()))?
            }
            _ = token.cancelled() => {
                self.registry.fail(id, "Download cancelled", "Download cancelled").await;
                return Ok(());
            }
        };

        self.registry.mark_preparing(id, "Getting video information...").await;

        // Title probe failure is not fatal; the fallback name covers it
        let title = match self.fetcher.probe(&url).await {
            Ok(ProbeInfo { title, .. }) => title,
            Err(e) => {
                debug!("Job {}: title probe failed ({}), using fallback name", id, e);
                String::new()
            }
        };
        let base_name = self.filenames.resolve(&title).await;
        self.base_names.lock().await.insert(id.clone(), base_name.clone());

        let plan = planner::plan(&descriptor);
        debug!("Job {}: base_name={} target={}", id, base_name, plan.target);

        self.registry.mark_downloading(id, "Starting download...").await;

        let (tx, mut rx) = mpsc::unbounded_channel::<FetchEvent>();
        let fetcher = Arc::clone(&self.fetcher);
        let fetch_url = url.clone();
        let fetch_dir = self.output_dir.clone();
        let fetch_base = base_name.clone();
        let fetch_task = tokio::spawn(async move {
            fetcher.fetch(fetch_url, plan, fetch_dir, fetch_base, tx).await
        });

        let mut reconciler = ProgressReconciler::new(
            Arc::clone(&self.registry),
            id.clone(),
            base_name.clone(),
            self.output_dir.clone(),
        );

        let mut completed = false;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    warn!("Job {} cancelled, aborting fetch", id);
                    fetch_task.abort();
                    self.registry.fail(id, "Download cancelled", "Download cancelled").await;
                    cleanup::cleanup_intermediate_files(&self.output_dir, &base_name);
                    drop(permit);
                    return Ok(());
                }
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            if reconciler.apply(event).await {
                                completed = true;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        match fetch_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // Reconciler may already have recorded the failure from an
                // Error event; fail() is a no-op once terminal either way.
                self.registry.fail(id, &e.to_string(), "Download failed").await;
            }
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(e) => return Err(AppError::Fetch(format!("Fetch task panicked: {}", e))),
        }

        drop(permit);

        // The engine can exit cleanly without a recognizable completion
        // line. Verify against the filesystem before giving up.
        if !completed {
            if let Some(status) = self.registry.status(id).await {
                if !status.is_terminal() {
                    let window = Duration::from_secs(config::stale::VERIFY_WINDOW_SECS);
                    match cleanup::find_completed_file(&self.output_dir, &base_name, window) {
                        Some(path) => {
                            let filename = path
                                .file_name()
                                .and_then(|n| n.to_str())
                                .unwrap_or(&base_name)
                                .to_string();
                            info!("Job {}: verified artifact on disk: {}", id, filename);
                            self.registry.complete(id, CompletedArtifact::new(filename, path)).await;
                            cleanup::cleanup_intermediate_files(&self.output_dir, &base_name);
                        }
                        None => {
                            self.registry
                                .fail(id, "Download finished but no output file was found", "Download failed")
                                .await;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
