//! Thread-safe job registry.
//!
//! All job state lives behind one async mutex. The coarse lock is a
//! correctness requirement, not a performance one: every read-then-write
//! (progress emission, completion recording, staleness healing) must be
//! serialized so the terminal-state law cannot be violated by interleaving.
//! Status reads take a snapshot copy so the lock is never held during
//! response serialization.

use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::core::config;
use crate::job::{CompletedArtifact, Job, JobId, JobSnapshot, JobStatus};

struct RegistryInner {
    jobs: HashMap<JobId, Job>,
    completed: HashMap<JobId, CompletedArtifact>,
}

/// Registry of all jobs known to this process.
///
/// Bounded: terminal jobs are evicted by [`JobRegistry::sweep`] after a TTL,
/// and job creation evicts the oldest terminal job when the capacity cap is
/// reached.
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_capacity(config::registry::MAX_JOBS)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                jobs: HashMap::new(),
                completed: HashMap::new(),
            }),
            capacity,
        }
    }

    /// Creates a new job in `created` state.
    ///
    /// The capacity cap is hard: when the registry is full, the stalest
    /// terminal job is evicted to make room, and if every retained job is
    /// still active the new job is rejected and `false` is returned.
    pub async fn create(&self, id: JobId) -> bool {
        let mut inner = self.inner.lock().await;

        if inner.jobs.len() >= self.capacity {
            let victim = inner
                .jobs
                .values()
                .filter(|j| j.status.is_terminal())
                .min_by_key(|j| j.last_update)
                .map(|j| j.id.clone());
            match victim {
                Some(vid) => {
                    inner.jobs.remove(&vid);
                    inner.completed.remove(&vid);
                    log::info!("Registry at capacity, evicted terminal job {}", vid);
                }
                None => {
                    log::warn!(
                        "Registry at capacity with {} active jobs, rejecting job {}",
                        inner.jobs.len(),
                        id
                    );
                    return false;
                }
            }
        }

        inner.jobs.insert(id.clone(), Job::new(id));
        true
    }

    /// Returns a snapshot copy of the job, or None for unknown IDs.
    pub async fn snapshot(&self, id: &str) -> Option<JobSnapshot> {
        let inner = self.inner.lock().await;
        inner.jobs.get(id).map(JobSnapshot::from)
    }

    /// Returns the job's current status, or None for unknown IDs.
    pub async fn status(&self, id: &str) -> Option<JobStatus> {
        let inner = self.inner.lock().await;
        inner.jobs.get(id).map(|j| j.status)
    }

    /// Seconds since the job's last emitted update.
    pub async fn seconds_since_update(&self, id: &str) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner.jobs.get(id).map(|j| j.last_update.elapsed().as_secs())
    }

    /// Returns the completed artifact recorded for a job, if any.
    pub async fn completed_artifact(&self, id: &str) -> Option<CompletedArtifact> {
        let inner = self.inner.lock().await;
        inner.completed.get(id).cloned()
    }

    /// Transitions the job into `preparing`. Ignored once terminal.
    pub async fn mark_preparing(&self, id: &str, message: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(id) else { return false };
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobStatus::Preparing;
        job.percent = job.percent.max(5.0);
        job.message = message.to_string();
        job.last_update = Instant::now();
        true
    }

    /// Transitions the job into `downloading`. Ignored once terminal.
    pub async fn mark_downloading(&self, id: &str, message: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(id) else { return false };
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobStatus::Downloading;
        job.percent = job.percent.max(10.0);
        job.message = message.to_string();
        job.last_update = Instant::now();
        true
    }

    /// Records an emitted progress update.
    ///
    /// Percent is monotonic non-decreasing while active and capped below
    /// 100 (100 is reserved for confirmed completion). Ignored once
    /// terminal.
    pub async fn update_progress(
        &self,
        id: &str,
        percent: f64,
        speed_mbs: Option<f64>,
        eta_seconds: Option<u64>,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(id) else { return false };
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobStatus::Downloading;
        job.percent = job
            .percent
            .max(percent.clamp(0.0, config::progress::ACTIVE_PERCENT_CAP));
        job.speed_mbs = speed_mbs;
        job.eta_seconds = eta_seconds;
        job.message = "Downloading...".to_string();
        job.last_update = Instant::now();
        true
    }

    /// Records true completion: writes the CompletedArtifact entry (exactly
    /// once) and transitions the job to terminal `finished` with percent
    /// 100. Ignored once terminal, so late duplicate signals cannot
    /// resurrect or overwrite.
    pub async fn complete(&self, id: &str, artifact: CompletedArtifact) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(id) else { return false };
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobStatus::Finished;
        job.percent = 100.0;
        job.speed_mbs = None;
        job.eta_seconds = None;
        job.message = "Download completed!".to_string();
        job.result = Some(artifact.clone());
        job.error = None;
        job.last_update = Instant::now();
        inner.completed.insert(id.to_string(), artifact);
        true
    }

    /// Records terminal failure with percent reset to 0. Ignored once
    /// terminal.
    pub async fn fail(&self, id: &str, error: &str, message: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(id) else { return false };
        if job.status.is_terminal() {
            return false;
        }
        job.status = JobStatus::Error;
        job.percent = 0.0;
        job.speed_mbs = None;
        job.eta_seconds = None;
        job.message = message.to_string();
        job.error = Some(error.to_string());
        job.result = None;
        job.last_update = Instant::now();
        true
    }

    /// Evicts terminal jobs whose last update is older than the TTL.
    /// Returns the number of evicted jobs.
    pub async fn sweep(&self, ttl: std::time::Duration) -> usize {
        let mut inner = self.inner.lock().await;
        let expired: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|j| j.status.is_terminal() && j.last_update.elapsed() > ttl)
            .map(|j| j.id.clone())
            .collect();
        for id in &expired {
            inner.jobs.remove(id);
            inner.completed.remove(id);
        }
        if !expired.is_empty() {
            log::debug!("Swept {} expired terminal jobs", expired.len());
        }
        expired.len()
    }

    /// Number of jobs currently retained.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
