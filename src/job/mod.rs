//! Job model: identity, lifecycle state machine, completed artifacts.

pub mod registry;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

pub use registry::JobRegistry;

/// Opaque job identifier. Generated at submission, never reused.
pub type JobId = String;

/// Generates a fresh job ID.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}

/// Returns true if `id` is structurally a valid job ID.
pub fn is_valid_job_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

/// Lifecycle state of a download job.
///
/// `created → preparing → downloading → {finished | error}`.
/// `Finished` and `Error` are terminal; no transition may leave them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Preparing,
    Downloading,
    Finished,
    Error,
}

impl JobStatus {
    /// Terminal states absorb all further events.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Error)
    }

    /// Active states are subject to staleness healing.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Preparing | JobStatus::Downloading)
    }
}

/// Final artifact record, written exactly once per job by whichever path
/// (event-driven or filesystem verification) detects completion first.
#[derive(Debug, Clone)]
pub struct CompletedArtifact {
    pub filename: String,
    pub filepath: PathBuf,
    pub completed_at: DateTime<Utc>,
}

impl CompletedArtifact {
    pub fn new(filename: String, filepath: PathBuf) -> Self {
        Self {
            filename,
            filepath,
            completed_at: Utc::now(),
        }
    }
}

/// In-memory job state. Mutated only through [`JobRegistry`] so the
/// terminal-state and monotonic-percent invariants hold everywhere.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// 0–100. Monotonic non-decreasing while active; capped below 100
    /// until completion is confirmed.
    pub percent: f64,
    pub speed_mbs: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub message: String,
    /// Staleness clock. Bumped only on emitted transitions, not on every
    /// raw fetch event.
    pub last_update: Instant,
    pub result: Option<CompletedArtifact>,
    pub error: Option<String>,
}

impl Job {
    fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Created,
            percent: 0.0,
            speed_mbs: None,
            eta_seconds: None,
            message: "Initializing...".to_string(),
            last_update: Instant::now(),
            result: None,
            error: None,
        }
    }
}

/// Serializable snapshot of a job for status responses.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub percent: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        Self {
            status: job.status,
            percent: job.percent,
            message: job.message.clone(),
            speed: job.speed_mbs,
            eta: job.eta_seconds,
            filename: job.result.as_ref().map(|a| a.filename.clone()),
            filepath: job.result.as_ref().map(|a| a.filepath.display().to_string()),
            error: job.error.clone(),
        }
    }
}
