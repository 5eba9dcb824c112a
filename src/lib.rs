//! Fbfetch - Facebook video download service
//!
//! This library provides all the core functionality for the service,
//! including job tracking, format planning, download orchestration and
//! the HTTP API.
//!
//! # Module Structure
//!
//! - `core`: Core utilities, configuration, errors, and validation
//! - `job`: Job model and the thread-safe job registry
//! - `download`: Probing, planning, fetching, progress and cleanup
//! - `server`: HTTP API

pub mod core;
pub mod download;
pub mod job;
pub mod server;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult};
pub use download::{DownloadService, Fetcher, YtdlpFetcher};
pub use job::{JobRegistry, JobSnapshot, JobStatus};
