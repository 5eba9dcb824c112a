//! Mock fetcher for integration testing
//!
//! Simulates the extraction engine with a configurable event script,
//! optional pacing between events and call counters, so orchestration
//! behavior (debounce, completion, cancellation, verification) can be
//! tested without spawning real processes.

#![allow(dead_code)] // Not every test binary uses every knob

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use url::Url;

use fbfetch::core::error::{AppError, AppResult};
use fbfetch::download::fetcher::ProbeInfo;
use fbfetch::download::planner::FetchPlan;
use fbfetch::download::progress::FetchEvent;
use fbfetch::download::{Fetcher, RawFormat};

/// Configuration for the mock fetcher
#[derive(Debug, Clone, Default)]
pub struct MockFetcherConfig {
    /// Title returned by probes
    pub title: String,
    /// Raw formats returned by probes
    pub formats: Vec<RawFormat>,
    /// Events emitted by fetch, in order
    pub events: Vec<FetchEvent>,
    /// Delay between emitted events
    pub event_delay: Option<Duration>,
    /// File written into the output directory before events are emitted
    pub write_file: Option<String>,
    /// Error message returned after all events are emitted
    pub fetch_error: Option<String>,
    /// Error message returned by probes
    pub probe_error: Option<String>,
}

pub struct MockFetcher {
    config: MockFetcherConfig,
    probe_calls: AtomicU64,
    fetch_calls: AtomicU64,
}

impl MockFetcher {
    pub fn new(config: MockFetcherConfig) -> Self {
        Self {
            config,
            probe_calls: AtomicU64::new(0),
            fetch_calls: AtomicU64::new(0),
        }
    }

    pub fn probe_calls(&self) -> u64 {
        self.probe_calls.load(Ordering::Relaxed)
    }

    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn probe(&self, _url: &Url) -> AppResult<ProbeInfo> {
        self.probe_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = &self.config.probe_error {
            return Err(AppError::Fetch(message.clone()));
        }
        Ok(ProbeInfo {
            title: self.config.title.clone(),
            formats: self.config.formats.clone(),
            ..Default::default()
        })
    }

    async fn fetch(
        &self,
        _url: Url,
        _plan: FetchPlan,
        output_dir: PathBuf,
        _base_name: String,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> AppResult<()> {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);

        if let Some(name) = &self.config.write_file {
            std::fs::write(output_dir.join(name), b"mock video data").map_err(AppError::Io)?;
        }

        for event in &self.config.events {
            if let Some(delay) = self.config.event_delay {
                sleep(delay).await;
            }
            if events.send(event.clone()).is_err() {
                return Ok(());
            }
        }

        match &self.config.fetch_error {
            Some(message) => Err(AppError::Fetch(message.clone())),
            None => Ok(()),
        }
    }
}

/// Shorthand for a progress event with a percent hint.
pub fn progress_event(percent: f64) -> FetchEvent {
    FetchEvent::Downloading {
        bytes_done: 0,
        bytes_total: None,
        percent_hint: Some(percent),
        speed_mbs: Some(3.2),
        eta_seconds: Some(12),
    }
}
