//! Extraction engine integration.
//!
//! [`Fetcher`] is the seam between orchestration and the external yt-dlp
//! process: the production implementation spawns the binary and streams
//! parsed events; tests substitute a scripted mock.

use async_trait::async_trait;
use log::{debug, info, trace, warn};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::download::formats::RawFormat;
use crate::download::planner::FetchPlan;
use crate::download::progress::FetchEvent;

/// Metadata returned by a probe, without downloading anything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeInfo {
    #[serde(default)]
    pub title: String,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub uploader: Option<String>,
    pub view_count: Option<u64>,
    pub description: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

/// Abstraction over the extraction engine.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches metadata and the raw format catalog for a video URL.
    async fn probe(&self, url: &Url) -> AppResult<ProbeInfo>;

    /// Runs a download, emitting [`FetchEvent`]s as it goes.
    ///
    /// Resolves once the engine process exits. Event delivery best-effort:
    /// a dropped receiver ends the fetch.
    async fn fetch(
        &self,
        url: Url,
        plan: FetchPlan,
        output_dir: PathBuf,
        base_name: String,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> AppResult<()>;
}

/// Production fetcher backed by the yt-dlp binary.
pub struct YtdlpFetcher;

#[async_trait]
impl Fetcher for YtdlpFetcher {
    async fn probe(&self, url: &Url) -> AppResult<ProbeInfo> {
        let ytdl_bin = &*config::YTDL_BIN;

        let output = timeout(
            config::download::probe_timeout(),
            Command::new(ytdl_bin)
                .args(["--dump-json", "--no-playlist", "--no-warnings", url.as_str()])
                .stdin(Stdio::null())
                .output(),
        )
        .await
        .map_err(|_| AppError::Fetch("Video information request timed out".to_string()))?
        .map_err(|e| AppError::Fetch(format!("Failed to execute {}: {}", ytdl_bin, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Fetch(helpful_extraction_error(&stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(stdout.trim())
            .map_err(|e| AppError::Fetch(format!("Could not parse video information: {}", e)))
    }

    async fn fetch(
        &self,
        url: Url,
        plan: FetchPlan,
        output_dir: PathBuf,
        base_name: String,
        events: mpsc::UnboundedSender<FetchEvent>,
    ) -> AppResult<()> {
        let ytdl_bin = &*config::YTDL_BIN;
        let output_template = output_dir.join(format!("{}.%(ext)s", base_name));
        let template = output_template.to_string_lossy().to_string();

        info!("Starting yt-dlp fetch: format={} output={}", plan.target, template);

        let mut child = Command::new(ytdl_bin)
            .args([
                "-f",
                &plan.target,
                "--merge-output-format",
                "mp4",
                "--newline",
                "--no-playlist",
                "-o",
                &template,
                url.as_str(),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Fetch(format!("Failed to start downloader '{}': {}", ytdl_bin, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Fetch("Downloader stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::Fetch("Downloader stderr unavailable".to_string()))?;

        // Collect stderr concurrently so a full pipe cannot stall the engine
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                trace!("yt-dlp stderr: {}", line);
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut last_destination: Option<String> = None;

        while let Ok(Some(line)) = lines.next_line().await {
            for event in events_from_line(&line, &mut last_destination) {
                if events.send(event).is_err() {
                    debug!("Event receiver gone, aborting fetch");
                    return Ok(());
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to wait for downloader: {}", e)))?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let message = helpful_extraction_error(&stderr_text);
            warn!("yt-dlp exited with {}: {}", status, message);
            let _ = events.send(FetchEvent::Error { message: message.clone() });
            return Err(AppError::Fetch(message));
        }

        Ok(())
    }
}

/// Translates one engine output line into zero or more events.
///
/// Tracks the most recent `Destination:` line so the 100% marker can be
/// attributed to a concrete file.
fn events_from_line(line: &str, last_destination: &mut Option<String>) -> Vec<FetchEvent> {
    let mut events = Vec::new();

    if let Some(dest) = line
        .strip_prefix("[download] Destination: ")
        .or_else(|| line.strip_prefix("[Merger] Merging formats into \"").map(|s| s.trim_end_matches('"')))
    {
        *last_destination = Some(dest.to_string());
        return events;
    }

    if line.contains("[download]") && line.contains('%') {
        if let Some(info) = parse_progress(line) {
            events.push(FetchEvent::Downloading {
                bytes_done: info.current_size.unwrap_or(0),
                bytes_total: info.total_size,
                percent_hint: Some(info.percent),
                speed_mbs: info.speed_mbs,
                eta_seconds: info.eta_seconds,
            });

            // "100% of 10.00MiB in 00:05" marks one file finished
            if info.percent >= 100.0 && line.contains(" in ") {
                if let Some(dest) = last_destination.clone() {
                    events.push(FetchEvent::Finished { filename: dest });
                }
            }
        }
        return events;
    }

    if line.contains("has already been downloaded") {
        // "[download] outputs/clip.mp4 has already been downloaded"
        if let Some(name) = line
            .split_whitespace()
            .find(|tok| tok.contains('.') && !tok.starts_with('['))
        {
            events.push(FetchEvent::Finished {
                filename: name.to_string(),
            });
        }
    }

    events
}

/// Parsed fields from one `[download]` progress line.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub percent: f64,
    pub speed_mbs: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub current_size: Option<u64>,
    pub total_size: Option<u64>,
}

/// Parses progress from an engine output line.
/// Example: `[download]  45.2% of 10.00MiB at 500.00KiB/s ETA 00:10`
pub fn parse_progress(line: &str) -> Option<ProgressInfo> {
    if !line.contains("[download]") || !line.contains('%') {
        return None;
    }

    let mut percent = None;
    let mut speed_mbs = None;
    let mut eta_seconds = None;
    let mut total_size = None;

    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if part.ends_with('%') {
            if let Ok(p) = part.trim_end_matches('%').parse::<f64>() {
                percent = Some(p.clamp(0.0, 100.0));
            }
        }

        if *part == "of" && i + 1 < parts.len() {
            if let Some(size_bytes) = parse_size(parts[i + 1]) {
                total_size = Some(size_bytes);
            }
        }

        if *part == "at" && i + 1 < parts.len() {
            if let Some(speed) = parse_size(parts[i + 1]) {
                speed_mbs = Some(speed as f64 / (1024.0 * 1024.0));
            }
        }

        if *part == "ETA" && i + 1 < parts.len() {
            if let Some(eta) = parse_eta(parts[i + 1]) {
                eta_seconds = Some(eta);
            }
        }
    }

    let percent = percent?;
    let current_size = total_size.map(|total| (total as f64 * (percent / 100.0)) as u64);

    Some(ProgressInfo {
        percent,
        speed_mbs,
        eta_seconds,
        current_size,
        total_size,
    })
}

/// Parses a size like "10.00MiB" or "500.00KiB" (trailing "/s" allowed).
fn parse_size(size_str: &str) -> Option<u64> {
    let size_str = size_str.trim_start_matches('~').trim_end_matches("/s");
    if size_str.ends_with("MiB") {
        if let Ok(mb) = size_str.trim_end_matches("MiB").parse::<f64>() {
            return Some((mb * 1024.0 * 1024.0) as u64);
        }
    } else if size_str.ends_with("KiB") {
        if let Ok(kb) = size_str.trim_end_matches("KiB").parse::<f64>() {
            return Some((kb * 1024.0) as u64);
        }
    } else if size_str.ends_with("GiB") {
        if let Ok(gb) = size_str.trim_end_matches("GiB").parse::<f64>() {
            return Some((gb * 1024.0 * 1024.0 * 1024.0) as u64);
        }
    }
    None
}

/// Parses an ETA like "00:10", "1:23" or "1:02:03".
fn parse_eta(eta_str: &str) -> Option<u64> {
    let parts: Vec<&str> = eta_str.split(':').collect();
    match parts.len() {
        2 => {
            let (m, s) = (parts[0].parse::<u64>().ok()?, parts[1].parse::<u64>().ok()?);
            Some(m * 60 + s)
        }
        3 => {
            let h = parts[0].parse::<u64>().ok()?;
            let m = parts[1].parse::<u64>().ok()?;
            let s = parts[2].parse::<u64>().ok()?;
            Some(h * 3600 + m * 60 + s)
        }
        _ => None,
    }
}

/// Maps raw engine stderr to a message a user can act on.
pub fn helpful_extraction_error(stderr: &str) -> String {
    let lower = stderr.to_lowercase();

    if lower.contains("login required") || lower.contains("log in") || lower.contains("cookies") {
        "This video requires login or is restricted. Private videos cannot be downloaded.".to_string()
    } else if lower.contains("private") {
        "This video is private and cannot be downloaded.".to_string()
    } else if lower.contains("unavailable") || lower.contains("not available in your country") {
        "This video is unavailable. It may have been removed or region-blocked.".to_string()
    } else if lower.contains("requested format is not available") {
        "The selected quality is not available for this video. Try a different format.".to_string()
    } else if lower.contains("unsupported url") {
        "This URL is not supported. Please provide a direct Facebook video link.".to_string()
    } else if lower.contains("unable to download") || lower.contains("network") || lower.contains("timed out") {
        "Network error while downloading. Please try again.".to_string()
    } else {
        // Last non-empty ERROR line, or a generic fallback
        stderr
            .lines()
            .rev()
            .find(|l| l.contains("ERROR"))
            .map(|l| l.trim().trim_start_matches("ERROR:").trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "Download failed. Please check the URL and try again.".to_string())
    }
}
