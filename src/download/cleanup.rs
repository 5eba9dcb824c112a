//! Transient artifact cleanup and completed-file discovery.
//!
//! The extraction engine leaves fragment files (`.f137.mp4`), partial
//! downloads (`.part`), resume state (`.ytdl`) and temp files in the
//! output directory. These are swept once a job's final artifact exists.
//! The same directory scan also backs post-run verification and stale-job
//! healing, which look for a plausible finished file on disk.

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Stream-fragment infix like `.f137.` or `.f140a.` inside a filename.
static FRAGMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.f\d+[va]?\.").expect("valid regex"));

/// Fragment suffix at end of name, e.g. `clip.f251` without extension.
static FRAGMENT_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.f\d+[va]?$").expect("valid regex"));

const TRANSIENT_EXTENSIONS: &[&str] = &["part", "ytdl", "tmp"];

const FINAL_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv"];

/// Returns true if `filename` is a transient artifact (fragment, partial
/// download or temp file) rather than a final one.
pub fn is_intermediate_artifact(filename: &str) -> bool {
    if FRAGMENT_RE.is_match(filename) || FRAGMENT_SUFFIX_RE.is_match(filename) {
        return true;
    }
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| TRANSIENT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Removes transient files belonging to `base_name` from `output_dir`.
///
/// Only files whose name contains the base name are touched, so
/// concurrent jobs never sweep each other's fragments. Removal errors are
/// logged and skipped; a fragment that survives one pass is caught by the
/// next job's sweep.
pub fn cleanup_intermediate_files(output_dir: &Path, base_name: &str) -> usize {
    let entries = match std::fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cleanup: cannot read {}: {}", output_dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        if !name.contains(base_name) || !is_intermediate_artifact(name) {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!("Removed intermediate file: {}", name);
                removed += 1;
            }
            Err(e) => warn!("Failed to remove intermediate file {}: {}", name, e),
        }
    }
    removed
}

/// Looks for a plausible finished artifact for `base_name` in `output_dir`.
///
/// Accepts an exact `base.{mp4,webm,mkv}` match, or any non-fragment
/// `.mp4` whose name contains the base name. The file must be non-empty
/// and modified within `window`; older files are assumed to belong to an
/// earlier run.
pub fn find_completed_file(output_dir: &Path, base_name: &str, window: Duration) -> Option<PathBuf> {
    let entries = std::fs::read_dir(output_dir).ok()?;
    let now = SystemTime::now();

    let mut fallback: Option<(PathBuf, SystemTime)> = None;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };

        if is_intermediate_artifact(name) {
            continue;
        }

        let exact = FINAL_EXTENSIONS
            .iter()
            .any(|ext| name == format!("{}.{}", base_name, ext));
        let partial = !exact && name.contains(base_name) && name.ends_with(".mp4");

        if !exact && !partial {
            continue;
        }

        let Ok(meta) = entry.metadata() else { continue };
        if meta.len() == 0 {
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > window {
            continue;
        }

        if exact {
            return Some(entry.path());
        }
        // Keep the newest partial match as a fallback
        match &fallback {
            Some((_, best)) if *best >= modified => {}
            _ => fallback = Some((entry.path(), modified)),
        }
    }

    fallback.map(|(path, _)| path)
}

/// Most recently modified non-fragment `.mp4` in `output_dir` within
/// `window`, regardless of name. Used by staleness healing when the
/// engine renamed the output beyond recognition.
pub fn most_recent_video(output_dir: &Path, window: Duration) -> Option<PathBuf> {
    let entries = std::fs::read_dir(output_dir).ok()?;
    let now = SystemTime::now();

    let mut best: Option<(PathBuf, SystemTime)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".mp4") || is_intermediate_artifact(name) {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        if meta.len() == 0 {
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        if now.duration_since(modified).unwrap_or(Duration::ZERO) > window {
            continue;
        }
        match &best {
            Some((_, t)) if *t >= modified => {}
            _ => best = Some((entry.path(), modified)),
        }
    }
    best.map(|(path, _)| path)
}
