//! URL and path validation utilities
//!
//! Provides security-focused validation for user inputs:
//! - Facebook URL validation and normalization
//! - Filename sanitization (prevent directory traversal)

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use url::Url;

use crate::core::error::AppError;

/// Hosts accepted as Facebook video sources.
const FACEBOOK_HOSTS: &[&str] = &["facebook.com", "www.facebook.com", "m.facebook.com", "fb.watch"];

static VIDEO_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{15,})").expect("valid regex"));

/// Returns true if the URL looks like a Facebook video link.
///
/// Accepts watch/reel/videos/posts paths on facebook.com (desktop or
/// mobile) and fb.watch short links.
pub fn is_facebook_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let lower = url.to_lowercase();
    lower.contains("facebook.com") || lower.contains("fb.watch")
}

/// Normalizes a Facebook URL to improve extraction success.
///
/// Mobile hosts are rewritten to desktop; query parameters are preserved
/// because they carry the video ID. Bare profile links with a numeric
/// video ID embedded are rewritten to the canonical watch URL.
///
/// # Errors
///
/// Returns `AppError::Validation` when the URL is not a Facebook video link.
pub fn normalize_facebook_url(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Please provide a valid URL".to_string()));
    }

    if trimmed.contains("fb.watch") {
        return Ok(trimmed.to_string());
    }

    if trimmed.contains("facebook.com") {
        let url = trimmed.replace("m.facebook.com", "www.facebook.com");

        if url.contains("/watch") || url.contains("/reel") || url.contains("/videos") || url.contains("/posts") {
            return Ok(url);
        }

        // Fall back to extracting a long numeric video ID from the path
        if let Some(m) = VIDEO_ID_RE.find(&url) {
            return Ok(format!("https://www.facebook.com/watch/?v={}", m.as_str()));
        }
    }

    // Last resort: accept any URL whose host is a known Facebook domain
    if let Ok(parsed) = Url::parse(trimmed) {
        if let Some(host) = parsed.host_str() {
            let host = host.to_lowercase();
            if FACEBOOK_HOSTS.iter().any(|d| host.contains(d)) {
                return Ok(trimmed.to_string());
            }
        }
    }

    Err(AppError::Validation(
        "Please provide a valid Facebook video URL. Supported formats: facebook.com/watch, \
         facebook.com/reel, fb.watch, or direct video links"
            .to_string(),
    ))
}

/// Reduces a user-supplied artifact filename to its base component.
///
/// Rejects anything that carries path separators or parent-dir
/// references, so `../../etc/passwd` can never escape the output
/// directory.
pub fn sanitize_artifact_name(name: &str) -> Result<String, AppError> {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Validation(format!("Invalid filename: {}", name)))?;

    if base != name || base == ".." || base == "." {
        return Err(AppError::Validation(format!("Invalid filename: {}", name)));
    }

    Ok(base.to_string())
}
