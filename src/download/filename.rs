//! Artifact base-name derivation.
//!
//! Turns an untrusted video title into a filesystem-safe, length-bounded
//! base name that matches what the extraction engine will write to disk.
//! Results for non-empty titles are memoized so repeated lookups within
//! one process run are identical; the memo cache is capacity-bounded with
//! a TTL so it cannot grow without limit. Untitled videos bypass the
//! cache and get a fresh timestamped name each time.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::core::config;

#[derive(Debug, Clone)]
struct CachedName {
    base_name: String,
    cached_at: Instant,
}

/// Memoizing filename resolver.
pub struct FilenameResolver {
    cache: Arc<Mutex<HashMap<String, CachedName>>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for FilenameResolver {
    fn default() -> Self {
        Self::new(config::filename::CACHE_CAPACITY, config::filename::cache_ttl())
    }
}

impl FilenameResolver {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            ttl,
        }
    }

    /// Resolves a title to a safe base name.
    ///
    /// Deterministic for a given non-empty title within one process run.
    /// Never fails — titles that sanitize to nothing get a synthesized
    /// fallback name embedding the current unix time.
    pub async fn resolve(&self, title: &str) -> String {
        // Untitled videos each get a fresh timestamped name; memoizing
        // the fallback would give every untitled job the same base name
        // and their artifacts would collide on disk.
        if title.trim().is_empty() {
            return fallback_name();
        }

        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.get(title) {
            if cached.cached_at.elapsed() < self.ttl {
                return cached.base_name.clone();
            }
            cache.remove(title);
        }

        let base_name = sanitize_title(title).unwrap_or_else(fallback_name);

        if cache.len() >= self.capacity {
            // Evict the oldest entry to stay within the cap.
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, v)| v.cached_at)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }

        cache.insert(
            title.to_string(),
            CachedName {
                base_name: base_name.clone(),
                cached_at: Instant::now(),
            },
        );

        base_name
    }

    /// Number of memoized titles (for diagnostics).
    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// Sanitizes a title into a base name, or None when the result is too
/// short to be usable.
///
/// Keeps only alphanumerics, spaces, hyphens and underscores; collapses
/// whitespace/underscore runs to a single underscore; trims separators;
/// truncates to the configured maximum, re-trimming after the cut.
fn sanitize_title(title: &str) -> Option<String> {
    let kept: String = title
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect();

    let mut collapsed = String::with_capacity(kept.len());
    let mut in_run = false;
    for c in kept.chars() {
        if c.is_whitespace() || c == '_' {
            if !in_run {
                collapsed.push('_');
                in_run = true;
            }
        } else {
            collapsed.push(c);
            in_run = false;
        }
    }

    let trimmed = collapsed.trim_matches(|c| c == '_' || c == '-');

    let truncated: String = trimmed.chars().take(config::filename::MAX_LENGTH).collect();
    let result = truncated.trim_end_matches(|c| c == '_' || c == '-');

    if result.chars().count() < config::filename::MIN_LENGTH {
        None
    } else {
        Some(result.to_string())
    }
}

/// Synthesized fallback name for empty/degenerate titles. Embeds the
/// current unix time for practical uniqueness.
fn fallback_name() -> String {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("facebook_video_{}", ts)
}
