use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Output directory for final and transient artifacts
/// Read from OUTPUT_DIR environment variable
/// Supports tilde (~) expansion for home directory
/// Default: outputs
pub static OUTPUT_DIR: Lazy<String> = Lazy::new(|| env::var("OUTPUT_DIR").unwrap_or_else(|_| "outputs".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: fbfetch.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "fbfetch.log".to_string()));

/// HTTP listen port
/// Read from PORT environment variable
/// Default: 8000
pub static PORT: Lazy<u16> = Lazy::new(|| {
    env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8000)
});

/// Download orchestration configuration
pub mod download {
    use super::{env, Duration, Lazy};

    /// Maximum number of concurrent background fetches.
    /// Submissions beyond this are queued on the semaphore, not rejected.
    /// Read from FBFETCH_MAX_CONCURRENT environment variable
    pub static MAX_CONCURRENT_DOWNLOADS: Lazy<usize> = Lazy::new(|| {
        env::var("FBFETCH_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(4)
    });

    /// Timeout for metadata probes (title, format catalog) via yt-dlp
    pub const PROBE_TIMEOUT_SECS: u64 = 30;

    pub fn probe_timeout() -> Duration {
        Duration::from_secs(PROBE_TIMEOUT_SECS)
    }
}

/// Progress coalescing configuration
pub mod progress {
    /// Emit a registry update only if percent moved by at least this much
    pub const PERCENT_THRESHOLD: f64 = 1.0;

    /// Or if this many seconds elapsed since the last emitted update
    pub const TIME_THRESHOLD_SECS: f64 = 2.0;

    /// Percent is capped strictly below 100 while still downloading;
    /// 100 is reserved for confirmed completion
    pub const ACTIVE_PERCENT_CAP: f64 = 99.0;
}

/// Staleness detection and filesystem reconciliation configuration
pub mod stale {
    use super::Duration;

    /// A job with no emitted progress for this long while active is stale
    pub const STALE_AFTER_SECS: u64 = 120;

    /// When healing, adopt output files modified within this window
    pub const RECENT_FILE_WINDOW_SECS: u64 = 180;

    /// Post-run verification accepts files modified within this window
    pub const VERIFY_WINDOW_SECS: u64 = 600;

    pub fn stale_after() -> Duration {
        Duration::from_secs(STALE_AFTER_SECS)
    }
}

/// Job registry bounds (terminal jobs are swept, the map is capacity-capped)
pub mod registry {
    use super::Duration;

    /// Maximum number of jobs retained in memory
    pub const MAX_JOBS: usize = 1024;

    /// Terminal jobs older than this are evicted by the sweep
    pub const TERMINAL_TTL_SECS: u64 = 3600;

    /// Interval between background sweeps
    pub const SWEEP_INTERVAL_SECS: u64 = 300;

    pub fn terminal_ttl() -> Duration {
        Duration::from_secs(TERMINAL_TTL_SECS)
    }

    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }
}

/// Filename resolver configuration
pub mod filename {
    use super::Duration;

    /// Maximum base-name length after sanitization
    pub const MAX_LENGTH: usize = 40;

    /// Results shorter than this get the synthesized fallback name
    pub const MIN_LENGTH: usize = 3;

    /// Memo cache bounds
    pub const CACHE_CAPACITY: usize = 512;
    pub const CACHE_TTL_SECS: u64 = 24 * 60 * 60;

    pub fn cache_ttl() -> Duration {
        Duration::from_secs(CACHE_TTL_SECS)
    }
}

/// Returns the output directory with tilde expansion applied.
pub fn output_dir() -> std::path::PathBuf {
    std::path::PathBuf::from(shellexpand::tilde(&*OUTPUT_DIR).into_owned())
}
