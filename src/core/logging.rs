//! Logging initialization
//!
//! Console + file logger setup, plus startup diagnostics for the
//! extraction binary and output directory.

use anyhow::Result;
use simplelog::*;
use std::fs::File;

use crate::core::config;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective configuration at startup and makes sure the
/// output directory exists.
pub fn log_startup_configuration() {
    log::info!("yt-dlp binary: {}", &*config::YTDL_BIN);

    let out = config::output_dir();
    match std::fs::create_dir_all(&out) {
        Ok(()) => log::info!("Output directory: {}", out.display()),
        Err(e) => log::error!("Failed to create output directory {}: {}", out.display(), e),
    }

    log::info!(
        "Max concurrent downloads: {}",
        *config::download::MAX_CONCURRENT_DOWNLOADS
    );
    log::info!(
        "Stale threshold: {}s, recent-file window: {}s",
        config::stale::STALE_AFTER_SECS,
        config::stale::RECENT_FILE_WINDOW_SECS
    );
}
