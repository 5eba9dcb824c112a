use anyhow::Result;
use std::sync::Arc;
use tokio::time::interval;

use fbfetch::core::logging::{init_logger, log_startup_configuration};
use fbfetch::core::config;
use fbfetch::download::{DownloadService, YtdlpFetcher};
use fbfetch::server;

/// Main entry point for the download service
///
/// # Errors
/// Returns an error if initialization fails (logging, server bind).
#[tokio::main]
async fn main() -> Result<()> {
    // Keep a wedged background task from taking the whole process down
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    init_logger(&config::LOG_FILE_PATH)?;
    log_startup_configuration();

    let service = Arc::new(DownloadService::new(Arc::new(YtdlpFetcher), config::output_dir()));

    // Periodic registry sweep keeps memory bounded over long uptimes
    let maintenance = Arc::clone(&service);
    tokio::spawn(async move {
        let mut tick = interval(config::registry::sweep_interval());
        loop {
            tick.tick().await;
            maintenance.maintain().await;
        }
    });

    server::serve(service, *config::PORT).await
}
