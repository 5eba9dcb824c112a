//! Download pipeline: probing, planning, fetching, progress and cleanup.

pub mod cleanup;
pub mod fetcher;
pub mod filename;
pub mod formats;
pub mod healer;
pub mod planner;
pub mod progress;
pub mod worker;

pub use fetcher::{Fetcher, ProbeInfo, YtdlpFetcher};
pub use filename::FilenameResolver;
pub use formats::{FormatKind, FormatOption, RawFormat};
pub use planner::{plan, FetchPlan, FetchStrategy};
pub use progress::{FetchEvent, ProgressReconciler};
pub use worker::{DownloadService, VideoInfo};
