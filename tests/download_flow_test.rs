//! End-to-end download orchestration tests using the mock fetcher.
//!
//! Covers the full submit → progress → terminal-state pipeline:
//! debounced monotonic progress, fragment-vs-final completion, cancellation,
//! filesystem verification and the one-shot artifact contract.

mod mocks;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use fbfetch::core::error::AppError;
use fbfetch::download::progress::FetchEvent;
use fbfetch::download::{DownloadService, FetchStrategy, RawFormat};
use fbfetch::job::{JobSnapshot, JobStatus};

use mocks::mock_fetcher::{progress_event, MockFetcher, MockFetcherConfig};

const URL: &str = "https://www.facebook.com/watch/?v=123456789012345";

fn service(dir: &TempDir, config: MockFetcherConfig) -> Arc<DownloadService> {
    Arc::new(DownloadService::with_concurrency(
        Arc::new(MockFetcher::new(config)),
        dir.path().to_path_buf(),
        2,
    ))
}

async fn wait_terminal(service: &Arc<DownloadService>, id: &str) -> JobSnapshot {
    for _ in 0..300 {
        if let Some(snap) = service.registry().snapshot(id).await {
            if snap.status.is_terminal() {
                return snap;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached a terminal state", id);
}

// ==================== Happy Path Tests ====================

#[tokio::test]
async fn test_full_download_lifecycle() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        MockFetcherConfig {
            title: "Beach Trip 2024".to_string(),
            events: vec![
                progress_event(10.0),
                progress_event(55.0),
                progress_event(99.5),
                FetchEvent::Finished {
                    filename: "Beach_Trip_2024.mp4".to_string(),
                },
            ],
            write_file: Some("Beach_Trip_2024.mp4".to_string()),
            ..Default::default()
        },
    );

    let id = svc.submit(URL, "best").await.unwrap();
    let snap = wait_terminal(&svc, &id).await;

    assert_eq!(snap.status, JobStatus::Finished);
    assert_eq!(snap.percent, 100.0);
    assert_eq!(snap.message, "Download completed!");
    assert_eq!(snap.filename.as_deref(), Some("Beach_Trip_2024.mp4"));

    // The status endpoint path agrees with the registry
    let polled = svc.status(&id).await.unwrap().unwrap();
    assert_eq!(polled.status, JobStatus::Finished);
    assert_eq!(polled.percent, 100.0);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_capped_below_100_while_active() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        MockFetcherConfig {
            title: "Clip".to_string(),
            events: vec![
                progress_event(50.0),
                // Engine restarts a stream: raw percent drops
                progress_event(5.0),
                // Garbage 100% line while still downloading
                progress_event(100.0),
            ],
            event_delay: Some(Duration::from_millis(30)),
            write_file: Some("Clip.mp4".to_string()),
            ..Default::default()
        },
    );

    let id = svc.submit(URL, "best").await.unwrap();
    let snap = wait_terminal(&svc, &id).await;

    // Post-run verification finds the file and finishes the job; along
    // the way percent never regressed and never showed a premature 100
    assert_eq!(snap.status, JobStatus::Finished);
    assert_eq!(snap.percent, 100.0);
}

#[tokio::test]
async fn test_fragment_completions_are_ignored() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        MockFetcherConfig {
            title: "Merged Clip".to_string(),
            events: vec![
                progress_event(40.0),
                FetchEvent::Finished {
                    filename: "Merged_Clip.f137.mp4".to_string(),
                },
                FetchEvent::Finished {
                    filename: "Merged_Clip.f140a.m4a".to_string(),
                },
                FetchEvent::Finished {
                    filename: "Merged_Clip.mp4".to_string(),
                },
            ],
            write_file: Some("Merged_Clip.mp4".to_string()),
            ..Default::default()
        },
    );

    let id = svc.submit(URL, "137+140").await.unwrap();
    let snap = wait_terminal(&svc, &id).await;
    assert_eq!(snap.status, JobStatus::Finished);
    assert_eq!(snap.filename.as_deref(), Some("Merged_Clip.mp4"));
}

#[tokio::test]
async fn test_completion_sweeps_intermediate_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Clip.f137.mp4"), b"frag").unwrap();
    std::fs::write(dir.path().join("Clip.mp4.part"), b"part").unwrap();

    let svc = service(
        &dir,
        MockFetcherConfig {
            title: "Clip".to_string(),
            events: vec![FetchEvent::Finished {
                filename: "Clip.mp4".to_string(),
            }],
            write_file: Some("Clip.mp4".to_string()),
            ..Default::default()
        },
    );

    let id = svc.submit(URL, "best").await.unwrap();
    wait_terminal(&svc, &id).await;

    // Cleanup runs on the blocking pool after completion
    for _ in 0..100 {
        if !dir.path().join("Clip.f137.mp4").exists() && !dir.path().join("Clip.mp4.part").exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!dir.path().join("Clip.f137.mp4").exists());
    assert!(!dir.path().join("Clip.mp4.part").exists());
    assert!(dir.path().join("Clip.mp4").exists());
}

// ==================== Failure Tests ====================

#[tokio::test]
async fn test_engine_error_fails_job_with_message() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        MockFetcherConfig {
            title: "Clip".to_string(),
            events: vec![progress_event(30.0)],
            fetch_error: Some("This video is private and cannot be downloaded.".to_string()),
            ..Default::default()
        },
    );

    let id = svc.submit(URL, "best").await.unwrap();
    let snap = wait_terminal(&svc, &id).await;
    assert_eq!(snap.status, JobStatus::Error);
    assert_eq!(snap.percent, 0.0);
    assert!(snap.error.unwrap().contains("private"));
}

#[tokio::test]
async fn test_probe_failure_does_not_abort_submission() {
    let dir = TempDir::new().unwrap();
    // Probe fails; the job still runs under a fallback base name. With no
    // matching file on disk, post-run verification fails it cleanly.
    let fetcher = Arc::new(MockFetcher::new(MockFetcherConfig {
        probe_error: Some("metadata fetch failed".to_string()),
        ..Default::default()
    }));
    let svc = Arc::new(DownloadService::with_concurrency(
        Arc::clone(&fetcher) as Arc<dyn fbfetch::download::Fetcher>,
        dir.path().to_path_buf(),
        2,
    ));

    let id = svc.submit(URL, "best").await.unwrap();
    let snap = wait_terminal(&svc, &id).await;
    assert_eq!(snap.status, JobStatus::Error);
    assert!(snap.error.unwrap().contains("no output file"));
    assert_eq!(fetcher.fetch_calls(), 1);
}

#[tokio::test]
async fn test_clean_exit_without_completion_signal_verifies_on_disk() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        MockFetcherConfig {
            title: "Quiet Clip".to_string(),
            events: vec![progress_event(80.0)],
            write_file: Some("Quiet_Clip.mp4".to_string()),
            ..Default::default()
        },
    );

    let id = svc.submit(URL, "best").await.unwrap();
    let snap = wait_terminal(&svc, &id).await;
    assert_eq!(snap.status, JobStatus::Finished);
    assert_eq!(snap.filename.as_deref(), Some("Quiet_Clip.mp4"));
}

#[tokio::test]
async fn test_invalid_url_rejected_at_submit() {
    let dir = TempDir::new().unwrap();
    let svc = service(&dir, MockFetcherConfig::default());
    let err = svc.submit("https://vimeo.com/12345", "best").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(svc.registry().is_empty().await);
}

// ==================== Cancellation Tests ====================

#[tokio::test]
async fn test_cancel_active_job() {
    let dir = TempDir::new().unwrap();
    let svc = service(
        &dir,
        MockFetcherConfig {
            title: "Slow Clip".to_string(),
            events: (1..=50).map(|i| progress_event(i as f64 * 2.0)).collect(),
            event_delay: Some(Duration::from_millis(50)),
            ..Default::default()
        },
    );

    let id = svc.submit(URL, "best").await.unwrap();

    // Let it get going, then cancel
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(svc.cancel(&id).await);

    let snap = wait_terminal(&svc, &id).await;
    assert_eq!(snap.status, JobStatus::Error);
    assert_eq!(snap.error.as_deref(), Some("Download cancelled"));

    // Cancelling again reports nothing to cancel
    assert!(!svc.cancel(&id).await);
}

#[tokio::test]
async fn test_cancel_queued_job() {
    let dir = TempDir::new().unwrap();
    // Single worker; the second submission waits in the queue
    let svc = Arc::new(DownloadService::with_concurrency(
        Arc::new(MockFetcher::new(MockFetcherConfig {
            title: "Busy".to_string(),
            events: (1..=40).map(|i| progress_event(i as f64)).collect(),
            event_delay: Some(Duration::from_millis(50)),
            ..Default::default()
        })),
        dir.path().to_path_buf(),
        1,
    ));

    let first = svc.submit(URL, "best").await.unwrap();
    let second = svc.submit(URL, "best").await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(svc.cancel(&second).await);

    let snap = wait_terminal(&svc, &second).await;
    assert_eq!(snap.status, JobStatus::Error);
    assert_eq!(snap.error.as_deref(), Some("Download cancelled"));

    // The first job is unaffected by the second's cancellation
    let first_status = svc.registry().status(&first).await.unwrap();
    assert!(!matches!(first_status, JobStatus::Error));
    svc.cancel(&first).await;
}

// ==================== Concurrency Tests ====================

#[tokio::test]
async fn test_worker_pool_queues_beyond_limit() {
    let dir = TempDir::new().unwrap();
    let svc = Arc::new(DownloadService::with_concurrency(
        Arc::new(MockFetcher::new(MockFetcherConfig {
            title: "Clip".to_string(),
            events: vec![FetchEvent::Finished {
                filename: "Clip.mp4".to_string(),
            }],
            event_delay: Some(Duration::from_millis(30)),
            write_file: Some("Clip.mp4".to_string()),
            ..Default::default()
        })),
        dir.path().to_path_buf(),
        2,
    ));

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(svc.submit(URL, "best").await.unwrap());
    }

    // All six eventually finish; none were rejected
    for id in &ids {
        let snap = wait_terminal(&svc, id).await;
        assert_eq!(snap.status, JobStatus::Finished);
    }
}

// ==================== Format Catalog Tests ====================

#[tokio::test]
async fn test_video_info_builds_catalog() {
    let dir = TempDir::new().unwrap();
    let combined = RawFormat {
        format_id: Some("sd".to_string()),
        ext: Some("mp4".to_string()),
        vcodec: Some("avc1".to_string()),
        acodec: Some("mp4a".to_string()),
        height: Some(480),
        ..Default::default()
    };
    let svc = service(
        &dir,
        MockFetcherConfig {
            title: "Catalog Clip".to_string(),
            formats: vec![combined],
            ..Default::default()
        },
    );

    let info = svc.video_info(URL).await.unwrap();
    assert_eq!(info.title, "Catalog Clip");
    assert_eq!(info.formats.len(), 1);
    assert_eq!(info.formats[0].quality, "480p (Video + Audio)");
}

#[tokio::test]
async fn test_plain_format_descriptor_goes_direct() {
    // Descriptor handling is pure planning; assert the strategy here so a
    // regression cannot silently rewrite plain stream IDs
    let plan = fbfetch::download::plan("137");
    assert_eq!(plan.target, "137");
    assert_eq!(plan.strategy, FetchStrategy::Direct);
}
