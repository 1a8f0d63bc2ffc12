//! Integration test: local HTTP server with Range support, full downloads
//! through the curl transport into file and in-memory sinks.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fatpipe_core::fetcher::RangeFetcher;
use fatpipe_core::planner::ChunkPolicy;
use fatpipe_core::retry::{FetchError, RetryPolicy};
use fatpipe_core::sink::StreamSink;
use fatpipe_core::transport::{CurlTransport, TransportOptions};
use fatpipe_core::{DownloadError, DownloadOptions, Downloader, Phase, PlanningError};
use tempfile::tempdir;

fn options(chunk: u64, concurrency: usize) -> DownloadOptions {
    DownloadOptions {
        concurrency,
        chunk_size: chunk,
        chunk_policy: ChunkPolicy {
            default_size: 0,
            min_size: 1,
            max_size: chunk,
        },
    }
}

fn downloader(url: &str, opts: DownloadOptions, max_attempts: u32) -> Downloader<CurlTransport> {
    let fetcher = RangeFetcher::new(
        Arc::new(CurlTransport::new(TransportOptions {
            connect_timeout_secs: 5,
            ..TransportOptions::default()
        })),
        url,
        BTreeMap::new(),
        "fatpipe-it",
        RetryPolicy {
            max_attempts,
            delay_step: Duration::from_millis(5),
        },
    );
    Downloader::new(fetcher, opts)
}

fn body(len: usize) -> Vec<u8> {
    (0u8..100).cycle().take(len).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_part_download_to_file_matches() {
    let content = body(64 * 1024 + 123);
    let server = common::range_server::start(content.clone());

    let dir = tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let sink = StreamSink::create(&path).await.unwrap();

    let report = downloader(&server.url, options(4096, 6), 3)
        .run(sink)
        .await
        .expect("download");

    assert_eq!(report.parts, 17);
    assert_eq!(report.bytes_emitted, content.len() as u64);
    assert_eq!(std::fs::read(&path).unwrap(), content);
    assert_eq!(server.gets(), 17);
    assert!(server.user_agents().iter().all(|ua| ua == "fatpipe-it"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_errors_are_retried() {
    let content = body(20_000);
    let server = common::range_server::start_with_options(
        content.clone(),
        common::range_server::RangeServerOptions {
            transient_failures: 3,
            ..Default::default()
        },
    );

    let dir = tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let sink = StreamSink::create(&path).await.unwrap();

    let report = downloader(&server.url, options(5_000, 2), 10)
        .run(sink)
        .await
        .expect("download");

    assert_eq!(std::fs::read(&path).unwrap(), content);
    assert_eq!(report.throttle_events, 3);
    assert_eq!(server.gets(), 4 + 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn permanently_broken_part_is_fatal() {
    let content = body(50_000);
    let server = common::range_server::start_with_options(
        content,
        common::range_server::RangeServerOptions {
            broken_offset: Some(10_000),
            ..Default::default()
        },
    );

    let dir = tempdir().unwrap();
    let sink = StreamSink::create(&dir.path().join("out.bin")).await.unwrap();
    let dl = downloader(&server.url, options(5_000, 2), 4);
    let progress = dl.progress();

    let err = dl.run(sink).await.unwrap_err();

    match err {
        DownloadError::Fetch { part, attempts, .. } => {
            assert_eq!(part, 2);
            assert_eq!(attempts, 4);
        }
        other => panic!("expected fetch failure, got {:?}", other),
    }
    let state = progress.snapshot();
    assert_eq!(state.phase, Phase::Failed);
    assert!(state.next_dispatch_part < 10);
}

#[tokio::test]
async fn server_without_ranges_is_rejected() {
    let server = common::range_server::start_with_options(
        body(1_000),
        common::range_server::RangeServerOptions {
            advertise_ranges: false,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let sink = StreamSink::create(&dir.path().join("out.bin")).await.unwrap();

    let err = downloader(&server.url, options(100, 2), 2)
        .run(sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DownloadError::Planning(PlanningError::RangesUnsupported { .. })
    ));
    assert_eq!(server.gets(), 0);
}

#[tokio::test]
async fn empty_resource_completes_immediately() {
    let server = common::range_server::start(Vec::new());
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.bin");
    let sink = StreamSink::create(&path).await.unwrap();

    let report = downloader(&server.url, options(100, 2), 2)
        .run(sink)
        .await
        .expect("download");

    assert_eq!(report.parts, 0);
    assert_eq!(server.gets(), 0);
    assert_eq!(std::fs::read(&path).unwrap().len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn server_ignoring_range_is_cut_off_early() {
    let content = body(2_000_000);
    let server = common::range_server::start_with_options(
        content.clone(),
        common::range_server::RangeServerOptions {
            ignore_ranges: true,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let sink = StreamSink::create(&dir.path().join("out.bin")).await.unwrap();

    let err = downloader(&server.url, options(5_000, 2), 2)
        .run(sink)
        .await
        .unwrap_err();

    match err {
        DownloadError::Fetch {
            attempts,
            source: FetchError::LengthMismatch { expected, received },
            ..
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(expected, 5_000);
            // the transfer stopped shortly past the range, not at the full body
            assert!(received > expected);
            assert!(received < content.len() as u64 / 10, "received {}", received);
        }
        other => panic!("expected length mismatch, got {:?}", other),
    }
}
