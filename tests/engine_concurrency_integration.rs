//! Integration tests for the acquisition engine's concurrency bound.
//!
//! Image responses are delayed so that requests overlap; the engine's
//! in-flight counter must never exceed the configured limit.

use std::sync::Arc;
use std::time::Duration;

use iiif_download_core::download::{AcquireContext, Image};
use iiif_download_core::{
    AcquisitionEngine, DownloadStats, HttpClient, ImageResource, ProviderDelays, Sidecar,
};
use tempfile::TempDir;
use wiremock::MockServer;

mod support;
use support::{PAGE_HEIGHT, PAGE_WIDTH, mount_pages, saved_pages, service};

fn images(server: &MockServer, dir: &std::path::Path, count: usize) -> Vec<Image> {
    (1..=count)
        .map(|n| {
            let resource = ImageResource {
                service_id: service(server, n),
                height: Some(PAGE_HEIGHT),
                width: Some(PAGE_WIDTH),
            };
            Image::new(n, &resource, dir, Some(2500), Some(1000))
        })
        .collect()
}

fn context(tmp: &TempDir) -> AcquireContext {
    AcquireContext {
        client: HttpClient::new().unwrap(),
        delays: ProviderDelays::disabled(),
        sidecar: Arc::new(
            Sidecar::create(
                tmp.path(),
                tmp.path().join("log").join("download_fails.log"),
                "https://iiif.example.org/ms1/manifest.json",
            )
            .unwrap(),
        ),
        stats: Arc::new(DownloadStats::new()),
        allow_truncation: false,
        max_resolution: 300,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_engine_never_exceeds_concurrency_limit() {
    let server = MockServer::start().await;
    mount_pages(&server, Some(Duration::from_millis(150))).await;
    let tmp = TempDir::new().unwrap();
    let ctx = context(&tmp);

    let engine = AcquisitionEngine::new(2).unwrap();
    let run = engine
        .acquire_all(images(&server, tmp.path(), 10), &ctx)
        .await
        .unwrap();

    assert_eq!(run.outcomes.len(), 10);
    assert!(run.outcomes.iter().all(|o| o.is_success()));
    assert_eq!(ctx.stats.saved(), 10);
    assert!(ctx.stats.peak_in_flight() <= 2, "peak {}", ctx.stats.peak_in_flight());
    assert_eq!(ctx.stats.peak_in_flight(), 2);
    assert_eq!(ctx.stats.in_flight(), 0);
    assert_eq!(saved_pages(tmp.path()).len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_engine_with_single_permit_runs_serially() {
    let server = MockServer::start().await;
    mount_pages(&server, Some(Duration::from_millis(20))).await;
    let tmp = TempDir::new().unwrap();
    let ctx = context(&tmp);

    let engine = AcquisitionEngine::new(1).unwrap();
    let run = engine
        .acquire_all(images(&server, tmp.path(), 4), &ctx)
        .await
        .unwrap();

    assert_eq!(ctx.stats.peak_in_flight(), 1);
    let indexes: Vec<usize> = run.outcomes.iter().map(|o| o.index()).collect();
    assert_eq!(indexes, [1, 2, 3, 4]);
    assert_eq!(run.mapping.len(), 4);
}

#[tokio::test]
async fn test_engine_with_empty_list() {
    let tmp = TempDir::new().unwrap();
    let ctx = context(&tmp);
    let run = AcquisitionEngine::new(5)
        .unwrap()
        .acquire_all(Vec::new(), &ctx)
        .await
        .unwrap();

    assert!(run.outcomes.is_empty());
    assert!(run.mapping.is_empty());
    assert_eq!(ctx.stats.total(), 0);
}
