//! End-to-end manifest runs against a mock IIIF server.
//!
//! These tests drive [`ManifestDownloader`] through manifest loading,
//! resource resolution, size negotiation, concurrent acquisition and the
//! sidecar files, checking the on-disk result.

use std::fs;

use iiif_download_core::{ManifestDownloader, ManifestReport};
use serde_json::Value;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::{
    PAGE_HEIGHT, manifest_v2, manifest_v3, mount_manifest, mount_pages, saved_pages, test_config,
};

fn read_info_json(report: &ManifestReport) -> Value {
    let text = fs::read_to_string(report.dir.join("info.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_v2_manifest_downloads_every_page() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    mount_manifest(&server, "/ms1/manifest.json", &manifest_v2(&server, 3)).await;
    mount_pages(&server, None).await;

    let downloader = ManifestDownloader::new(test_config(tmp.path())).unwrap();
    let report = downloader
        .download(&format!("{}/ms1/manifest.json", server.uri()), None)
        .await;

    assert!(report.is_success(), "report: {report:?}");
    assert_eq!(report.images_total, 3);
    assert_eq!(report.images_downloaded, 3);
    assert!(report.dir.starts_with(tmp.path().join("img")));
    assert_eq!(saved_pages(&report.dir), ["0001.jpg", "0002.jpg", "0003.jpg"]);

    let (width, height) = image::image_dimensions(report.dir.join("0002.jpg")).unwrap();
    assert_eq!(height, PAGE_HEIGHT);
    assert!(width > 0);

    assert_eq!(
        report.images[&2],
        format!("{}/iiif/p2/full/,300/0/default.jpg", server.uri())
    );
}

#[tokio::test]
async fn test_v2_and_v3_manifests_resolve_to_the_same_requests() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    mount_manifest(&server, "/v2/manifest.json", &manifest_v2(&server, 2)).await;
    mount_manifest(&server, "/v3/manifest.json", &manifest_v3(&server, 2)).await;
    mount_pages(&server, None).await;

    let downloader = ManifestDownloader::new(test_config(tmp.path())).unwrap();
    let v2 = downloader
        .download(&format!("{}/v2/manifest.json", server.uri()), None)
        .await;
    let v3 = downloader
        .download(&format!("{}/v3/manifest.json", server.uri()), None)
        .await;

    assert!(v2.is_success());
    assert!(v3.is_success());
    assert_ne!(v2.dir, v3.dir);
    assert_eq!(v2.images, v3.images);
}

#[tokio::test]
async fn test_rerun_skips_pages_already_on_disk() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    let url = format!("{}/ms1/manifest.json", server.uri());
    mount_manifest(&server, "/ms1/manifest.json", &manifest_v2(&server, 4)).await;
    mount_pages(&server, None).await;

    let downloader = ManifestDownloader::new(test_config(tmp.path())).unwrap();
    let first = downloader.download(&url, None).await;
    assert!(first.is_success());

    server.reset().await;
    mount_manifest(&server, "/ms1/manifest.json", &manifest_v2(&server, 4)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/iiif/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let second = downloader.download(&url, None).await;
    assert!(second.is_success());
    assert_eq!(second.images_downloaded, 4);
    // Skipped pages map to their service base
    assert_eq!(second.images[&1], support::service(&server, 1));
    server.verify().await;
}

#[tokio::test]
async fn test_one_failing_page_does_not_affect_the_others() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    mount_manifest(&server, "/ms1/manifest.json", &manifest_v2(&server, 10)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/iiif/p7/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;
    mount_pages(&server, None).await;

    let config = test_config(tmp.path());
    let ledger = config.failure_ledger_path();
    let downloader = ManifestDownloader::new(config).unwrap();
    let report = downloader
        .download(&format!("{}/ms1/manifest.json", server.uri()), None)
        .await;

    assert!(!report.is_success());
    assert_eq!(report.images_total, 10);
    assert_eq!(report.images_downloaded, 9);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 7);
    assert_eq!(report.retried, 1);
    assert!(!report.dir.join("0007.jpg").exists());
    assert_eq!(saved_pages(&report.dir).len(), 9);

    let ledger = fs::read_to_string(ledger).unwrap();
    assert_eq!(ledger.lines().count(), 1);
    assert!(ledger.contains("0007.jpg"));

    let info = read_info_json(&report);
    assert_eq!(info["images_downloaded"], 9);
    assert_eq!(info["failures"][0]["index"], 7);

    let attempts = fs::read_to_string(report.dir.join("info.txt")).unwrap();
    let page7_requests = attempts
        .lines()
        .filter(|line| line.starts_with("7 ") && line.ends_with("/iiif/p7/full/,300/0/default.jpg"))
        .count();
    assert_eq!(page7_requests, 2);
    server.verify().await;
}

#[tokio::test]
async fn test_debug_mode_and_saved_manifest() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    mount_manifest(&server, "/ms1/manifest.json", &manifest_v2(&server, 8)).await;
    mount_pages(&server, None).await;

    let mut config = test_config(tmp.path());
    config.debug = true;
    config.save_manifest = true;
    let downloader = ManifestDownloader::new(config).unwrap();
    let report = downloader
        .download(&format!("{}/ms1/manifest.json", server.uri()), None)
        .await;

    assert_eq!(report.images_total, 5);
    assert_eq!(saved_pages(&report.dir).len(), 5);

    let saved: Value =
        serde_json::from_str(&fs::read_to_string(report.dir.join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(saved["label"], "Test codex");
}

#[tokio::test]
async fn test_sidecar_records_license_and_explicit_directory() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    mount_manifest(&server, "/ms1/manifest.json", &manifest_v2(&server, 1)).await;
    mount_pages(&server, None).await;

    let downloader = ManifestDownloader::new(test_config(tmp.path())).unwrap();
    let report = downloader
        .download(
            &format!("{}/ms1/manifest.json", server.uri()),
            Some(std::path::Path::new("codex")),
        )
        .await;

    assert_eq!(report.dir, tmp.path().join("img").join("codex"));
    assert_eq!(report.license, "https://creativecommons.org/licenses/by/4.0/");

    let info = fs::read_to_string(report.dir.join("info.txt")).unwrap();
    let mut lines = info.lines();
    assert!(lines.next().unwrap().ends_with("/ms1/manifest.json"));
    assert!(info.contains("https://creativecommons.org/licenses/by/4.0/"));
}

#[tokio::test]
async fn test_unreachable_manifest_is_reported_not_raised() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/gone/manifest.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let downloader = ManifestDownloader::new(test_config(tmp.path())).unwrap();
    let report = downloader
        .download(&format!("{}/gone/manifest.json", server.uri()), None)
        .await;

    assert!(!report.is_success());
    assert!(report.error.is_some());
    assert_eq!(report.images_total, 0);
    assert!(read_info_json(&report)["error"].is_string());
}

#[tokio::test]
async fn test_manifest_without_images_is_a_failure() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    let document = serde_json::json!({"label": "empty", "sequences": [{"canvases": []}]});
    mount_manifest(&server, "/empty/manifest.json", &document).await;

    let downloader = ManifestDownloader::new(test_config(tmp.path())).unwrap();
    let report = downloader
        .download(&format!("{}/empty/manifest.json", server.uri()), None)
        .await;

    assert!(!report.is_success());
    assert_eq!(report.error.as_deref(), Some("no images found in manifest"));
}
