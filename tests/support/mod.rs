//! Shared fixtures for integration tests: generated JPEG bodies, manifest
//! documents in both Presentation API shapes, and mock server wiring.

#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use iiif_download_core::{DownloadConfig, ProviderDelays};
use image::{DynamicImage, ImageFormat, RgbImage};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Declared page size used by every generated manifest.
pub const PAGE_WIDTH: u32 = 200;
pub const PAGE_HEIGHT: u32 = 300;

/// Encodes a solid-colour JPEG of the given size.
pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img =
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([90, 60, 30])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
    buf.into_inner()
}

/// Image service base for page `n` on `server`.
pub fn service(server: &MockServer, n: usize) -> String {
    format!("{}/iiif/p{n}", server.uri())
}

/// Presentation 2 manifest with `pages` canvases.
pub fn manifest_v2(server: &MockServer, pages: usize) -> Value {
    let canvases: Vec<Value> = (1..=pages)
        .map(|n| {
            json!({
                "@type": "sc:Canvas",
                "images": [{
                    "resource": {
                        "@id": format!("{}/full/full/0/default.jpg", service(server, n)),
                        "width": PAGE_WIDTH,
                        "height": PAGE_HEIGHT,
                        "service": {"@id": service(server, n)}
                    }
                }]
            })
        })
        .collect();

    json!({
        "@context": "http://iiif.io/api/presentation/2/context.json",
        "label": "Test codex",
        "license": "https://creativecommons.org/licenses/by/4.0/",
        "metadata": [{"label": "Shelfmark", "value": "MS 1"}],
        "sequences": [{"canvases": canvases}]
    })
}

/// Presentation 3 manifest with `pages` canvases.
pub fn manifest_v3(server: &MockServer, pages: usize) -> Value {
    let canvases: Vec<Value> = (1..=pages)
        .map(|n| {
            json!({
                "type": "Canvas",
                "items": [{
                    "type": "AnnotationPage",
                    "items": [{
                        "type": "Annotation",
                        "body": {
                            "id": format!("{}/full/max/0/default.jpg", service(server, n)),
                            "width": PAGE_WIDTH.to_string(),
                            "height": PAGE_HEIGHT.to_string(),
                            "service": [{"id": service(server, n), "type": "ImageService3"}]
                        }
                    }]
                }]
            })
        })
        .collect();

    json!({
        "@context": "http://iiif.io/api/presentation/3/context.json",
        "label": {"en": ["Test codex"]},
        "rights": "http://creativecommons.org/publicdomain/zero/1.0/",
        "items": canvases
    })
}

/// Serves `document` at `route`.
pub async fn mount_manifest(server: &MockServer, route: &str, document: &Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

/// Serves a page-sized JPEG for every image request, optionally delayed.
pub async fn mount_pages(server: &MockServer, delay: Option<Duration>) {
    let mut template = ResponseTemplate::new(200)
        .insert_header("content-type", "image/jpeg")
        .set_body_bytes(jpeg(PAGE_WIDTH, PAGE_HEIGHT));
    if let Some(delay) = delay {
        template = template.set_delay(delay);
    }
    Mock::given(method("GET"))
        .and(path_regex(r"^/iiif/p\d+/full/"))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Configuration rooted in `base` with pacing disabled and no file logging.
pub fn test_config(base: &Path) -> DownloadConfig {
    let mut config = DownloadConfig::with_base_dir(base);
    config.provider_delays = ProviderDelays::disabled();
    config.log_to_file = false;
    config
}

/// Saved page files (`NNNN.jpg`) in `dir`, sorted.
pub fn saved_pages(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".jpg"))
        .collect();
    names.sort();
    names
}
