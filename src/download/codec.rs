//! Image decoding, downscaling and JPEG persistence.
//!
//! Every function here is blocking; async callers go through
//! [`decode_and_save`], which moves the work onto the blocking pool.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use tracing::debug;

use super::constants::JPEG_QUALITY;
use super::error::DownloadError;

/// Pixel dimensions of a stored or decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Length of the longer side.
    #[must_use]
    pub fn long_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Reads the dimensions of an image file without decoding pixel data.
///
/// # Errors
///
/// Returns the decoder error when the file is missing or not an image.
pub fn probe_dimensions(path: &Path) -> Result<Dimensions, image::ImageError> {
    let (width, height) = image::image_dimensions(path)?;
    Ok(Dimensions { width, height })
}

/// Decodes an in-memory body into an image.
///
/// # Errors
///
/// Returns [`DownloadError::Undecodable`] when the format is unknown or the
/// data is corrupt.
pub fn decode(url: &str, body: &[u8]) -> Result<DynamicImage, DownloadError> {
    image::load_from_memory(body).map_err(|e| DownloadError::undecodable(url, e))
}

/// Shrinks `img` to fit inside a `max_dim` square, keeping the aspect ratio.
///
/// Images already within bounds, or any image when `max_dim` is `None`,
/// are returned unchanged.
#[must_use]
pub fn fit_within(img: DynamicImage, max_dim: Option<u32>) -> DynamicImage {
    match max_dim {
        Some(max_dim) if img.width() > max_dim || img.height() > max_dim => {
            debug!(
                width = img.width(),
                height = img.height(),
                max_dim,
                "downscaling image"
            );
            img.resize(max_dim, max_dim, FilterType::Lanczos3)
        }
        _ => img,
    }
}

/// Encodes `img` as an RGB JPEG carrying `dpi` as its pixel density.
///
/// # Errors
///
/// Returns [`DownloadError::Encode`] if the encoder rejects the image.
pub fn encode_jpeg(img: &DynamicImage, dpi: u16, path: &Path) -> Result<Vec<u8>, DownloadError> {
    let rgb = img.to_rgb8();
    let mut buf = Cursor::new(Vec::new());

    let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    encoder.set_pixel_density(PixelDensity::dpi(dpi));
    encoder
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| DownloadError::encode(path, e))?;

    Ok(buf.into_inner())
}

/// Writes `bytes` to a `.part` sibling and renames it onto `path`.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if either step fails.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    let part = part_path(path);
    fs::write(&part, bytes).map_err(|e| DownloadError::io(&part, e))?;
    fs::rename(&part, path).map_err(|e| {
        let _ = fs::remove_file(&part);
        DownloadError::io(path, e)
    })
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Decodes a response body, downscales it and stores it as JPEG at `path`.
///
/// # Errors
///
/// Returns decode, encode or IO errors from the individual steps.
pub fn save_body(
    url: &str,
    body: &[u8],
    path: &Path,
    max_dim: Option<u32>,
    dpi: u16,
) -> Result<Dimensions, DownloadError> {
    let img = fit_within(decode(url, body)?, max_dim);
    let bytes = encode_jpeg(&img, dpi, path)?;
    write_atomically(path, &bytes)?;

    Ok(Dimensions {
        width: img.width(),
        height: img.height(),
    })
}

/// Async wrapper around [`save_body`] that runs on the blocking pool.
///
/// # Errors
///
/// Returns the errors of [`save_body`], or [`DownloadError::Worker`] if the
/// blocking task panicked.
pub async fn decode_and_save(
    url: String,
    body: Vec<u8>,
    path: PathBuf,
    max_dim: Option<u32>,
    dpi: u16,
) -> Result<Dimensions, DownloadError> {
    let worker_url = url.clone();
    tokio::task::spawn_blocking(move || save_body(&worker_url, &body, &path, max_dim, dpi))
        .await
        .map_err(|e| DownloadError::worker(url, e))?
}
