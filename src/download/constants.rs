//! Constants for the download module (timeouts, pacing, image defaults).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large archival images).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default pre-request delay for hosts without a provider override.
pub const DEFAULT_PROVIDER_DELAY: Duration = Duration::from_millis(50);

/// Gallica accepts only a handful of large image requests per minute.
pub const GALLICA_PROVIDER_DELAY: Duration = Duration::from_secs(12);

/// Default ceiling on the longer side of a requested image.
pub const DEFAULT_MAX_SIZE: u32 = 2500;

/// Default floor used when negotiating a reduced size.
pub const DEFAULT_MIN_SIZE: u32 = 1000;

/// Default pixel density written into saved JPEG files.
pub const DEFAULT_MAX_RESOLUTION: u16 = 300;

/// JPEG quality used when re-encoding downloaded images.
pub const JPEG_QUALITY: u8 = 90;

/// Largest number of missing bytes tolerated when truncation is allowed.
pub const MAX_TOLERATED_MISSING_BYTES: u64 = 2;

/// Number of images processed per manifest in debug mode.
pub const DEBUG_IMAGE_LIMIT: usize = 5;

/// Suffix IIIF services append for the default full-size request.
pub const DEFAULT_REQUEST_SUFFIX: &str = "full/full/0/default.jpg";

/// Browser User-Agent; several archival image servers reject unknown agents.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:102.0) Gecko/20100101 Firefox/102.0";
