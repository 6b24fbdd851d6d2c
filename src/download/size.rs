//! IIIF Image API size negotiation.
//!
//! Two pure functions pick the `{size}` segment of an image request:
//! [`max_size`] for the first attempt and [`reduced_size`] for the single
//! fallback attempt. Both degrade to conservative requests when the manifest
//! does not declare dimensions.

use std::fmt;

/// The `{size}` segment of a IIIF Image API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeRequest {
    /// Native resolution (`full`).
    Full,
    /// Scale to a width, height follows the aspect ratio (`{w},`).
    Width(u32),
    /// Scale to a height, width follows the aspect ratio (`,{h}`).
    Height(u32),
}

impl fmt::Display for SizeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Width(w) => write!(f, "{w},"),
            Self::Height(h) => write!(f, ",{h}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Height,
    Width,
}

impl Axis {
    fn request(self, len: u32) -> SizeRequest {
        match self {
            Self::Height => SizeRequest::Height(len),
            Self::Width => SizeRequest::Width(len),
        }
    }
}

/// Longer declared axis and its length; height wins only when strictly longer.
fn longer_axis(height: Option<u32>, width: Option<u32>) -> Option<(Axis, u32)> {
    match (height, width) {
        (Some(h), Some(w)) if h > w => Some((Axis::Height, h)),
        (_, Some(w)) => Some((Axis::Width, w)),
        (Some(h), None) => Some((Axis::Height, h)),
        (None, None) => None,
    }
}

/// Computes the size for the first, maximum-quality request.
///
/// - no ceiling: `full`
/// - a declared dimension is missing: `{max_dim},`
/// - otherwise the longer axis, capped at the ceiling
///
/// # Examples
///
/// ```
/// use iiif_download_core::download::{SizeRequest, max_size};
///
/// assert_eq!(max_size(Some(3000), Some(2000), Some(2500)), SizeRequest::Height(2500));
/// assert_eq!(max_size(Some(1200), Some(1800), Some(2500)).to_string(), "1800,");
/// assert_eq!(max_size(None, None, None).to_string(), "full");
/// ```
#[must_use]
pub fn max_size(height: Option<u32>, width: Option<u32>, max_dim: Option<u32>) -> SizeRequest {
    let Some(max_dim) = max_dim else {
        return SizeRequest::Full;
    };

    match (height, width) {
        (Some(h), Some(w)) if h > w => SizeRequest::Height(h.min(max_dim)),
        (Some(_), Some(w)) => SizeRequest::Width(w.min(max_dim)),
        _ => SizeRequest::Width(max_dim),
    }
}

/// Computes the size for the fallback request after a failed maximum request.
///
/// With a floor `min_dim` and longer declared axis `L`:
/// - nothing declared: `{min_dim},`
/// - `L < min_dim`: `L` itself, no further reduction is possible
/// - `L > 2 * min_dim`: half of `L`
/// - otherwise: `min_dim`
///
/// Without a floor the longer declared axis is halved, or `full` is returned
/// when nothing is declared.
///
/// # Examples
///
/// ```
/// use iiif_download_core::download::{SizeRequest, reduced_size};
///
/// assert_eq!(reduced_size(Some(3000), Some(2000), Some(1000)), SizeRequest::Height(1500));
/// assert_eq!(reduced_size(Some(1500), Some(1200), Some(1000)), SizeRequest::Height(1000));
/// assert_eq!(reduced_size(None, None, Some(1000)).to_string(), "1000,");
/// ```
#[must_use]
pub fn reduced_size(height: Option<u32>, width: Option<u32>, min_dim: Option<u32>) -> SizeRequest {
    let axis = longer_axis(height, width);

    let Some(min_dim) = min_dim else {
        return axis.map_or(SizeRequest::Full, |(axis, len)| axis.request(len / 2));
    };

    let Some((axis, len)) = axis else {
        return SizeRequest::Width(min_dim);
    };

    if len < min_dim {
        axis.request(len)
    } else if len > min_dim.saturating_mul(2) {
        axis.request(len / 2)
    } else {
        axis.request(min_dim)
    }
}
