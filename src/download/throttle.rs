//! Per-provider pacing for image requests.
//!
//! This module provides the [`ProviderDelays`] table which maps an image
//! service URL to the minimum delay a task must sleep before issuing its
//! request. Archival providers that throttle aggressively get their own entry;
//! every other host falls back to the default delay.
//!
//! # Overview
//!
//! Pacing is local to each acquisition task: every task sleeps for its
//! provider's delay before each request, independently of its siblings. The
//! engine's concurrency bound multiplied by the provider delay therefore
//! determines the effective request rate against one host.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use iiif_download_core::download::ProviderDelays;
//!
//! let delays = ProviderDelays::default();
//! assert_eq!(
//!     delays.delay_for("https://gallica.bnf.fr/iiif/ark:/12148/btv1b/f1"),
//!     Duration::from_secs(12)
//! );
//! assert_eq!(
//!     delays.delay_for("https://iiif.example.org/image/1"),
//!     Duration::from_millis(50)
//! );
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::constants::{DEFAULT_PROVIDER_DELAY, GALLICA_PROVIDER_DELAY};

/// Delay table keyed by provider identifier.
///
/// A provider identifier is matched against the lowercased host of the image
/// service URL; the first registered provider whose identifier occurs in the
/// host wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDelays {
    default_delay: Duration,
    providers: Vec<(String, Duration)>,
}

impl Default for ProviderDelays {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER_DELAY).with_provider("gallica", GALLICA_PROVIDER_DELAY)
    }
}

impl ProviderDelays {
    /// Creates a table with only a default delay.
    #[must_use]
    pub fn new(default_delay: Duration) -> Self {
        Self {
            default_delay,
            providers: Vec::new(),
        }
    }

    /// Creates a table that never sleeps, for tests and local mirrors.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Registers (or replaces) the delay for a provider identifier.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>, delay: Duration) -> Self {
        self.set_provider(provider, delay);
        self
    }

    /// Registers (or replaces) the delay for a provider identifier in place.
    pub fn set_provider(&mut self, provider: impl Into<String>, delay: Duration) {
        let provider = provider.into().to_lowercase();
        if let Some(entry) = self.providers.iter_mut().find(|(name, _)| *name == provider) {
            entry.1 = delay;
        } else {
            self.providers.push((provider, delay));
        }
    }

    /// Replaces the default delay, keeping provider overrides.
    pub fn set_default_delay(&mut self, delay: Duration) {
        self.default_delay = delay;
    }

    /// Returns the delay applied to hosts without a provider override.
    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Returns the provider identifier that governs `url`, if any.
    #[must_use]
    pub fn provider_for(&self, url: &str) -> Option<&str> {
        let host = extract_domain(url);
        self.providers
            .iter()
            .find(|(provider, _)| host.contains(provider.as_str()))
            .map(|(provider, _)| provider.as_str())
    }

    /// Returns the pre-request delay for an image service URL.
    #[must_use]
    pub fn delay_for(&self, url: &str) -> Duration {
        let host = extract_domain(url);
        self.providers
            .iter()
            .find(|(provider, _)| host.contains(provider.as_str()))
            .map_or(self.default_delay, |(_, delay)| *delay)
    }

    /// Sleeps for the delay that applies to `url`.
    #[instrument(skip(self), fields(provider))]
    pub async fn pace(&self, url: &str) {
        let delay = self.delay_for(url);
        if let Some(provider) = self.provider_for(url) {
            tracing::Span::current().record("provider", provider);
        }
        if delay.is_zero() {
            return;
        }
        debug!(delay_ms = delay.as_millis(), "pacing request");
        tokio::time::sleep(delay).await;
    }
}

/// Extracts the lowercased host from a URL.
///
/// Returns "unknown" for malformed URLs so that pacing still applies the
/// default delay.
///
/// # Examples
///
/// ```
/// use iiif_download_core::download::extract_domain;
///
/// assert_eq!(extract_domain("https://Gallica.BNF.fr/iiif/x"), "gallica.bnf.fr");
/// assert_eq!(extract_domain("https://localhost:8080/x"), "localhost");
/// assert_eq!(extract_domain("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_default_table_has_gallica_override() {
        let delays = ProviderDelays::default();
        assert_eq!(delays.default_delay(), Duration::from_millis(50));
        assert_eq!(
            delays.delay_for("https://gallica.bnf.fr/iiif/ark:/12148/f1"),
            Duration::from_secs(12)
        );
        assert_eq!(
            delays.provider_for("https://gallica.bnf.fr/iiif/ark:/12148/f1"),
            Some("gallica")
        );
    }

    #[test]
    fn test_unknown_host_uses_default() {
        let delays = ProviderDelays::default();
        assert_eq!(
            delays.delay_for("https://images.example.org/iiif/1"),
            Duration::from_millis(50)
        );
        assert_eq!(delays.provider_for("https://images.example.org/iiif/1"), None);
    }

    #[test]
    fn test_provider_match_is_case_insensitive() {
        let delays =
            ProviderDelays::new(Duration::ZERO).with_provider("Gallica", Duration::from_secs(3));
        assert_eq!(
            delays.delay_for("https://GALLICA.bnf.fr/iiif/1"),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_provider_only_matches_host() {
        let delays = ProviderDelays::default();
        // Provider name in the path must not trigger the override.
        assert_eq!(
            delays.delay_for("https://iiif.example.org/gallica/1"),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_set_provider_replaces_existing() {
        let mut delays = ProviderDelays::default();
        delays.set_provider("gallica", Duration::from_secs(1));
        assert_eq!(
            delays.delay_for("https://gallica.bnf.fr/x"),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_malformed_url_uses_default() {
        let delays = ProviderDelays::default();
        assert_eq!(delays.delay_for("::not a url::"), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pace_sleeps_for_provider_delay() {
        tokio::time::pause();

        let delays = ProviderDelays::new(Duration::from_secs(2));
        let start = Instant::now();
        delays.pace("https://example.org/iiif/1").await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_disabled_table_does_not_sleep() {
        tokio::time::pause();

        let delays = ProviderDelays::disabled();
        let start = Instant::now();
        delays.pace("https://gallica.bnf.fr/iiif/1").await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn test_extract_domain_with_port() {
        assert_eq!(extract_domain("https://example.com:8080/path"), "example.com");
    }
}
