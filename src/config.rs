//! Run configuration.
//!
//! [`DownloadConfig`] is built once per run (defaults, then `IIIF_*`
//! environment variables, then CLI overrides) and passed by reference to the
//! engine and batch runner. Environment access goes through a lookup function
//! so tests can supply their own variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::download::ProviderDelays;
use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_MAX_RESOLUTION, DEFAULT_MAX_SIZE, DEFAULT_MIN_SIZE,
    DEFAULT_USER_AGENT, READ_TIMEOUT_SECS,
};
use crate::download::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};

const MAX_TIMEOUT_SECS: u64 = 3600;

/// Errors produced while building or validating a [`DownloadConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Raw value.
        value: String,
        /// What was expected.
        reason: &'static str,
    },

    /// A field failed validation.
    #[error("invalid config value for `{field}`: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid_env(var: &str, value: &str, reason: &'static str) -> Self {
        Self::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
            reason,
        }
    }

    fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Configuration for one download run.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Root for relative image and log directories.
    pub base_dir: PathBuf,
    /// Parent of every per-manifest output directory.
    pub img_dir: PathBuf,
    /// Directory for `error.log` and `download_fails.log`.
    pub log_dir: PathBuf,
    /// Ceiling on the longer side; `None` requests full resolution.
    pub max_size: Option<u32>,
    /// Floor used by the reduced-size fallback.
    pub min_size: Option<u32>,
    /// Pixel density (DPI) written into saved JPEGs.
    pub max_resolution: u16,
    /// Save bodies missing 1-2 bytes instead of failing.
    pub allow_truncation: bool,
    /// Pre-request delay per provider.
    pub provider_delays: ProviderDelays,
    /// Maximum simultaneous image downloads.
    pub concurrency: usize,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP request timeout.
    pub read_timeout: Duration,
    /// Only process the first few images of each manifest.
    pub debug: bool,
    /// Write the fetched manifest JSON next to the images.
    pub save_manifest: bool,
    /// Mirror errors into `{log_dir}/error.log`.
    pub log_to_file: bool,
    /// User-Agent for every request.
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self::with_base_dir(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

impl DownloadConfig {
    /// Creates a default configuration rooted at `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            img_dir: base_dir.join("img"),
            log_dir: base_dir.join("log"),
            base_dir,
            max_size: Some(DEFAULT_MAX_SIZE),
            min_size: Some(DEFAULT_MIN_SIZE),
            max_resolution: DEFAULT_MAX_RESOLUTION,
            allow_truncation: false,
            provider_delays: ProviderDelays::default(),
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            debug: false,
            save_manifest: false,
            log_to_file: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Builds a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparseable variables or invalid values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparseable variables or invalid values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();

        if let Some(base) = get("IIIF_BASE_DIR") {
            config.set_base_dir(base);
        }
        if let Some(dir) = get("IIIF_IMG_DIR") {
            config.img_dir = config.under_base(dir);
        }
        if let Some(dir) = get("IIIF_LOG_DIR") {
            config.log_dir = config.under_base(dir);
        }
        if let Some(raw) = get("IIIF_MAX_SIZE") {
            config.max_size = parse_dimension("IIIF_MAX_SIZE", &raw)?;
        }
        if let Some(raw) = get("IIIF_MIN_SIZE") {
            config.min_size = parse_dimension("IIIF_MIN_SIZE", &raw)?;
        }
        if let Some(raw) = get("IIIF_MAX_RESOLUTION") {
            config.max_resolution = raw
                .trim()
                .parse()
                .map_err(|_| {
                    ConfigError::invalid_env("IIIF_MAX_RESOLUTION", &raw, "expected 0..=65535")
                })?;
        }
        if let Some(raw) = get("IIIF_ALLOW_TRUNCATION") {
            config.allow_truncation = parse_bool(&raw);
        }
        if let Some(raw) = get("IIIF_SLEEP") {
            let secs: f64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_env("IIIF_SLEEP", &raw, "expected seconds"))?;
            let delay = Duration::try_from_secs_f64(secs).map_err(|_| {
                ConfigError::invalid_env("IIIF_SLEEP", &raw, "expected non-negative seconds")
            })?;
            config.provider_delays.set_default_delay(delay);
        }
        if let Some(raw) = get("IIIF_CONCURRENCY") {
            config.concurrency = raw
                .trim()
                .parse()
                .map_err(|_| {
                    ConfigError::invalid_env("IIIF_CONCURRENCY", &raw, "expected integer")
                })?;
        }
        if let Some(raw) = get("IIIF_CONNECT_TIMEOUT") {
            config.connect_timeout = parse_secs("IIIF_CONNECT_TIMEOUT", &raw)?;
        }
        if let Some(raw) = get("IIIF_READ_TIMEOUT") {
            config.read_timeout = parse_secs("IIIF_READ_TIMEOUT", &raw)?;
        }
        if let Some(raw) = get("IIIF_DEBUG") {
            config.debug = parse_bool(&raw);
        }
        if let Some(raw) = get("IIIF_SAVE_MANIFEST") {
            config.save_manifest = parse_bool(&raw);
        }
        if let Some(raw) = get("IIIF_LOG_TO_FILE") {
            config.log_to_file = parse_bool(&raw);
        }
        if let Some(agent) = get("IIIF_USER_AGENT") {
            config.user_agent = agent;
        }

        config.validate()?;
        Ok(config)
    }

    /// Moves the base directory, carrying default child directories along.
    pub fn set_base_dir(&mut self, base: impl AsRef<Path>) {
        let old_img = self.base_dir.join("img");
        let old_log = self.base_dir.join("log");
        let base = base.as_ref();
        self.base_dir = if base.is_absolute() {
            base.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(base))
                .unwrap_or_else(|_| base.to_path_buf())
        };
        if self.img_dir == old_img {
            self.img_dir = self.base_dir.join("img");
        }
        if self.log_dir == old_log {
            self.log_dir = self.base_dir.join("log");
        }
    }

    /// Resolves `path` against the base directory unless it is absolute.
    #[must_use]
    pub fn under_base(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(min), Some(max)) = (self.min_size, self.max_size)
            && min > max
        {
            return Err(ConfigError::invalid_value(
                "min_size",
                format!("{min} is larger than max_size {max}"),
            ));
        }

        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::invalid_value(
                "concurrency",
                format!(
                    "{}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}",
                    self.concurrency
                ),
            ));
        }

        validate_timeout("connect_timeout", self.connect_timeout)?;
        validate_timeout("read_timeout", self.read_timeout)?;

        Ok(())
    }

    /// Path of the per-run failure ledger.
    #[must_use]
    pub fn failure_ledger_path(&self) -> PathBuf {
        self.log_dir.join("download_fails.log")
    }
}

fn validate_timeout(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    let secs = value.as_secs();
    if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
        return Err(ConfigError::invalid_value(
            field,
            format!("{secs}s. Expected range: 1..={MAX_TIMEOUT_SECS}"),
        ));
    }
    Ok(())
}

/// Parses a boolean flag; `true`, `1` and `yes` are truthy, anything else false.
#[must_use]
pub fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Parses a dimension where `0` or `full` mean "no limit".
fn parse_dimension(var: &str, raw: &str) -> Result<Option<u32>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("full") {
        return Ok(None);
    }
    match trimmed.parse::<u32>() {
        Ok(0) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ConfigError::invalid_env(var, raw, "expected pixels, 0 or `full`")),
    }
}

fn parse_secs(var: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::invalid_env(var, raw, "expected whole seconds"))
}
