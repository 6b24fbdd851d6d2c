//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Download the page images of IIIF manifests.
///
/// Images are requested at the largest acceptable size, validated, and saved
/// as JPEG files under one directory per manifest. Re-running skips images
/// that are already on disk at an acceptable size.
#[derive(Parser, Debug)]
#[command(name = "iiif-download")]
#[command(author, version, about)]
pub struct Args {
    /// Single manifest URL to download
    #[arg(required_unless_present = "file")]
    pub manifest_url: Option<String>,

    /// File containing manifest URLs, one per line (`#` starts a comment)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Directory where manifest folders are created
    #[arg(short = 'd', long = "img-dir", alias = "img_dir")]
    pub img_dir: Option<PathBuf>,

    /// Output folder for the single manifest URL (relative to the image directory)
    #[arg(short = 'n', long, requires = "manifest_url")]
    pub name: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent image downloads per manifest (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Largest requested dimension in pixels (`full` or 0 for no limit)
    #[arg(long = "max-size", alias = "max_dim", value_parser = parse_size_limit)]
    pub max_size: Option<SizeLimit>,

    /// Smallest acceptable dimension in pixels (`full` or 0 for no floor)
    #[arg(long = "min-size", alias = "min_dim", value_parser = parse_size_limit)]
    pub min_size: Option<SizeLimit>,

    /// Pixel density written into saved JPEG files
    #[arg(long = "max-resolution")]
    pub max_resolution: Option<u16>,

    /// Seconds to wait before each request to hosts without a specific policy
    #[arg(long, value_parser = parse_seconds)]
    pub sleep: Option<Duration>,

    /// Save images whose body is short by at most two bytes
    #[arg(long)]
    pub allow_truncation: bool,

    /// Only process the first five images of each manifest
    #[arg(long)]
    pub debug: bool,

    /// Write the fetched manifest JSON next to its images
    #[arg(long)]
    pub save_manifest: bool,

    /// Do not write errors to `error.log` in the log directory
    #[arg(long)]
    pub no_log_file: bool,
}

/// A dimension limit where `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimit(pub Option<u32>);

fn parse_size_limit(raw: &str) -> Result<SizeLimit, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("full") {
        return Ok(SizeLimit(None));
    }
    match raw.parse::<u32>() {
        Ok(0) => Ok(SizeLimit(None)),
        Ok(pixels) => Ok(SizeLimit(Some(pixels))),
        Err(_) => Err(format!("`{raw}` is not a pixel count, 0 or `full`")),
    }
}

fn parse_seconds(raw: &str) -> Result<Duration, String> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| format!("`{raw}` is not a non-negative number of seconds"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const URL: &str = "https://iiif.example.org/ms1/manifest.json";

    #[test]
    fn test_cli_single_url_parses_successfully() {
        let args = Args::try_parse_from(["iiif-download", URL]).unwrap();
        assert_eq!(args.manifest_url.as_deref(), Some(URL));
        assert!(args.file.is_none());
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.concurrency.is_none());
        assert!(args.max_size.is_none());
        assert!(!args.no_log_file);
    }

    #[test]
    fn test_cli_requires_url_or_file() {
        let err = Args::try_parse_from(["iiif-download"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_file_without_url() {
        let args = Args::try_parse_from(["iiif-download", "-f", "list.txt"]).unwrap();
        assert_eq!(args.file, Some(PathBuf::from("list.txt")));
        assert!(args.manifest_url.is_none());
    }

    #[test]
    fn test_cli_file_and_url_together() {
        let args = Args::try_parse_from(["iiif-download", "--file", "list.txt", URL]).unwrap();
        assert!(args.file.is_some());
        assert!(args.manifest_url.is_some());
    }

    #[test]
    fn test_cli_img_dir_short_and_legacy_long() {
        let args = Args::try_parse_from(["iiif-download", URL, "-d", "out"]).unwrap();
        assert_eq!(args.img_dir, Some(PathBuf::from("out")));

        let args = Args::try_parse_from(["iiif-download", URL, "--img_dir", "pages"]).unwrap();
        assert_eq!(args.img_dir, Some(PathBuf::from("pages")));
    }

    #[test]
    fn test_cli_name_requires_url() {
        let args = Args::try_parse_from(["iiif-download", URL, "-n", "ms1"]).unwrap();
        assert_eq!(args.name, Some(PathBuf::from("ms1")));

        let err =
            Args::try_parse_from(["iiif-download", "-f", "list.txt", "-n", "ms1"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["iiif-download", URL, "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["iiif-download", URL, "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["iiif-download", URL, "--quiet"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["iiif-download", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let err = Args::try_parse_from(["iiif-download", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["iiif-download", URL, "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        let args = Args::try_parse_from(["iiif-download", URL, "-c", "1"]).unwrap();
        assert_eq!(args.concurrency, Some(1));
        let args = Args::try_parse_from(["iiif-download", URL, "--concurrency", "100"]).unwrap();
        assert_eq!(args.concurrency, Some(100));

        for bad in ["0", "101"] {
            let err = Args::try_parse_from(["iiif-download", URL, "-c", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_max_size_accepts_full_and_zero() {
        let args = Args::try_parse_from(["iiif-download", URL, "--max-size", "full"]).unwrap();
        assert_eq!(args.max_size, Some(SizeLimit(None)));
        let args = Args::try_parse_from(["iiif-download", URL, "--max-size", "0"]).unwrap();
        assert_eq!(args.max_size, Some(SizeLimit(None)));
        let args = Args::try_parse_from(["iiif-download", URL, "--max_dim", "3000"]).unwrap();
        assert_eq!(args.max_size, Some(SizeLimit(Some(3000))));
    }

    #[test]
    fn test_cli_size_rejects_garbage() {
        let err = Args::try_parse_from(["iiif-download", URL, "--min-size", "big"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_sleep_must_be_non_negative() {
        let args = Args::try_parse_from(["iiif-download", URL, "--sleep", "0.25"]).unwrap();
        assert_eq!(args.sleep, Some(Duration::from_millis(250)));

        let err = Args::try_parse_from(["iiif-download", URL, "--sleep=-1"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_sleep_rejects_unrepresentable_durations() {
        for raw in ["1e300", "inf", "NaN"] {
            let err = Args::try_parse_from(["iiif-download", URL, "--sleep", raw]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation, "{raw}");
        }
    }

    #[test]
    fn test_cli_boolean_switches() {
        let args = Args::try_parse_from([
            "iiif-download",
            URL,
            "--allow-truncation",
            "--debug",
            "--save-manifest",
            "--no-log-file",
        ])
        .unwrap();
        assert!(args.allow_truncation);
        assert!(args.debug);
        assert!(args.save_manifest);
        assert!(args.no_log_file);
    }
}
