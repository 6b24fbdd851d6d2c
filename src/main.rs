//! CLI entry point for the IIIF image downloader.

use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use iiif_download_core::{
    BatchDownloader, DownloadConfig, ManifestDownloader, ManifestReport, read_manifest_list,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let config = build_config(&args)?;
    fs::create_dir_all(&config.img_dir)
        .with_context(|| format!("cannot create {}", config.img_dir.display()))?;
    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("cannot create {}", config.log_dir.display()))?;

    init_tracing(&args, config.log_to_file.then_some(config.log_dir.as_path()))?;

    debug!(?args, "CLI arguments parsed");

    let mut urls = Vec::new();
    if let Some(path) = &args.file {
        urls.extend(read_manifest_list(path)?);
    }
    if let Some(url) = &args.manifest_url {
        urls.push(url.clone());
    }
    if urls.is_empty() {
        error!("no manifest URLs found in input");
        return Ok(ExitCode::FAILURE);
    }

    info!(
        manifests = urls.len(),
        img_dir = %config.img_dir.display(),
        "downloading manifests"
    );

    let downloader = ManifestDownloader::new(config)?;
    let progress = progress_bar(&args, urls.len());

    // An explicit folder name only applies to a lone positional URL
    if let (Some(name), Some(url), None) = (&args.name, &args.manifest_url, &args.file) {
        let report = downloader.download(url, Some(name.as_path())).await;
        progress.inc(1);
        progress.finish_and_clear();
        print_report(&report, args.quiet);
        return Ok(exit_code(report.is_success()));
    }

    let batch = BatchDownloader::new(downloader);
    let summary = batch
        .download_all(&urls, |report| {
            progress.inc(1);
            progress.suspend(|| print_report(report, args.quiet));
        })
        .await;
    progress.finish_and_clear();

    info!(
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        images = summary.images_downloaded(),
        total = summary.images_total(),
        "Download complete"
    );

    Ok(exit_code(summary.is_success()))
}

/// Layers CLI flags over the `IIIF_*` environment.
fn build_config(args: &Args) -> Result<DownloadConfig> {
    let mut config = DownloadConfig::from_env().context("invalid IIIF_* environment")?;

    if let Some(dir) = &args.img_dir {
        config.img_dir = config.under_base(dir);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = usize::from(concurrency);
    }
    if let Some(limit) = args.max_size {
        config.max_size = limit.0;
    }
    if let Some(limit) = args.min_size {
        config.min_size = limit.0;
    }
    if let Some(dpi) = args.max_resolution {
        config.max_resolution = dpi;
    }
    if let Some(delay) = args.sleep {
        config.provider_delays.set_default_delay(delay);
    }
    config.allow_truncation |= args.allow_truncation;
    config.debug |= args.debug;
    config.save_manifest |= args.save_manifest;
    if args.no_log_file {
        config.log_to_file = false;
    }

    config.validate()?;
    Ok(config)
}

/// Installs the console subscriber and, when `log_dir` is set, an
/// `error.log` layer that only receives ERROR events.
fn init_tracing(args: &Args, log_dir: Option<&Path>) -> Result<()> {
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console = fmt::layer().with_writer(io::stderr).with_filter(filter);

    let error_file = match log_dir {
        Some(dir) => {
            let path = dir.join("error.log");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::ERROR),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(error_file)
        .init();
    Ok(())
}

fn progress_bar(args: &Args, total: usize) -> ProgressBar {
    if args.quiet || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:30} {pos}/{len} manifests {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_report(report: &ManifestReport, quiet: bool) {
    if quiet {
        return;
    }
    let status = if report.is_success() { "ok" } else { "FAILED" };
    println!(
        "{status} {} {}/{} images -> {}",
        report.url,
        report.images_downloaded,
        report.images_total,
        report.dir.display()
    );
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
