//! Per-manifest sidecar files and the run-wide failure ledger.
//!
//! Each manifest directory receives:
//! - `info.txt`: the manifest URL, its license, one `"{index} {url}"` line per
//!   download attempt and a block per terminal image failure
//! - `info.json`: the [`ManifestReport`] written when the manifest finishes
//! - `manifest.json`: the fetched document, when enabled
//!
//! Terminal failures are also appended to `{log_dir}/download_fails.log` as
//! `"{output path} {url}"` lines.
//!
//! Image tasks share one [`Sidecar`] and append concurrently; writes are
//! serialized by an internal lock.

use std::error::Error as StdError;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::download::ManifestReport;

/// File name of the human-readable sidecar.
pub const INFO_TXT: &str = "info.txt";
/// File name of the machine-readable summary.
pub const INFO_JSON: &str = "info.json";
/// File name of the saved manifest document.
pub const MANIFEST_JSON: &str = "manifest.json";

/// Errors produced by sidecar writes.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// I/O error writing a sidecar file to disk.
    #[error("I/O error writing sidecar: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error (shouldn't occur for well-formed structs).
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writer for one manifest's sidecar files.
#[derive(Debug)]
pub struct Sidecar {
    dir: PathBuf,
    ledger: PathBuf,
    lock: Mutex<()>,
}

impl Sidecar {
    /// Creates the manifest directory and starts a fresh `info.txt`.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError::Io`] if the directory or file cannot be created.
    #[instrument(skip(ledger), fields(dir = %dir.display()))]
    pub fn create(dir: &Path, ledger: PathBuf, manifest_url: &str) -> Result<Self, SidecarError> {
        fs::create_dir_all(dir)?;
        let mut info = File::create(dir.join(INFO_TXT))?;
        writeln!(info, "{manifest_url}")?;
        debug!("sidecar started");

        Ok(Self {
            dir: dir.to_path_buf(),
            ledger,
            lock: Mutex::new(()),
        })
    }

    /// Path of `info.txt`.
    #[must_use]
    pub fn info_path(&self) -> PathBuf {
        self.dir.join(INFO_TXT)
    }

    /// Path of the failure ledger.
    #[must_use]
    pub fn ledger_path(&self) -> &Path {
        &self.ledger
    }

    /// Appends the license line.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError::Io`] on write failure.
    pub fn record_license(&self, license: &str) -> Result<(), SidecarError> {
        self.append_info(&format!("{license}\n"))
    }

    /// Appends an `"{index} {url}"` attempt line.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError::Io`] on write failure.
    pub fn record_attempt(&self, index: usize, url: &str) -> Result<(), SidecarError> {
        self.append_info(&format!("{index} {url}\n"))
    }

    /// Records a terminal image failure in `info.txt` and the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError::Io`] on write failure.
    pub fn record_failure(
        &self,
        image_path: &Path,
        url: &str,
        error: &(dyn StdError + 'static),
    ) -> Result<(), SidecarError> {
        let mut block = format!(
            "\nFailed to download {url} to {}\n{error}\n",
            image_path.display()
        );
        let mut source = error.source();
        while let Some(cause) = source {
            block.push_str(&format!("  caused by: {cause}\n"));
            source = cause.source();
        }
        block.push('\n');

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        append(&self.info_path(), &block)?;
        if let Some(parent) = self.ledger.parent() {
            fs::create_dir_all(parent)?;
        }
        append(&self.ledger, &format!("{} {url}\n", image_path.display()))?;
        Ok(())
    }

    /// Writes the fetched document as pretty-printed `manifest.json`.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError`] on I/O or serialization failure.
    pub fn write_manifest_json(&self, document: &Value) -> Result<PathBuf, SidecarError> {
        let path = self.dir.join(MANIFEST_JSON);
        write_json(&path, document)?;
        Ok(path)
    }

    /// Writes the run summary as `info.json`.
    ///
    /// # Errors
    ///
    /// Returns [`SidecarError`] on I/O or serialization failure.
    pub fn write_report(&self, report: &ManifestReport) -> Result<PathBuf, SidecarError> {
        let path = self.dir.join(INFO_JSON);
        write_json(&path, report)?;
        debug!(path = %path.display(), "report written");
        Ok(path)
    }

    fn append_info(&self, text: &str) -> Result<(), SidecarError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        append(&self.info_path(), text)
    }
}

fn append(path: &Path, text: &str) -> Result<(), SidecarError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SidecarError> {
    let mut writer = BufWriter::new(File::create(path)?);
    if let Err(err) = serde_json::to_writer_pretty(&mut writer, value) {
        // A half-written summary is worse than none.
        drop(writer);
        let _ = fs::remove_file(path);
        return Err(err.into());
    }
    writer.flush()?;
    Ok(())
}
