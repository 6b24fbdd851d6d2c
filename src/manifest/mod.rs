//! IIIF manifest entity and image resource resolution.
//!
//! # Architecture
//!
//! - [`Manifest`] - source URL, loaded document, output directory, cached license
//! - [`ResolverChain`] - ordered [`ResourceStrategy`] list turning a document
//!   into [`ImageResource`]s
//! - [`ManifestError`] - fetch, parse and layout errors
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use iiif_download_core::download::HttpClient;
//! use iiif_download_core::manifest::{Manifest, ResolverChain};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?;
//! let url = "https://iiif.example.org/ms1/manifest.json";
//! let mut manifest = Manifest::new(url, Path::new("img"), None);
//! manifest.load(&client).await?;
//! println!("{} -> {}", manifest.uid(), manifest.license());
//! let resources = manifest.resources(&ResolverChain::default());
//! println!("{} images", resources.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod resolver;

pub use error::ManifestError;
pub use resolver::{
    ImageResource, ItemsStrategy, Resolution, ResolverChain, ResourceStrategy, SequencesStrategy,
};

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::download::HttpClient;
use crate::metadata::{self, NO_MANIFEST};

/// A IIIF manifest being processed.
#[derive(Debug)]
pub struct Manifest {
    url: String,
    content: Option<Value>,
    uid: String,
    dir: PathBuf,
    license: OnceLock<String>,
}

impl Manifest {
    /// Creates an unloaded manifest.
    ///
    /// `url` is percent-decoded. Output goes to `dir_name` when given
    /// (absolute, or relative to `img_dir`), else to `{img_dir}/{uid}`.
    #[must_use]
    pub fn new(url: &str, img_dir: &Path, dir_name: Option<&Path>) -> Self {
        let url = urlencoding::decode(url.trim())
            .map_or_else(|_| url.trim().to_string(), |decoded| decoded.into_owned());
        let uid = manifest_uid(&url);
        let dir = match dir_name {
            Some(name) if name.is_absolute() => name.to_path_buf(),
            Some(name) => img_dir.join(name),
            None => img_dir.join(&uid),
        };

        Self {
            url,
            content: None,
            uid,
            dir,
            license: OnceLock::new(),
        }
    }

    /// Source URL (percent-decoded).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Directory-safe identifier derived from the URL.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Output directory for images and sidecars.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loaded document, if any.
    #[must_use]
    pub fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    /// Fetches and stores the manifest document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the document cannot be fetched, is not
    /// JSON, or is empty.
    #[instrument(skip(self, client), fields(manifest = %self.url))]
    pub async fn load(&mut self, client: &HttpClient) -> Result<(), ManifestError> {
        let document = client.get_json(&self.url).await?;
        self.set_content(document)?;
        info!("manifest loaded");
        Ok(())
    }

    /// Stores an already parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Empty`] for `null`, `{}` and `[]`.
    pub fn set_content(&mut self, document: Value) -> Result<(), ManifestError> {
        let empty = match &document {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if empty {
            return Err(ManifestError::empty(&self.url));
        }
        self.content = Some(document);
        self.license = OnceLock::new();
        Ok(())
    }

    /// License of the document, computed once after loading.
    #[must_use]
    pub fn license(&self) -> &str {
        match &self.content {
            Some(content) => self
                .license
                .get_or_init(|| metadata::license(Some(content))),
            None => NO_MANIFEST,
        }
    }

    /// Value of the first metadata entry labelled `label`.
    #[must_use]
    pub fn meta(&self, label: &str) -> Option<String> {
        let entries = self.content.as_ref()?.get("metadata")?.as_array()?;
        metadata::meta_value(entries, label)
    }

    /// Image resources in document order.
    ///
    /// An unloaded manifest or an unrecognized layout yields an empty list;
    /// the cause is logged.
    #[must_use]
    pub fn resources(&self, chain: &ResolverChain) -> Vec<ImageResource> {
        let Some(content) = &self.content else {
            warn!(error = %ManifestError::not_loaded(&self.url), "no resources");
            return Vec::new();
        };

        chain.resolve(content).unwrap_or_else(|e| {
            warn!(manifest = %self.url, error = %e, "failed to extract images from manifest");
            Vec::new()
        })
    }
}

/// Directory name for a manifest URL.
///
/// # Examples
///
/// ```
/// use iiif_download_core::manifest::manifest_uid;
///
/// assert_eq!(
///     manifest_uid("https://www.e-codices.unifr.ch/metadata/iiif/csg-0390/manifest.json"),
///     "e-codicesunifrchmetadataiiifcsg-0390"
/// );
/// ```
#[must_use]
pub fn manifest_uid(url: &str) -> String {
    url.replace('/', "")
        .replace('.', "")
        .replace("https:", "")
        .replace("www", "")
        .replace(' ', "_")
        .replace("manifest", "")
        .replace("json", "")
}
