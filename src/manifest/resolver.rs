//! Image resource resolution for IIIF Presentation documents.
//!
//! Presentation API v2 lists images under `sequences[0].canvases[*].images`,
//! v3 under `items[*].items[0].items`. Each layout is handled by a
//! [`ResourceStrategy`]; the [`ResolverChain`] tries them in registration
//! order and stops at the first one that recognizes the document.

use serde_json::Value;
use tracing::{debug, trace};

use super::ManifestError;
use crate::download::constants::DEFAULT_REQUEST_SUFFIX;

/// One image resource extracted from a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    /// Image service base URL, without the default request suffix.
    pub service_id: String,
    /// Declared height, when present.
    pub height: Option<u32>,
    /// Declared width, when present.
    pub width: Option<u32>,
}

impl ImageResource {
    /// Builds a resource from a resource/body JSON object.
    ///
    /// Returns `None` when neither the service nor the resource carries an id.
    #[must_use]
    pub fn from_json(resource: &Value) -> Option<Self> {
        let raw_id = resource
            .get("service")
            .and_then(service_id)
            .or_else(|| object_id(resource))?;

        Some(Self {
            service_id: normalize_service_id(&raw_id),
            height: dimension(resource.get("height")),
            width: dimension(resource.get("width")),
        })
    }
}

/// Result of one strategy applied to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The strategy recognized the layout; the list may be empty.
    Resolved(Vec<ImageResource>),
    /// The document does not have this strategy's layout.
    NotApplicable,
}

/// A way of locating image resources in a manifest layout.
pub trait ResourceStrategy: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Extracts resources in document order.
    fn resolve(&self, document: &Value) -> Resolution;
}

/// Presentation API v2: `sequences[0].canvases[*].images[*]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequencesStrategy;

impl ResourceStrategy for SequencesStrategy {
    fn name(&self) -> &'static str {
        "sequences"
    }

    fn resolve(&self, document: &Value) -> Resolution {
        let Some(canvases) = document
            .get("sequences")
            .and_then(Value::as_array)
            .and_then(|sequences| sequences.first())
            .and_then(|sequence| sequence.get("canvases"))
            .and_then(Value::as_array)
        else {
            return Resolution::NotApplicable;
        };

        let mut resources = Vec::new();
        for canvas in canvases {
            let Some(images) = canvas.get("images").and_then(Value::as_array) else {
                return Resolution::NotApplicable;
            };
            resources.extend(images.iter().filter_map(extract_resource));
        }
        Resolution::Resolved(resources)
    }
}

/// Presentation API v3: `items[*].items[0].items[*]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemsStrategy;

impl ResourceStrategy for ItemsStrategy {
    fn name(&self) -> &'static str {
        "items"
    }

    fn resolve(&self, document: &Value) -> Resolution {
        let Some(canvases) = document.get("items").and_then(Value::as_array) else {
            return Resolution::NotApplicable;
        };

        let mut resources = Vec::new();
        for canvas in canvases {
            let Some(annotations) = canvas
                .get("items")
                .and_then(Value::as_array)
                .and_then(|pages| pages.first())
                .and_then(|page| page.get("items"))
                .and_then(Value::as_array)
            else {
                return Resolution::NotApplicable;
            };
            resources.extend(annotations.iter().filter_map(extract_resource));
        }
        Resolution::Resolved(resources)
    }
}

/// Ordered list of strategies.
pub struct ResolverChain {
    strategies: Vec<Box<dyn ResourceStrategy>>,
}

impl std::fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverChain")
            .field("strategies", &self.names())
            .finish()
    }
}

impl Default for ResolverChain {
    fn default() -> Self {
        let mut chain = Self::new();
        chain.register(Box::new(SequencesStrategy));
        chain.register(Box::new(ItemsStrategy));
        chain
    }
}

impl ResolverChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy; earlier registrations are tried first.
    pub fn register(&mut self, strategy: Box<dyn ResourceStrategy>) {
        self.strategies.push(strategy);
    }

    /// Names of the registered strategies, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs strategies until one recognizes the document.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnrecognizedSchema`] when every strategy
    /// reports [`Resolution::NotApplicable`].
    pub fn resolve(&self, document: &Value) -> Result<Vec<ImageResource>, ManifestError> {
        for strategy in &self.strategies {
            match strategy.resolve(document) {
                Resolution::Resolved(resources) => {
                    debug!(
                        strategy = strategy.name(),
                        count = resources.len(),
                        "resolved image resources"
                    );
                    return Ok(resources);
                }
                Resolution::NotApplicable => {
                    trace!(strategy = strategy.name(), "strategy not applicable");
                }
            }
        }

        Err(ManifestError::UnrecognizedSchema {
            tried: self.names().join(", "),
        })
    }
}

/// `resource` (v2) or `body` (v3) of an image annotation, converted.
fn extract_resource(annotation: &Value) -> Option<ImageResource> {
    let resource = annotation
        .get("resource")
        .filter(|v| is_present(v))
        .or_else(|| annotation.get("body").filter(|v| is_present(v)))?;

    let extracted = ImageResource::from_json(resource);
    if extracted.is_none() {
        debug!("skipping image resource without an id");
    }
    extracted
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Id of a `service` entry: object, first element of a list, or a bare string.
fn service_id(service: &Value) -> Option<String> {
    match service {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.first().and_then(service_id),
        Value::Object(_) => object_id(service),
        _ => None,
    }
}

fn object_id(value: &Value) -> Option<String> {
    value
        .get("@id")
        .or_else(|| value.get("id"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strips the default request suffix and trailing slashes, encodes spaces.
fn normalize_service_id(raw: &str) -> String {
    raw.replace(DEFAULT_REQUEST_SUFFIX, "")
        .trim_end_matches('/')
        .replace(' ', "+")
}

/// Declared dimension as a JSON number or a numeric string.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
