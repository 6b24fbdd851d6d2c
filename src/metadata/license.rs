//! License and rights normalization.
//!
//! [`license`] locates the rights statement of a manifest and [`license_url`]
//! turns free text or HTML into a canonical URL where it can.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use super::{DEFAULT_LANGUAGE, collapse_value};

/// Returned when no rights statement can be found.
pub const NO_LICENSE: &str = "No license information found";

/// Returned when the manifest document was never loaded.
pub const NO_MANIFEST: &str = "No manifest loaded";

/// Metadata label fragments that mark a rights statement, in priority order.
pub const RIGHTS_TERMS: [&str; 9] = [
    "license",
    "licence",
    "lizenz",
    "rights",
    "droits",
    "access",
    "copyright",
    "rechteinformationen",
    "conditions",
];

const PUBLIC_DOMAIN_MARK: &str = "https://creativecommons.org/publicdomain/mark/1.0/";
const CC_LICENSES: &str = "https://creativecommons.org/licenses/";

/// Creative Commons terms, most specific first. `None` is the public domain mark.
const CC_TABLE: [(&[&str], Option<&str>); 7] = [
    (&["publicdomain", "cc0", "pdm"], None),
    (&["byncsa", "noncommercialsharealike"], Some("by-nc-sa")),
    (&["byncnd", "noncommercialnoderiv"], Some("by-nc-nd")),
    (&["bysa", "sharealike"], Some("by-sa")),
    (&["bync", "noncommercial"], Some("by-nc")),
    (&["bynd", "noderiv"], Some("by-nd")),
    (&["by"], Some("by")),
];

/// Markup is re-parsed while it still looks like HTML, up to this many times.
const MAX_MARKUP_PASSES: usize = 4;

#[allow(clippy::expect_used)]
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?://[^\s]+|www\.[^\s]+|[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}(?:/[^\s]*)?)")
        .expect("url regex is valid")
});

#[allow(clippy::expect_used)]
static DECIMAL_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d\.\d").expect("version regex is valid"));

#[allow(clippy::expect_used)]
static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").expect("digit regex is valid"));

#[allow(clippy::expect_used)]
static HREF: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[href]").expect("href selector is valid"));

/// Extracts the license of a manifest document.
///
/// Looks at the top-level `license`/`rights` field, then metadata entries
/// whose label contains one of [`RIGHTS_TERMS`], then `attribution`.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use iiif_download_core::metadata::{NO_MANIFEST, license};
///
/// let doc = json!({"license": "CC-BY-NC 1.0"});
/// assert_eq!(license(Some(&doc)), "https://creativecommons.org/licenses/by-nc/1.0/");
/// assert_eq!(license(None), NO_MANIFEST);
/// ```
#[must_use]
pub fn license(content: Option<&Value>) -> String {
    let Some(content) = content else {
        return NO_MANIFEST.to_string();
    };

    for field in ["license", "rights"] {
        if let Some(value) = content.get(field) {
            return license_url(&collapse_value(value, DEFAULT_LANGUAGE).unwrap_or_default());
        }
    }

    if let Some(metadata) = content.get("metadata").and_then(Value::as_array) {
        for term in RIGHTS_TERMS {
            let entry = metadata.iter().find(|entry| {
                entry
                    .get("label")
                    .is_some_and(|label| label_text(label).to_lowercase().contains(term))
            });
            if let Some(entry) = entry {
                let value = entry
                    .get("value")
                    .and_then(|v| collapse_value(v, DEFAULT_LANGUAGE))
                    .unwrap_or_default();
                return license_url(&value);
            }
        }
    }

    let attribution = content
        .get("attribution")
        .and_then(|v| collapse_value(v, DEFAULT_LANGUAGE))
        .unwrap_or_default();
    license_url(&attribution)
}

/// Every string in a label, so that any translation can match a term.
fn label_text(label: &Value) -> String {
    match label {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Canonicalizes a rights statement.
///
/// A single `href` target or a single embedded URL wins; otherwise the text
/// is matched against Creative Commons terms. Unrecognized text comes back
/// cleaned of markup.
///
/// # Examples
///
/// ```
/// use iiif_download_core::metadata::{NO_LICENSE, license_url};
///
/// assert_eq!(
///     license_url(r#"<a href="https://rightsstatements.org/vocab/InC/1.0/">In Copyright</a>"#),
///     "https://rightsstatements.org/vocab/InC/1.0/"
/// );
/// assert_eq!(license_url("CC BY-SA 4.0"), "https://creativecommons.org/licenses/by-sa/4.0/");
/// assert_eq!(license_url("Public Domain"), "https://creativecommons.org/publicdomain/mark/1.0/");
/// assert_eq!(license_url(""), NO_LICENSE);
/// ```
#[must_use]
pub fn license_url(raw: &str) -> String {
    if raw.is_empty() {
        return NO_LICENSE.to_string();
    }

    let (text, hrefs) = strip_markup(raw);
    let text = match hrefs.as_slice() {
        [only] => return only.clone(),
        [] => text,
        many => many.join(" "),
    };

    let urls: Vec<&str> = URL_PATTERN.find_iter(&text).map(|m| m.as_str()).collect();
    if let [only] = urls.as_slice() {
        return if only.starts_with("http") {
            (*only).to_string()
        } else {
            format!("http://{only}")
        };
    }

    let normalized = text.trim().to_lowercase().replace(['-', ' '], "");
    if let Some(url) = creative_commons_url(&normalized) {
        return url;
    }

    if text.is_empty() {
        NO_LICENSE.to_string()
    } else {
        text
    }
}

fn creative_commons_url(normalized: &str) -> Option<String> {
    let (_, code) = CC_TABLE
        .iter()
        .find(|(terms, _)| terms.iter().any(|term| normalized.contains(term)))?;

    Some(match code {
        None => PUBLIC_DOMAIN_MARK.to_string(),
        Some(code) => format!("{CC_LICENSES}{code}/{}/", version_of(normalized)),
    })
}

/// Best-guess license version: `d.d`, else a lone digit as `d.0`, else `1.0`.
fn version_of(text: &str) -> String {
    if let Some(m) = DECIMAL_VERSION.find(text) {
        return m.as_str().to_string();
    }
    DIGIT
        .find(text)
        .map_or_else(|| "1.0".to_string(), |m| format!("{}.0", m.as_str()))
}

/// Unescapes entities and strips tags, collecting `href` targets on the way.
///
/// Escaped markup (`&lt;a href=...&gt;`) becomes real markup after one pass,
/// so parsing repeats while the text still contains tags.
fn strip_markup(raw: &str) -> (String, Vec<String>) {
    let mut current = raw.to_string();
    let mut hrefs = Vec::new();

    for _ in 0..MAX_MARKUP_PASSES {
        let fragment = Html::parse_fragment(&current);
        hrefs.extend(
            fragment
                .select(&HREF)
                .filter_map(|el| el.value().attr("href"))
                .map(str::to_string),
        );
        let text: String = fragment.root_element().text().collect();
        let settled = text == current || !(text.contains('<') && text.contains('>'));
        current = text;
        if settled {
            break;
        }
    }

    (current, hrefs)
}
