//! Manifest metadata helpers.
//!
//! IIIF v2 and v3 encode labels and values in several shapes: bare strings,
//! language-tagged literals (`{"@language": "en", "@value": ...}`), language
//! maps (`{"en": ["..."]}`) and arbitrary nestings of these. [`collapse_value`]
//! reduces any of them to a single representative string.

mod license;

pub use license::{NO_LICENSE, NO_MANIFEST, RIGHTS_TERMS, license, license_url};

use serde_json::Value;

/// Language preferred when a value carries several translations.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Collapses a nested JSON value to one representative string.
///
/// - strings, numbers and booleans are returned as text
/// - a collection with a single entry unwraps to that entry
/// - a multi-entry collection prefers the entry tagged with `lang`, then the
///   first entry that collapses to something
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use iiif_download_core::metadata::collapse_value;
///
/// assert_eq!(collapse_value(&json!({"en": ["Rights"]}), "en").as_deref(), Some("Rights"));
/// assert_eq!(
///     collapse_value(&json!([{"@language": "fr", "@value": "Droits"},
///                            {"@language": "en", "@value": "Rights"}]), "en").as_deref(),
///     Some("Rights")
/// );
/// assert_eq!(collapse_value(&json!([]), "en"), None);
/// ```
#[must_use]
pub fn collapse_value(value: &Value, lang: &str) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => match items.as_slice() {
            [] => None,
            [only] => collapse_value(only, lang),
            _ => items
                .iter()
                .find(|item| language_of(item) == Some(lang))
                .and_then(|item| collapse_value(item, lang))
                .or_else(|| items.iter().find_map(|item| collapse_value(item, lang))),
        },
        Value::Object(map) => {
            if map.len() == 1 {
                return map.values().next().and_then(|v| collapse_value(v, lang));
            }
            if let Some(tagged) = map.get(lang) {
                return collapse_value(tagged, lang);
            }
            if let Some(literal) = map.get("@value").or_else(|| map.get("value")) {
                return collapse_value(literal, lang);
            }
            map.values().find_map(|v| collapse_value(v, lang))
        }
    }
}

fn language_of(value: &Value) -> Option<&str> {
    let map = value.as_object()?;
    map.get("@language")
        .or_else(|| map.get("language"))
        .and_then(Value::as_str)
}

/// Collapsed text of `entry[field]` for a metadata entry.
#[must_use]
pub fn field_text(entry: &Value, field: &str) -> Option<String> {
    entry
        .get(field)
        .and_then(|v| collapse_value(v, DEFAULT_LANGUAGE))
}

/// Finds the value of the first metadata entry labelled `label`.
///
/// The label matches verbatim, capitalized, lowercased or prefixed with `@`.
#[must_use]
pub fn meta_value(metadata: &[Value], label: &str) -> Option<String> {
    let variants = [
        label.to_string(),
        capitalize(label),
        label.to_lowercase(),
        format!("@{label}"),
    ];

    metadata.iter().find_map(|entry| {
        let entry_label = field_text(entry, "label")?;
        if variants.contains(&entry_label) {
            field_text(entry, "value")
        } else {
            None
        }
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
