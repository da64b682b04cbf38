//! List decoding
//!
//! Turns a downloaded body into IP/CIDR entries according to the source's
//! [`ListFormat`]. Order is preserved and duplicates are dropped.

use bestip_core::source::ListFormat;
use bestip_core::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;

/// Decode `body` into entries
///
/// # Errors
///
/// `Error::Parse` if a JSON body is malformed or lacks the expected key.
pub fn decode(body: &str, format: ListFormat) -> Result<Vec<String>> {
    let raw = match format {
        ListFormat::Text => decode_text(body),
        ListFormat::JsonArray { key } => {
            let items = json_array(body, key)?;
            items
                .iter()
                .filter_map(|item| match item.as_str() {
                    Some(s) => Some(s.to_string()),
                    None => {
                        tracing::warn!("Skipping non-string entry under '{}': {}", key, item);
                        None
                    }
                })
                .collect()
        }
        ListFormat::JsonObjects { key, field } => {
            let items = json_array(body, key)?;
            items
                .iter()
                .filter_map(|item| match item.get(field).and_then(Value::as_str) {
                    Some(s) => Some(s.to_string()),
                    None => {
                        tracing::warn!("Skipping entry under '{}' without '{}'", key, field);
                        None
                    }
                })
                .collect()
        }
    };

    Ok(dedup(raw))
}

/// Entries of a plain-text list: one per line, `#` starts a comment
pub fn decode_text(body: &str) -> Vec<String> {
    body.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn json_array(body: &str, key: &str) -> Result<Vec<Value>> {
    let mut value: Value = serde_json::from_str(body)
        .map_err(|e| Error::parse(format!("IP list is not valid JSON: {}", e)))?;

    match value.get_mut(key).map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(Error::parse(format!("'{}' in IP list is not an array", key))),
        None => Err(Error::parse(format!("IP list has no '{}' key", key))),
    }
}

fn dedup(entries: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty() && seen.insert(e.clone()))
        .collect()
}
