//! Parsing of the credential document.
//!
//! ```yaml
//! api_keys:
//!   Gemini:
//!     keys: [AIza-one, AIza-two]
//!     default_model: gemini-2.5-flash
//!   Groq: [gsk_one, gsk_two]
//!   OpenRouter: sk-or-single
//! ```
//!
//! Individual entries that do not match any accepted shape contribute no
//! credentials; only a document that cannot be read at all is an error.

use super::{KeySnapshot, ProviderConfig};
use anyhow::{Context, anyhow};
use serde_json::Value;
use std::collections::HashMap;

/// Syntax of the credential document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

/// Parse a whole document into a snapshot.
pub fn parse(text: &str, format: DocumentFormat) -> anyhow::Result<KeySnapshot> {
    let root: Value = match format {
        DocumentFormat::Json => serde_json::from_str(text).context("invalid JSON credential document")?,
        DocumentFormat::Yaml => serde_yml::from_str(text).context("invalid YAML credential document")?,
    };

    let section = root
        .get("api_keys")
        .ok_or_else(|| anyhow!("missing api_keys section"))?
        .as_object()
        .ok_or_else(|| anyhow!("api_keys must be a mapping"))?;

    let providers: HashMap<String, ProviderConfig> = section
        .iter()
        .map(|(name, entry)| (name.clone(), parse_entry(name, entry)))
        .collect();

    Ok(KeySnapshot::new(providers))
}

/// Interpret one `api_keys` entry. Never fails.
fn parse_entry(name: &str, entry: &Value) -> ProviderConfig {
    let (credentials, default_model) = match entry {
        Value::Array(items) => (string_items(items), None),
        Value::String(key) => (vec![key.clone()], None),
        Value::Object(map) => {
            let keys = map
                .get("keys")
                .and_then(Value::as_array)
                .map(|items| string_items(items))
                .unwrap_or_default();
            let default_model = map
                .get("default_model")
                .and_then(Value::as_str)
                .map(str::to_string);
            (keys, default_model)
        }
        other => {
            tracing::debug!(provider = name, kind = value_kind(other), "ignoring credential entry");
            (Vec::new(), None)
        }
    };

    let credentials: Vec<String> = credentials
        .into_iter()
        .filter(|k| !k.trim().is_empty())
        .collect();

    ProviderConfig {
        name: name.to_string(),
        credentials,
        default_model,
    }
}

fn string_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
