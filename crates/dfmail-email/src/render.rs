//! Placeholder substitution of merged data into subjects and bodies
//!
//! `{{ key }}` and `{key}` are both replaced by the value of `key` in the
//! merged data. Strings are inserted as-is, numbers and booleans in their
//! plain form; missing keys, `null`, arrays and objects leave the placeholder
//! untouched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}|\{([A-Za-z0-9_.\-]+)\}")
        .unwrap_or_else(|e| panic!("invalid placeholder pattern: {e}"))
});

/// Substitute placeholders in one pass; inserted values are not rescanned.
pub fn apply_data(template: &str, data: &Map<String, Value>) -> String {
    if data.is_empty() || !template.contains('{') {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .and_then(|key| data.get(key.as_str()))
                .and_then(scalar_text)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
