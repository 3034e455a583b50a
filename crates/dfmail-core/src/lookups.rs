//! Lookup substitution
//!
//! Lookups are host-defined named values (global, per-app, per-user) that may
//! appear in request strings as `{name}`. The host owns their storage; the
//! email service only asks for a string with lookups replaced.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static LOOKUP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").unwrap_or_else(|e| panic!("invalid lookup pattern: {e}"))
});

pub trait LookupResolver: Send + Sync {
    /// Return `input` with every known lookup replaced by its value.
    fn replace_lookups(&self, input: &str) -> String;
}

/// Lookups from a fixed name→value table.
///
/// Unknown names are left untouched, as are doubled braces (`{{name}}`),
/// which belong to template substitution.
#[derive(Debug, Clone, Default)]
pub struct StaticLookups {
    values: HashMap<String, String>,
}

impl StaticLookups {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl LookupResolver for StaticLookups {
    fn replace_lookups(&self, input: &str) -> String {
        if self.values.is_empty() || !input.contains('{') {
            return input.to_string();
        }

        LOOKUP_PATTERN
            .replace_all(input, |caps: &Captures| {
                let whole = &caps[0];
                let doubled = caps.get(0).is_some_and(|m| {
                    input[..m.start()].ends_with('{') || input[m.end()..].starts_with('}')
                });
                if doubled {
                    return whole.to_string();
                }
                match self.values.get(&caps[1]) {
                    Some(value) => value.clone(),
                    None => whole.to_string(),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookups() -> StaticLookups {
        StaticLookups::default()
            .with("company", "Acme")
            .with("files.bucket", "reports")
    }

    #[test]
    fn test_known_lookups_are_replaced() {
        assert_eq!(
            lookups().replace_lookups("Hello from {company}"),
            "Hello from Acme"
        );
        assert_eq!(
            lookups().replace_lookups("{files.bucket}/q1.pdf"),
            "reports/q1.pdf"
        );
    }

    #[test]
    fn test_unknown_lookups_are_left_alone() {
        assert_eq!(lookups().replace_lookups("Hi {user}"), "Hi {user}");
    }

    #[test]
    fn test_double_braces_are_not_lookups() {
        assert_eq!(
            lookups().replace_lookups("{{company}} and {company}"),
            "{{company}} and Acme"
        );
    }

    #[test]
    fn test_empty_table_is_identity() {
        let empty = StaticLookups::default();
        assert!(empty.is_empty());
        assert_eq!(empty.replace_lookups("{company}"), "{company}");
    }
}
