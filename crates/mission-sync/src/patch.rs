//! Partial attribute mappings and the sanitizer applied before every merge.
//!
//! A patch distinguishes "unset" from every concrete value: `null`, `""`,
//! `0` and `false` are real values that overwrite, an unset field is dropped
//! by [`sanitize`] and never reaches the store.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::store::Document;

/// Partial attribute mapping merged into a mission's current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: BTreeMap<String, Option<Value>>,
}

impl Patch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Patch::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder form of [`Patch::mark_unset`].
    #[must_use]
    pub fn without(mut self, key: impl Into<String>) -> Self {
        self.mark_unset(key);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), Some(value.into()));
    }

    /// Inserts `value` when present, otherwise records the key as unset.
    pub fn insert_optional<V: Into<Value>>(&mut self, key: impl Into<String>, value: Option<V>) {
        self.fields.insert(key.into(), value.map(Into::into));
    }

    pub fn mark_unset(&mut self, key: impl Into<String>) {
        self.fields.insert(key.into(), None);
    }

    /// The value for `key`, or `None` when missing or unset.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).and_then(Option::as_ref)
    }

    /// The value for `key` when it is set and not falsy (`null`, `""`, `0`,
    /// `false`).
    pub fn get_truthy(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|value| is_truthy(value))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// True when `key` carries a concrete value.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl From<Document> for Patch {
    fn from(document: Document) -> Self {
        document
            .into_iter()
            .map(|(key, value)| (key, Some(value)))
            .collect()
    }
}

impl FromIterator<(String, Option<Value>)> for Patch {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Loose truthiness used when picking among alternative source fields.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Drops every unset field and returns the remaining concrete values.
pub fn sanitize(patch: &Patch) -> Document {
    patch
        .fields
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|value| (key.clone(), value.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{Patch, sanitize};

    #[test]
    fn sanitize_drops_only_unset_fields() {
        let patch = Patch::new()
            .with("status", "Cancelled")
            .with("vehicle", Value::Null)
            .with("note", "")
            .with("count", 0)
            .with("urgent", false)
            .without("missionDateISO");

        let sanitized = sanitize(&patch);
        assert_eq!(sanitized.len(), 5);
        assert!(!sanitized.contains_key("missionDateISO"));
        assert_eq!(sanitized.get("vehicle"), Some(&Value::Null));
        assert_eq!(sanitized.get("note"), Some(&json!("")));
        assert_eq!(sanitized.get("count"), Some(&json!(0)));
        assert_eq!(sanitized.get("urgent"), Some(&json!(false)));
    }

    #[test]
    fn sanitize_leaves_input_untouched() {
        let patch = Patch::new().with("status", "Scheduled").without("date");
        let _ = sanitize(&patch);
        assert_eq!(patch.len(), 2);
        assert!(!patch.is_set("date"));
    }

    #[test]
    fn insert_optional_records_absence() {
        let mut patch = Patch::new();
        patch.insert_optional("vehicle", None::<String>);
        patch.insert_optional("typeKey", Some("medevac"));
        assert_eq!(patch.get("vehicle"), None);
        assert_eq!(patch.get_str("typeKey"), Some("medevac"));
        assert_eq!(sanitize(&patch).len(), 1);
    }

    #[test]
    fn unset_keys_count_toward_length() {
        let mut patch = Patch::new();
        assert!(patch.is_empty());
        patch.mark_unset("vehicle");
        assert!(!patch.is_empty());
        assert_eq!(patch.len(), 1);
        assert!(!patch.is_set("vehicle"));
    }

    #[test]
    fn truthy_lookup_skips_falsy_values() {
        let patch = Patch::new()
            .with("missionDateISO", "")
            .with("date", "2025-03-01")
            .with("count", 0);
        assert_eq!(patch.get_truthy("missionDateISO"), None);
        assert_eq!(patch.get_truthy("count"), None);
        assert_eq!(patch.get_truthy("date"), Some(&json!("2025-03-01")));
    }
}
