//! Duplicate fingerprints for nodes.
//!
//! Two nodes are duplicates when they share a label and the same
//! duplicate-relevant properties. Store-managed timestamps never count, and
//! for labels keyed by an opaque caller id the id is ignored too: the id is
//! what differs between two submissions of the same observation.

use super::label::RESERVED_PROPERTIES;
use super::{Label, Properties};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 fingerprint of a node's label and duplicate-relevant properties.
///
/// # Example
///
/// ```rust
/// use factgraph::models::{Label, NodeFingerprint, Properties};
/// use serde_json::json;
///
/// let a: Properties = serde_json::from_value(json!({"id": "h-1", "text": "capex peaks"})).unwrap();
/// let b: Properties = serde_json::from_value(json!({"id": "h-2", "text": "capex peaks"})).unwrap();
///
/// assert_eq!(
///     NodeFingerprint::compute(Label::Hypothesis, &a),
///     NodeFingerprint::compute(Label::Hypothesis, &b),
/// );
/// assert_eq!(NodeFingerprint::compute(Label::Hypothesis, &a).len(), 64);
/// ```
pub struct NodeFingerprint;

impl NodeFingerprint {
    /// Computes the lowercase hex fingerprint (64 characters).
    #[must_use]
    pub fn compute(label: Label, properties: &Properties) -> String {
        let relevant: Properties = properties
            .iter()
            .filter(|(key, _)| Self::is_relevant(label, key))
            .map(|(key, value)| (key.clone(), canonicalize(value)))
            .collect();

        let canonical = serde_json::to_string(&relevant).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(label.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn is_relevant(label: Label, key: &str) -> bool {
        if RESERVED_PROPERTIES.contains(&key) {
            return false;
        }
        !(label.has_opaque_key() && key == label.natural_key_field())
    }
}

/// Rebuilds nested objects with sorted keys.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Properties {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_fingerprint_ignores_key_order_and_timestamps() {
        let a = props(json!({"ticker": "NVDA", "name": "NVIDIA", "created_at": 1}));
        let b = props(json!({"name": "NVIDIA", "ticker": "NVDA", "updated_at": 2}));
        assert_eq!(
            NodeFingerprint::compute(Label::Company, &a),
            NodeFingerprint::compute(Label::Company, &b)
        );
    }

    #[test]
    fn test_fingerprint_includes_domain_key() {
        let a = props(json!({"ticker": "NVDA"}));
        let b = props(json!({"ticker": "AMD"}));
        assert_ne!(
            NodeFingerprint::compute(Label::Company, &a),
            NodeFingerprint::compute(Label::Company, &b)
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_labels() {
        let p = props(json!({"id": "x", "text": "same"}));
        assert_ne!(
            NodeFingerprint::compute(Label::Pattern, &p),
            NodeFingerprint::compute(Label::Hypothesis, &p)
        );
    }

    #[test]
    fn test_fingerprint_nested_values() {
        let a = props(json!({"id": "1", "meta": {"b": 1, "a": 2}}));
        let b = props(json!({"id": "2", "meta": {"a": 2, "b": 1}}));
        let c = props(json!({"id": "3", "meta": {"a": 2, "b": 3}}));
        let fa = NodeFingerprint::compute(Label::Observation, &a);
        assert_eq!(fa, NodeFingerprint::compute(Label::Observation, &b));
        assert_ne!(fa, NodeFingerprint::compute(Label::Observation, &c));
    }
}
