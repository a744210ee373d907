//! Deterministic identity for metric families and samples.
//!
//! A family's identifier doubles as its exposed metric name, so namespaces
//! are validated against the same grammar as names. Label values are folded
//! into sample keys through base64 over their JSON array, which keeps the
//! `:` key separator out of the encoded segment no matter what the values
//! contain, and makes the key fully reversible at collection time.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::common::MetricError;

/// Label name reserved for histogram bucket boundaries.
pub const RESERVED_LABEL: &str = "le";

/// Builds the stable identifier for a metric family.
///
/// Deterministic and order-preserving: identical inputs always produce the
/// identical key. Inputs are expected to have passed validation first.
pub fn family_key(namespace: &str, name: &str) -> String {
    format!("{namespace}_{name}")
}

/// Builds the per-sample key suffix for a family: the family identifier
/// plus the encoded label-value segment.
pub fn sample_key(family_key: &str, label_values: &[&str]) -> String {
    format!("{family_key}:{}", encode_label_values(label_values))
}

/// Encodes a label-value sequence into its sample key segment.
pub fn encode_label_values(values: &[&str]) -> String {
    let json = serde_json::to_string(values).expect("string slices always serialize");
    BASE64.encode(json)
}

/// Decodes a sample key segment back into label values.
///
/// Returns `None` for segments not produced by [`encode_label_values`].
pub fn decode_label_values(segment: &str) -> Option<Vec<String>> {
    let raw = BASE64.decode(segment).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Validates a metric or namespace name.
///
/// The first character must be `[a-zA-Z_:]`, and all subsequent characters
/// must be `[a-zA-Z0-9_:]`.
pub(crate) fn validate_metric_name(name: &str) -> Result<(), MetricError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) => valid_metric_name_start_character(c) && chars.all(valid_metric_name_character),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MetricError::InvalidMetricName(name.to_string()))
    }
}

/// Validates a label name.
///
/// The first character must be `[a-zA-Z_]`, all subsequent characters must
/// be `[a-zA-Z0-9_]`, and reserved names are rejected.
pub(crate) fn validate_label_name(label: &str) -> Result<(), MetricError> {
    if label == RESERVED_LABEL {
        return Err(MetricError::ReservedLabelName(label.to_string()));
    }
    let mut chars = label.chars();
    let valid = match chars.next() {
        Some(c) => valid_label_name_start_character(c) && chars.all(valid_label_name_character),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(MetricError::InvalidLabelName(label.to_string()))
    }
}

#[inline]
fn valid_metric_name_start_character(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':'
}

#[inline]
fn valid_metric_name_character(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

#[inline]
fn valid_label_name_start_character(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

#[inline]
fn valid_label_name_character(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::{
        decode_label_values, encode_label_values, family_key, sample_key, validate_label_name,
        validate_metric_name,
    };
    use proptest::prelude::*;

    #[test]
    fn family_key_is_deterministic() {
        assert_eq!(family_key("app", "requests_total"), family_key("app", "requests_total"));
        assert_eq!(family_key("test", "some_metric"), "test_some_metric");
        assert_ne!(family_key("app", "requests"), family_key("app", "responses"));
        assert_ne!(family_key("app", "requests"), family_key("web", "requests"));
    }

    #[test]
    fn sample_keys_differ_by_label_values() {
        let family = family_key("app", "requests_total");
        assert_eq!(sample_key(&family, &["a", "b"]), sample_key(&family, &["a", "b"]));
        assert_ne!(sample_key(&family, &["a", "b"]), sample_key(&family, &["a", "c"]));
        assert_ne!(sample_key(&family, &["a", "b"]), sample_key(&family, &["ab"]));
    }

    #[test]
    fn validate_metric_name_known_cases() {
        assert!(validate_metric_name("requests_total").is_ok());
        assert!(validate_metric_name("_hidden").is_ok());
        assert!(validate_metric_name("rpc:latency").is_ok());
        assert!(validate_metric_name("some metric").is_err());
        assert!(validate_metric_name("1requests").is_err());
        assert!(validate_metric_name("").is_err());
    }

    #[test]
    fn validate_label_name_known_cases() {
        assert!(validate_label_name("method").is_ok());
        assert!(validate_label_name("_private").is_ok());
        assert!(validate_label_name("invalid label").is_err());
        assert!(validate_label_name("1label").is_err());
        assert!(validate_label_name("with:colon").is_err());
        assert!(validate_label_name("le").is_err());
        assert!(validate_label_name("").is_err());
    }

    #[test]
    fn label_values_survive_awkward_content() {
        let values = ["with:colon", "with\nnewline", "with\"quote", ""];
        let refs: Vec<&str> = values.to_vec();
        let encoded = encode_label_values(&refs);
        assert!(!encoded.contains(':'));
        assert_eq!(decode_label_values(&encoded), Some(values.map(String::from).to_vec()));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(decode_label_values("!!not-base64!!"), None);
        // Valid base64 that is not a JSON string array.
        assert_eq!(decode_label_values("bm90IGpzb24="), None);
    }

    proptest! {
        #[test]
        fn encode_decode_round_trips(values in proptest::collection::vec(".*", 0..4)) {
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            let encoded = encode_label_values(&refs);
            prop_assert!(!encoded.contains(':'));
            prop_assert_eq!(decode_label_values(&encoded), Some(values));
        }
    }
}
