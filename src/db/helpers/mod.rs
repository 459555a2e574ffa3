use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::features::FeatureVector;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn encode_features(features: &FeatureVector) -> Result<String> {
    serde_json::to_string(features.values()).context("failed to serialize feature vector")
}

/// Lenient decode: anything that is not a number becomes `None`, and a column
/// that is not a JSON array at all decodes to an empty vector. Repairing the
/// entries is left to the sequence builder.
pub fn decode_features(raw: &str) -> Vec<Option<f32>> {
    match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(values) => values
            .iter()
            .map(|value| value.as_f64().map(|v| v as f32))
            .collect(),
        Err(err) => {
            log::warn!("stored feature column is not a JSON array: {err}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_keeps_numbers_and_drops_garbage() {
        let decoded = decode_features(r#"[1.5, null, "x", 4]"#);
        assert_eq!(decoded, vec![Some(1.5), None, None, Some(4.0)]);
        assert!(decode_features("not json").is_empty());
    }

    #[test]
    fn encoded_vector_decodes_to_same_values() {
        let (vector, _) = FeatureVector::sanitized([2.0; 13]);
        let encoded = encode_features(&vector).unwrap();
        assert_eq!(decode_features(&encoded), vec![Some(2.0); 13]);
    }
}
