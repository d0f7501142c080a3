//! Structured configuration payloads.
//!
//! A resolved configuration instance is a JSON-like value tree. Its canonical
//! serialization (compact JSON with lexicographically ordered object keys) is
//! what checksums are computed over and what travels on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Generic runtime value for one node of a configuration tree.
///
/// Supports all JSON types. Object keys use `BTreeMap` for deterministic
/// serialization order, which keeps the canonical byte form stable and
/// therefore content-addressable. Serializes untagged, so the wire form is
/// plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// JSON array (ordered sequence of values).
    Array(Vec<ConfigValue>),
    /// JSON object (map of string keys to values, ordered by key).
    Object(BTreeMap<String, ConfigValue>),
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ConfigValue::Null,
            serde_json::Value::Bool(b) => ConfigValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Int(i),
                None => ConfigValue::Float(n.as_f64().unwrap_or(f64::MAX)),
            },
            serde_json::Value::String(s) => ConfigValue::String(s),
            serde_json::Value::Array(items) => {
                ConfigValue::Array(items.into_iter().map(ConfigValue::from).collect())
            }
            serde_json::Value::Object(fields) => ConfigValue::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Default for ConfigValue {
    fn default() -> Self {
        ConfigValue::Object(BTreeMap::new())
    }
}

/// One resolved configuration instance, the unit served to clients.
///
/// Wraps the root value, which is an object for every real config. The empty
/// payload `{}` is a valid, distinct value: it is what a client receives when
/// the resolution guard declines to serve it. It is not the same thing as a
/// response with no payload section, which means "content unchanged".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigPayload {
    root: ConfigValue,
}

impl ConfigPayload {
    /// The empty payload `{}`.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a value tree.
    #[must_use]
    pub fn new(root: ConfigValue) -> Self {
        Self { root }
    }

    /// Parses a payload from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error for malformed input.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Parses a payload from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error for malformed input.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Canonical compact JSON bytes of this payload.
    ///
    /// Checksums are computed over exactly these bytes, and these bytes are
    /// what a response's payload section carries before compression.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.root).expect("value trees always serialize to JSON")
    }

    /// The root value.
    #[must_use]
    pub fn root(&self) -> &ConfigValue {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_an_empty_object() {
        assert_eq!(ConfigPayload::empty().canonical_bytes(), b"{}");
    }

    #[test]
    fn canonical_bytes_are_order_independent() {
        let a = ConfigPayload::from_json_str(r#"{"a":1,"b":2}"#).unwrap();
        let b = ConfigPayload::from_json_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
        assert_eq!(a, b);
    }

    #[test]
    fn construction_routes_agree() {
        let parsed = ConfigPayload::from_json_str(r#"{"myfield":"bar"}"#).unwrap();
        let built = ConfigPayload::new(ConfigValue::Object(
            [(
                "myfield".to_string(),
                ConfigValue::String("bar".to_string()),
            )]
            .into_iter()
            .collect(),
        ));
        assert_eq!(parsed, built);
        assert_eq!(parsed.canonical_bytes(), br#"{"myfield":"bar"}"#);
    }

    #[test]
    fn integers_and_floats_stay_distinct() {
        let payload = ConfigPayload::from_json_str(r#"{"i":3,"f":3.5}"#).unwrap();
        let ConfigValue::Object(fields) = payload.root() else {
            panic!("expected object root");
        };
        assert_eq!(fields["i"], ConfigValue::Int(3));
        assert_eq!(fields["f"], ConfigValue::Float(3.5));
    }

    #[test]
    fn nested_values_round_trip() {
        let text = r#"{"a":[1,true,null,"s"],"b":{"c":2.5}}"#;
        let payload = ConfigPayload::from_json_str(text).unwrap();
        assert_eq!(payload.canonical_bytes(), text.as_bytes());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ConfigPayload::from_json_str("{\"unterminated").is_err());
        assert!(ConfigPayload::from_slice(b"\xff\xfe").is_err());
    }

    #[test]
    fn converts_from_serde_json_value() {
        let value = serde_json::json!({"n": 7, "f": 1.5, "xs": [null, false]});
        let payload = ConfigPayload::new(ConfigValue::from(value));
        assert_eq!(
            payload.canonical_bytes(),
            br#"{"f":1.5,"n":7,"xs":[null,false]}"#
        );
    }
}
