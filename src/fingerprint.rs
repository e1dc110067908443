//! Structural fingerprints for schema deduplication
//!
//! A fingerprint is the SHA-256 of a node's canonical JSON: descriptions and
//! examples stripped, object keys sorted at every depth, `required` sorted.
//! Two nodes that differ only in property order or documentation therefore
//! share a fingerprint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::schema::SchemaNode;

/// SHA-256 fingerprint of a schema's canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a schema node
    pub fn of(schema: &SchemaNode) -> Self {
        Self::from_json(&schema.to_openapi(false))
    }

    /// Compute the fingerprint of a raw JSON schema value.
    ///
    /// Only equal to [`Fingerprint::of`] for values already in canonical
    /// node form; parse first when the value comes from a document.
    pub fn from_json(value: &Value) -> Self {
        let canonical = canonical_json(value);
        let hash = Sha256::digest(canonical.as_bytes());
        Self(format!("{:x}", hash))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Compute the fingerprint of a schema node
pub fn compute_fingerprint(schema: &SchemaNode) -> Fingerprint {
    Fingerprint::of(schema)
}

/// Serialize a JSON value with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
