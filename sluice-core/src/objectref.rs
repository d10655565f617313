//! Object-store file references
//!
//! A reference addresses one object as bucket + key. User-supplied addresses
//! are accepted in two forms: an HTTPS URL whose path ends in
//! `/{bucket}/{key}`, or the scheme form `store://{bucket}/{key}`. The key
//! must be at least 10 characters, which guards against accidentally
//! truncated addresses.

use crate::params::interpolate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

static HTTP_ADDRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://.+?/([-\w]+)/(.{10,})$").expect("Invalid regex pattern"));

static SCHEME_ADDRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^store://([-\w]+)/(.{10,})$").expect("Invalid regex pattern"));

/// Errors produced while parsing object references
#[derive(Debug, Error)]
pub enum ObjectRefError {
    #[error("`{0}` is not a valid object-store address")]
    InvalidAddress(String),
}

/// A bucket + key pair naming one object in the external store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    /// Create a reference from already-split parts
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a user-supplied address in either accepted form
    pub fn parse(address: &str) -> Result<Self, ObjectRefError> {
        for pattern in [&*HTTP_ADDRESS_PATTERN, &*SCHEME_ADDRESS_PATTERN] {
            if let Some(captures) = pattern.captures(address) {
                return Ok(Self::new(&captures[1], &captures[2]));
            }
        }
        Err(ObjectRefError::InvalidAddress(address.to_string()))
    }

    /// Return a copy with the key interpolated against the given parameters
    /// (keys are path fragments, so array values are never quoted)
    pub fn with_interpolated_key(&self, params: &Map<String, Value>) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key: interpolate(&self.key, params, false),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store://{}/{}", self.bucket, self.key)
    }
}

impl std::str::FromStr for ObjectRef {
    type Err = ObjectRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_https_address() {
        let object_ref =
            ObjectRef::parse("https://cdn.example.com/mybucket/exports/2024/q1-data.csv").unwrap();
        assert_eq!(object_ref.bucket, "mybucket");
        assert_eq!(object_ref.key, "exports/2024/q1-data.csv");
    }

    #[test]
    fn test_parse_http_address() {
        let object_ref = ObjectRef::parse("http://files.internal/raw-data/loads/customers.csv").unwrap();
        assert_eq!(object_ref.bucket, "raw-data");
        assert_eq!(object_ref.key, "loads/customers.csv");
    }

    #[test]
    fn test_parse_scheme_address() {
        let object_ref = ObjectRef::parse("store://warehouse/imports/daily.tsv").unwrap();
        assert_eq!(object_ref.bucket, "warehouse");
        assert_eq!(object_ref.key, "imports/daily.tsv");
    }

    #[test]
    fn test_parse_rejects_short_key() {
        // Key under 10 characters reads as a truncated address
        assert!(ObjectRef::parse("store://warehouse/short.csv").is_err());
        assert!(ObjectRef::parse("https://cdn.example.com/bucket/tiny.c").is_err());
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(ObjectRef::parse("ftp://host/bucket/some-long-key.csv").is_err());
        assert!(ObjectRef::parse("not an address at all").is_err());
    }

    #[test]
    fn test_key_interpolation() {
        let object_ref = ObjectRef::new("warehouse", "exports/:table_name.csv");
        let params = json!({"table_name": "orders"});
        let resolved = object_ref.with_interpolated_key(params.as_object().unwrap());
        assert_eq!(resolved.key, "exports/orders.csv");
        assert_eq!(resolved.bucket, "warehouse");
    }

    #[test]
    fn test_display_round_trips() {
        let object_ref = ObjectRef::new("warehouse", "imports/daily.tsv");
        let parsed: ObjectRef = object_ref.to_string().parse().unwrap();
        assert_eq!(parsed, object_ref);
    }
}
