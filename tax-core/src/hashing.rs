//! Content hashing for calculation inputs.
//!
//! ```text
//! SHA-256(version.to_be_bytes() || 0x00 || canonical_json_bytes)
//! ```
//!
//! Canonical JSON sorts object keys recursively and writes integral floats
//! as integers, so `85000` and `85000.0` hash the same. Strings are hashed
//! byte for byte: decimal amounts are normalized on the typed return before
//! it is serialized, never by guessing at string contents. The version is
//! bumped whenever canonicalization or the hashed input shape changes.
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use tax_core::hashing::hash_value;
//!
//! let a = hash_value(&json!({"a": 1, "b": 2}));
//! let b = hash_value(&json!({"b": 2, "a": 1}));
//!
//! assert_eq!(a, b);
//! assert_eq!(a.as_str().len(), 64);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::error::CalcError;
use crate::models::{FederalTaxParameters, StateTaxConfig, TaxReturn};

/// Version of the canonical form and hashed input layout.
pub const HASH_VERSION: u32 = 2;

/// Hex-encoded SHA-256 digest of a canonical input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InputHash(String);

impl InputHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts exactly 64 hex digits, normalized to lower case.
    pub fn parse(hex_digest: &str) -> Result<Self, CalcError> {
        if hex_digest.len() != 64 || !hex_digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CalcError::validation(
                "input_hash",
                "expected 64 hexadecimal characters",
            ));
        }
        Ok(Self(hex_digest.to_ascii_lowercase()))
    }
}

impl fmt::Display for InputHash {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InputHash {
    type Error = CalcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InputHash> for String {
    fn from(hash: InputHash) -> Self {
        hash.0
    }
}

/// Largest float magnitude below which every integral value is exact.
const EXACT_FLOAT_LIMIT: f64 = 9_007_199_254_740_992.0;

fn canonical_number(number: &Number) -> Number {
    match number.as_f64() {
        Some(float)
            if number.is_f64() && float.fract() == 0.0 && float.abs() < EXACT_FLOAT_LIMIT =>
        {
            Number::from(float as i64)
        }
        _ => number.clone(),
    }
}

/// Rewrites a JSON value into its canonical form.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, item) in entries {
                sorted.insert(key.clone(), canonicalize(item));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(number) => Value::Number(canonical_number(number)),
        Value::Null | Value::Bool(_) | Value::String(_) => value.clone(),
    }
}

pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    // Serializing a Value cannot fail: every key is already a string.
    serde_json::to_vec(&canonicalize(value)).unwrap_or_default()
}

/// SHA-256 over the version, a discriminator byte and the canonical bytes.
pub fn hash_canonical_bytes(
    version: u32,
    bytes: &[u8],
) -> InputHash {
    let mut hasher = Sha256::new();
    hasher.update(version.to_be_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    InputHash(hex::encode(hasher.finalize()))
}

pub fn hash_value(value: &Value) -> InputHash {
    hash_canonical_bytes(HASH_VERSION, &canonical_bytes(value))
}

fn to_value<T: Serialize>(
    what: &str,
    value: &T,
) -> Result<Value, CalcError> {
    serde_json::to_value(value)
        .map_err(|e| CalcError::Configuration(format!("cannot serialize {what}: {e}")))
}

/// Hash of a parameter table, used to tie results to the configuration
/// in force.
pub fn fingerprint<T: Serialize>(
    what: &str,
    value: &T,
) -> Result<InputHash, CalcError> {
    Ok(hash_value(&to_value(what, value)?))
}

/// Everything that determines a calculation result.
///
/// The return id is left out: it names the owner, not the input. A
/// scenario's parent snapshot is kept in.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationInput {
    /// Canonical input document, also stored as the snapshot's input data.
    pub document: Value,
    pub hash: InputHash,
}

impl CalculationInput {
    pub fn new(
        tax_return: &TaxReturn,
        federal: &FederalTaxParameters,
        state: Option<&StateTaxConfig>,
    ) -> Result<Self, CalcError> {
        let mut return_value = to_value("tax return", &tax_return.with_normalized_amounts())?;
        if let Value::Object(map) = &mut return_value {
            map.remove("return_id");
        }

        let mut document = Map::new();
        document.insert("tax_return".to_string(), return_value);
        document.insert(
            "federal_parameters".to_string(),
            Value::String(fingerprint("federal parameters", federal)?.0),
        );
        document.insert(
            "state".to_string(),
            match state {
                Some(config) => serde_json::json!({
                    "code": config.state_code.as_str(),
                    "config": fingerprint("state configuration", config)?.0,
                }),
                None => Value::Null,
            },
        );

        let document = canonicalize(&Value::Object(document));
        let hash = hash_canonical_bytes(HASH_VERSION, &canonical_bytes(&document));
        Ok(Self { document, hash })
    }

    /// Adds the parent snapshot of a what-if scenario to the input.
    pub fn with_parent(
        mut self,
        parent_snapshot_id: i64,
    ) -> Self {
        if let Value::Object(map) = &mut self.document {
            map.insert("parent_snapshot_id".to_string(), Value::from(parent_snapshot_id));
        }
        self.hash = hash_canonical_bytes(HASH_VERSION, &canonical_bytes(&self.document));
        self
    }
}
