//! Typed result values
//!
//! Everything a workflow captures is converted into a [`Value`], a closed
//! tagged union. Keeping the set of variants fixed is what lets the
//! comparator walk two values exhaustively and deterministically.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A captured result value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Finite floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered sequence of values
    Sequence(Vec<Value>),
    /// String-keyed mapping, always iterated in key order
    Mapping(BTreeMap<String, Value>),
    /// Fingerprint of a binary artifact
    Blob(BlobDescriptor),
}

impl Value {
    /// Numeric view of `Int` and `Float` values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Check that the value can be stored and reloaded exactly.
    ///
    /// JSON has no representation for NaN or infinities, so they are
    /// rejected wherever they appear.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(format!("non-finite float {}", f)),
            Value::Sequence(items) => items.iter().enumerate().try_for_each(|(i, item)| {
                item.validate().map_err(|e| format!("[{}]: {}", i, e))
            }),
            Value::Mapping(map) => map.iter().try_for_each(|(k, v)| {
                v.validate().map_err(|e| format!("{}: {}", k, e))
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Mapping(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Blob(blob) => write!(f, "{}", blob),
        }
    }
}

/// Content hash and size of a binary artifact
///
/// Raw bytes never live inside a [`Value`]; artifacts are compared by
/// fingerprint and stored content-addressed next to the result record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobDescriptor {
    /// Lowercase hex SHA-256 digest
    pub hash: String,
    /// Size in bytes
    pub size: u64,
}

impl BlobDescriptor {
    /// Describe an artifact whose hash was computed elsewhere
    pub fn new(hash: impl Into<String>, size: u64) -> Self {
        Self {
            hash: hash.into(),
            size,
        }
    }

    /// Hash `bytes` with SHA-256 and describe them
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            hash: sha256_hex(bytes),
            size: bytes.len() as u64,
        }
    }
}

impl fmt::Display for BlobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.hash.get(..12).unwrap_or(&self.hash);
        write!(f, "blob:sha256:{}…({} bytes)", short, self.size)
    }
}

/// Compute the lowercase hex SHA-256 digest of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Conversion of workflow data into a [`Value`]
///
/// Implemented for the primitive types, strings, collections of convertible
/// types and blob descriptors. Implement it for domain types to capture them
/// as structured mappings.
pub trait IntoValue {
    /// Convert into a [`Value`]
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

macro_rules! impl_into_value_int {
    ($($t:ty),*) => {
        $(
            impl IntoValue for $t {
                fn into_value(self) -> Value {
                    Value::Int(i64::from(self))
                }
            }
        )*
    };
}

impl_into_value_int!(i8, i16, i32, i64, u8, u16, u32);

// Values beyond i64::MAX degrade to floats rather than wrapping.
macro_rules! impl_into_value_wide {
    ($($t:ty),*) => {
        $(
            impl IntoValue for $t {
                fn into_value(self) -> Value {
                    match i64::try_from(self) {
                        Ok(i) => Value::Int(i),
                        Err(_) => Value::Float(self as f64),
                    }
                }
            }
        )*
    };
}

impl_into_value_wide!(u64, usize, isize);

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::Float(f64::from(self))
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoValue for &String {
    fn into_value(self) -> Value {
        Value::String(self.clone())
    }
}

impl IntoValue for BlobDescriptor {
    fn into_value(self) -> Value {
        Value::Blob(self)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::Sequence(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: IntoValue + Clone> IntoValue for &[T] {
    fn into_value(self) -> Value {
        Value::Sequence(self.iter().cloned().map(IntoValue::into_value).collect())
    }
}

impl<T: IntoValue> IntoValue for BTreeMap<String, T> {
    fn into_value(self) -> Value {
        Value::Mapping(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }
}

impl<T: IntoValue> IntoValue for HashMap<String, T> {
    fn into_value(self) -> Value {
        Value::Mapping(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }
}
