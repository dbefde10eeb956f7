use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Type alias for a HashMap representing key-value pairs of user attributes.
///
/// # Examples
/// ```
/// # use flagship_core::{Attributes, Value};
/// let attributes = [
///     ("age".to_owned(), 30.into()),
///     ("is_premium_member".to_owned(), true.into()),
///     ("username".to_owned(), "john_doe".into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, Value>;

/// Largest numeric magnitude accepted for attribute values (2^53). Values
/// beyond it lose integer precision in an f64 and are rejected by matchers.
pub const MAX_NUMERIC_VALUE: f64 = 9_007_199_254_740_992.0;

/// A dynamically-typed value: user attributes, condition values, and variable
/// values all pass through this single sum type so that coercion rules live in
/// one place.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `i64`,
/// `f64`, and `bool`.
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum Value {
    /// A null value or absence of value.
    Null,
    /// A boolean value.
    Bool(bool),
    /// An integer value.
    Int(i64),
    /// A floating-point value.
    Float(f64),
    /// A string value.
    String(String),
}

impl Value {
    /// Numeric coercion: succeeds for both numeric kinds, fails for
    /// everything else. Booleans and numeric-looking strings do not convert.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Strict boolean accessor.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Strict integer accessor.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Strict string accessor.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Whether this value is usable for audience targeting: booleans,
    /// strings, and finite numerics of bounded magnitude. Null, NaN,
    /// infinities, and out-of-range numbers are not.
    pub fn is_valid_attribute(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(_) | Value::String(_) => true,
            Value::Int(i) => (i.unsigned_abs() as f64) <= MAX_NUMERIC_VALUE,
            Value::Float(f) => f.is_finite() && f.abs() <= MAX_NUMERIC_VALUE,
        }
    }

    /// Convert from arbitrary JSON. Composite values (arrays, objects) have
    /// no representation here and return `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Value::from(f),
            Value::String(s) => serde_json::Value::String(s),
        }
    }
}
