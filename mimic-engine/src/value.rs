//! Closed value union for trait payloads.
//!
//! Every trait read and write in the engine goes through [`Value`]; raw JSON
//! only appears at the document boundary. A [`ValueKind`] is attached to each
//! trait definition so plan outputs and catalog options can be type-checked.
use std::collections::BTreeMap;
use std::fmt;

use mimic_common::MimicError;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Json", into = "Json")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    StringArray(Vec<String>),
    Object(BTreeMap<String, Value>),
}

/// Variant tag of a [`Value`], used as the per-trait type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Double,
    String,
    StringArray,
    Object,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::StringArray(_) => ValueKind::StringArray,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            Value::StringArray(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Stable textual form: compact JSON with object keys sorted.
    pub fn canonical(&self) -> String {
        Json::from(self.clone()).to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl ValueKind {
    /// `Null` is accepted everywhere as "unset"; `Int` is accepted where `Double` is expected.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value.kind()) {
            (_, ValueKind::Null) => true,
            (ValueKind::Double, ValueKind::Int) => true,
            (expected, actual) => expected == actual,
        }
    }

    /// Convert `value` into this kind where a lossless or rounding conversion exists.
    pub fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (ValueKind::Double, Value::Int(n)) => Some(Value::Double(n as f64)),
            (ValueKind::Int, Value::Double(d)) if d.is_finite() => {
                Some(Value::Int(d.round() as i64))
            }
            (kind, value) if kind.accepts(&value) => Some(value),
            _ => None,
        }
    }
}

impl TryFrom<Json> for Value {
    type Error = MimicError;

    fn try_from(json: Json) -> Result<Self, Self::Error> {
        Ok(match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n
                    .as_f64()
                    .map(Value::Double)
                    .ok_or_else(|| MimicError::Value(format!("unrepresentable number {n}")))?,
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::StringArray(
                items
                    .into_iter()
                    .map(|item| match item {
                        Json::String(s) => Ok(s),
                        other => Err(MimicError::Value(format!(
                            "arrays may only contain strings, found {other}"
                        ))),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Json::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k, Value::try_from(v)?)))
                    .collect::<Result<_, MimicError>>()?,
            ),
        })
    }
}

impl From<Value> for Json {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(b),
            Value::Int(n) => Json::from(n),
            Value::Double(d) => serde_json::Number::from_f64(d)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s),
            Value::StringArray(items) => Json::Array(items.into_iter().map(Json::String).collect()),
            Value::Object(map) => Json::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::StringArray(items)
    }
}
