//! Loosely-typed configuration values and typed projections.
//!
//! Desired and observed state travel as [`Fields`], a string-keyed map of
//! [`Value`]s. Resource code projects them into typed requests through the
//! fallible accessors on [`Fields`], never through implicit casts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Kind of a [`Value`], used in mismatch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        };
        f.write_str(name)
    }
}

/// A field held a value of the wrong kind (or was missing).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}': expected {expected}, found {found}")]
pub struct TypeMismatch {
    pub field: String,
    pub expected: ValueKind,
    pub found: ValueKind,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
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

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats accept integer values as well.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Build a list of strings.
    pub fn string_list<I, S>(items: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Wrap a nested block the way blocks are represented: a one-element list of maps.
    pub fn block(fields: Fields) -> Value {
        Value::List(vec![Value::Map(fields.into_inner())])
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A string-keyed map of values: a resource's configuration or a nested block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Explicit nulls read as absent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    fn mismatch(name: &str, expected: ValueKind, found: &Value) -> TypeMismatch {
        TypeMismatch {
            field: name.to_string(),
            expected,
            found: found.kind(),
        }
    }

    pub fn string(&self, name: &str) -> Result<Option<&str>, TypeMismatch> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| Self::mismatch(name, ValueKind::String, v)),
        }
    }

    pub fn required_string(&self, name: &str) -> Result<&str, TypeMismatch> {
        self.string(name)?.ok_or_else(|| TypeMismatch {
            field: name.to_string(),
            expected: ValueKind::String,
            found: ValueKind::Null,
        })
    }

    /// A string field, treating the empty string as absent.
    pub fn non_empty_string(&self, name: &str) -> Result<Option<&str>, TypeMismatch> {
        Ok(self.string(name)?.filter(|s| !s.is_empty()))
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, TypeMismatch> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| Self::mismatch(name, ValueKind::Bool, v)),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, TypeMismatch> {
        Ok(self.bool(name)?.unwrap_or(default))
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>, TypeMismatch> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| Self::mismatch(name, ValueKind::Int, v)),
        }
    }

    pub fn required_int(&self, name: &str) -> Result<i64, TypeMismatch> {
        self.int(name)?.ok_or_else(|| TypeMismatch {
            field: name.to_string(),
            expected: ValueKind::Int,
            found: ValueKind::Null,
        })
    }

    pub fn float(&self, name: &str) -> Result<Option<f64>, TypeMismatch> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| Self::mismatch(name, ValueKind::Float, v)),
        }
    }

    /// A list of strings; absent reads as empty.
    pub fn string_list(&self, name: &str) -> Result<Vec<String>, TypeMismatch> {
        let Some(v) = self.get(name) else {
            return Ok(Vec::new());
        };
        let list = v
            .as_list()
            .ok_or_else(|| Self::mismatch(name, ValueKind::List, v))?;
        list.iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Self::mismatch(name, ValueKind::String, item))
            })
            .collect()
    }

    /// Every nested block under `name`. Accepts a list of maps or a single map.
    pub fn blocks(&self, name: &str) -> Result<Vec<Fields>, TypeMismatch> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(Value::Map(m)) => Ok(vec![Fields(m.clone())]),
            Some(Value::List(items)) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| match item {
                    Value::Map(m) => Ok(Fields(m.clone())),
                    other => Err(Self::mismatch(name, ValueKind::Map, other)),
                })
                .collect(),
            Some(other) => Err(Self::mismatch(name, ValueKind::List, other)),
        }
    }

    /// The first nested block under `name`, for single-item blocks.
    pub fn block(&self, name: &str) -> Result<Option<Fields>, TypeMismatch> {
        Ok(self.blocks(name)?.into_iter().next())
    }
}

impl From<BTreeMap<String, Value>> for Fields {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Fields(map)
    }
}

impl FromIterator<(String, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Fields(iter.into_iter().collect())
    }
}
