//! InputBundle: per-event inputs handed to stages.
//!
//! Values are a closed tagged union; typed reads go through `TryFrom` and
//! fail with `TypeMismatch` instead of a runtime cast error.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
pub enum InputValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<InputValue>),
}

impl InputValue {
    pub fn kind(&self) -> &'static str {
        match self {
            InputValue::Bool(_) => "bool",
            InputValue::Int(_) => "int",
            InputValue::Float(_) => "float",
            InputValue::Text(_) => "text",
            InputValue::Bytes(_) => "bytes",
            InputValue::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum BundleError {
    #[error("input '{0}' not found")]
    NotFound(String),

    #[error("input '{key}' holds {found}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Marker error for a failed `TryFrom<&InputValue>`; carries the expected kind.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct WrongKind(pub &'static str);

macro_rules! input_conversions {
    ($($variant:ident => $ty:ty, $kind:literal;)*) => {
        $(
            impl From<$ty> for InputValue {
                fn from(v: $ty) -> Self {
                    InputValue::$variant(v)
                }
            }

            impl TryFrom<&InputValue> for $ty {
                type Error = WrongKind;

                fn try_from(v: &InputValue) -> Result<Self, Self::Error> {
                    match v {
                        InputValue::$variant(inner) => Ok(inner.clone()),
                        _ => Err(WrongKind($kind)),
                    }
                }
            }
        )*
    };
}

input_conversions! {
    Bool => bool, "bool";
    Int => i64, "int";
    Float => f64, "float";
    Text => String, "text";
    Bytes => Vec<u8>, "bytes";
    List => Vec<InputValue>, "list";
}

impl From<&str> for InputValue {
    fn from(v: &str) -> Self {
        InputValue::Text(v.to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputBundle {
    data: HashMap<String, InputValue>,
}

impl InputBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<InputValue>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn get_raw(&self, key: &str) -> Result<&InputValue, BundleError> {
        self.data
            .get(key)
            .ok_or_else(|| BundleError::NotFound(key.to_string()))
    }

    /// Typed read of `key`.
    pub fn get<T>(&self, key: &str) -> Result<T, BundleError>
    where
        T: for<'a> TryFrom<&'a InputValue, Error = WrongKind>,
    {
        let raw = self.get_raw(key)?;
        T::try_from(raw).map_err(|WrongKind(expected)| BundleError::TypeMismatch {
            key: key.to_string(),
            expected,
            found: raw.kind(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<InputValue> {
        self.data.remove(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// One `key -> kind` line per entry, sorted by key.
    pub fn describe(&self) -> String {
        self.keys()
            .iter()
            .filter_map(|k| self.data.get(k).map(|v| format!("{k} -> {}\n", v.kind())))
            .collect()
    }
}

impl fmt::Display for InputBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
