//! Named field access for payload types.
//!
//! Consumers that need to read a field of a checked-out payload by name go
//! through `FieldAccess`. Implementations are usually backed by a
//! `FieldRegistry`, a table of accessors built once per payload type.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A typed field value read from a payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    F64(f64),
    F32(f32),
    I64(i64),
    I32(i32),
    I16(i16),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value; `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FieldValue::F64(v) => Some(v),
            FieldValue::F32(v) => Some(f64::from(v)),
            FieldValue::I64(v) => Some(v as f64),
            FieldValue::I32(v) => Some(f64::from(v)),
            FieldValue::I16(v) => Some(f64::from(v)),
            FieldValue::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
            FieldValue::Text(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::F64(_) => "f64",
            FieldValue::F32(_) => "f32",
            FieldValue::I64(_) => "i64",
            FieldValue::I32(_) => "i32",
            FieldValue::I16(_) => "i16",
            FieldValue::Bool(_) => "bool",
            FieldValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::F64(v) => write!(f, "{v}"),
            FieldValue::F32(v) => write!(f, "{v}"),
            FieldValue::I64(v) => write!(f, "{v}"),
            FieldValue::I32(v) => write!(f, "{v}"),
            FieldValue::I16(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

/// Read access to a payload's fields by name.
pub trait FieldAccess {
    fn field(&self, name: &str) -> Option<FieldValue>;

    fn fields(&self) -> BTreeMap<&'static str, FieldValue>;
}

/// Per-type table of `name -> accessor`.
pub struct FieldRegistry<T> {
    accessors: Vec<(&'static str, fn(&T) -> FieldValue)>,
}

impl<T> FieldRegistry<T> {
    pub const fn new() -> Self {
        Self {
            accessors: Vec::new(),
        }
    }

    /// Register an accessor. A later registration under the same name
    /// replaces the earlier one.
    pub fn with_field(mut self, name: &'static str, accessor: fn(&T) -> FieldValue) -> Self {
        self.accessors.retain(|(n, _)| *n != name);
        self.accessors.push((name, accessor));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.accessors.iter().map(|(n, _)| *n)
    }

    pub fn get(&self, value: &T, name: &str) -> Option<FieldValue> {
        self.accessors
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, accessor)| accessor(value))
    }

    pub fn all(&self, value: &T) -> BTreeMap<&'static str, FieldValue> {
        self.accessors
            .iter()
            .map(|(n, accessor)| (*n, accessor(value)))
            .collect()
    }
}

impl<T> Default for FieldRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for FieldRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hit {
        energy: f32,
        channel: i16,
        label: String,
    }

    fn registry() -> FieldRegistry<Hit> {
        FieldRegistry::<Hit>::new()
            .with_field("energy", |h| FieldValue::F32(h.energy))
            .with_field("channel", |h| FieldValue::I16(h.channel))
            .with_field("label", |h| FieldValue::Text(h.label.clone()))
    }

    #[test]
    fn lookup_by_name() {
        let hit = Hit {
            energy: 1.5,
            channel: 7,
            label: "ge".into(),
        };
        let reg = registry();
        assert_eq!(reg.get(&hit, "channel"), Some(FieldValue::I16(7)));
        assert_eq!(reg.get(&hit, "energy").and_then(|v| v.as_f64()), Some(1.5));
        assert!(reg.get(&hit, "missing").is_none());
        assert_eq!(reg.get(&hit, "label").and_then(|v| v.as_f64()), None);
    }

    #[test]
    fn all_fields_and_override() {
        let hit = Hit {
            energy: 2.0,
            channel: 1,
            label: "x".into(),
        };
        let reg = registry().with_field("channel", |h| FieldValue::I64(i64::from(h.channel) * 10));
        let all = reg.all(&hit);
        assert_eq!(all.len(), 3);
        assert_eq!(all["channel"], FieldValue::I64(10));
        assert_eq!(all["channel"].type_name(), "i64");
        assert_eq!(all["label"].to_string(), "x");
    }
}
