//! Dynamic state payload.
//!
//! Registries often hold slices of unrelated shapes: a counter record, a list
//! of items, a set of selected ids. [`Value`] is a payload that can hold any
//! of them, so a single `Galena<Value>` can compose them all.
//!
//! # Snapshots
//!
//! Taking a snapshot dispatches on the variant:
//!
//! | Variant      | Copy                                  |
//! |--------------|---------------------------------------|
//! | `Sequence`   | element-wise                          |
//! | `Set`        | entry-wise                            |
//! | `Mapping`    | entry-wise                            |
//! | `Record`     | field-wise                            |
//! | `Shared`     | by reference (the cell is shared)     |
//! | `Opaque`     | by reference                          |
//! | scalars      | by value                              |
//!
//! Owned nested containers are plain Rust values and are copied with their
//! parent. A nested structure that must stay shared between the initial
//! value and later copies goes in a [`SharedValue`] cell.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::reactive::{Keyed, Snapshot};

/// Hashable key for sets and mappings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Key {
    /// Boolean key.
    Bool(bool),
    /// Integer key.
    Int(i64),
    /// String key.
    String(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::String(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::String(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Bool(value)
    }
}

/// A nested value shared by reference between copies.
#[derive(Clone, Default)]
pub struct SharedValue(Arc<RwLock<Value>>);

impl SharedValue {
    /// Wrap a value in a shared cell.
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Read the shared value.
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Value> {
        self.0.read()
    }

    /// Write the shared value.
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Value> {
        self.0.write()
    }

    /// Whether both cells are the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for SharedValue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.read() == *other.read()
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&*self.read()).finish()
    }
}

/// A value of any other type, carried by reference.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    /// Wrap an arbitrary value.
    pub fn new<V: Any + Send + Sync>(value: V) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the wrapped value if it has type `V`.
    pub fn downcast_ref<V: Any>(&self) -> Option<&V> {
        self.0.downcast_ref()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque(..)")
    }
}

/// A dynamically shaped state payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// String.
    String(String),
    /// Ordered sequence.
    Sequence(Vec<Value>),
    /// Insertion-ordered set.
    Set(IndexSet<Key>),
    /// Insertion-ordered map with arbitrary keys.
    Mapping(IndexMap<Key, Value>),
    /// Plain record with named fields.
    Record(IndexMap<String, Value>),
    /// Nested value shared between copies.
    Shared(SharedValue),
    /// Value of any other type, carried by reference.
    Opaque(Opaque),
}

impl Value {
    /// Build a record from `(field, value)` pairs.
    pub fn record<K, V, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a sequence.
    pub fn sequence<V, I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }

    /// Look up a record field or a string-keyed mapping entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.get(key),
            Value::Mapping(entries) => entries.get(&Key::from(key)),
            _ => None,
        }
    }

    /// Mutable variant of [`Value::get`].
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Record(fields) => fields.get_mut(key),
            Value::Mapping(entries) => entries.get_mut(&Key::from(key)),
            _ => None,
        }
    }

    /// Set a record field, returning the previous value.
    ///
    /// Does nothing and returns `None` if this is not a record.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        match self {
            Value::Record(fields) => fields.insert(key.into(), value.into()),
            _ => None,
        }
    }

    /// Append to a sequence. Returns `false` if this is not a sequence.
    pub fn push(&mut self, value: impl Into<Value>) -> bool {
        match self {
            Value::Sequence(items) => {
                items.push(value.into());
                true
            }
            _ => false,
        }
    }

    /// Number of elements, entries or fields; `0` for anything else.
    pub fn len(&self) -> usize {
        match self {
            Value::Sequence(items) => items.len(),
            Value::Set(keys) => keys.len(),
            Value::Mapping(entries) => entries.len(),
            Value::Record(fields) => fields.len(),
            Value::String(s) => s.len(),
            _ => 0,
        }
    }

    /// Whether [`Value::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer, if this is an `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The number as a float, if this is an `Int` or `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The boolean, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The string, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The elements, if this is a `Sequence`.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// The elements, mutably, if this is a `Sequence`.
    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Add `delta` to an `Int`. Returns the new value, or `None` if this is
    /// not an integer.
    pub fn increment(&mut self, delta: i64) -> Option<i64> {
        match self {
            Value::Int(i) => {
                *i += delta;
                Some(*i)
            }
            _ => None,
        }
    }
}

impl Snapshot for Value {
    fn snapshot(&self) -> Self {
        match self {
            Value::Sequence(items) => Value::Sequence(items.snapshot()),
            Value::Set(keys) => Value::Set(keys.snapshot()),
            Value::Mapping(entries) => Value::Mapping(entries.snapshot()),
            Value::Record(fields) => Value::Record(fields.snapshot()),
            Value::Shared(cell) => Value::Shared(cell.clone()),
            Value::Opaque(other) => Value::Opaque(other.clone()),
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(i) => Value::Int(*i),
            Value::Float(f) => Value::Float(*f),
            Value::String(s) => Value::String(s.clone()),
        }
    }
}

impl Keyed for Value {
    type Key = str;
    type Field = Value;

    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Opaque(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Set(keys) => {
                let mut seq = serializer.serialize_seq(Some(keys.len()))?;
                for key in keys {
                    seq.serialize_element(key)?;
                }
                seq.end()
            }
            Value::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(&key.to_string(), value)?;
                }
                map.end()
            }
            Value::Record(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Shared(cell) => cell.read().serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Sequence(value)
    }
}

impl From<SharedValue> for Value {
    fn from(value: SharedValue) -> Self {
        Value::Shared(value)
    }
}

impl From<Opaque> for Value {
    fn from(value: Opaque) -> Self {
        Value::Opaque(value)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
