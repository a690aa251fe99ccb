//! ResultStore - named result slots with DashMap
//!
//! A slot is reserved when a task is queued and assigned when it completes.
//! Reservation happens in declaration order, so completion order never
//! changes where a result lands.

use std::ops::Index;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::binding::Expr;
use crate::error::{FluidError, Result};

static NULL: Value = Value::Null;

/// Stored value(s) for one result name
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEntry {
    /// Name queued exactly once
    Scalar(Value),
    /// Name queued more than once; slot i holds the i-th call's result
    Sequence(Vec<Value>),
}

impl ResultEntry {
    /// Number of reserved slots
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Sequence(values) => values.len(),
        }
    }

    /// Always false: an entry exists only once a slot is reserved
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value in slot `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Scalar(value) if index == 0 => Some(value),
            Self::Scalar(_) => None,
            Self::Sequence(values) => values.get(index),
        }
    }

    /// JSON shape exposed to callers: scalar value or array
    pub fn to_value(&self) -> Value {
        match self {
            Self::Scalar(value) => value.clone(),
            Self::Sequence(values) => Value::Array(values.clone()),
        }
    }
}

/// Thread-safe storage for named results (lock-free)
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct ResultStore {
    /// Result name → entry
    entries: Arc<DashMap<Arc<str>, ResultEntry>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next slot for `name`, returning its index
    ///
    /// - unused name → `Scalar(null)`, index 0
    /// - scalar → promoted to `Sequence([value, null])`, index 1
    /// - sequence → `null` appended, index = previous length
    pub fn reserve(&self, name: &str) -> usize {
        match self.entries.entry(Arc::from(name)) {
            Entry::Vacant(vacant) => {
                vacant.insert(ResultEntry::Scalar(Value::Null));
                0
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                match entry {
                    ResultEntry::Scalar(value) => {
                        let first = std::mem::take(value);
                        *entry = ResultEntry::Sequence(vec![first, Value::Null]);
                        1
                    }
                    ResultEntry::Sequence(values) => {
                        values.push(Value::Null);
                        values.len() - 1
                    }
                }
            }
        }
    }

    /// Write `value` into the reserved slot `index` of `name`
    pub fn assign(&self, name: &str, index: usize, value: Value) -> Result<()> {
        let out_of_range = |reserved: usize| FluidError::SlotOutOfRange {
            name: name.to_string(),
            index,
            reserved,
        };

        let Some(mut entry) = self.entries.get_mut(name) else {
            return Err(out_of_range(0));
        };

        match entry.value_mut() {
            ResultEntry::Scalar(slot) if index == 0 => {
                *slot = value;
                Ok(())
            }
            ResultEntry::Scalar(_) => Err(out_of_range(1)),
            ResultEntry::Sequence(values) => {
                let reserved = values.len();
                let slot = values.get_mut(index).ok_or_else(|| out_of_range(reserved))?;
                *slot = value;
                Ok(())
            }
        }
    }

    /// Get a copy of the entry for `name`
    pub fn get(&self, name: &str) -> Option<ResultEntry> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// Check if `name` has at least one reserved slot
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of distinct result names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current contents as an immutable snapshot
    pub fn snapshot(&self) -> Results {
        let map = self
            .entries
            .iter()
            .map(|e| (e.key().to_string(), e.value().to_value()))
            .collect();
        Results(map)
    }

    /// Resolve a dot-separated path against the current contents
    /// (e.g., "method.0" or "first.summary")
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        self.snapshot().resolve_path(path)
    }
}

/// Snapshot of a result store
///
/// Single calls appear as plain values, repeated calls as arrays in
/// declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Results(Map<String, Value>);

impl Results {
    /// Get the value stored under `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Result names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve a path whose first segment is a result name
    ///
    /// Uses the path syntax of deferred expressions; any other expression
    /// resolves to `None`.
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        match Expr::parse(path).ok()? {
            expr @ Expr::Path { .. } => expr.eval(self).ok(),
            _ => None,
        }
    }

    /// Whole snapshot as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl Index<&str> for Results {
    type Output = Value;

    /// Missing names index to `null`, like `serde_json::Value`
    fn index(&self, name: &str) -> &Value {
        self.0.get(name).unwrap_or(&NULL)
    }
}

impl From<Map<String, Value>> for Results {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
