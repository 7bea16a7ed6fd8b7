//! Host-side tables.

use std::cmp::Ordering;
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use super::Value;

/// Ordered map from values to values, owned and deep-copied on clone.
///
/// A `Nil` key is representable here but never reaches the engine: pushing a
/// table skips it.
#[derive(Clone, Debug, Default)]
pub struct Table(BTreeMap<Value, Value>);

impl Table {
    pub fn new() -> Self {
        Table(BTreeMap::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &Value) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a pair, returning the previous value for `key`.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.0.remove(key)
    }

    /// Slot for `key`, created as `Nil` when absent.
    pub fn entry(&mut self, key: Value) -> &mut Value {
        self.0.entry(key).or_default()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Value, Value> {
        self.0.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, Value, Value> {
        self.0.keys()
    }

    pub fn values(&self) -> btree_map::Values<'_, Value, Value> {
        self.0.values()
    }
}

/// Size first, then pairs in key order.
impl Ord for Table {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.0.iter().cmp(other.0.iter()))
    }
}

impl PartialOrd for Table {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Table {}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for Table {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Table(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<Value>, V: Into<Value>> Extend<(K, V)> for Table {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for Table {
    type Item = (Value, Value);
    type IntoIter = btree_map::IntoIter<Value, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = (&'a Value, &'a Value);
    type IntoIter = btree_map::Iter<'a, Value, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{k}] = {v}")?;
        }
        write!(f, "}}")
    }
}
