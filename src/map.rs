//! Insertion-ordered map used for querystring objects.

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::Value;

/// An insertion-ordered `String -> Value` map.
///
/// Order matters for querystrings: encoding walks keys in insertion order,
/// and decoding preserves the order in which keys first appeared.
///
/// A map can also be an *overflow* map. Those are lists that outgrew the
/// configured `list_limit` and were converted to index-keyed maps; later
/// values for the same key are appended after the highest index rather
/// than merged by key. The marker does not take part in equality.
#[derive(Clone, Default)]
pub struct Map {
    entries: IndexMap<String, Value>,
    overflow: Option<usize>,
}

impl Map {
    #[must_use]
    pub fn new() -> Self {
        Map::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Map {
            entries: IndexMap::with_capacity(capacity),
            overflow: None,
        }
    }

    /// Inserts a key-value pair, returning the previous value for `key`.
    ///
    /// An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    /// Removes `key`, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, Value> {
        self.entries.keys()
    }

    pub fn values(&self) -> indexmap::map::Values<'_, String, Value> {
        self.entries.values()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> indexmap::map::IterMut<'_, String, Value> {
        self.entries.iter_mut()
    }

    pub(crate) fn entry(&mut self, key: String) -> indexmap::map::Entry<'_, String, Value> {
        self.entries.entry(key)
    }

    /// Removes `key` without keeping the order of the remaining entries.
    pub(crate) fn take(&mut self, key: &str) -> Option<Value> {
        self.entries.swap_remove(key)
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&String, &mut Value) -> bool) {
        self.entries.retain(keep)
    }

    /// The highest index of an overflow map, `None` for ordinary maps.
    pub(crate) fn overflow_max(&self) -> Option<usize> {
        self.overflow
    }

    pub(crate) fn is_overflow(&self) -> bool {
        self.overflow.is_some()
    }

    pub(crate) fn set_overflow_max(&mut self, max: usize) {
        self.overflow = Some(max);
    }

    /// Builds an overflow map holding `items` under the keys `"0".."n-1"`.
    pub(crate) fn overflow_from(items: Vec<Value>) -> Self {
        let mut map = Map::with_capacity(items.len());
        let len = items.len();
        for (i, item) in items.into_iter().enumerate() {
            map.entries.insert(i.to_string(), item);
        }
        map.overflow = len.checked_sub(1);
        map
    }

    /// Appends `item` after the highest index of an overflow map.
    pub(crate) fn push_overflow(&mut self, item: Value) {
        let next = self.overflow.map_or(0, |max| max + 1);
        self.entries.insert(next.to_string(), item);
        self.overflow = Some(next);
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Map {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            overflow: None,
        }
    }
}

impl IntoIterator for Map {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Map {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for Map {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
