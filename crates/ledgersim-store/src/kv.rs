//! Ordered key-value capability and its in-memory implementation.

use std::collections::BTreeMap;
use std::ops::Bound;

/// Borrowed key/value entry yielded by store iteration.
pub type Entry<'a> = (&'a [u8], &'a [u8]);

/// Read access to an ordered key-value store.
///
/// Iteration is always in ascending byte order of the keys. Everything that
/// depends on store contents (diffs, hashes, exports) relies on this order.
pub trait KvRead {
    fn get(&self, key: &[u8]) -> Option<&[u8]>;

    /// Iterates every entry in key order.
    fn iter(&self) -> Box<dyn Iterator<Item = Entry<'_>> + '_>;

    /// Iterates entries whose key starts with `prefix`, in key order.
    fn iter_prefix<'a>(&'a self, prefix: &'a [u8]) -> Box<dyn Iterator<Item = Entry<'a>> + 'a> {
        Box::new(self.iter().filter(move |(k, _)| k.starts_with(prefix)))
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write access to an ordered key-value store.
pub trait KvStore: KvRead {
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Removes `key`; returns whether it was present.
    fn delete(&mut self, key: &[u8]) -> bool;
}

/// In-memory ordered store backed by a `BTreeMap`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemKv {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the keys under `prefix` so callers can mutate while walking.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.iter_prefix(prefix).map(|(k, _)| k.to_vec()).collect()
    }
}

impl KvRead for MemKv {
    fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Entry<'_>> + '_> {
        Box::new(
            self.entries
                .iter()
                .map(|(k, v)| (k.as_slice(), v.as_slice())),
        )
    }

    fn iter_prefix<'a>(&'a self, prefix: &'a [u8]) -> Box<dyn Iterator<Item = Entry<'a>> + 'a> {
        let range = self
            .entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded));
        Box::new(
            range
                .take_while(move |(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.as_slice(), v.as_slice())),
        )
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl KvStore for MemKv {
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        self.entries.remove(key).is_some()
    }
}

impl FromIterator<(Vec<u8>, Vec<u8>)> for MemKv {
    fn from_iter<I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
