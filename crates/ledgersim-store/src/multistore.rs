//! Named module stores and the state commitment over them.

use std::collections::BTreeMap;

use blake3::Hasher;
use ledgersim_types::StateHash;

use crate::StoreError;
use crate::kv::{KvRead, MemKv};

/// A set of named [`MemKv`] stores, one per application module.
///
/// Cloning is the cache-wrap: a transaction executes against a clone and the
/// clone is written back only if the transaction succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiStore {
    stores: BTreeMap<String, MemKv>,
}

impl MultiStore {
    /// Creates a multi-store with an empty store mounted for each name.
    pub fn with_stores<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            stores: names
                .into_iter()
                .map(|name| (name.to_string(), MemKv::new()))
                .collect(),
        }
    }

    pub fn store(&self, name: &str) -> Result<&MemKv, StoreError> {
        self.stores
            .get(name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    pub fn store_mut(&mut self, name: &str) -> Result<&mut MemKv, StoreError> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| StoreError::UnknownStore(name.to_string()))
    }

    /// Returns a copy to run a transaction against.
    pub fn cache_wrap(&self) -> Self {
        self.clone()
    }

    /// Replaces this state with a successfully executed cache.
    pub fn write(&mut self, cache: MultiStore) {
        *self = cache;
    }

    /// Computes the commitment hash of every store at `version`.
    ///
    /// Stores are hashed in name order and entries in key order, with every
    /// field length-prefixed so distinct layouts cannot collide:
    /// `version, store count, [name, entry count, [key, value]*]*`.
    pub fn commit_hash(&self, version: u64) -> StateHash {
        let mut hasher = Hasher::new();
        hasher.update(&version.to_le_bytes());
        hasher.update(&(self.stores.len() as u64).to_le_bytes());

        for (name, store) in &self.stores {
            hash_bytes(&mut hasher, name.as_bytes());
            hasher.update(&(store.len() as u64).to_le_bytes());
            for (key, value) in store.iter() {
                hash_bytes(&mut hasher, key);
                hash_bytes(&mut hasher, value);
            }
        }

        StateHash::from_bytes(*hasher.finalize().as_bytes())
    }
}

fn hash_bytes(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KvStore;

    fn sample() -> MultiStore {
        let mut ms = MultiStore::with_stores(["bank", "staking"]);
        ms.store_mut("bank")
            .unwrap()
            .set(b"a".to_vec(), b"1".to_vec());
        ms.store_mut("staking")
            .unwrap()
            .set(b"v".to_vec(), b"2".to_vec());
        ms
    }

    #[test]
    fn same_contents_same_hash() {
        assert_eq!(sample().commit_hash(3), sample().commit_hash(3));
    }

    #[test]
    fn hash_covers_version_and_contents() {
        let base = sample();
        assert_ne!(base.commit_hash(3), base.commit_hash(4));

        let mut changed = sample();
        changed
            .store_mut("bank")
            .unwrap()
            .set(b"a".to_vec(), b"9".to_vec());
        assert_ne!(base.commit_hash(3), changed.commit_hash(3));
    }

    #[test]
    fn moving_an_entry_between_stores_changes_hash() {
        let mut a = MultiStore::with_stores(["x", "y"]);
        a.store_mut("x").unwrap().set(b"k".to_vec(), b"v".to_vec());
        let mut b = MultiStore::with_stores(["x", "y"]);
        b.store_mut("y").unwrap().set(b"k".to_vec(), b"v".to_vec());
        assert_ne!(a.commit_hash(1), b.commit_hash(1));
    }

    #[test]
    fn discarded_cache_leaves_state_untouched() {
        let mut ms = sample();
        let before = ms.commit_hash(1);

        let mut cache = ms.cache_wrap();
        cache.store_mut("bank").unwrap().delete(b"a");
        drop(cache);
        assert_eq!(ms.commit_hash(1), before);

        let mut cache = ms.cache_wrap();
        cache.store_mut("bank").unwrap().delete(b"a");
        ms.write(cache);
        assert_ne!(ms.commit_hash(1), before);
    }

    #[test]
    fn unknown_store_is_an_error() {
        let ms = sample();
        assert!(matches!(ms.store("gov"), Err(StoreError::UnknownStore(_))));
    }
}
