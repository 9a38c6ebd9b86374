//! Typed value encoding for store entries.
//!
//! Values are encoded with `postcard`: compact, and byte-for-byte stable for
//! equal inputs, which keeps commitment hashes comparable across runs.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::StoreError;
use crate::kv::KvStore;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(value).map_err(StoreError::Encode)
}

pub fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, StoreError> {
    postcard::from_bytes(bytes).map_err(|source| StoreError::Decode {
        key: hex_key(key),
        source,
    })
}

fn hex_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{b:02x}")).collect()
}

/// Typed helpers layered over any [`KvStore`].
pub trait KvStoreExt: KvStore {
    fn get_typed<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        self.get(key).map(|bytes| decode(key, bytes)).transpose()
    }

    fn set_typed<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> Result<(), StoreError> {
        let bytes = encode(value)?;
        self.set(key, bytes);
        Ok(())
    }

    /// Decodes every value under `prefix`, in key order.
    fn collect_prefix<T: DeserializeOwned>(
        &self,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, T)>, StoreError> {
        self.iter_prefix(prefix)
            .map(|(k, v)| decode(k, v).map(|value| (k.to_vec(), value)))
            .collect()
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemKv;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        tokens: u64,
        jailed: bool,
    }

    #[test]
    fn typed_values_survive_storage() {
        let mut kv = MemKv::new();
        let record = Record {
            tokens: 42,
            jailed: true,
        };
        kv.set_typed(b"r".to_vec(), &record).unwrap();
        assert_eq!(kv.get_typed::<Record>(b"r").unwrap(), Some(record));
        assert_eq!(kv.get_typed::<Record>(b"missing").unwrap(), None);
    }

    #[test]
    fn decode_failure_names_the_key() {
        let mut kv = MemKv::new();
        kv.set(vec![0xab, 0xcd], vec![0xff]);
        let err = kv.get_typed::<Record>(&[0xab, 0xcd]).unwrap_err();
        assert!(err.to_string().contains("abcd"));
    }
}
