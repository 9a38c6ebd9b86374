//! # ledgersim-store: ordered key-value state for simulated ledgers
//!
//! Application state lives in named, ordered key-value stores (one per
//! module) grouped in a [`MultiStore`]. The harness never interprets keys or
//! values; it only needs three capabilities from the state:
//!
//! - ordered iteration ([`KvRead::iter`]) for export/import diffing,
//! - a commitment hash ([`MultiStore::commit_hash`]) for determinism audits,
//! - cheap copy-on-write transactions ([`MultiStore::cache_wrap`]) so a
//!   rejected transaction leaves no side effects.
//!
//! ```text
//!   MultiStore
//!   ├── "bank"          MemKv  (BTreeMap<Vec<u8>, Vec<u8>>)
//!   ├── "distribution"  MemKv
//!   ├── "staking"       MemKv
//!   └── ...
//! ```

mod codec;
mod diff;
mod error;
mod kv;
mod multistore;

pub use codec::{KvStoreExt, decode, encode};
pub use diff::{KvDiff, KvPair, PrefixPolicy, diff_kv_stores};
pub use error::StoreError;
pub use kv::{KvRead, KvStore, MemKv};
pub use multistore::MultiStore;
