//! Key-value diffing for export/import verification.
//!
//! Two stores are walked together in key order (a merge join). Keys under an
//! ignored prefix hold derived or history-dependent data, such as time-ordered
//! queues whose values record insertion order, and are handled according to
//! a [`PrefixPolicy`] instead of being compared byte for byte.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::iter::Peekable;

use crate::kv::{Entry, KvRead};

/// How keys under an ignored prefix are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixPolicy {
    /// Ignored keys are not compared at all.
    #[default]
    Skip,
    /// Both stores must hold the same ignored keys; values may differ.
    KeysOnly,
}

/// An owned key/value pair reported by a diff.
#[derive(Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvPair {
    fn from_entry((key, value): Entry<'_>) -> Self {
        Self {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }
}

impl Debug for KvPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KvPair({self})")
    }
}

impl Display for KvPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.key {
            write!(f, "{b:02x}")?;
        }
        write!(f, " => ")?;
        for b in &self.value {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Result of comparing two stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvDiff {
    /// Compared keys present only in the first store.
    pub only_in_a: Vec<KvPair>,
    /// Compared keys present only in the second store.
    pub only_in_b: Vec<KvPair>,
    /// Keys present in both stores with different values, as `(a, b)`.
    pub mismatched: Vec<(KvPair, KvPair)>,
    /// Entries (from either side) that fell under an ignored prefix.
    pub ignored: usize,
}

impl KvDiff {
    pub fn is_empty(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.mismatched.is_empty()
    }

    /// Number of distinct keys that differ.
    pub fn len(&self) -> usize {
        self.only_in_a.len() + self.only_in_b.len() + self.mismatched.len()
    }

    /// Entries of the first store that have no equal counterpart in the second.
    pub fn unequal_a(&self) -> Vec<&KvPair> {
        self.mismatched
            .iter()
            .map(|(a, _)| a)
            .chain(&self.only_in_a)
            .collect()
    }

    /// Entries of the second store that have no equal counterpart in the first.
    pub fn unequal_b(&self) -> Vec<&KvPair> {
        self.mismatched
            .iter()
            .map(|(_, b)| b)
            .chain(&self.only_in_b)
            .collect()
    }

    /// Every differing entry, one per line: first-store entries as `A`,
    /// then second-store entries as `B`.
    pub fn log(&self) -> String {
        let a = self.unequal_a().into_iter().map(|pair| format!("A {pair}"));
        let b = self.unequal_b().into_iter().map(|pair| format!("B {pair}"));
        a.chain(b).collect::<Vec<_>>().join("\n")
    }
}

/// Compares two ordered stores, treating `ignored_prefixes` per `policy`.
///
/// Stores with identical non-ignored contents produce an empty diff
/// regardless of what lives under the ignored prefixes (with
/// [`PrefixPolicy::Skip`]).
pub fn diff_kv_stores(
    a: &dyn KvRead,
    b: &dyn KvRead,
    ignored_prefixes: &[Vec<u8>],
    policy: PrefixPolicy,
) -> KvDiff {
    let is_ignored = |key: &[u8]| ignored_prefixes.iter().any(|p| key.starts_with(p));
    let mut diff = KvDiff::default();
    let mut left: Peekable<_> = a.iter().peekable();
    let mut right: Peekable<_> = b.iter().peekable();

    loop {
        let order = match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((ka, _)), Some((kb, _))) => ka.cmp(kb),
        };

        match order {
            Ordering::Less => {
                if let Some(entry) = left.next() {
                    one_sided(
                        entry,
                        &mut diff.only_in_a,
                        &mut diff.ignored,
                        is_ignored(entry.0),
                        policy,
                    );
                }
            }
            Ordering::Greater => {
                if let Some(entry) = right.next() {
                    one_sided(
                        entry,
                        &mut diff.only_in_b,
                        &mut diff.ignored,
                        is_ignored(entry.0),
                        policy,
                    );
                }
            }
            Ordering::Equal => {
                if let (Some(ea), Some(eb)) = (left.next(), right.next()) {
                    if is_ignored(ea.0) {
                        diff.ignored += 2;
                    } else if ea.1 != eb.1 {
                        diff.mismatched
                            .push((KvPair::from_entry(ea), KvPair::from_entry(eb)));
                    }
                }
            }
        }
    }

    diff
}

fn one_sided(
    entry: Entry<'_>,
    out: &mut Vec<KvPair>,
    ignored: &mut usize,
    under_ignored_prefix: bool,
    policy: PrefixPolicy,
) {
    if under_ignored_prefix && policy == PrefixPolicy::Skip {
        *ignored += 1;
    } else {
        out.push(KvPair::from_entry(entry));
    }
}
