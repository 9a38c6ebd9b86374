//! # ledgersim-types: Core types for `ledgersim`
//!
//! This crate contains value types shared by the simulation harness and the
//! reference ledger application:
//! - Account identity ([`Address`], module accounts via [`ModuleName`])
//! - Token amounts ([`Amount`])
//! - Block context ([`Height`], [`Timestamp`], [`BlockHeader`])
//! - State commitments ([`StateHash`], [`CommitId`])

use std::fmt::{Debug, Display};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Addresses
// ============================================================================

/// Length of an account address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Account address.
///
/// Rendered as lowercase hex in JSON and in `Display`, so exported genesis
/// files stay readable and diffable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Derives the address of a module account from the module name.
    ///
    /// Module accounts hold pooled funds (fee collector, bonded pool, ...) and
    /// are never selected as actors by random operations.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ledgersim_types::Address;
    /// assert_eq!(Address::module("gov"), Address::module("gov"));
    /// assert_ne!(Address::module("gov"), Address::module("bank"));
    /// ```
    pub fn module(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"module:");
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest.as_bytes()[..ADDRESS_LENGTH]);
        Self(bytes)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Address({:02x}{:02x}{:02x}{:02x}...)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Error returned when parsing a hex address fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(String);

impl Display for ParseAddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid address: {}", self.0)
    }
}

impl std::error::Error for ParseAddressError {}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ADDRESS_LENGTH * 2 {
            return Err(ParseAddressError(format!(
                "expected {} hex characters, got {}",
                ADDRESS_LENGTH * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; ADDRESS_LENGTH];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = s
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| ParseAddressError(s.to_string()))?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| ParseAddressError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
    fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; ADDRESS_LENGTH]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Name of a module that owns a module account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleName(&'static str);

impl ModuleName {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }

    /// Address of this module's account.
    pub fn address(self) -> Address {
        Address::module(self.0)
    }
}

impl Display for ModuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Token amount in the ledger's single denomination.
pub type Amount = u64;

// ============================================================================
// Block context
// ============================================================================

/// Block height.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Height(u64);

impl Height {
    pub fn new(height: u64) -> Self {
        Self(height)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Height {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Height {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Height> for u64 {
    fn from(height: Height) -> Self {
        height.0
    }
}

/// Block time in whole seconds since the Unix epoch.
///
/// Simulated chains never read the wall clock; time only advances through
/// block headers produced by the driver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn saturating_add_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Header of the block currently being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: Height,
    pub time: Timestamp,
}

impl BlockHeader {
    pub fn new(height: Height, time: Timestamp) -> Self {
        Self { height, time }
    }
}

// ============================================================================
// State commitments
// ============================================================================

/// Length of a state hash in bytes.
pub const HASH_LENGTH: usize = 32;

/// Cryptographic commitment over the full application state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StateHash([u8; HASH_LENGTH]);

impl StateHash {
    pub const ZERO: StateHash = StateHash([0u8; HASH_LENGTH]);

    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }
}

impl Debug for StateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "StateHash({:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}...)",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5], self.0[6], self.0[7]
        )
    }
}

impl Display for StateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; HASH_LENGTH]> for StateHash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

/// Identifier of a committed state: the version (block height) and the
/// commitment hash over every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct CommitId {
    pub version: u64,
    pub hash: StateHash,
}

impl CommitId {
    pub fn new(version: u64, hash: StateHash) -> Self {
        Self { version, hash }
    }
}

impl Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.hash, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn module_addresses_are_stable_and_distinct() {
        let fee = Address::module("fee_collector");
        assert_eq!(fee, Address::module("fee_collector"));
        assert_ne!(fee, Address::module("distribution"));
        assert_eq!(ModuleName::new("fee_collector").address(), fee);
    }

    #[test_case("" ; "empty")]
    #[test_case("abcd" ; "too short")]
    #[test_case("zz00000000000000000000000000000000000000" ; "not hex")]
    fn rejects_malformed_addresses(input: &str) {
        assert!(input.parse::<Address>().is_err());
    }

    #[test]
    fn address_json_is_hex_string() {
        let addr = Address::from_bytes([0xab; ADDRESS_LENGTH]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(ADDRESS_LENGTH)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn commit_id_display_includes_version() {
        let id = CommitId::new(7, StateHash::from_bytes([1u8; HASH_LENGTH]));
        assert!(id.to_string().ends_with("@7"));
        assert!(id.to_string().starts_with("0101"));
    }

    proptest! {
        #[test]
        fn display_parses_back(bytes in proptest::array::uniform20(any::<u8>())) {
            let addr = Address::from_bytes(bytes);
            prop_assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
        }
    }
}
