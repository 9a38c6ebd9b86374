//! Parameter resolution: explicit overrides first, random generation second.
//!
//! Every tunable value of a run (operation weights, randomized genesis
//! parameters) is resolved by name through a [`ParamResolver`]. The resolved
//! values are recorded, exported as [`SimParams`], and can be fed back as an
//! override file to replay the same choices.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{SimError, SimRng};

/// Name under which a run's seed is recorded among its parameters.
pub const SEED_PARAM: &str = "seed";

// ============================================================================
// Overrides
// ============================================================================

/// Named parameter overrides, usually loaded from a JSON object file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppParams {
    overrides: BTreeMap<String, Value>,
}

impl AppParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let value: Value = serde_json::from_str(json).map_err(|source| {
            SimError::MalformedParamsFile {
                path: "<inline>".into(),
                source,
            }
        })?;
        Self::from_value(value)
    }

    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        let contents = std::fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        let value: Value =
            serde_json::from_str(&contents).map_err(|source| SimError::MalformedParamsFile {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, SimError> {
        match value {
            Value::Object(map) => Ok(Self {
                overrides: map.into_iter().collect(),
            }),
            _ => Err(SimError::ParamsNotObject),
        }
    }

    pub fn with_override(mut self, name: impl Into<String>, value: Value) -> Self {
        self.overrides.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.overrides.get(name)
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves named parameters and records every resolved value.
pub struct ParamResolver<'a> {
    overrides: &'a AppParams,
    resolved: BTreeMap<String, Value>,
}

impl<'a> ParamResolver<'a> {
    pub fn new(overrides: &'a AppParams) -> Self {
        Self {
            overrides,
            resolved: BTreeMap::new(),
        }
    }

    /// Returns the override for `name` if one exists, otherwise the value
    /// produced by `generate`.
    ///
    /// `generate` is only invoked (and only consumes randomness) when no
    /// override exists. An override that does not decode as `T` is an error,
    /// never silently replaced by a generated value.
    pub fn resolve<T, G>(
        &mut self,
        name: &str,
        rng: &mut SimRng,
        generate: G,
    ) -> Result<T, SimError>
    where
        T: Serialize + DeserializeOwned,
        G: FnOnce(&mut SimRng) -> T,
    {
        let value = match self.overrides.get(name) {
            Some(raw) => T::deserialize(raw).map_err(|source| SimError::MalformedOverride {
                name: name.to_string(),
                source,
            })?,
            None => generate(rng),
        };

        let recorded = serde_json::to_value(&value).map_err(|source| SimError::ParamEncode {
            name: name.to_string(),
            source,
        })?;
        self.resolved.insert(name.to_string(), recorded);
        Ok(value)
    }

    pub fn resolved(&self) -> &BTreeMap<String, Value> {
        &self.resolved
    }

    pub fn into_params(self) -> SimParams {
        SimParams {
            values: self.resolved,
        }
    }
}

/// The parameters a run actually used.
///
/// Serializes as a flat JSON object, the same shape [`AppParams`] reads, so
/// an exported file can be passed back as `params_file`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimParams {
    pub values: BTreeMap<String, Value>,
}

impl SimParams {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The seed the run used.
    pub fn seed(&self) -> Option<u64> {
        self.get(SEED_PARAM).and_then(Value::as_u64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn write_to(&self, path: &Path) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self).map_err(SimError::SnapshotCodec)?;
        std::fs::write(path, json).map_err(|e| SimError::io(path, e))
    }
}

// ============================================================================
// Simulated parameter changes
// ============================================================================

/// A parameter that governance proposals may change during a run.
///
/// `generate` renders a new value in the parameter's wire format.
pub struct ParamChange {
    subspace: String,
    key: String,
    generate: Box<dyn Fn(&mut SimRng) -> String + Send + Sync>,
}

impl ParamChange {
    pub fn new(
        subspace: impl Into<String>,
        key: impl Into<String>,
        generate: impl Fn(&mut SimRng) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            subspace: subspace.into(),
            key: key.into(),
            generate: Box::new(generate),
        }
    }

    pub fn subspace(&self) -> &str {
        &self.subspace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `subspace/key`
    pub fn composite_key(&self) -> String {
        format!("{}/{}", self.subspace, self.key)
    }

    pub fn simulate_value(&self, rng: &mut SimRng) -> String {
        (self.generate)(rng)
    }
}

impl std::fmt::Debug for ParamChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamChange")
            .field("subspace", &self.subspace)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn override_wins_and_skips_generator() {
        let overrides = AppParams::new().with_override("op_weight_send", json!(7));
        let mut resolver = ParamResolver::new(&overrides);
        let mut rng = SimRng::new(1);

        let weight: u64 = resolver
            .resolve("op_weight_send", &mut rng, |_| {
                panic!("generator must not run")
            })
            .unwrap();
        assert_eq!(weight, 7);
        assert_eq!(rng.step_count(), 0);
    }

    #[test]
    fn generator_used_without_override_and_recorded() {
        let overrides = AppParams::new();
        let mut resolver = ParamResolver::new(&overrides);
        let mut rng = SimRng::new(1);

        let value: u64 = resolver
            .resolve("max_validators", &mut rng, |r| r.next_u64_inclusive(1, 250))
            .unwrap();
        assert!((1..=250).contains(&value));
        assert_eq!(resolver.into_params().get("max_validators"), Some(&json!(value)));
    }

    #[test]
    fn malformed_override_is_fatal() {
        let overrides = AppParams::new().with_override("op_weight_send", json!("heavy"));
        let mut resolver = ParamResolver::new(&overrides);
        let mut rng = SimRng::new(1);

        let err = resolver
            .resolve::<u64, _>("op_weight_send", &mut rng, |_| 100)
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::MalformedOverride { ref name, .. } if name == "op_weight_send"
        ));
    }

    #[test]
    fn params_file_must_be_an_object() {
        assert!(matches!(
            AppParams::from_json_str("[1, 2]"),
            Err(SimError::ParamsNotObject)
        ));
        assert!(matches!(
            AppParams::from_json_str("{not json"),
            Err(SimError::MalformedParamsFile { .. })
        ));
    }

    #[test]
    fn exported_params_replay_as_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");

        let overrides = AppParams::new();
        let mut resolver = ParamResolver::new(&overrides);
        let mut rng = SimRng::new(5);
        let first: u64 = resolver
            .resolve("unbonding_time", &mut rng, |r| r.next_u64_range(60, 86_400))
            .unwrap();
        resolver.into_params().write_to(&path).unwrap();

        let replay = AppParams::from_file(&path).unwrap();
        let mut resolver = ParamResolver::new(&replay);
        let mut other_rng = SimRng::new(999);
        let second: u64 = resolver
            .resolve("unbonding_time", &mut other_rng, |r| {
                r.next_u64_range(60, 86_400)
            })
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn param_change_renders_composite_key() {
        let change = ParamChange::new("staking", "MaxValidators", |r| {
            format!("{}", r.next_u64_inclusive(1, 10))
        });
        assert_eq!(change.composite_key(), "staking/MaxValidators");
        let mut rng = SimRng::new(0);
        let rendered = change.simulate_value(&mut rng);
        assert!(rendered.parse::<u64>().is_ok());
    }
}
