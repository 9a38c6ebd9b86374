//! Error taxonomy for simulation runs.

use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

use crate::Divergence;

/// Errors produced by the harness.
///
/// Business-rule rejections inside operations are not errors; they are
/// recorded as skips. Everything here stops the run (or refuses to start it).
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),

    #[error("failed to load config: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed parameter file {path}: {source}")]
    MalformedParamsFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("parameter overrides must be a JSON object")]
    ParamsNotObject,

    #[error("malformed override for parameter {name}: {source}")]
    MalformedOverride {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to record parameter {name}: {source}")]
    ParamEncode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("operation registry has zero total weight")]
    ZeroTotalWeight,

    #[error("operation weights overflow u64")]
    WeightOverflow,

    #[error("invariant broken at height {height}: {module}/{route}: {message}")]
    InvariantViolation {
        module: String,
        route: String,
        height: u64,
        message: String,
    },

    #[error("operation {route} failed at height {height}: {reason}")]
    Operation {
        route: String,
        height: u64,
        reason: String,
    },

    #[error("genesis generation failed: {0}")]
    Genesis(String),

    #[error("application error during {context}: {source}")]
    Application {
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("snapshot encoding error: {0}")]
    SnapshotCodec(#[source] serde_json::Error),

    #[error("simulation stopped early; refusing to export or import its state")]
    StoppedEarly,

    #[error("store {0} is not exposed by the application")]
    MissingStore(String),

    /// `log` lists every divergent entry of every listed store.
    #[error("imported state differs in {}:\n{log}", .stores.join(", "))]
    StoreMismatch { stores: Vec<String>, log: String },

    #[error("non-deterministic commits: {}", join(.divergences, "; "))]
    NonDeterminism { divergences: Vec<Divergence> },
}

fn join<T: Display>(items: &[T], separator: &str) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

impl SimError {
    pub(crate) fn application<E>(context: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Application {
            context,
            source: Box::new(source),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for the error that marks a broken invariant.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}
