//! Error types for store operations.

use thiserror::Error;

/// Errors that can occur while reading or writing typed store values.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to encode value: {0}")]
    Encode(#[source] postcard::Error),

    #[error("failed to decode value at key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: postcard::Error,
    },

    #[error("store not mounted: {0}")]
    UnknownStore(String),
}
