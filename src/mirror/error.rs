//! Mirror error types.

use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by [`ConfigMirror`](crate::mirror::ConfigMirror) operations.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The config unit failed validation; no store call was made.
    #[error("invalid config unit: {0}")]
    Validation(String),

    /// A store read or write failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The unit could not be serialized.
    #[error("failed to encode config unit {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("mirror already started")]
    AlreadyStarted,

    #[error("mirror has been stopped")]
    Stopped,

    /// The background sync task panicked or was aborted.
    #[error("sync task failed: {0}")]
    Join(String),
}

/// Errors produced when a store payload cannot be turned into a config unit.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("config unit has no name")]
    MissingName,

    /// The payload names a different unit than the key it is stored under.
    #[error("config unit {name:?} stored under key for {key_name:?}")]
    NameMismatch { key_name: String, name: String },
}

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;
