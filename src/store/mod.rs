//! Replicated key/value store boundary.
//!
//! # Data Flow
//! ```text
//! ConfigMirror::start
//!     → StoreClient::get(prefix)            snapshot at revision R
//!     → StoreClient::watch(prefix, R + 1)   change feed, revision ordered per key
//!
//! ConfigMirror::put / delete
//!     → StoreClient::put / delete           returns the new store revision
//! ```
//!
//! # Design Decisions
//! - The trait is object safe (`Arc<dyn StoreClient>`) so the mirror does not
//!   care which store backs it
//! - Watches take an explicit start revision; a snapshot and the watch that
//!   follows it share the same revision anchor
//! - Timeouts belong to the implementation and surface as `StoreError`

pub mod memory;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryStore;

/// Monotonically increasing store version marker.
pub type Revision = i64;

/// Kind of change carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Modify,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Modify => "modify",
            EventKind::Delete => "delete",
        }
    }
}

/// A single notification from the store's change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub key: String,
    /// Raw payload; `None` for deletes.
    pub value: Option<String>,
    /// Store revision at which the change was committed.
    pub revision: Revision,
}

/// A key and its value as returned by a prefix read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    pub mod_revision: Revision,
}

/// Result of a prefix read: every matching entry as of `revision`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub revision: Revision,
    pub entries: Vec<KeyValue>,
}

/// Errors surfaced by a [`StoreClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Connectivity failure or timeout.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write.
    #[error("store rejected write to {key}: {reason}")]
    Rejected { key: String, reason: String },

    /// The requested watch revision is no longer retained.
    #[error("revision {requested} has been compacted (compacted through {compacted})")]
    Compacted {
        requested: Revision,
        compacted: Revision,
    },

    /// The change feed failed after it was established.
    #[error("watch failed: {0}")]
    Watch(String),
}

/// Stream of change events. Ends only on an unrecoverable error or disconnect.
pub type WatchStream = BoxStream<'static, Result<ChangeEvent, StoreError>>;

/// Client for a linearizable, revision-ordered key/value store.
#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Read every entry whose key starts with `prefix`.
    async fn get(&self, prefix: &str) -> Result<Snapshot, StoreError>;

    /// Write `value` under `key`, returning the revision of the write.
    async fn put(&self, key: &str, value: &str) -> Result<Revision, StoreError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<Revision, StoreError>;

    /// Watch every key under `prefix`, replaying changes from `start_revision`
    /// (inclusive). A start revision of `0` means "changes after now".
    async fn watch(
        &self,
        prefix: &str,
        start_revision: Revision,
    ) -> Result<WatchStream, StoreError>;
}
