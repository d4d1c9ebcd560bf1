//! Distributed configuration mirror.
//!
//! Keeps an in-process copy of the datacenter config synchronized with a
//! replicated, revision-ordered key/value store. Reads are served from memory;
//! writes go through to the store.

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod mirror;
pub mod observability;
pub mod resilience;
pub mod store;

pub use config::MirrorSettings;
pub use lifecycle::Shutdown;
pub use mirror::{ConfigMirror, ConfigUnit, GlobalConfig, MirrorError, MirrorOptions, SyncState};
pub use store::{MemoryStore, StoreClient};
