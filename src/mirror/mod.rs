//! Datacenter config mirror.
//!
//! # Data Flow
//! ```text
//! start():
//!     StoreClient::get(prefix)            → snapshot at revision R
//!     → GlobalConfig (upsert + prune)
//!     → spawn sync.rs task
//!
//! sync task:
//!     StoreClient::watch(prefix, R + 1)
//!     → create/modify: decode → upsert
//!     → delete: key_to_name → remove
//!     → stream lost: backoff → re-watch from last revision + 1
//!
//! put()/delete():
//!     validate → mutate GlobalConfig → StoreClient::put/delete
//!     → on failure: roll back the local mutation
//! ```
//!
//! # Design Decisions
//! - The mapping is never exposed; callers get clones
//! - Snapshot and watch share one revision anchor, so nothing committed in
//!   between is lost
//! - Undecodable payloads are skipped, never fatal to the sync task
//! - A persistently lost change feed is reported through [`SyncState::Stale`]

pub mod datacenter;
pub mod error;
pub mod global;
pub mod keys;
pub mod state;
mod sync;
pub mod unit;

pub use datacenter::{ConfigMirror, DefaultsFn, MirrorOptions};
pub use error::{DecodeError, MirrorError, MirrorResult};
pub use global::{GlobalConfig, WriteStamp};
pub use keys::{last_segment, KeyLayout, KeyMapper};
pub use state::SyncState;
pub use unit::ConfigUnit;
