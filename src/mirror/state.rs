//! Synchronization readiness state.
//!
//! # State Transitions
//! ```text
//! Idle → Loading → Synced ⇄ Reconnecting → Stale
//!                     │                      │
//!                     └──────→ Stopped ←─────┘
//! ```
//!
//! `Stale` is terminal for the sync task: the mirror still serves reads, but
//! they are no longer being refreshed.

use serde::Serialize;

use crate::store::Revision;

/// What the mirror currently knows about its freshness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    /// Constructed, not started.
    Idle,
    /// Bulk load in progress.
    Loading,
    /// Caught up with the store as of `revision`.
    Synced { revision: Revision },
    /// The change feed dropped; retrying.
    Reconnecting { attempt: u32 },
    /// The change feed could not be re-established.
    Stale { reason: String },
    Stopped,
}

impl SyncState {
    /// Whether reads reflect a live change feed.
    pub fn is_ready(&self) -> bool {
        matches!(self, SyncState::Synced { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Loading => "loading",
            SyncState::Synced { .. } => "synced",
            SyncState::Reconnecting { .. } => "reconnecting",
            SyncState::Stale { .. } => "stale",
            SyncState::Stopped => "stopped",
        }
    }
}
