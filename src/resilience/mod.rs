//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Change feed lost:
//!     → backoff.rs (ReconnectPolicy: attempt budget, exponential delay + jitter)
//!     → re-watch from the last applied revision
//!     → budget exhausted: mirror reports Stale
//! ```
//!
//! # Design Decisions
//! - No retries on caller writes; failures surface immediately and roll back
//! - Reconnect attempts are bounded so a dead store is reported, not hidden

pub mod backoff;

pub use backoff::{calculate_backoff, ReconnectPolicy};
