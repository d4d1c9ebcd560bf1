//! Background task following the store's change feed.
//!
//! The task watches from the revision after the last one applied, so a
//! reconnect resumes exactly where the previous stream stopped. If the store
//! has compacted that revision away, a fresh snapshot replaces the local view
//! and the watch is re-anchored on it.

use std::sync::Arc;

use futures_util::StreamExt;

use crate::lifecycle::ShutdownSignal;
use crate::mirror::datacenter::Shared;
use crate::mirror::state::SyncState;
use crate::observability::metrics;
use crate::store::{Revision, StoreError, WatchStream};

enum Exit {
    Cancelled,
    Disconnected(StoreError),
}

pub(crate) struct SyncTask {
    shared: Arc<Shared>,
    shutdown: ShutdownSignal,
    next_revision: Revision,
}

impl SyncTask {
    pub(crate) fn new(
        shared: Arc<Shared>,
        shutdown: ShutdownSignal,
        next_revision: Revision,
    ) -> Self {
        Self {
            shared,
            shutdown,
            next_revision,
        }
    }

    /// Follow the change feed until cancelled or reconnects are exhausted.
    ///
    /// `failures` counts consecutive attempts that could not re-open the
    /// feed; a successfully opened watch resets it.
    pub(crate) async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            let err = match self.follow(&mut failures).await {
                Exit::Cancelled => break,
                Exit::Disconnected(err) => err,
            };

            failures += 1;
            if !self.shared.reconnect.allows(failures) {
                tracing::error!(
                    error = %err,
                    last_revision = self.next_revision - 1,
                    "Datacenter config watch lost; mirror is stale"
                );
                self.shared.publish(SyncState::Stale {
                    reason: err.to_string(),
                });
                return;
            }

            let delay = self.shared.reconnect.delay_for(failures);
            tracing::warn!(
                error = %err,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Datacenter config watch lost, reconnecting"
            );
            metrics::record_reconnect();
            self.shared.publish(SyncState::Reconnecting { attempt: failures });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.recv() => break,
            }
        }

        self.shared.publish(SyncState::Stopped);
        tracing::info!("Datacenter config listener stopped");
    }

    async fn follow(&mut self, failures: &mut u32) -> Exit {
        if self.shutdown.is_triggered() {
            return Exit::Cancelled;
        }

        let mut stream = match self.open().await {
            Ok(stream) => stream,
            Err(e) => return Exit::Disconnected(e),
        };
        if *failures > 0 {
            tracing::info!(
                from_revision = self.next_revision,
                attempts = *failures,
                "Datacenter config watch re-established"
            );
            *failures = 0;
        }
        self.shared.publish(SyncState::Synced {
            revision: self.next_revision - 1,
        });

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => return Exit::Cancelled,
                item = stream.next() => match item {
                    Some(Ok(event)) => {
                        self.next_revision = event.revision + 1;
                        self.shared.apply_event(&event);
                        self.shared.publish(SyncState::Synced { revision: event.revision });
                    }
                    Some(Err(e)) => return Exit::Disconnected(e),
                    None => {
                        let closed = StoreError::Watch("watch stream closed".to_string());
                        return Exit::Disconnected(closed);
                    }
                },
            }
        }
    }

    async fn open(&mut self) -> Result<WatchStream, StoreError> {
        let prefix = self.shared.layout.prefix().to_string();
        match self.shared.store.watch(&prefix, self.next_revision).await {
            Err(StoreError::Compacted { requested, compacted }) => {
                tracing::warn!(
                    requested,
                    compacted,
                    "Watch revision compacted, reloading snapshot"
                );
                let revision = self.shared.load_snapshot().await?;
                self.next_revision = revision + 1;
                self.shared.store.watch(&prefix, self.next_revision).await
            }
            other => other,
        }
    }
}
