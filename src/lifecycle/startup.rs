//! Startup orchestration.
//!
//! # Responsibilities
//! - Bring up metrics, the store and the mirror in dependency order
//! - Start the admin API last, once the mirror holds a snapshot
//! - On termination, stop the admin API, then the mirror, and wait for both
//!
//! # Design Decisions
//! - Fail fast: a failed bulk load is fatal at startup
//! - The mirror stops after the admin API so no request sees a stopped mirror

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::admin::{serve_admin, AppState};
use crate::config::MirrorSettings;
use crate::lifecycle::Shutdown;
use crate::mirror::{ConfigMirror, MirrorOptions};
use crate::observability::metrics;
use crate::store::{MemoryStore, StoreClient};

/// Run the service against an embedded in-memory store until `terminate` resolves.
///
/// The store keeps at most `[store] history_limit` events for watch replay.
pub async fn run<F>(settings: MirrorSettings, terminate: F) -> Result<(), Box<dyn Error>>
where
    F: Future<Output = ()>,
{
    let store: Arc<dyn StoreClient> =
        Arc::new(MemoryStore::with_history_limit(settings.store.history_limit));
    run_with_store(settings, store, terminate).await
}

/// Run the service against `store` until `terminate` resolves.
pub async fn run_with_store<F>(
    settings: MirrorSettings,
    store: Arc<dyn StoreClient>,
    terminate: F,
) -> Result<(), Box<dyn Error>>
where
    F: Future<Output = ()>,
{
    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mirror = Arc::new(ConfigMirror::new(store, MirrorOptions::from_settings(&settings)));
    mirror.start().await?;

    let shutdown = Shutdown::new();
    let admin = if settings.admin.enabled {
        let listener = TcpListener::bind(&settings.admin.bind_address).await?;
        let state = AppState::new(mirror.clone(), settings.admin.api_key.clone());
        let signal = shutdown.subscribe();
        Some(tokio::spawn(serve_admin(listener, state, signal)))
    } else {
        tracing::info!("Admin API disabled");
        None
    };

    terminate.await;

    shutdown.trigger();
    if let Some(admin) = admin {
        match admin.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Admin API exited with error"),
            Err(e) => tracing::error!(error = %e, "Admin API task failed"),
        }
    }

    mirror.shutdown().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
