//! Admin HTTP API over the mirror.
//!
//! Config routes follow the datacenter node API layout:
//! `/v2/configs/datacenter[/{name}]`. `/health` is unauthenticated so
//! orchestrators can check readiness.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::lifecycle::ShutdownSignal;
use crate::mirror::ConfigMirror;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State injected into admin handlers.
#[derive(Clone)]
pub struct AppState {
    pub mirror: Arc<ConfigMirror>,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(mirror: Arc<ConfigMirror>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            mirror,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AppState) -> Router {
    let configs = Router::new()
        .route(
            "/v2/configs/datacenter",
            get(get_datacenter_config).put(put_datacenter_config),
        )
        .route(
            "/v2/configs/datacenter/{name}",
            get(get_config).put(put_config).delete(delete_config),
        )
        .route("/admin/status", get(get_status))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(get_health))
        .merge(configs)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve_admin(
    listener: TcpListener,
    state: AppState,
    mut shutdown: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
