//! Datacenter config mirror service.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                       CONFIG MIRROR                           │
//!   │                                                               │
//!   │  admin API ──▶ ConfigMirror ──get/put/delete──▶ StoreClient   │
//!   │  (axum)         │      ▲                          │           │
//!   │                 │      │ apply events             │ watch     │
//!   │                 ▼      │                          ▼           │
//!   │            GlobalConfig ◀──── sync task ◀──── change feed     │
//!   │                                                               │
//!   │  cross-cutting: config · observability · resilience ·        │
//!   │                 lifecycle                                     │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The binary hosts the mirror against an embedded in-memory store; library
//! users plug in their own `StoreClient`.

use std::path::PathBuf;

use clap::Parser;

use config_mirror::config::{load_settings, MirrorSettings};
use config_mirror::lifecycle::{signals, startup};
use config_mirror::observability::logging;

#[derive(Parser)]
#[command(name = "config-mirror")]
#[command(about = "Mirror of the datacenter config held in a replicated store", long_about = None)]
struct Cli {
    /// Settings file (TOML). Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => load_settings(path)?,
        None => MirrorSettings::default(),
    };

    logging::init_logging(&settings.observability)?;
    tracing::info!("config-mirror v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        storage_path = %settings.store.storage_path,
        admin_enabled = settings.admin.enabled,
        max_reconnect_attempts = settings.sync.max_reconnect_attempts,
        "Configuration loaded"
    );

    startup::run(settings, signals::wait_for_termination()).await
}
