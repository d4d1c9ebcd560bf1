//! Settings schema.
//!
//! Every section has defaults, so an empty file is a valid configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::memory::DEFAULT_HISTORY_LIMIT;

/// Root settings for the mirror service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// Where the datacenter config lives in the store.
    pub store: StoreSettings,

    /// Change feed reconnect behavior.
    pub sync: SyncSettings,

    /// Admin HTTP API.
    pub admin: AdminSettings,

    /// Logging and metrics.
    pub observability: ObservabilitySettings,

    /// Units seeded into an empty store on first full read.
    pub defaults: BTreeMap<String, Value>,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            sync: SyncSettings::default(),
            admin: AdminSettings::default(),
            observability: ObservabilitySettings::default(),
            defaults: default_units(),
        }
    }
}

/// Store namespace settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Root path; units are stored under `{storage_path}/global/{name}`.
    pub storage_path: String,

    /// Change events the embedded store retains for watch replay.
    pub history_limit: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            storage_path: "/datacenter/config".to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Change feed reconnect settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Consecutive reconnect attempts before the mirror is declared stale.
    pub max_reconnect_attempts: u32,

    pub reconnect_base_delay_ms: u64,

    pub reconnect_max_delay_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 200,
            reconnect_max_delay_ms: 5_000,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminSettings {
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    pub bind_address: String,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            // Placeholder; validation refuses it when the API is enabled.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    pub metrics_enabled: bool,

    pub metrics_address: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

fn default_units() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("dns_servers".to_string(), Value::from(vec!["114.114.114.114"])),
        ("image_registry".to_string(), Value::from("registry.local")),
        ("log_level".to_string(), Value::from("info")),
        ("request_timeout".to_string(), Value::from("30")),
    ])
}
