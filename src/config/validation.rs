//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays, attempt counts)
//! - Check addresses parse and the store path is usable as a key prefix
//! - Check seeded default names are valid unit names
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: MirrorSettings → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::MirrorSettings;
use crate::mirror::unit::validate_name;

/// A single semantic problem in the settings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

const LOG_FORMATS: &[&str] = &["pretty", "json"];

pub fn validate_settings(settings: &MirrorSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let path = &settings.store.storage_path;
    if !path.starts_with('/') {
        errors.push(ValidationError::new("store.storage_path", "must start with '/'"));
    }
    if path.trim_end_matches('/').is_empty() {
        errors.push(ValidationError::new("store.storage_path", "must not be the root"));
    }

    if settings.store.history_limit == 0 {
        errors.push(ValidationError::new("store.history_limit", "must be greater than 0"));
    }

    let sync = &settings.sync;
    if sync.reconnect_base_delay_ms == 0 {
        errors.push(ValidationError::new("sync.reconnect_base_delay_ms", "must be greater than 0"));
    }
    if sync.reconnect_max_delay_ms < sync.reconnect_base_delay_ms {
        errors.push(ValidationError::new(
            "sync.reconnect_max_delay_ms",
            "must not be less than reconnect_base_delay_ms",
        ));
    }

    let admin = &settings.admin;
    if admin.enabled {
        if admin.api_key.is_empty() || admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be set when the admin API is enabled",
            ));
        }
        if admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("invalid socket address {:?}", admin.bind_address),
            ));
        }
    }

    let observability = &settings.observability;
    if !LOG_FORMATS.contains(&observability.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("expected one of {LOG_FORMATS:?}"),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", observability.metrics_address),
        ));
    }

    for name in settings.defaults.keys() {
        if let Err(e) = validate_name(name) {
            errors.push(ValidationError::new(format!("defaults.{name}"), e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate_settings(&MirrorSettings::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut settings = MirrorSettings::default();
        settings.store.storage_path = "relative".to_string();
        settings.store.history_limit = 0;
        settings.sync.reconnect_base_delay_ms = 0;
        settings.admin.enabled = true;
        settings.observability.log_format = "xml".to_string();
        settings.defaults.insert("a/b".to_string(), serde_json::json!("x"));

        let errors = validate_settings(&settings).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "store.storage_path",
                "store.history_limit",
                "sync.reconnect_base_delay_ms",
                "admin.api_key",
                "observability.log_format",
                "defaults.a/b",
            ]
        );
    }

    #[test]
    fn test_admin_address_checked_only_when_enabled() {
        let mut settings = MirrorSettings::default();
        settings.admin.bind_address = "nowhere".to_string();
        assert!(validate_settings(&settings).is_ok());

        settings.admin.enabled = true;
        settings.admin.api_key = "secret".to_string();
        let errors = validate_settings(&settings).unwrap_err();
        assert_eq!(errors[0].field, "admin.bind_address");
    }
}
