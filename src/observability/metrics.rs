//! Metrics collection and exposition.
//!
//! Recording goes through the `metrics` facade; without an installed recorder
//! every call is a no-op, so library users and tests pay nothing.
//!
//! # Metrics
//! - `mirror_events_applied_total` (counter): change events applied, by kind
//! - `mirror_decode_errors_total` (counter): undecodable payloads, by source
//! - `mirror_store_writes_total` (counter): store writes, by op and outcome
//! - `mirror_rollbacks_total` (counter): local mutations undone after a failed write
//! - `mirror_watch_reconnects_total` (counter): change feed reconnect attempts
//! - `mirror_config_units` (gauge): units currently mirrored
//! - `mirror_ready` (gauge): 1 while the change feed is live

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const EVENTS_APPLIED: &str = "mirror_events_applied_total";
pub const DECODE_ERRORS: &str = "mirror_decode_errors_total";
pub const STORE_WRITES: &str = "mirror_store_writes_total";
pub const ROLLBACKS: &str = "mirror_rollbacks_total";
pub const WATCH_RECONNECTS: &str = "mirror_watch_reconnects_total";
pub const CONFIG_UNITS: &str = "mirror_config_units";
pub const READY: &str = "mirror_ready";

/// Install the Prometheus exporter and serve it on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            register_metrics();
            tracing::info!(address = %addr, "Prometheus exporter listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter");
        }
    }
}

/// Register metric descriptions with the installed recorder.
pub fn register_metrics() {
    describe_counter!(EVENTS_APPLIED, "Change events applied to the mirror");
    describe_counter!(DECODE_ERRORS, "Store payloads that failed to decode");
    describe_counter!(STORE_WRITES, "Writes issued to the store");
    describe_counter!(ROLLBACKS, "Local mutations rolled back after a failed store write");
    describe_counter!(WATCH_RECONNECTS, "Change feed reconnect attempts");
    describe_gauge!(CONFIG_UNITS, "Config units currently mirrored");
    describe_gauge!(READY, "1 while the mirror follows a live change feed");
}

pub fn record_event_applied(kind: &'static str) {
    counter!(EVENTS_APPLIED, "kind" => kind).increment(1);
}

pub fn record_decode_error(source: &'static str) {
    counter!(DECODE_ERRORS, "source" => source).increment(1);
}

pub fn record_store_write(op: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(STORE_WRITES, "op" => op, "outcome" => outcome).increment(1);
}

pub fn record_rollback(op: &'static str) {
    counter!(ROLLBACKS, "op" => op).increment(1);
}

pub fn record_reconnect() {
    counter!(WATCH_RECONNECTS).increment(1);
}

pub fn record_config_units(count: usize) {
    gauge!(CONFIG_UNITS).set(count as f64);
}

pub fn record_ready(ready: bool) {
    gauge!(READY).set(if ready { 1.0 } else { 0.0 });
}
