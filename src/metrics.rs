//! Prometheus metrics for the bridge relayer
//!
//! Exposed on the /metrics endpoint for scraping.

#![allow(dead_code)]

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    // Block processing metrics
    pub static ref BLOCKS_PROCESSED: CounterVec = register_counter_vec!(
        "relayer_blocks_processed_total",
        "Total number of blocks processed",
        &["chain"]
    ).unwrap();

    pub static ref LATEST_BLOCK: GaugeVec = register_gauge_vec!(
        "relayer_latest_block",
        "Latest block number processed",
        &["chain"]
    ).unwrap();

    // Event / transfer metrics
    pub static ref EVENTS_DETECTED: CounterVec = register_counter_vec!(
        "relayer_events_detected_total",
        "Total number of bridge events detected",
        &["chain", "kind"]
    ).unwrap();

    pub static ref ROOTS_PUBLISHED: CounterVec = register_counter_vec!(
        "relayer_roots_published_total",
        "Total number of Merkle root commits attempted",
        &["chain", "status"]
    ).unwrap();

    pub static ref RELAYS_SUBMITTED: CounterVec = register_counter_vec!(
        "relayer_relays_submitted_total",
        "Total number of relay submissions",
        &["chain", "status"]
    ).unwrap();

    pub static ref TRANSFERS_EXPIRED: CounterVec = register_counter_vec!(
        "relayer_transfers_expired_total",
        "Pending transfers dropped by the cleanup sweep",
        &["chain"]
    ).unwrap();

    // Queue sizes
    pub static ref PENDING_TRANSFERS: GaugeVec = register_gauge_vec!(
        "relayer_pending_transfers",
        "Number of transfers awaiting relay",
        &["chain"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "relayer_errors_total",
        "Total number of errors",
        &["chain", "type"]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "relayer_up",
        "Whether the relayer is up and running"
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: GaugeVec = register_gauge_vec!(
        "relayer_last_successful_poll_timestamp",
        "Unix timestamp of last successful poll",
        &["chain"]
    ).unwrap();
}

/// Record a block range processed
pub fn record_block_processed(chain: &str, block_number: u64) {
    BLOCKS_PROCESSED.with_label_values(&[chain]).inc();
    LATEST_BLOCK
        .with_label_values(&[chain])
        .set(block_number as f64);
}

/// Record a bridge event detected
pub fn record_event_detected(chain: &str, kind: &str) {
    EVENTS_DETECTED.with_label_values(&[chain, kind]).inc();
}

/// Record a Merkle root commit attempt
pub fn record_root_published(chain: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    ROOTS_PUBLISHED.with_label_values(&[chain, status]).inc();
}

/// Record a relay submission
pub fn record_relay_submitted(chain: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    RELAYS_SUBMITTED.with_label_values(&[chain, status]).inc();
}

/// Record transfers dropped by cleanup
pub fn record_transfers_expired(chain: &str, count: usize) {
    TRANSFERS_EXPIRED
        .with_label_values(&[chain])
        .inc_by(count as f64);
}

/// Update pending transfer count
pub fn set_pending_transfers(chain: &str, count: usize) {
    PENDING_TRANSFERS
        .with_label_values(&[chain])
        .set(count as f64);
}

/// Record an error
pub fn record_error(chain: &str, error_type: &str) {
    ERRORS.with_label_values(&[chain, error_type]).inc();
}

/// Record last successful poll
pub fn record_successful_poll(chain: &str) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    LAST_SUCCESSFUL_POLL
        .with_label_values(&[chain])
        .set(timestamp);
}
