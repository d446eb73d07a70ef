//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Feed Metrics
    pub static ref FEED_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedstore_feed_operations_total", "Total number of feed store operations"),
        &["operation", "outcome"]
    ).expect("metric can be created");
    pub static ref FEED_POSTS: IntGauge = IntGauge::new(
        "feedstore_feed_posts",
        "Current number of posts in the feed"
    ).expect("metric can be created");

    // Storage Metrics
    pub static ref SNAPSHOT_WRITES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedstore_snapshot_writes_total", "Total number of snapshot writes"),
        &["status"]
    ).expect("metric can be created");
    pub static ref SNAPSHOT_BYTES: IntGauge = IntGauge::new(
        "feedstore_snapshot_bytes",
        "Size of the last persisted snapshot in bytes"
    ).expect("metric can be created");
    pub static ref MIGRATED_POSTS_TOTAL: IntCounter = IntCounter::new(
        "feedstore_migrated_posts_total",
        "Total number of posts upgraded from legacy snapshots"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("feedstore_errors_total", "Total number of errors"),
        &["error_type", "operation"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(FEED_OPERATIONS_TOTAL.clone()))
        .expect("FEED_OPERATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(FEED_POSTS.clone()))
        .expect("FEED_POSTS can be registered");
    REGISTRY
        .register(Box::new(SNAPSHOT_WRITES_TOTAL.clone()))
        .expect("SNAPSHOT_WRITES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SNAPSHOT_BYTES.clone()))
        .expect("SNAPSHOT_BYTES can be registered");
    REGISTRY
        .register(Box::new(MIGRATED_POSTS_TOTAL.clone()))
        .expect("MIGRATED_POSTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> Result<String, crate::error::AppError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    encoder
        .encode_to_string(&metric_families)
        .map_err(|e| crate::error::AppError::Internal(e.into()))
}
