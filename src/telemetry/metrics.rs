//! Metric instrument factories for courier-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"courier-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for courier-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("courier-rs")
}

/// Counter: work items submitted through the facade.
/// Labels: `channel`.
pub fn items_submitted() -> Counter<u64> {
    meter()
        .u64_counter("courier.items.submitted")
        .with_description("Number of work items submitted")
        .build()
}

/// Counter: stream-level operations (append, read, ack).
/// Labels: `stream`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("courier.queue.operations")
        .with_description("Number of stream operations")
        .build()
}

/// Counter: replies produced by workers, degraded path included.
/// Labels: `channel`, `escalated` ("true" | "false").
pub fn replies_produced() -> Counter<u64> {
    meter()
        .u64_counter("courier.replies.produced")
        .with_description("Number of replies produced by workers")
        .build()
}

/// Counter: pool size changes applied by scaling.
/// Labels: `direction` ("up" | "down").
pub fn pool_size_changes() -> Counter<u64> {
    meter()
        .u64_counter("courier.pool.size_changes")
        .with_description("Number of pool scaling operations applied")
        .build()
}

/// Histogram: per-item processing duration in milliseconds.
/// Labels: `channel`.
pub fn processing_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("courier.processing.duration_ms")
        .with_description("Worker processing duration in milliseconds")
        .with_unit("ms")
        .build()
}
