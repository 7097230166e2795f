//! Metric instrument factories for flightmap.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a registered provider every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for flightmap instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("flightmap")
}

/// Counter: calls entering a singleflight group.
/// Labels: `role` ("primary" | "duplicate").
pub fn flight_calls() -> Counter<u64> {
    meter()
        .u64_counter("flightmap.flight.calls")
        .with_description("Number of calls entering a singleflight group")
        .build()
}

/// Counter: how each call left the group.
/// Labels: `outcome` ("ok" | "failed" | "cancelled" | "abandoned").
pub fn flight_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("flightmap.flight.outcomes")
        .with_description("Outcomes observed by singleflight callers")
        .build()
}

/// Histogram: primary work duration in milliseconds.
pub fn flight_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("flightmap.flight.duration_ms")
        .with_description("Duration of deduplicated work in milliseconds")
        .with_unit("ms")
        .build()
}
