//! Flight span helpers.
//!
//! One span per generation, created by the primary caller and entered while
//! its work runs.

use tracing::Span;

/// Start a span for one flight generation.
///
/// The `flight.outcome` field is declared empty and filled in by
/// [`record_outcome`].
pub fn start_flight_span(generation: u64) -> Span {
    tracing::info_span!(
        "flight.execute",
        "flight.generation" = generation,
        "flight.outcome" = tracing::field::Empty,
    )
}

/// Record how the generation ended and emit an event scoped to the span.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("flight.outcome", outcome);
    span.in_scope(|| {
        tracing::debug!(outcome = outcome, "flight published");
    });
}
