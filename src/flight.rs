//! Singleflight: collapse concurrent calls for the same key into one
//! execution.
//!
//! The first caller for a key becomes the primary and runs the work. Callers
//! arriving while that work is in flight become duplicates: they wait for the
//! primary and receive a clone of its outcome, success or failure. A caller
//! arriving after the outcome was published starts a new generation.
//!
//! Flight bookkeeping lives in a [`ConditionalMap`]. Each flight carries a
//! waiter count; whichever caller drops it to zero tries to reap the entry.
//! Reaping is best-effort: if another caller joins in between, the entry
//! survives until that caller leaves and retries.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::map::{ConditionalMap, Update};
use crate::signal::Signal;
use crate::telemetry::flight::{record_outcome, start_flight_span};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, trace, warn};

/// State shared by every caller of one generation.
struct Flight<V> {
    generation: u64,
    /// Written once by the primary, strictly before `done` fires.
    outcome: OnceLock<Result<V>>,
    done: Signal,
    waiters: AtomicUsize,
}

impl<V> Flight<V> {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            outcome: OnceLock::new(),
            done: Signal::new(),
            waiters: AtomicUsize::new(1),
        }
    }

    /// Store the outcome and wake every waiter. Returns `false`, leaving the
    /// first outcome in place, if one was already published.
    fn publish(&self, outcome: Result<V>) -> bool {
        if self.outcome.set(outcome).is_err() {
            return false;
        }
        self.done.fire()
    }
}

/// Suppresses duplicate concurrent executions of work sharing a key.
pub struct Group<K, V> {
    flights: ConditionalMap<K, Arc<Flight<V>>>,
    generations: AtomicU64,
}

impl<K, V> Group<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a group whose flight map preallocates `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            flights: ConditionalMap::with_capacity(capacity),
            generations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_capacity(config.initial_capacity)
    }

    /// Number of flights not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Run `work` unless a call for `key` is already in flight, in which case
    /// wait for it and return its outcome.
    ///
    /// A failure of `work` is returned as [`Error::Work`] to every caller of
    /// the generation.
    pub async fn run<F, Fut, E>(&self, key: K, work: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<anyhow::Error>,
    {
        self.execute(key, None, work).await
    }

    /// Like [`Group::run`], but a duplicate stops waiting with
    /// [`Error::Cancelled`] once `cancel` fires.
    ///
    /// Cancellation never reaches the primary: if this call ends up running
    /// the work, it runs to completion.
    pub async fn run_cancellable<F, Fut, E>(
        &self,
        cancel: &CancellationToken,
        key: K,
        work: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<anyhow::Error>,
    {
        self.execute(key, Some(cancel), work).await
    }

    async fn execute<F, Fut, E>(
        &self,
        key: K,
        cancel: Option<&CancellationToken>,
        work: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<anyhow::Error>,
    {
        let (flight, primary) = self.join(&key);
        // Dropped on every exit path, including when this future is dropped.
        let ticket = Ticket {
            flights: &self.flights,
            key,
            flight,
        };

        let outcome = if primary {
            metrics::flight_calls().add(1, &[KeyValue::new("role", "primary")]);
            self.lead(&ticket.flight, work).await
        } else {
            metrics::flight_calls().add(1, &[KeyValue::new("role", "duplicate")]);
            debug!(
                generation = ticket.flight.generation,
                "joined in-flight work"
            );
            follow(&ticket.flight, cancel).await
        };

        metrics::flight_outcomes().add(1, &[KeyValue::new("outcome", outcome_label(&outcome))]);
        outcome
    }

    /// Become the primary for `key`, or register as a waiter on the live
    /// flight. Returns the flight and whether this call is the primary.
    fn join(&self, key: &K) -> (Arc<Flight<V>>, bool) {
        loop {
            let update = self.flights.set_if(
                key.clone(),
                |current| current.is_none_or(|flight| flight.done.is_fired()),
                |_| {
                    let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                    Arc::new(Flight::new(generation))
                },
            );

            match update {
                Update::Applied(flight) => return (flight, true),
                Update::Rejected(Some(flight)) => {
                    flight.waiters.fetch_add(1, Ordering::AcqRel);
                    return (flight, false);
                }
                // A vacant slot always passes the predicate.
                Update::Rejected(None) => continue,
            }
        }
    }

    async fn lead<F, Fut, E>(&self, flight: &Flight<V>, work: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
        E: Into<anyhow::Error>,
    {
        let span = start_flight_span(flight.generation);
        let completion = Completion {
            flight,
            span: span.clone(),
            published: false,
        };

        let started = Instant::now();
        let outcome = work()
            .instrument(span)
            .await
            .map_err(|e| Error::Work(Arc::new(e.into())));
        metrics::flight_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);

        completion.publish(outcome.clone());
        outcome
    }
}

async fn follow<V: Clone>(flight: &Flight<V>, cancel: Option<&CancellationToken>) -> Result<V> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                () = flight.done.wait() => {}
                () = token.cancelled() => {
                    debug!(generation = flight.generation, "wait for in-flight work cancelled");
                    return Err(Error::Cancelled);
                }
            }
        }
        None => flight.done.wait().await,
    }

    flight
        .outcome
        .get()
        .cloned()
        .unwrap_or(Err(Error::Abandoned))
}

fn outcome_label<V>(outcome: &Result<V>) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(Error::Cancelled) => "cancelled",
        Err(Error::Abandoned) => "abandoned",
        Err(_) => "failed",
    }
}

/// Publishes [`Error::Abandoned`] if the primary goes away without a result,
/// so that duplicates never wait forever.
struct Completion<'a, V> {
    flight: &'a Flight<V>,
    span: Span,
    published: bool,
}

impl<V> Completion<'_, V> {
    fn publish(mut self, outcome: Result<V>) {
        record_outcome(&self.span, outcome_label(&outcome));
        self.flight.publish(outcome);
        self.published = true;
    }
}

impl<V> Drop for Completion<'_, V> {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        warn!(
            generation = self.flight.generation,
            "primary dropped before publishing a result"
        );
        record_outcome(&self.span, "abandoned");
        self.flight.publish(Err(Error::Abandoned));
    }
}

/// One caller's reference on a flight. Releasing it decrements the waiter
/// count; the caller that reaches zero tries to reap the map entry.
struct Ticket<'a, K, V>
where
    K: Hash + Eq,
{
    flights: &'a ConditionalMap<K, Arc<Flight<V>>>,
    key: K,
    flight: Arc<Flight<V>>,
}

impl<K, V> Drop for Ticket<'_, K, V>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        if self.flight.waiters.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        // The key may already hold a newer generation; only reap our own.
        let reaped = self.flights.delete_if(&self.key, |current| {
            Arc::ptr_eq(current, &self.flight) && current.waiters.load(Ordering::Acquire) == 0
        });
        if reaped {
            trace!(generation = self.flight.generation, "flight reaped");
        }
    }
}

impl<K, V> Default for Group<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for Group<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("flights", &self.flights)
            .field("generations", &self.generations.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
