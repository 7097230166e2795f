//! # flightmap
//!
//! In-process concurrency building blocks:
//!
//! - [`ConditionalMap`]: a reader/writer-locked map with atomic
//!   predicate-guarded set and delete.
//! - [`Group`]: singleflight deduplication of concurrent work, built on a
//!   conditional map of in-flight generations.
//! - [`Signal`]: the one-shot broadcast used to publish a flight's result.
//!
//! Nothing here is global. Construct a map or group and share it by
//! reference or `Arc`.

pub mod config;
pub mod error;
pub mod flight;
pub mod map;
pub mod signal;
pub mod telemetry;

pub use error::{Error, Result};
pub use flight::Group;
pub use map::{ConditionalMap, Update};
pub use signal::Signal;
