//! Error types for flightmap.
//!
//! The map itself never fails. Everything here is surfaced by the
//! singleflight group, the config loader, or telemetry setup.

use std::sync::Arc;
use thiserror::Error;

/// A work failure shared by every caller of one flight generation.
pub type SharedError = Arc<anyhow::Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("wait for in-flight work was cancelled")]
    Cancelled,

    #[error("in-flight work failed: {0}")]
    Work(SharedError),

    #[error("in-flight work was abandoned before it produced a result")]
    Abandoned,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("telemetry error: {0}")]
    Telemetry(String),
}

impl Error {
    /// Whether this is the cancellation outcome of a waiting duplicate.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
