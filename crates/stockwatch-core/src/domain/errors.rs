//! Error taxonomy shared by Monitors and Tasks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operational classification of a failed step.
///
/// - Transient: network / parse hiccup, retry silently.
/// - RateLimited: server asked us to wait, retry after a computed delay.
/// - AuthoritativeRejection: business-level decline, terminal.
/// - ConcurrencyConflict: resource owned by another activity, terminal without retry.
/// - Cancelled: stop flag observed, terminal, reported apart from failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    RateLimited,
    AuthoritativeRejection,
    ConcurrencyConflict,
    Cancelled,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::RateLimited)
    }
}

/// Error returned by a `StockSource` when a poll cannot be interpreted.
///
/// Never fatal to the Monitor loop.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
}
