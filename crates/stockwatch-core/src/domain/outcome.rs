//! Step outcome model: the tri-state result every checkout step returns.
//!
//! A step either makes progress, asks to be retried, or ends the Task. The
//! failure carries its `ErrorKind` so the decider can pick the delay and the
//! terminal status without knowing anything about the retailer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ErrorKind;

/// Why a step did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub kind: ErrorKind,
    pub reason: String,

    /// Server-provided wait hint (rate limiting / queueing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl StepFailure {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            retry_after: None,
        }
    }
}

/// Tri-state result of one attempt at one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T = ()> {
    Success(T),
    Retry(StepFailure),
    Terminal(StepFailure),
}

impl<T> StepOutcome<T> {
    pub fn transient(reason: impl Into<String>) -> Self {
        StepOutcome::Retry(StepFailure::new(ErrorKind::Transient, reason))
    }

    pub fn rate_limited(retry_after: Duration, reason: impl Into<String>) -> Self {
        StepOutcome::Retry(StepFailure {
            kind: ErrorKind::RateLimited,
            reason: reason.into(),
            retry_after: Some(retry_after),
        })
    }

    /// Business decline (payment declined, quantity exceeded, ...).
    pub fn rejected(reason: impl Into<String>) -> Self {
        StepOutcome::Terminal(StepFailure::new(ErrorKind::AuthoritativeRejection, reason))
    }

    /// Another activity already owns the resource (e.g. cart locked).
    pub fn conflict(reason: impl Into<String>) -> Self {
        StepOutcome::Terminal(StepFailure::new(ErrorKind::ConcurrencyConflict, reason))
    }

    /// Unclassified adapter errors degrade to `Transient`.
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => StepOutcome::Success(value),
            Err(e) => StepOutcome::transient(e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StepOutcome<U> {
        match self {
            StepOutcome::Success(value) => StepOutcome::Success(f(value)),
            StepOutcome::Retry(failure) => StepOutcome::Retry(failure),
            StepOutcome::Terminal(failure) => StepOutcome::Terminal(failure),
        }
    }
}
