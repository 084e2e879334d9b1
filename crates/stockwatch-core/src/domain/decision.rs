//! Decision model: what a Task does after a failed step attempt.
//!
//! The Decider is a pure function of the failed attempt. The Task executes the
//! decision (sleeping, publishing, ending) itself.

use std::time::Duration;

use super::errors::ErrorKind;
use super::outcome::StepFailure;
use super::retry::RetryPolicy;
use super::state::TaskStatus;
use super::step::Step;

/// A failed attempt as seen by the decider.
#[derive(Debug, Clone)]
pub struct FailedAttempt {
    pub step: Step,
    /// Attempts made at this step so far, including this one.
    pub attempts: u32,
    pub failure: StepFailure,
    /// The step returned `Terminal` rather than `Retry`.
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Sleep `delay`, then attempt the step again.
    Retry { delay: Duration, reason: String },

    /// End the Task in `status`.
    Abort { status: TaskStatus, reason: String },

    /// The collaborator reported cancellation; end as stopped.
    Stop,
}

pub trait Decider: Send + Sync {
    fn decide(&self, attempt: &FailedAttempt) -> Decision;
}

/// Taxonomy-driven decider.
///
/// - Transient / RateLimited `Retry` outcomes retry until the step's ceiling.
/// - `Terminal` outcomes, and non-retryable kinds in either variant, abort
///   without further attempts.
/// - An authoritative rejection while placing the order is `CardDeclined`;
///   every other abort is `CheckoutFailed`.
#[derive(Debug, Clone)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, attempt: &FailedAttempt) -> Decision {
        let kind = attempt.failure.kind;
        if kind == ErrorKind::Cancelled {
            return Decision::Stop;
        }

        if attempt.terminal || !kind.is_retryable() {
            let status = if attempt.step == Step::PlaceOrder
                && kind == ErrorKind::AuthoritativeRejection
            {
                TaskStatus::CardDeclined
            } else {
                TaskStatus::CheckoutFailed
            };
            return Decision::Abort {
                status,
                reason: attempt.failure.reason.clone(),
            };
        }

        if let Some(max) = self.retry_policy.ceiling(attempt.step) {
            if attempt.attempts >= max {
                return Decision::Abort {
                    status: TaskStatus::CheckoutFailed,
                    reason: format!(
                        "{} failed after {}/{} attempts: {}",
                        attempt.step, attempt.attempts, max, attempt.failure.reason
                    ),
                };
            }
        }

        let delay = match kind {
            ErrorKind::RateLimited => self
                .retry_policy
                .rate_limited_delay(attempt.failure.retry_after, attempt.attempts),
            _ => self.retry_policy.next_delay(attempt.attempts),
        };
        Decision::Retry {
            delay,
            reason: attempt.failure.reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn attempt(step: Step, attempts: u32, kind: ErrorKind, terminal: bool) -> FailedAttempt {
        FailedAttempt {
            step,
            attempts,
            failure: StepFailure::new(kind, "boom"),
            terminal,
        }
    }

    fn decider() -> DefaultDecider {
        DefaultDecider::new(RetryPolicy::fixed(Duration::from_millis(500)))
    }

    #[rstest]
    #[case(Step::SetShipping, ErrorKind::Transient, false)]
    #[case(Step::SetBilling, ErrorKind::RateLimited, false)]
    fn retryable_failures_retry(#[case] step: Step, #[case] kind: ErrorKind, #[case] terminal: bool) {
        let d = decider().decide(&attempt(step, 1, kind, terminal));
        assert!(matches!(d, Decision::Retry { .. }));
    }

    #[rstest]
    #[case(Step::PlaceOrder, ErrorKind::AuthoritativeRejection, TaskStatus::CardDeclined)]
    #[case(Step::AddToCart, ErrorKind::AuthoritativeRejection, TaskStatus::CheckoutFailed)]
    #[case(Step::PlaceOrder, ErrorKind::ConcurrencyConflict, TaskStatus::CheckoutFailed)]
    #[case(Step::GetCartInfo, ErrorKind::Transient, TaskStatus::CheckoutFailed)]
    fn terminal_failures_abort(
        #[case] step: Step,
        #[case] kind: ErrorKind,
        #[case] expected: TaskStatus,
    ) {
        let d = decider().decide(&attempt(step, 1, kind, true));
        assert_eq!(
            d,
            Decision::Abort {
                status: expected,
                reason: "boom".to_string()
            }
        );
    }

    #[test]
    fn non_retryable_kind_in_retry_variant_still_aborts() {
        let d = decider().decide(&attempt(
            Step::SetBilling,
            1,
            ErrorKind::ConcurrencyConflict,
            false,
        ));
        assert!(matches!(d, Decision::Abort { status: TaskStatus::CheckoutFailed, .. }));
    }

    #[test]
    fn ceiling_ends_add_to_cart() {
        let d = decider();
        assert!(matches!(
            d.decide(&attempt(Step::AddToCart, 4, ErrorKind::Transient, false)),
            Decision::Retry { .. }
        ));
        assert!(matches!(
            d.decide(&attempt(Step::AddToCart, 5, ErrorKind::Transient, false)),
            Decision::Abort { status: TaskStatus::CheckoutFailed, .. }
        ));
    }

    #[test]
    fn configured_ceilings_apply_per_step() {
        let capped = DefaultDecider::new(
            RetryPolicy::fixed(Duration::from_millis(500)).with_ceiling(Step::SetShipping, 2),
        );
        assert!(matches!(
            capped.decide(&attempt(Step::SetShipping, 2, ErrorKind::Transient, false)),
            Decision::Abort { status: TaskStatus::CheckoutFailed, .. }
        ));

        let unbounded =
            DefaultDecider::new(RetryPolicy::fixed(Duration::from_millis(500)).without_ceilings());
        assert!(matches!(
            unbounded.decide(&attempt(Step::AddToCart, 50, ErrorKind::Transient, false)),
            Decision::Retry { .. }
        ));
    }

    #[test]
    fn rate_limit_uses_server_hint() {
        let mut a = attempt(Step::Login, 1, ErrorKind::RateLimited, false);
        a.failure.retry_after = Some(Duration::from_secs(7));
        match decider().decide(&a) {
            Decision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(7)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancelled_stops() {
        let d = decider().decide(&attempt(Step::SetShipping, 1, ErrorKind::Cancelled, true));
        assert_eq!(d, Decision::Stop);
    }
}
