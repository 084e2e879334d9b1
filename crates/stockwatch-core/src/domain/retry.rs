//! Retry policy: decides inter-attempt delays and attempt ceilings.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::step::Step;
use crate::config::millis;

/// Retry policy for checkout steps.
///
/// The delay for attempt `n` (1-indexed) is `delay * multiplier^(n - 1)`,
/// capped at `max_delay`. With the default multiplier of 1.0 every retry
/// waits exactly `delay`, which is what operators usually configure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    #[serde(rename = "delay_ms", with = "millis")]
    pub delay: Duration,

    pub multiplier: f64,

    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,

    /// Upper bound for server-provided rate-limit waits.
    #[serde(rename = "rate_limit_cap_ms", with = "millis")]
    pub rate_limit_cap: Duration,

    /// Attempt ceilings for steps with side-effect risk. Steps not listed retry
    /// until success, a terminal failure or stop.
    pub max_attempts: BTreeMap<Step, u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            multiplier: 1.0,
            max_delay: Duration::from_secs(30),
            rate_limit_cap: Duration::from_secs(60),
            max_attempts: BTreeMap::from([(Step::AddToCart, 5), (Step::PlaceOrder, 3)]),
        }
    }
}

impl RetryPolicy {
    /// Constant `delay` between attempts, default ceilings.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_ceiling(mut self, step: Step, max_attempts: u32) -> Self {
        self.max_attempts.insert(step, max_attempts);
        self
    }

    pub fn without_ceilings(mut self) -> Self {
        self.max_attempts.clear();
        self
    }

    pub fn ceiling(&self, step: Step) -> Option<u32> {
        self.max_attempts.get(&step).copied()
    }

    /// Delay after the `attempts`-th failed attempt (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exp = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        if exp == 0 || self.multiplier == 1.0 {
            return self.delay.min(self.max_delay);
        }
        let secs = self.delay.as_secs_f64() * self.multiplier.powi(exp);
        let max_secs = self.max_delay.as_secs_f64();
        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay for a rate-limited attempt: the server hint, never shorter than
    /// `delay` and never longer than `rate_limit_cap`.
    pub fn rate_limited_delay(&self, hint: Option<Duration>, attempts: u32) -> Duration {
        match hint {
            Some(wait) => wait.max(self.delay).min(self.rate_limit_cap),
            None => self.next_delay(attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_constant_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(1), Duration::from_secs(1));
        assert_eq!(policy.next_delay(7), Duration::from_secs(1));
        assert_eq!(policy.ceiling(Step::AddToCart), Some(5));
        assert_eq!(policy.ceiling(Step::SetShipping), None);
    }

    #[test]
    fn ceilings_can_be_added_and_cleared() {
        let policy = RetryPolicy::default().with_ceiling(Step::SetShipping, 2);
        assert_eq!(policy.ceiling(Step::SetShipping), Some(2));
        assert_eq!(policy.ceiling(Step::AddToCart), Some(5));

        let policy = policy.without_ceilings();
        assert_eq!(policy.ceiling(Step::SetShipping), None);
        assert_eq!(policy.ceiling(Step::PlaceOrder), None);
    }

    #[test]
    fn exponential_backoff_increases_and_caps() {
        let policy = RetryPolicy {
            delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };

        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
        assert_eq!(policy.next_delay(4), Duration::from_secs(10));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn rate_limit_hint_is_capped() {
        let policy = RetryPolicy {
            rate_limit_cap: Duration::from_secs(5),
            ..RetryPolicy::fixed(Duration::from_millis(100))
        };
        assert_eq!(
            policy.rate_limited_delay(Some(Duration::from_secs(3)), 1),
            Duration::from_secs(3)
        );
        assert_eq!(
            policy.rate_limited_delay(Some(Duration::from_secs(90)), 1),
            Duration::from_secs(5)
        );
        assert_eq!(
            policy.rate_limited_delay(Some(Duration::from_millis(10)), 1),
            Duration::from_millis(100)
        );
        assert_eq!(policy.rate_limited_delay(None, 1), Duration::from_millis(100));
    }

    #[test]
    fn deserializes_from_millis_with_defaults() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"delay_ms": 250, "max_attempts": {"add_to_cart": 2}}"#)
                .unwrap();
        assert_eq!(policy.delay, Duration::from_millis(250));
        assert_eq!(policy.multiplier, 1.0);
        assert_eq!(policy.ceiling(Step::AddToCart), Some(2));
        assert_eq!(policy.ceiling(Step::PlaceOrder), None);
    }
}
