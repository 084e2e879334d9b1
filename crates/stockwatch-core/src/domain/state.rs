//! Monitor and Task status machines.

use serde::{Deserialize, Serialize};

/// Monitor status.
///
/// Transitions:
/// - Idle -> SettingUp -> Searching
/// - Searching <-> OutOfStock
/// - Searching | OutOfStock -> SendingToTasks -> OutOfStock | Searching
/// - any -> Error -> (next successful poll) OutOfStock | Searching | SendingToTasks
/// - any -> Idle (stop only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Idle,
    SettingUp,
    Searching,
    OutOfStock,
    SendingToTasks,
    Error,
}

/// Task status.
///
/// Transitions:
/// - Idle -> SettingUp -> LoggingIn -> WaitingForMonitor
/// - WaitingForMonitor -> AddingToCart -> GettingCartInfo -> SettingShippingInfo
///   -> SettingBillingInfo -> CheckingOut -> CheckedOut | CardDeclined | CheckoutFailed
/// - any non-terminal -> CheckoutFailed (terminal step failure)
/// - any non-terminal -> Idle (stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Idle,
    SettingUp,
    LoggingIn,
    WaitingForMonitor,
    AddingToCart,
    GettingCartInfo,
    SettingShippingInfo,
    SettingBillingInfo,
    CheckingOut,
    CheckedOut,
    CardDeclined,
    CheckoutFailed,
}

impl TaskStatus {
    /// Outcome states. `Idle` is terminal only after a stop, so it is not listed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::CheckedOut | TaskStatus::CardDeclined | TaskStatus::CheckoutFailed
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(self, TaskStatus::CardDeclined | TaskStatus::CheckoutFailed)
    }
}

/// Lifecycle tag attached to every Task/Monitor event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Start,
    Update,
    Fail,
    Stop,
    Complete,
}
