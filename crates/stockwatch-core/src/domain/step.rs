//! Checkout pipeline steps.

use serde::{Deserialize, Serialize};

use super::state::TaskStatus;

/// One retryable unit of the checkout pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Login,
    AddToCart,
    GetCartInfo,
    SetShipping,
    SetBilling,
    PlaceOrder,
}

impl Step {
    /// Steps run after a product was received (login happens before waiting).
    pub const CHECKOUT: [Step; 5] = [
        Step::AddToCart,
        Step::GetCartInfo,
        Step::SetShipping,
        Step::SetBilling,
        Step::PlaceOrder,
    ];

    /// Status the Task reports while this step runs.
    pub fn status(self) -> TaskStatus {
        match self {
            Step::Login => TaskStatus::LoggingIn,
            Step::AddToCart => TaskStatus::AddingToCart,
            Step::GetCartInfo => TaskStatus::GettingCartInfo,
            Step::SetShipping => TaskStatus::SettingShippingInfo,
            Step::SetBilling => TaskStatus::SettingBillingInfo,
            Step::PlaceOrder => TaskStatus::CheckingOut,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Login => "login",
            Step::AddToCart => "add_to_cart",
            Step::GetCartInfo => "get_cart_info",
            Step::SetShipping => "set_shipping",
            Step::SetBilling => "set_billing",
            Step::PlaceOrder => "place_order",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
