//! Checkout state and the read-only resources a Task works with.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ids::{GroupId, TaskId};
use super::target::Product;

/// Account credential. Owned by the surrounding system; read-only here.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Stable identifier (usually the login e-mail). Part of the AccountPool key.
    pub identifier: String,
    #[serde(default)]
    pub secret: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authenticated session handle shared through the AccountPool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub credential: String,
    /// Opaque adapter data (cookies, tokens, ...).
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Session {
    pub fn new(credential: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            credential: credential.into(),
            data,
        }
    }
}

/// Everything a `CheckoutDriver` may read about the Task it serves.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub group_id: GroupId,
    pub retailer: String,
    pub credential: Option<Arc<Credential>>,
    pub profile: Arc<serde_json::Value>,
    pub proxy: Option<Arc<str>>,
}

/// Fields accumulated step by step. Owned by exactly one Task.
///
/// Each step writes only what it produces:
/// - WaitingForMonitor: `product`
/// - LoggingIn: `session`
/// - AddingToCart: `cart_id`
/// - GettingCartInfo: `cart_total`
/// - SettingShippingInfo: `shipping_confirmation`
/// - SettingBillingInfo: `payment_token`
/// - CheckingOut: `order_number`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckoutState {
    pub product: Option<Product>,
    #[serde(skip)]
    pub session: Option<Arc<Session>>,
    pub cart_id: Option<String>,
    pub cart_total: Option<f64>,
    pub shipping_confirmation: Option<String>,
    pub payment_token: Option<String>,
    pub order_number: Option<String>,
    /// Adapter scratch space for retailer-specific intermediate values.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_hides_secret() {
        let c = Credential {
            identifier: "a@b.c".to_string(),
            secret: "hunter2".to_string(),
        };
        let s = format!("{c:?}");
        assert!(s.contains("a@b.c"));
        assert!(!s.contains("hunter2"));
    }
}
