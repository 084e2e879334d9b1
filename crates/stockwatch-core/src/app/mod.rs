//! App - the long-lived activities and the Supervisor that wires them.
//!
//! # Main pieces
//! - **Monitor**: polls a `StockSource`, publishes product events
//! - **ProductFeed**: latest product wave per group, read by its Tasks
//! - **CheckoutTask**: waits for a product, drives a `CheckoutDriver`
//! - **Supervisor**: owns Monitors and Tasks per group, one bus, one pool
//! - **SupervisorBuilder**: fail-fast wiring of retailer adapters
//! - **EventLogger**: bus observer that logs every event

pub mod builder;
pub mod event_log;
pub mod feed;
pub mod monitor;
pub mod registry;
pub mod status;
pub mod supervisor;
pub mod task;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::account_pool::AccountPool;
use crate::bus::EventBus;
use crate::config::SupervisorConfig;

pub use self::builder::{BuildError, SupervisorBuilder};
pub use self::event_log::EventLogger;
pub use self::feed::{ProductFeed, ProductWatch};
pub use self::monitor::Monitor;
pub use self::registry::{RegistryError, RetailerRegistry};
pub use self::status::{GroupStatus, TaskCounts};
pub use self::supervisor::{Supervisor, SupervisorError};
pub use self::task::{CheckoutTask, TaskReport};

/// Handles shared by every activity of one Supervisor.
#[derive(Clone)]
pub struct Shared {
    pub bus: EventBus,
    pub pool: AccountPool,
    pub settings: SupervisorConfig,
}

/// Sleeps for `duration` unless `stop` fires first.
///
/// Returns `false` when stopped.
pub(crate) async fn sleep_or_stop(stop: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
