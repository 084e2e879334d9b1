//! stockwatch-core
//!
//! Orchestration core for product-availability monitoring and automated
//! checkout.
//!
//! # Modules
//! - **domain**: ids, statuses, targets, events, step outcomes, retry decisions
//! - **ports**: seams to retailers (`StockSource`, `CheckoutDriver`,
//!   `RetailerAdapter`) plus `Clock` / `IdGenerator`
//! - **bus**: `EventBus`, non-blocking publish/subscribe
//! - **account_pool**: one shared session per (group, credential)
//! - **app**: `Monitor`, `CheckoutTask`, `Supervisor` and its builder
//! - **config**: JSON configuration with defaults and validation

pub mod account_pool;
pub mod app;
pub mod bus;
pub mod config;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod testing;

pub use crate::account_pool::{AccountKey, AccountPool};
pub use crate::app::{
    BuildError, EventLogger, ProductFeed, ProductWatch, Supervisor, SupervisorBuilder,
    SupervisorError, TaskReport,
};
pub use crate::bus::{EventBus, Subscription};
pub use crate::config::{ConfigError, GroupConfig, StockwatchConfig, SupervisorConfig, TaskConfig};
