//! Monitor - polling loop over one group's watch targets.
//!
//! ```text
//! Idle ─► SettingUp ─► Searching ⇄ OutOfStock
//!            ▲             │
//!            │             ▼
//!          Error     SendingToTasks ─► (re-arm) ─► Searching | OutOfStock
//! ```
//!
//! Every tick: stop check, warm the source, `check_stock`, evaluate each
//! target, publish rising edges, report status on change, sleep.
//! Rising edges go to the bus for observers and to the group's
//! `ProductFeed` for its Tasks.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::app::{ProductFeed, sleep_or_stop};
use crate::bus::EventBus;
use crate::config::GroupConfig;
use crate::domain::{
    Evaluation, Event, EventType, GroupId, MonitorStatus, Product, ProductEvent, WatchTarget,
};
use crate::ports::StockSource;

pub struct Monitor {
    group_id: GroupId,
    retailer: String,
    targets: Vec<WatchTarget>,
    delay: Duration,
    warm_backoff: Duration,
    source: Arc<dyn StockSource>,
    bus: EventBus,
    feed: ProductFeed,
    stop: CancellationToken,
    status: watch::Sender<MonitorStatus>,
    /// Targets already handed to Tasks since their last non-actionable observation.
    reported: HashSet<String>,
    warmed: bool,
}

impl Monitor {
    pub fn new(
        group_id: GroupId,
        group: &GroupConfig,
        source: Arc<dyn StockSource>,
        bus: EventBus,
        stop: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(MonitorStatus::Idle);
        Self {
            group_id,
            retailer: group.retailer.clone(),
            targets: group.targets.clone(),
            delay: group.delay,
            warm_backoff: group.warm_backoff,
            source,
            bus,
            feed: ProductFeed::new(),
            stop,
            status,
            reported: HashSet::new(),
            warmed: false,
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn status(&self) -> watch::Receiver<MonitorStatus> {
        self.status.subscribe()
    }

    /// Feed that receives every product wave this Monitor publishes.
    pub fn feed(&self) -> ProductFeed {
        self.feed.clone()
    }

    /// Runs until the stop token fires. Never returns early on adapter errors.
    pub async fn run(mut self) {
        tracing::info!(group = %self.group_id, targets = self.targets.len(), "monitor started");
        self.publish(MonitorStatus::SettingUp, EventType::Start, json!({}));

        loop {
            if self.stop.is_cancelled() {
                break;
            }
            if !self.ensure_warm().await {
                break;
            }
            self.tick().await;
            if !sleep_or_stop(&self.stop, self.delay).await {
                break;
            }
        }

        self.publish(MonitorStatus::Idle, EventType::Stop, json!({}));
        tracing::info!(group = %self.group_id, "monitor stopped");
    }

    /// Warms the source with a fixed backoff. `false` once stopped.
    async fn ensure_warm(&mut self) -> bool {
        while !self.warmed {
            self.transition(MonitorStatus::SettingUp, EventType::Update, json!({}));
            let warmed = AssertUnwindSafe(self.source.warm())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!(group = %self.group_id, "stock source panicked while warming");
                    false
                });
            if warmed {
                tracing::debug!(group = %self.group_id, "stock source warmed");
                self.warmed = true;
                break;
            }
            tracing::debug!(group = %self.group_id, backoff_ms = self.warm_backoff.as_millis() as u64, "warm-up failed");
            if !sleep_or_stop(&self.stop, self.warm_backoff).await {
                return false;
            }
        }
        true
    }

    async fn tick(&mut self) {
        let checked = AssertUnwindSafe(self.source.check_stock(&self.targets))
            .catch_unwind()
            .await;
        let reports = match checked {
            Ok(Ok(reports)) => reports,
            Ok(Err(e)) => {
                tracing::warn!(group = %self.group_id, error = %e, "stock check failed");
                self.fail(e.to_string());
                return;
            }
            Err(_) => {
                tracing::warn!(group = %self.group_id, "stock source panicked");
                self.fail("stock check panicked".to_string());
                return;
            }
        };

        // Pass 1: what each target id looks like on this tick. An id is
        // actionable if any of its targets is, and re-arms only if none is.
        let mut actionable: Vec<Product> = Vec::new();
        let mut hit: HashSet<&str> = HashSet::new();
        let mut idle: HashSet<&str> = HashSet::new();
        let mut any_out_of_stock = false;
        for target in &self.targets {
            // missing report = no observation, reported state unchanged
            let Some(report) = reports.get(&target.id) else {
                continue;
            };
            let evaluation =
                match std::panic::catch_unwind(AssertUnwindSafe(|| target.evaluate(report))) {
                    Ok(evaluation) => evaluation,
                    Err(_) => {
                        tracing::warn!(group = %self.group_id, target = %target.id, "evaluation panicked");
                        continue;
                    }
                };
            match evaluation {
                Evaluation::Actionable(product) => {
                    if hit.insert(target.id.as_str()) {
                        actionable.push(product);
                    }
                }
                Evaluation::OutOfStock => {
                    any_out_of_stock = true;
                    idle.insert(target.id.as_str());
                }
                Evaluation::Filtered => {
                    idle.insert(target.id.as_str());
                }
                Evaluation::Malformed(reason) => {
                    tracing::debug!(group = %self.group_id, target = %target.id, %reason, "skipping malformed report");
                }
            }
        }

        // Pass 2: re-arm, then keep only rising edges.
        for id in idle.difference(&hit) {
            self.reported.remove(*id);
        }
        let fresh: Vec<Product> = actionable
            .into_iter()
            .filter(|product| self.reported.insert(product.target_id.clone()))
            .collect();

        if !fresh.is_empty() {
            tracing::info!(group = %self.group_id, products = fresh.len(), "products found");
            let ids: Vec<&str> = fresh.iter().map(|p| p.target_id.as_str()).collect();
            self.publish(
                MonitorStatus::SendingToTasks,
                EventType::Update,
                json!({ "targets": ids }),
            );
            let wave = ProductEvent {
                retailer: self.retailer.clone(),
                group_id: self.group_id,
                products: fresh,
            };
            self.feed.publish(Arc::new(wave.clone()));
            self.bus.publish(Event::Product(wave));
        } else if any_out_of_stock {
            self.transition(MonitorStatus::OutOfStock, EventType::Update, json!({}));
        } else {
            self.transition(MonitorStatus::Searching, EventType::Update, json!({}));
        }
    }

    fn fail(&mut self, reason: String) {
        self.warmed = false;
        self.transition(MonitorStatus::Error, EventType::Fail, json!({ "reason": reason }));
    }

    /// Publishes only when the status changes.
    fn transition(&self, status: MonitorStatus, event_type: EventType, payload: serde_json::Value) {
        if *self.status.borrow() != status {
            self.publish(status, event_type, payload);
        }
    }

    fn publish(&self, status: MonitorStatus, event_type: EventType, payload: serde_json::Value) {
        self.status.send_replace(status);
        self.bus
            .publish(Event::monitor(self.group_id, status, event_type, payload));
    }
}
