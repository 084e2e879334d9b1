use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use stockwatch_core::domain::{
    CheckoutState, FulfillmentKind, Session, SourceError, StepOutcome, StockReport, TaskContext,
    WatchTarget,
};
use stockwatch_core::ports::{CheckoutDriver, RetailerAdapter, StockSource};
use stockwatch_core::{
    EventLogger, GroupConfig, StockwatchConfig, SupervisorBuilder, TaskConfig,
};

const SAMPLE_CONFIG: &str = r#"{
    "supervisor": { "bus_capacity": 256 },
    "groups": [{
        "name": "consoles",
        "retailer": "sim",
        "delay_ms": 1000,
        "targets": [
            { "id": "console-1", "max_price": 500.0 },
            { "id": "console-2", "mode": "shipping_only" }
        ],
        "tasks": [
            { "credential": { "identifier": "demo@example.com", "secret": "pw" },
              "profile": { "name": "Demo User", "address": "1 Main St" },
              "retry": { "delay_ms": 500 } },
            { "credential": { "identifier": "demo@example.com", "secret": "pw" },
              "profile": { "name": "Demo User", "address": "1 Main St" } },
            { "profile": { "name": "Guest", "address": "2 Side St" } }
        ]
    }]
}"#;

const RUN_FOR: Duration = Duration::from_secs(30);

/// Stock flips randomly; prices wander around 450.
struct SimStock;

#[async_trait]
impl StockSource for SimStock {
    async fn warm(&self) -> bool {
        sleep(Duration::from_millis(100)).await;
        true
    }

    async fn check_stock(
        &self,
        targets: &[WatchTarget],
    ) -> Result<HashMap<String, StockReport>, SourceError> {
        sleep(Duration::from_millis(150)).await;
        let mut rng = rand::thread_rng();
        if rng.gen_bool(0.05) {
            return Err(SourceError::Unavailable("simulated 503".to_string()));
        }
        let reports = targets
            .iter()
            .map(|t| {
                let report = if rng.gen_bool(0.3) {
                    let fulfillment = if rng.gen_bool(0.5) {
                        FulfillmentKind::Shipping
                    } else {
                        FulfillmentKind::Pickup
                    };
                    StockReport::in_stock(format!("Sim {}", t.id), rng.gen_range(400.0..550.0), fulfillment)
                } else {
                    StockReport::out_of_stock(format!("Sim {}", t.id))
                };
                (t.id.clone(), report)
            })
            .collect();
        Ok(reports)
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
    address: String,
}

/// Succeeds after a few intentional add-to-cart failures.
struct SimCheckout {
    remaining_failures: AtomicU32,
}

impl SimCheckout {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl CheckoutDriver for SimCheckout {
    async fn login(&self, ctx: &TaskContext) -> StepOutcome<Session> {
        sleep(Duration::from_millis(300)).await;
        let Some(credential) = &ctx.credential else {
            return StepOutcome::rejected("no credential");
        };
        StepOutcome::Success(Session::new(
            credential.identifier.clone(),
            serde_json::json!({ "cookie": format!("sim-{}", ctx.task_id) }),
        ))
    }

    async fn add_to_cart(&self, _ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return StepOutcome::transient(format!("intentional failure (left={left})"));
        }
        state.cart_id = Some(format!("cart-{}", rand::random::<u32>()));
        StepOutcome::Success(())
    }

    async fn get_cart_info(&self, _ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        state.cart_total = state.product.as_ref().map(|p| p.price);
        StepOutcome::Success(())
    }

    async fn set_shipping(&self, ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        let profile: Profile = match serde_json::from_value((*ctx.profile).clone()) {
            Ok(profile) => profile,
            Err(e) => return StepOutcome::rejected(format!("bad profile: {e}")),
        };
        state.shipping_confirmation = Some(format!("{} / {}", profile.name, profile.address));
        StepOutcome::Success(())
    }

    async fn set_billing(&self, _ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        state.payment_token = Some("tok_sim".to_string());
        StepOutcome::Success(())
    }

    async fn place_order(&self, _ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        if rand::thread_rng().gen_bool(0.2) {
            return StepOutcome::rate_limited(Duration::from_secs(2), "checkout queue");
        }
        state.order_number = Some(format!("SIM-{:06}", rand::random::<u32>() % 1_000_000));
        StepOutcome::Success(())
    }
}

struct SimRetailer;

impl RetailerAdapter for SimRetailer {
    fn retailer(&self) -> &str {
        "sim"
    }

    fn stock_source(&self, _group: &GroupConfig) -> Arc<dyn StockSource> {
        Arc::new(SimStock)
    }

    fn checkout_driver(&self, _group: &GroupConfig, _task: &TaskConfig) -> Arc<dyn CheckoutDriver> {
        Arc::new(SimCheckout::new(2))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) config: first argument or the built-in sample
    let config = match std::env::args().nth(1) {
        Some(path) => StockwatchConfig::from_path(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => StockwatchConfig::from_json_str(SAMPLE_CONFIG).context("built-in sample config")?,
    };

    // (B) wiring
    let supervisor = SupervisorBuilder::new()
        .register(Arc::new(SimRetailer))?
        .config(&config)
        .build()?;
    let logger = tokio::spawn(EventLogger::new(supervisor.bus()).run());

    // (C) groups
    for group in config.groups {
        let name = group.name.clone();
        let id = supervisor
            .start_group(group)
            .with_context(|| format!("starting group '{name}'"))?;
        tracing::info!(group = %id, %name, "group running");
    }

    // (D) run until Ctrl-C or the demo window ends
    tokio::select! {
        r = tokio::signal::ctrl_c() => r.context("waiting for ctrl-c")?,
        _ = sleep(RUN_FOR) => {}
    }

    for group in supervisor.status() {
        tracing::info!(group = %group.name, monitor = ?group.monitor, counts = ?group.counts, "final status");
    }

    // (E) graceful shutdown: stop everything, then Close ends the logger
    let reports = supervisor.shutdown().await;
    for report in &reports {
        tracing::info!(
            task = %report.task_id,
            status = ?report.status,
            order = ?report.state.order_number,
            "task report"
        );
    }
    let logged = logger.await.context("event logger")?;
    tracing::info!(events = logged, "done");
    Ok(())
}
