//! Scripted collaborators and helpers shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::Subscription;
use crate::config::{GroupConfig, TaskConfig};
use crate::domain::{
    CheckoutState, Event, FulfillmentKind, Session, SourceError, Step, StepOutcome, StockReport,
    TaskContext, WatchTarget,
};
use crate::ports::{CheckoutDriver, RetailerAdapter, StockSource};

pub(crate) fn in_stock(price: f64) -> StockReport {
    StockReport::in_stock("Test Product", price, FulfillmentKind::Shipping)
}

pub(crate) fn out_of_stock() -> StockReport {
    StockReport::out_of_stock("Test Product")
}

/// Everything currently queued on `sub`.
pub(crate) fn drain(sub: &mut Subscription) -> Vec<Arc<Event>> {
    let mut events = Vec::new();
    while let Some(event) = sub.try_recv() {
        events.push(event);
    }
    events
}

/// One scripted `check_stock` result.
#[derive(Debug, Clone)]
pub(crate) enum Tick {
    Reports(HashMap<String, StockReport>),
    Unavailable,
    Panic,
}

impl Tick {
    pub(crate) fn single(id: &str, report: StockReport) -> Self {
        Tick::Reports(HashMap::from([(id.to_string(), report)]))
    }
}

/// Plays back one `Tick` per check; an exhausted script reports nothing.
pub(crate) struct ScriptedSource {
    ticks: Mutex<VecDeque<Tick>>,
    repeat: Option<Tick>,
    failing_warm_ups: AtomicUsize,
    warms: AtomicUsize,
    checks: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new(ticks: impl IntoIterator<Item = Tick>) -> Self {
        Self {
            ticks: Mutex::new(ticks.into_iter().collect()),
            repeat: None,
            failing_warm_ups: AtomicUsize::new(0),
            warms: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
        }
    }

    pub(crate) fn repeating(tick: Tick) -> Self {
        let mut source = Self::new([]);
        source.repeat = Some(tick);
        source
    }

    pub(crate) fn failing_warm_ups(self, n: usize) -> Self {
        self.failing_warm_ups.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn warms(&self) -> usize {
        self.warms.load(Ordering::SeqCst)
    }

    pub(crate) fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StockSource for ScriptedSource {
    async fn warm(&self) -> bool {
        self.warms.fetch_add(1, Ordering::SeqCst);
        self.failing_warm_ups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    async fn check_stock(
        &self,
        _targets: &[WatchTarget],
    ) -> Result<HashMap<String, StockReport>, SourceError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let tick = self.ticks.lock().unwrap().pop_front().or_else(|| self.repeat.clone());
        match tick {
            Some(Tick::Reports(reports)) => Ok(reports),
            Some(Tick::Unavailable) => Err(SourceError::Unavailable("scripted outage".to_string())),
            Some(Tick::Panic) => panic!("scripted stock source panic"),
            None => Ok(HashMap::new()),
        }
    }
}

/// Per-step outcome queues; an empty queue succeeds.
///
/// Successful steps write the `CheckoutState` field they own.
#[derive(Default)]
pub(crate) struct ScriptedDriver {
    scripts: Mutex<HashMap<Step, VecDeque<StepOutcome>>>,
    panics: Mutex<HashSet<Step>>,
    calls: Mutex<HashMap<Step, u32>>,
    login_latency: Duration,
}

impl ScriptedDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, step: Step, outcomes: impl IntoIterator<Item = StepOutcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(step)
            .or_default()
            .extend(outcomes);
        self
    }

    /// The next call of `step` panics once.
    pub(crate) fn panic_once(self, step: Step) -> Self {
        self.panics.lock().unwrap().insert(step);
        self
    }

    pub(crate) fn with_login_latency(mut self, latency: Duration) -> Self {
        self.login_latency = latency;
        self
    }

    pub(crate) fn calls(&self, step: Step) -> u32 {
        self.calls.lock().unwrap().get(&step).copied().unwrap_or(0)
    }

    fn next(&self, step: Step) -> StepOutcome {
        *self.calls.lock().unwrap().entry(step).or_default() += 1;
        let panics = self.panics.lock().unwrap().remove(&step);
        if panics {
            panic!("scripted driver panic at {step}");
        }
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&step)
            .and_then(VecDeque::pop_front)
            .unwrap_or(StepOutcome::Success(()))
    }
}

#[async_trait]
impl CheckoutDriver for ScriptedDriver {
    async fn login(&self, ctx: &TaskContext) -> StepOutcome<Session> {
        if !self.login_latency.is_zero() {
            tokio::time::sleep(self.login_latency).await;
        }
        let identifier = ctx
            .credential
            .as_ref()
            .map(|c| c.identifier.clone())
            .unwrap_or_default();
        self.next(Step::Login)
            .map(|()| Session::new(identifier, serde_json::json!({ "task": ctx.task_id })))
    }

    async fn add_to_cart(&self, _ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        let outcome = self.next(Step::AddToCart);
        if outcome.is_success() {
            state.cart_id = Some("cart-1".to_string());
        }
        outcome
    }

    async fn get_cart_info(&self, _ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        let outcome = self.next(Step::GetCartInfo);
        if outcome.is_success() {
            state.cart_total = state.product.as_ref().map(|p| p.price);
        }
        outcome
    }

    async fn set_shipping(&self, _ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        let outcome = self.next(Step::SetShipping);
        if outcome.is_success() {
            state.shipping_confirmation = Some("ship-ok".to_string());
        }
        outcome
    }

    async fn set_billing(&self, _ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        let outcome = self.next(Step::SetBilling);
        if outcome.is_success() {
            state.payment_token = Some("pay-tok".to_string());
        }
        outcome
    }

    async fn place_order(&self, _ctx: &TaskContext, state: &mut CheckoutState) -> StepOutcome {
        let outcome = self.next(Step::PlaceOrder);
        if outcome.is_success() {
            state.order_number = Some("order-1".to_string());
        }
        outcome
    }
}

/// Adapter handing out pre-built collaborators.
pub(crate) struct StaticAdapter {
    pub(crate) retailer: String,
    pub(crate) source: Arc<ScriptedSource>,
    pub(crate) driver: Arc<ScriptedDriver>,
}

impl StaticAdapter {
    pub(crate) fn new(retailer: &str, source: ScriptedSource, driver: ScriptedDriver) -> Self {
        Self {
            retailer: retailer.to_string(),
            source: Arc::new(source),
            driver: Arc::new(driver),
        }
    }
}

impl RetailerAdapter for StaticAdapter {
    fn retailer(&self) -> &str {
        &self.retailer
    }

    fn stock_source(&self, _group: &GroupConfig) -> Arc<dyn StockSource> {
        self.source.clone()
    }

    fn checkout_driver(&self, _group: &GroupConfig, _task: &TaskConfig) -> Arc<dyn CheckoutDriver> {
        self.driver.clone()
    }
}
