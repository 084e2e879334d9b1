//! CheckoutTask - one checkout attempt from login to order placement.
//!
//! ```text
//! Idle ─► SettingUp ─► LoggingIn ─► WaitingForMonitor ─► AddingToCart ─► GettingCartInfo
//!     ─► SettingShippingInfo ─► SettingBillingInfo ─► CheckingOut
//!     ─► CheckedOut | CardDeclined | CheckoutFailed
//! ```
//!
//! Each step runs in its own retry loop:
//! stop check → one driver call → success advances, failure goes to the
//! `Decider`, which answers retry-after-delay, abort or stop.
//! Driver calls are never aborted midway; stop is observed between attempts
//! and during every wait.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::account_pool::{AccountKey, Claim, WaitOutcome};
use crate::app::{ProductWatch, Shared, sleep_or_stop};
use crate::domain::{
    AuthEvent, AuthOutcome, CheckoutState, Decider, Decision, DefaultDecider, Event, EventType,
    FailedAttempt, Product, RetryPolicy, Session, Step, StepOutcome, TaskContext, TaskId,
    TaskStatus,
};
use crate::ports::CheckoutDriver;

/// Final result of `CheckoutTask::run`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub status: TaskStatus,
    /// Attempts made per step, including the last one.
    pub attempts: BTreeMap<Step, u32>,
    pub state: CheckoutState,
}

impl TaskReport {
    pub fn attempts(&self, step: Step) -> u32 {
        self.attempts.get(&step).copied().unwrap_or(0)
    }
}

/// Why the pipeline ended before placing the order.
#[derive(Debug)]
enum Halt {
    Failed { status: TaskStatus, reason: String },
    Stopped,
}

pub struct CheckoutTask {
    ctx: TaskContext,
    driver: Arc<dyn CheckoutDriver>,
    decider: Box<dyn Decider>,
    shared: Shared,
    /// Created with the Task, so any wave published after `new` is seen.
    products: ProductWatch,
    stop: CancellationToken,
    status: watch::Sender<TaskStatus>,
    state: CheckoutState,
    attempts: BTreeMap<Step, u32>,
}

impl CheckoutTask {
    pub fn new(
        ctx: TaskContext,
        driver: Arc<dyn CheckoutDriver>,
        retry: RetryPolicy,
        shared: Shared,
        products: ProductWatch,
        stop: CancellationToken,
    ) -> Self {
        let (status, _) = watch::channel(TaskStatus::Idle);
        Self {
            products,
            ctx,
            driver,
            decider: Box::new(DefaultDecider::new(retry)),
            shared,
            stop,
            status,
            state: CheckoutState::default(),
            attempts: BTreeMap::new(),
        }
    }

    pub fn with_decider(mut self, decider: Box<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn task_id(&self) -> TaskId {
        self.ctx.task_id
    }

    pub fn status(&self) -> watch::Receiver<TaskStatus> {
        self.status.subscribe()
    }

    pub async fn run(mut self) -> TaskReport {
        tracing::info!(task = %self.ctx.task_id, group = %self.ctx.group_id, "task started");
        self.publish(TaskStatus::SettingUp, EventType::Start, json!({}));

        let (status, event_type, payload) = match self.drive().await {
            Ok(()) => (
                TaskStatus::CheckedOut,
                EventType::Complete,
                json!({ "order_number": self.state.order_number }),
            ),
            Err(Halt::Failed { status, reason }) => {
                tracing::warn!(task = %self.ctx.task_id, ?status, %reason, "checkout failed");
                (status, EventType::Fail, json!({ "reason": reason }))
            }
            Err(Halt::Stopped) => (TaskStatus::Idle, EventType::Stop, json!({})),
        };
        self.publish(status, event_type, payload);
        tracing::info!(task = %self.ctx.task_id, ?status, "task finished");

        TaskReport {
            task_id: self.ctx.task_id,
            status,
            attempts: self.attempts,
            state: self.state,
        }
    }

    async fn drive(&mut self) -> Result<(), Halt> {
        self.log_in().await?;

        let product = self.wait_for_product().await?;
        tracing::info!(task = %self.ctx.task_id, target = %product.target_id, price = product.price, "product received");
        self.state.product = Some(product);

        for step in Step::CHECKOUT {
            self.run_step(step).await?;
        }
        Ok(())
    }

    /// Adopts, waits for, or performs the login for this Task's credential.
    async fn log_in(&mut self) -> Result<(), Halt> {
        let Some(credential) = self.ctx.credential.clone() else {
            return Ok(());
        };
        let key = AccountKey::new(self.ctx.group_id, credential.identifier.clone());
        self.transition(TaskStatus::LoggingIn, EventType::Update, json!({}));

        loop {
            if self.stop.is_cancelled() {
                return Err(Halt::Stopped);
            }

            let claim = self.shared.pool.try_claim(&key);
            match claim {
                Claim::Materialized(session) => {
                    self.adopt(session, AuthOutcome::Adopted);
                    return Ok(());
                }
                Claim::InProgressByOther => {
                    let poll = self.shared.settings.account_poll;
                    match self.shared.pool.wait_for(&key, &self.stop, poll).await {
                        WaitOutcome::Ready(session) => {
                            self.adopt(session, AuthOutcome::Adopted);
                            return Ok(());
                        }
                        // writer gave up, run the next election
                        WaitOutcome::Vacant => continue,
                        WaitOutcome::Stopped => return Err(Halt::Stopped),
                    }
                }
                Claim::Claimed(guard) => {
                    let halt = match self.run_step(Step::Login).await {
                        Ok(Some(session)) => {
                            let session = guard.materialize(session);
                            self.adopt(session, AuthOutcome::LoggedIn);
                            return Ok(());
                        }
                        Ok(None) => Halt::Failed {
                            status: TaskStatus::CheckoutFailed,
                            reason: "login produced no session".to_string(),
                        },
                        Err(halt) => halt,
                    };
                    drop(guard);
                    if matches!(halt, Halt::Failed { .. }) {
                        self.publish_auth(AuthOutcome::Failed);
                    }
                    return Err(halt);
                }
            }
        }
    }

    fn adopt(&mut self, session: Arc<Session>, outcome: AuthOutcome) {
        tracing::debug!(task = %self.ctx.task_id, credential = %session.credential, ?outcome, "session ready");
        self.state.session = Some(session);
        self.publish_auth(outcome);
    }

    fn publish_auth(&self, outcome: AuthOutcome) {
        let credential = self
            .ctx
            .credential
            .as_ref()
            .map(|c| c.identifier.clone())
            .unwrap_or_default();
        self.shared.bus.publish(Event::Auth(AuthEvent {
            group_id: self.ctx.group_id,
            task_id: self.ctx.task_id,
            credential,
            outcome,
        }));
    }

    /// First product of the latest wave this Task has not seen yet.
    async fn wait_for_product(&mut self) -> Result<Product, Halt> {
        self.transition(TaskStatus::WaitingForMonitor, EventType::Update, json!({}));

        loop {
            let wave = tokio::select! {
                _ = self.stop.cancelled() => return Err(Halt::Stopped),
                wave = self.products.next() => wave,
            };
            // feed is gone, nothing will ever arrive
            let Some(wave) = wave else {
                return Err(Halt::Stopped);
            };
            if let Some(product) = wave.products.first() {
                return Ok(product.clone());
            }
        }
    }

    /// Runs `step` until it succeeds or the decider ends the Task.
    ///
    /// Returns the session for `Step::Login`, `None` for every other step.
    async fn run_step(&mut self, step: Step) -> Result<Option<Session>, Halt> {
        loop {
            if self.stop.is_cancelled() {
                return Err(Halt::Stopped);
            }
            self.transition(step.status(), EventType::Update, json!({}));

            let attempts = {
                let n = self.attempts.entry(step).or_insert(0);
                *n += 1;
                *n
            };
            let (failure, terminal) = match self.call_driver(step).await {
                StepOutcome::Success(session) => return Ok(session),
                StepOutcome::Retry(failure) => (failure, false),
                StepOutcome::Terminal(failure) => (failure, true),
            };

            let attempt = FailedAttempt {
                step,
                attempts,
                failure,
                terminal,
            };
            match self.decider.decide(&attempt) {
                Decision::Stop => return Err(Halt::Stopped),
                Decision::Abort { status, reason } => {
                    return Err(Halt::Failed { status, reason });
                }
                Decision::Retry { delay, reason } => {
                    tracing::debug!(
                        task = %self.ctx.task_id,
                        %step,
                        attempts,
                        kind = ?attempt.failure.kind,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "retrying step"
                    );
                    self.publish(
                        step.status(),
                        EventType::Update,
                        json!({
                            "retry_in_ms": delay.as_millis() as u64,
                            "reason": reason,
                            "attempt": attempts,
                        }),
                    );
                    if !sleep_or_stop(&self.stop, delay).await {
                        return Err(Halt::Stopped);
                    }
                }
            }
        }
    }

    /// One driver call. A panic inside the driver counts as a transient failure.
    async fn call_driver(&mut self, step: Step) -> StepOutcome<Option<Session>> {
        let driver = &self.driver;
        let ctx = &self.ctx;
        let state = &mut self.state;
        let call = async move {
            match step {
                Step::Login => driver.login(ctx).await.map(Some),
                Step::AddToCart => driver.add_to_cart(ctx, state).await.map(|()| None),
                Step::GetCartInfo => driver.get_cart_info(ctx, state).await.map(|()| None),
                Step::SetShipping => driver.set_shipping(ctx, state).await.map(|()| None),
                Step::SetBilling => driver.set_billing(ctx, state).await.map(|()| None),
                Step::PlaceOrder => driver.place_order(ctx, state).await.map(|()| None),
            }
        };
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(task = %self.ctx.task_id, %step, "checkout driver panicked");
                StepOutcome::transient(format!("{step} panicked"))
            }
        }
    }

    /// Publishes only when the status changes.
    fn transition(&self, status: TaskStatus, event_type: EventType, payload: serde_json::Value) {
        if *self.status.borrow() != status {
            self.publish(status, event_type, payload);
        }
    }

    fn publish(&self, status: TaskStatus, event_type: EventType, payload: serde_json::Value) {
        self.status.send_replace(status);
        self.shared
            .bus
            .publish(Event::task(self.ctx.task_id, status, event_type, payload));
    }
}
