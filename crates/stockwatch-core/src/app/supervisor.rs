//! Supervisor - owns every Monitor and Task, grouped by `GroupId`.
//!
//! ```text
//! Supervisor
//!   ├─ shutdown token
//!   │    └─ group token (one per group)
//!   │         ├─ Monitor            (1 per group) ─► ProductFeed
//!   │         └─ task token ─► CheckoutTask   (N per group, watch the feed)
//!   ├─ EventBus     (shared)
//!   └─ AccountPool  (shared)
//! ```
//!
//! Stopping a group cancels its token, waits for its activities and drops its
//! AccountPool entries. Activities run as spawned Tokio tasks, so a panic
//! that escapes one surfaces here as a `JoinError` and is logged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::account_pool::AccountPool;
use crate::app::status::{GroupStatus, TaskCounts};
use crate::app::{
    CheckoutTask, Monitor, ProductFeed, RegistryError, RetailerRegistry, Shared, TaskReport,
};
use crate::bus::{EventBus, Subscription};
use crate::config::{ConfigError, GroupConfig, SupervisorConfig, TaskConfig};
use crate::domain::{Event, GroupId, MonitorStatus, TaskContext, TaskId, TaskStatus};
use crate::ports::{IdGenerator, RetailerAdapter};

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("group '{0}' is already running")]
    AlreadyRunning(String),

    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("task {0} panicked")]
    TaskPanicked(TaskId),

    #[error("supervisor is shut down")]
    ShutDown,
}

struct TaskHandle {
    stop: CancellationToken,
    status: watch::Receiver<TaskStatus>,
    join: JoinHandle<TaskReport>,
}

struct GroupHandle {
    config: GroupConfig,
    adapter: Arc<dyn RetailerAdapter>,
    feed: ProductFeed,
    stop: CancellationToken,
    monitor_status: watch::Receiver<MonitorStatus>,
    monitor: JoinHandle<()>,
    tasks: HashMap<TaskId, TaskHandle>,
}

pub struct Supervisor {
    registry: RetailerRegistry,
    ids: Arc<dyn IdGenerator>,
    shared: Shared,
    shutdown: CancellationToken,
    closed: AtomicBool,
    groups: Mutex<HashMap<GroupId, GroupHandle>>,
}

impl Supervisor {
    pub(crate) fn new(
        registry: RetailerRegistry,
        settings: SupervisorConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            registry,
            ids,
            shared: Shared {
                bus: EventBus::new(settings.bus_capacity),
                pool: AccountPool::new(),
                settings,
            },
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.bus.subscribe()
    }

    pub fn pool(&self) -> &AccountPool {
        &self.shared.pool
    }

    fn groups(&self) -> MutexGuard<'_, HashMap<GroupId, GroupHandle>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a Monitor for `config` plus one Task per configured task.
    ///
    /// Must be called from within a Tokio runtime. Tasks watch the group's
    /// `ProductFeed` before the Monitor is spawned, so the first wave reaches them.
    pub fn start_group(&self, config: GroupConfig) -> Result<GroupId, SupervisorError> {
        if self.shutdown.is_cancelled() {
            return Err(SupervisorError::ShutDown);
        }
        config.validate()?;
        let adapter = self.registry.get(&config.retailer)?;

        let mut groups = self.groups();
        if groups.values().any(|g| g.config.name == config.name) {
            return Err(SupervisorError::AlreadyRunning(config.name));
        }

        let group_id = self.ids.generate_group_id();
        let stop = self.shutdown.child_token();
        let monitor = Monitor::new(
            group_id,
            &config,
            adapter.stock_source(&config),
            self.shared.bus.clone(),
            stop.clone(),
        );
        let monitor_status = monitor.status();
        let feed = monitor.feed();

        let mut tasks = HashMap::new();
        for task in &config.tasks {
            let (task_id, handle) =
                self.spawn_task(group_id, &config, &adapter, &feed, &stop, task.clone());
            tasks.insert(task_id, handle);
        }
        let monitor = tokio::spawn(monitor.run());

        tracing::info!(
            group = %group_id,
            name = %config.name,
            retailer = %config.retailer,
            tasks = tasks.len(),
            "group started"
        );
        groups.insert(
            group_id,
            GroupHandle {
                config,
                adapter,
                feed,
                stop,
                monitor_status,
                monitor,
                tasks,
            },
        );
        Ok(group_id)
    }

    /// Adds a Task to a running group. It waits for the group's next product event.
    pub fn add_task(&self, group_id: GroupId, task: TaskConfig) -> Result<TaskId, SupervisorError> {
        task.validate()?;
        let mut groups = self.groups();
        let group = groups
            .get_mut(&group_id)
            .ok_or(SupervisorError::UnknownGroup(group_id))?;

        let (task_id, handle) =
            self.spawn_task(group_id, &group.config, &group.adapter, &group.feed, &group.stop, task);
        group.tasks.insert(task_id, handle);
        tracing::info!(group = %group_id, task = %task_id, "task added");
        Ok(task_id)
    }

    fn spawn_task(
        &self,
        group_id: GroupId,
        group: &GroupConfig,
        adapter: &Arc<dyn RetailerAdapter>,
        feed: &ProductFeed,
        group_stop: &CancellationToken,
        task: TaskConfig,
    ) -> (TaskId, TaskHandle) {
        let task_id = self.ids.generate_task_id();
        let ctx = TaskContext {
            task_id,
            group_id,
            retailer: group.retailer.clone(),
            credential: task.credential.clone().map(Arc::new),
            profile: Arc::new(task.profile.clone()),
            proxy: task.proxy.as_deref().map(Arc::from),
        };
        let driver = adapter.checkout_driver(group, &task);
        let stop = group_stop.child_token();
        let checkout = CheckoutTask::new(
            ctx,
            driver,
            task.retry,
            self.shared.clone(),
            feed.subscribe(),
            stop.clone(),
        );
        let status = checkout.status();
        let join = tokio::spawn(checkout.run());
        (task_id, TaskHandle { stop, status, join })
    }

    /// Stops one Task and returns its report.
    pub async fn stop_task(&self, task_id: TaskId) -> Result<TaskReport, SupervisorError> {
        let handle = {
            let mut groups = self.groups();
            groups
                .values_mut()
                .find_map(|g| g.tasks.remove(&task_id))
                .ok_or(SupervisorError::UnknownTask(task_id))?
        };
        handle.stop.cancel();
        handle.join.await.map_err(|e| {
            tracing::error!(task = %task_id, error = %e, "task panicked");
            SupervisorError::TaskPanicked(task_id)
        })
    }

    /// Stops a group's Monitor and Tasks and forgets its shared sessions.
    pub async fn stop_group(&self, group_id: GroupId) -> Result<Vec<TaskReport>, SupervisorError> {
        let group = self
            .groups()
            .remove(&group_id)
            .ok_or(SupervisorError::UnknownGroup(group_id))?;
        Ok(self.wind_down(group_id, group).await)
    }

    /// Stops everything, then publishes one `Close` event. Idempotent.
    pub async fn shutdown(&self) -> Vec<TaskReport> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        tracing::info!("supervisor shutting down");
        self.shutdown.cancel();

        let groups: Vec<(GroupId, GroupHandle)> = self.groups().drain().collect();
        let mut reports = Vec::new();
        for (group_id, group) in groups {
            reports.extend(self.wind_down(group_id, group).await);
        }
        self.shared.bus.publish(Event::close("supervisor shutdown"));
        reports
    }

    async fn wind_down(&self, group_id: GroupId, group: GroupHandle) -> Vec<TaskReport> {
        group.stop.cancel();

        if let Err(e) = group.monitor.await {
            tracing::error!(group = %group_id, error = %e, "monitor panicked");
        }
        let mut reports = Vec::with_capacity(group.tasks.len());
        for (task_id, handle) in group.tasks {
            match handle.join.await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(task = %task_id, error = %e, "task panicked"),
            }
        }

        let sessions = self.shared.pool.remove_group(group_id);
        tracing::info!(group = %group_id, tasks = reports.len(), sessions, "group stopped");
        reports
    }

    pub fn monitor_status(&self, group_id: GroupId) -> Option<MonitorStatus> {
        self.groups()
            .get(&group_id)
            .map(|g| *g.monitor_status.borrow())
    }

    pub fn task_status(&self, task_id: TaskId) -> Option<TaskStatus> {
        self.groups()
            .values()
            .find_map(|g| g.tasks.get(&task_id))
            .map(|t| *t.status.borrow())
    }

    pub fn status(&self) -> Vec<GroupStatus> {
        let groups = self.groups();
        let mut out: Vec<GroupStatus> = groups
            .iter()
            .map(|(group_id, g)| {
                let mut counts = TaskCounts::default();
                let mut tasks: Vec<(TaskId, TaskStatus)> = g
                    .tasks
                    .iter()
                    .map(|(id, t)| {
                        let status = *t.status.borrow();
                        counts.record(status, t.join.is_finished());
                        (*id, status)
                    })
                    .collect();
                tasks.sort_by_key(|(id, _)| *id);
                GroupStatus {
                    group_id: *group_id,
                    name: g.config.name.clone(),
                    retailer: g.config.retailer.clone(),
                    monitor: *g.monitor_status.borrow(),
                    tasks,
                    counts,
                }
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::app::SupervisorBuilder;
    use crate::domain::{Credential, Product, RetryPolicy, WatchTarget};
    use crate::testing::{ScriptedDriver, ScriptedSource, StaticAdapter, Tick, drain, in_stock};

    fn supervisor(source: ScriptedSource, driver: ScriptedDriver) -> Supervisor {
        SupervisorBuilder::new()
            .register(Arc::new(StaticAdapter::new("demo", source, driver)))
            .unwrap()
            .build()
            .unwrap()
    }

    fn group(name: &str, tasks: Vec<TaskConfig>) -> GroupConfig {
        let mut group = GroupConfig::new(
            name,
            "demo",
            vec![WatchTarget::new("sku").with_max_price(100.0)],
        )
        .with_delay(Duration::from_secs(1));
        group.tasks = tasks;
        group
    }

    fn guest() -> TaskConfig {
        TaskConfig::guest(RetryPolicy::fixed(Duration::from_millis(100)))
    }

    async fn wait_for_task(sv: &Supervisor, id: TaskId, status: TaskStatus) {
        while sv.task_status(id) != Some(status) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn price_drop_scenario_checks_out_at_new_price() {
        let sv = supervisor(
            ScriptedSource::new([
                Tick::single("sku", in_stock(120.0)),
                Tick::single("sku", in_stock(90.0)),
            ]),
            ScriptedDriver::new(),
        );
        let mut sub = sv.subscribe();

        let group_id = sv.start_group(group("consoles", vec![guest()])).unwrap();
        let task_id = sv.status()[0].tasks[0].0;
        wait_for_task(&sv, task_id, TaskStatus::CheckedOut).await;
        let reports = sv.shutdown().await;

        let events = drain(&mut sub);
        let products: Vec<&Product> = events
            .iter()
            .filter_map(|e| match &**e {
                Event::Product(p) => Some(p),
                _ => None,
            })
            .flat_map(|p| p.products.iter())
            .collect();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].price, 90.0);

        let monitor: Vec<MonitorStatus> = events
            .iter()
            .filter_map(|e| match &**e {
                Event::Monitor(m) if m.group_id == group_id => Some(m.status),
                _ => None,
            })
            .collect();
        let searching = monitor.iter().position(|s| *s == MonitorStatus::Searching).unwrap();
        assert_eq!(monitor[searching + 1], MonitorStatus::SendingToTasks);

        let task: Vec<TaskStatus> = events
            .iter()
            .filter_map(|e| match &**e {
                Event::Task(t) if t.task_id == task_id => Some(t.status),
                _ => None,
            })
            .collect();
        let waiting = task.iter().position(|s| *s == TaskStatus::WaitingForMonitor).unwrap();
        assert_eq!(task[waiting + 1], TaskStatus::AddingToCart);

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, TaskStatus::CheckedOut);
        assert_eq!(reports[0].state.product.as_ref().unwrap().price, 90.0);
        assert!(matches!(events.last().map(|e| &**e), Some(Event::Close(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn wave_reaches_every_task_even_when_the_bus_overflows() {
        let sv = SupervisorBuilder::new()
            .register(Arc::new(StaticAdapter::new(
                "demo",
                ScriptedSource::repeating(Tick::single("sku", in_stock(50.0))),
                ScriptedDriver::new().with_login_latency(Duration::from_secs(2)),
            )))
            .unwrap()
            .settings(SupervisorConfig {
                bus_capacity: 8,
                ..SupervisorConfig::default()
            })
            .build()
            .unwrap();
        let _idle_observer = sv.subscribe();
        let task = guest().with_credential(Credential {
            identifier: "a@b.c".to_string(),
            secret: "pw".to_string(),
        });

        sv.start_group(group("g", vec![task; 40])).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let counts = sv.status()[0].counts.clone();
        assert_eq!(counts.checked_out, 40);
        assert_eq!(counts.running, 0);
        sv.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_group_name_is_rejected() {
        let sv = supervisor(ScriptedSource::new([]), ScriptedDriver::new());
        sv.start_group(group("g", vec![])).unwrap();
        assert!(matches!(
            sv.start_group(group("g", vec![])),
            Err(SupervisorError::AlreadyRunning(name)) if name == "g"
        ));
        sv.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_retailer_is_rejected() {
        let sv = supervisor(ScriptedSource::new([]), ScriptedDriver::new());
        let mut config = group("g", vec![]);
        config.retailer = "nowhere".to_string();
        assert!(matches!(
            sv.start_group(config),
            Err(SupervisorError::Registry(RegistryError::NotRegistered(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_task_returns_idle_report() {
        let sv = supervisor(ScriptedSource::new([]), ScriptedDriver::new());
        let group_id = sv.start_group(group("g", vec![])).unwrap();
        let task_id = sv.add_task(group_id, guest()).unwrap();
        wait_for_task(&sv, task_id, TaskStatus::WaitingForMonitor).await;

        let report = sv.stop_task(task_id).await.unwrap();
        assert_eq!(report.status, TaskStatus::Idle);
        assert_eq!(sv.task_status(task_id), None);
        assert!(matches!(
            sv.stop_task(task_id).await,
            Err(SupervisorError::UnknownTask(_))
        ));
        sv.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_group_drops_shared_sessions() {
        let sv = supervisor(ScriptedSource::new([]), ScriptedDriver::new());
        let task = guest().with_credential(Credential {
            identifier: "a@b.c".to_string(),
            secret: "pw".to_string(),
        });
        let group_id = sv.start_group(group("g", vec![task.clone(), task])).unwrap();
        for (id, _) in sv.status()[0].tasks.clone() {
            wait_for_task(&sv, id, TaskStatus::WaitingForMonitor).await;
        }
        assert_eq!(sv.pool().len(), 1);

        let reports = sv.stop_group(group_id).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status == TaskStatus::Idle));
        assert!(sv.pool().is_empty());
        assert_eq!(sv.monitor_status(group_id), None);
        assert!(matches!(
            sv.stop_group(group_id).await,
            Err(SupervisorError::UnknownGroup(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn add_task_to_unknown_group_fails() {
        let sv = supervisor(ScriptedSource::new([]), ScriptedDriver::new());
        assert!(matches!(
            sv.add_task(GroupId::generate(), guest()),
            Err(SupervisorError::UnknownGroup(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_idempotent_and_closes_once() {
        let sv = supervisor(ScriptedSource::new([]), ScriptedDriver::new());
        let mut sub = sv.subscribe();
        sv.start_group(group("g", vec![guest()])).unwrap();

        assert_eq!(sv.shutdown().await.len(), 1);
        assert!(sv.shutdown().await.is_empty());
        assert!(matches!(
            sv.start_group(group("h", vec![])),
            Err(SupervisorError::ShutDown)
        ));

        let closes = drain(&mut sub)
            .iter()
            .filter(|e| matches!(&***e, Event::Close(_)))
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_monitor_and_task_counts() {
        let sv = supervisor(ScriptedSource::new([]), ScriptedDriver::new());
        let group_id = sv.start_group(group("g", vec![guest(), guest()])).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let status = sv.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].group_id, group_id);
        assert_eq!(status[0].monitor, MonitorStatus::Searching);
        assert_eq!(status[0].counts.running, 2);
        assert!(status[0]
            .tasks
            .iter()
            .all(|(_, s)| *s == TaskStatus::WaitingForMonitor));
        sv.shutdown().await;
    }
}
