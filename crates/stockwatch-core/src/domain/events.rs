//! Events published on the `EventBus`.
//!
//! The bus never looks inside an event. Monitors and Tasks are the only
//! producers of `Task`/`Monitor`/`Product` events; observers (UI, webhooks,
//! logging) interpret them.

use serde::Serialize;

use super::ids::{GroupId, TaskId};
use super::state::{EventType, MonitorStatus, TaskStatus};
use super::target::Product;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Auth(AuthEvent),
    Close(CloseEvent),
    Task(TaskEvent),
    Monitor(MonitorEvent),
    Product(ProductEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    /// This Task performed the login and published the session.
    LoggedIn,
    /// This Task reused a session another Task established.
    Adopted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthEvent {
    pub group_id: GroupId,
    pub task_id: TaskId,
    pub credential: String,
    pub outcome: AuthOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseEvent {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub status: TaskStatus,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorEvent {
    pub status: MonitorStatus,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub group_id: GroupId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductEvent {
    pub retailer: String,
    pub group_id: GroupId,
    pub products: Vec<Product>,
}

impl Event {
    pub fn task(
        task_id: TaskId,
        status: TaskStatus,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Self {
        Event::Task(TaskEvent {
            status,
            event_type,
            payload,
            task_id,
        })
    }

    pub fn monitor(
        group_id: GroupId,
        status: MonitorStatus,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Self {
        Event::Monitor(MonitorEvent {
            status,
            event_type,
            payload,
            group_id,
        })
    }

    pub fn product(retailer: impl Into<String>, group_id: GroupId, products: Vec<Product>) -> Self {
        Event::Product(ProductEvent {
            retailer: retailer.into(),
            group_id,
            products,
        })
    }

    pub fn close(reason: impl Into<String>) -> Self {
        Event::Close(CloseEvent {
            reason: reason.into(),
        })
    }

    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Auth(_) => "auth",
            Event::Close(_) => "close",
            Event::Task(_) => "task",
            Event::Monitor(_) => "monitor",
            Event::Product(_) => "product",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_is_internally_tagged() {
        let ev = Event::monitor(
            GroupId::generate(),
            MonitorStatus::OutOfStock,
            EventType::Update,
            serde_json::json!({}),
        );
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "monitor");
        assert_eq!(v["status"], "out_of_stock");
        assert_eq!(v["event_type"], "update");
        assert_eq!(ev.kind(), "monitor");
    }
}
