//! EventLogger - bus observer that logs every event through `tracing`.
//!
//! ```text
//! [monitor] group=group-01J.. status=SendingToTasks type=Update
//! [product] group=group-01J.. retailer=demo products=1
//! [task]    task=task-01J.. status=AddingToCart type=Update
//! [auth]    task=task-01J.. credential=a@b.c outcome=LoggedIn
//! [close]   reason="supervisor shutdown"
//! ```

use crate::bus::{EventBus, Subscription};
use crate::domain::{Event, EventType};

pub struct EventLogger {
    sub: Subscription,
}

impl EventLogger {
    /// Subscribes now; events published before this call are not seen.
    pub fn new(bus: &EventBus) -> Self {
        Self {
            sub: bus.subscribe(),
        }
    }

    /// Logs events until a `Close` event arrives or the bus goes away.
    /// Returns the number of events logged, including the `Close`.
    pub async fn run(mut self) -> usize {
        let mut logged = 0;
        while let Some(event) = self.sub.recv().await {
            logged += 1;
            log_event(&event);
            if matches!(*event, Event::Close(_)) {
                break;
            }
        }
        logged
    }
}

fn log_event(event: &Event) {
    match event {
        Event::Monitor(m) => match m.event_type {
            EventType::Fail => {
                tracing::warn!(group = %m.group_id, status = ?m.status, payload = %m.payload, "[monitor]")
            }
            _ => {
                tracing::debug!(group = %m.group_id, status = ?m.status, event_type = ?m.event_type, "[monitor]")
            }
        },
        Event::Product(p) => {
            let targets: Vec<&str> = p.products.iter().map(|p| p.target_id.as_str()).collect();
            tracing::info!(group = %p.group_id, retailer = %p.retailer, ?targets, "[product]");
        }
        Event::Task(t) => match t.event_type {
            EventType::Complete => {
                tracing::info!(task = %t.task_id, status = ?t.status, payload = %t.payload, "[task]")
            }
            EventType::Fail => {
                tracing::warn!(task = %t.task_id, status = ?t.status, payload = %t.payload, "[task]")
            }
            _ => {
                tracing::debug!(task = %t.task_id, status = ?t.status, event_type = ?t.event_type, "[task]")
            }
        },
        Event::Auth(a) => {
            tracing::info!(group = %a.group_id, task = %a.task_id, credential = %a.credential, outcome = ?a.outcome, "[auth]");
        }
        Event::Close(c) => {
            tracing::info!(reason = %c.reason, "[close]");
        }
    }
}
