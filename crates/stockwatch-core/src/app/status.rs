//! Status views returned by `Supervisor::status`.

use serde::Serialize;

use crate::domain::{GroupId, MonitorStatus, TaskId, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub running: usize,
    pub checked_out: usize,
    pub card_declined: usize,
    pub checkout_failed: usize,
    pub stopped: usize,
}

impl TaskCounts {
    /// `finished`: the Task's loop has returned.
    pub fn record(&mut self, status: TaskStatus, finished: bool) {
        if !finished {
            self.running += 1;
            return;
        }
        match status {
            TaskStatus::CheckedOut => self.checked_out += 1,
            TaskStatus::CardDeclined => self.card_declined += 1,
            TaskStatus::CheckoutFailed => self.checkout_failed += 1,
            _ => self.stopped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.running + self.checked_out + self.card_declined + self.checkout_failed + self.stopped
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub group_id: GroupId,
    pub name: String,
    pub retailer: String,
    pub monitor: MonitorStatus,
    pub tasks: Vec<(TaskId, TaskStatus)>,
    pub counts: TaskCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_bucket_by_outcome() {
        let mut counts = TaskCounts::default();
        counts.record(TaskStatus::Idle, false);
        counts.record(TaskStatus::CheckingOut, false);
        counts.record(TaskStatus::CheckedOut, true);
        counts.record(TaskStatus::CardDeclined, true);
        counts.record(TaskStatus::Idle, true);
        assert_eq!(counts.running, 2);
        assert_eq!(counts.checked_out, 1);
        assert_eq!(counts.card_declined, 1);
        assert_eq!(counts.stopped, 1);
        assert_eq!(counts.total(), 5);
    }
}
