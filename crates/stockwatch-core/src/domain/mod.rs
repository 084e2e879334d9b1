//! Domain model (IDs, statuses, targets, events, outcomes, retry decisions).

pub mod checkout;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod retry;
pub mod state;
pub mod step;
pub mod target;

pub use checkout::{CheckoutState, Credential, Session, TaskContext};
pub use decision::{Decider, Decision, DefaultDecider, FailedAttempt};
pub use errors::{ErrorKind, SourceError};
pub use events::{AuthEvent, AuthOutcome, CloseEvent, Event, MonitorEvent, ProductEvent, TaskEvent};
pub use ids::{GroupId, TaskId};
pub use outcome::{StepFailure, StepOutcome};
pub use retry::RetryPolicy;
pub use state::{EventType, MonitorStatus, TaskStatus};
pub use step::Step;
pub use target::{
    Evaluation, FulfillmentKind, Product, StockReport, StockStatus, TargetMode, WatchTarget,
};
