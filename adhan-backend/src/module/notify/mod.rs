//! Notification scheduling, snooze and the persisted ledger

mod ledger;
mod scheduler;
mod state;

pub use ledger::{NotificationKind, NotificationLedger, ScheduledNotification, SnoozeState};
pub use scheduler::NotificationScheduler;
pub use state::{NotificationEvent, NotificationState};
