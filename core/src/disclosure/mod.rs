pub mod case;
pub mod tracker;

pub use case::{CaseStatus, DisclosureCase};
pub use tracker::{CaseEvent, DisclosureTracker, LogNotificationSink, NotificationSink};
