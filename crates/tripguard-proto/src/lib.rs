pub mod alert;
pub mod deviation;
pub mod event;
pub mod route;

pub use alert::{ActionKind, Alert, AlertAction};
pub use deviation::{DangerLevel, PathDeviation};
pub use event::{EventKind, TripEvent};
pub use route::{ClusterMatch, RouteStatus};
