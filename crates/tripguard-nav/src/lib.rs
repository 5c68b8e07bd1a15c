pub mod alert;
pub mod danger;
pub mod doctor;
pub mod geo;
pub mod gnss;
pub mod monitor;
pub mod provider;
pub mod replay;
pub mod route_cluster;
pub mod sos;

pub use alert::Alerter;
pub use danger::{assess_danger, DangerThresholds};
pub use geo::{haversine_m, Coordinate, GeoError};
pub use monitor::{AlertMode, LocationMonitor, MonitorError, MonitorUpdate};
pub use provider::{LocationProvider, LocationSample, Permission, ProviderError, Subscription, WatchOptions};
pub use route_cluster::{ClusterStore, RouteCluster, RouteError};
pub use sos::{raise_sos, SosConfig, TrustedContact};
