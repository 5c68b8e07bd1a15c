use serde::Deserialize;
use tracing::{debug, info, warn};
use tripguard_proto::{Alert, DangerLevel, PathDeviation};

use crate::alert::Alerter;
use crate::danger::DangerThresholds;
use crate::geo::Coordinate;
use crate::provider::{LocationProvider, LocationSample, Permission, ProviderError, Subscription, WatchOptions};

/// When the off-route warning is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertMode {
    /// Once per excursion: fires when the alert condition starts holding and
    /// re-arms after it clears.
    #[default]
    Edge,
    /// On every sample that meets the condition.
    Level,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorUpdate {
    pub sample: LocationSample,
    pub deviation: Option<PathDeviation>,
    pub alerted: bool,
}

/// Owns at most one location subscription and turns its samples into
/// path-deviation assessments against a destination.
pub struct LocationMonitor<P, A> {
    provider: P,
    alerter: A,
    thresholds: DangerThresholds,
    alert_mode: AlertMode,
    watch: WatchOptions,

    destination: Option<Coordinate>,
    subscription: Option<Subscription>,
    current_location: Option<Coordinate>,
    loading_location: bool,
    path_deviation: Option<PathDeviation>,
    alert_latched: bool,
}

impl<P: LocationProvider, A: Alerter> LocationMonitor<P, A> {
    pub fn new(provider: P, alerter: A) -> Self {
        Self {
            provider,
            alerter,
            thresholds: DangerThresholds::default(),
            alert_mode: AlertMode::default(),
            watch: WatchOptions::default(),
            destination: None,
            subscription: None,
            current_location: None,
            loading_location: true,
            path_deviation: None,
            alert_latched: false,
        }
    }

    pub fn with_thresholds(mut self, thresholds: DangerThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_alert_mode(mut self, mode: AlertMode) -> Self {
        self.alert_mode = mode;
        self
    }

    pub fn with_watch_options(mut self, watch: WatchOptions) -> Self {
        self.watch = watch;
        self
    }

    pub fn current_location(&self) -> Option<Coordinate> {
        self.current_location
    }

    pub fn loading_location(&self) -> bool {
        self.loading_location
    }

    pub fn path_deviation(&self) -> Option<&PathDeviation> {
        self.path_deviation.as_ref()
    }

    pub fn destination(&self) -> Option<Coordinate> {
        self.destination
    }

    pub fn is_monitoring(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn alerter(&self) -> &A {
        &self.alerter
    }

    /// Replaces the destination; the previous assessment no longer applies.
    pub fn set_destination(&mut self, destination: Coordinate) {
        self.destination = Some(destination);
        self.path_deviation = None;
        self.alert_latched = false;
    }

    /// Starts tracking towards `destination`. An active session is torn down
    /// first. Failures are alerted and leave the monitor inactive.
    pub async fn start(&mut self, destination: Coordinate) -> Result<(), MonitorError> {
        if self.subscription.take().is_some() {
            info!("monitor: restarting active session");
        }
        self.set_destination(destination);

        let res = self.acquire().await;
        self.loading_location = false;

        match res {
            Ok(sub) => {
                info!(
                    "monitor: active, destination=({:.5}, {:.5})",
                    destination.lat(),
                    destination.lon()
                );
                self.subscription = Some(sub);
                Ok(())
            }
            Err(MonitorError::PermissionDenied) => {
                warn!("monitor: location permission denied");
                self.alerter.notify(&Alert::simple("Permission Denied", "Location access is required."));
                Err(MonitorError::PermissionDenied)
            }
            Err(e) => {
                warn!("monitor: setup failed: {}", e);
                self.alerter.notify(&Alert::simple("Error", "Failed to get current location."));
                Err(e)
            }
        }
    }

    async fn acquire(&mut self) -> Result<Subscription, MonitorError> {
        if self.provider.request_permission().await? == Permission::Denied {
            return Err(MonitorError::PermissionDenied);
        }

        let initial = self.provider.current_position().await?;
        info!(
            "monitor: initial location ({:.6}, {:.6}) speed={:?} accuracy={:?}",
            initial.coord.lat(),
            initial.coord.lon(),
            initial.speed(),
            initial.accuracy_m
        );
        self.current_location = Some(initial.coord);

        Ok(self.provider.watch_position(self.watch).await?)
    }

    /// Releases the subscription. No-op when inactive.
    pub fn stop(&mut self) {
        if self.subscription.take().is_some() {
            self.path_deviation = None;
            self.alert_latched = false;
            info!("monitor: stopped");
        }
    }

    /// Waits for the next sample and processes it. `Ok(None)` when inactive or
    /// once the stream has ended; a stream failure deactivates the monitor.
    pub async fn next_update(&mut self) -> Result<Option<MonitorUpdate>, MonitorError> {
        let Some(sub) = self.subscription.as_mut() else {
            return Ok(None);
        };
        match sub.next().await {
            Some(Ok(sample)) => Ok(Some(self.process_sample(sample))),
            Some(Err(e)) => {
                warn!("monitor: {}", e);
                self.alerter.notify(&Alert::simple("Error", "Failed to get current location."));
                self.stop();
                Err(e.into())
            }
            None => {
                info!("monitor: location stream ended");
                self.stop();
                Ok(None)
            }
        }
    }

    /// One monitoring step: update the location, reassess against the
    /// destination and raise the warning if due.
    pub fn process_sample(&mut self, sample: LocationSample) -> MonitorUpdate {
        debug!(
            "monitor: sample ({:.6}, {:.6}) speed={:?} accuracy={:?}",
            sample.coord.lat(),
            sample.coord.lon(),
            sample.speed(),
            sample.accuracy_m
        );
        self.current_location = Some(sample.coord);

        let Some(dest) = self.destination else {
            return MonitorUpdate { sample, deviation: None, alerted: false };
        };

        let distance = sample.coord.distance_m(&dest);
        let deviation = self.thresholds.assess(distance, sample.speed());
        debug!(
            "monitor: deviation {}m level={} reason={}",
            deviation.rounded_m(),
            deviation.danger_level,
            deviation.reason
        );

        let qualifies =
            deviation.danger_level == DangerLevel::High && deviation.distance_m > self.thresholds.high_distance_m;
        let alerted = match self.alert_mode {
            AlertMode::Level => qualifies,
            AlertMode::Edge => qualifies && !self.alert_latched,
        };
        self.alert_latched = qualifies;

        if alerted {
            warn!("monitor: {}m off path ({})", deviation.rounded_m(), deviation.reason);
            self.alerter.notify(&Alert::deviation(&deviation));
        }

        self.path_deviation = Some(deviation.clone());
        MonitorUpdate { sample, deviation: Some(deviation), alerted }
    }
}
