use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub coord: Coordinate,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub ts: OffsetDateTime,
}

impl LocationSample {
    pub fn new(coord: Coordinate, speed_mps: Option<f64>, ts: OffsetDateTime) -> Self {
        Self { coord, speed_mps: normalize_speed(speed_mps), accuracy_m: None, ts }
    }

    pub fn with_accuracy(mut self, accuracy_m: Option<f64>) -> Self {
        self.accuracy_m = accuracy_m.filter(|a| a.is_finite() && *a >= 0.0);
        self
    }

    /// Speed usable for classification. Providers report -1 or NaN when unknown.
    pub fn speed(&self) -> Option<f64> {
        normalize_speed(self.speed_mps)
    }
}

fn normalize_speed(speed: Option<f64>) -> Option<f64> {
    speed.filter(|s| s.is_finite() && *s >= 0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("location source unavailable: {0}")]
    Unavailable(String),
    #[error("location stream failed: {0}")]
    Stream(String),
}

impl ProviderError {
    pub fn unavailable(e: &anyhow::Error) -> Self {
        Self::Unavailable(format!("{:#}", e))
    }

    pub fn stream(e: &anyhow::Error) -> Self {
        Self::Stream(format!("{:#}", e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Minimum time between delivered samples.
    pub interval: Duration,
    /// Minimum movement since the last delivered sample.
    pub distance_filter_m: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self { interval: Duration::from_millis(1000), distance_filter_m: 1.0 }
    }
}

/// Device position capability.
#[allow(async_fn_in_trait)]
pub trait LocationProvider {
    async fn request_permission(&mut self) -> Result<Permission, ProviderError>;

    async fn current_position(&mut self) -> Result<LocationSample, ProviderError>;

    async fn watch_position(&mut self, opts: WatchOptions) -> Result<Subscription, ProviderError>;
}

type Slot = Option<Result<LocationSample, ProviderError>>;

/// Live sample stream. Holds the pump task; dropping the subscription stops it.
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<Slot>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Spawns `pump` with a sender that enforces `opts`. The pump returns when
    /// its source is exhausted or the subscription is gone.
    pub fn spawn<F, Fut>(opts: WatchOptions, pump: F) -> Self
    where
        F: FnOnce(SampleSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(pump(SampleSender { tx, opts, last: None }));
        Self { rx, task }
    }

    /// Latest sample not yet seen. Intermediate samples are overwritten if the
    /// consumer is slower than the source. `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<LocationSample, ProviderError>> {
        loop {
            if self.rx.changed().await.is_err() {
                return None;
            }
            if let Some(item) = self.rx.borrow_and_update().clone() {
                return Some(item);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct SampleSender {
    tx: watch::Sender<Slot>,
    opts: WatchOptions,
    last: Option<(Instant, Coordinate)>,
}

impl SampleSender {
    /// Returns false once nobody is listening.
    pub fn send(&mut self, sample: LocationSample) -> bool {
        if self.tx.is_closed() {
            return false;
        }
        let now = Instant::now();
        if let Some((at, coord)) = self.last {
            if now.duration_since(at) < self.opts.interval {
                debug!("watch: sample throttled");
                return true;
            }
            if coord.distance_m(&sample.coord) < self.opts.distance_filter_m {
                debug!("watch: sample below distance filter");
                return true;
            }
        }
        self.last = Some((now, sample.coord));
        self.tx.send(Some(Ok(sample))).is_ok()
    }

    pub fn fail(self, err: ProviderError) {
        let _ = self.tx.send(Some(Err(err)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(lat: f64) -> LocationSample {
        LocationSample::new(Coordinate::new(lat, 8.0).unwrap(), None, OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn unknown_speed_normalizes_to_none() {
        let c = Coordinate::new(0.0, 0.0).unwrap();
        assert_eq!(LocationSample::new(c, Some(-1.0), OffsetDateTime::UNIX_EPOCH).speed(), None);
        assert_eq!(LocationSample::new(c, Some(f64::NAN), OffsetDateTime::UNIX_EPOCH).speed(), None);
        assert_eq!(LocationSample::new(c, Some(3.5), OffsetDateTime::UNIX_EPOCH).speed(), Some(3.5));
    }

    #[test]
    fn sample_parses_from_json_line() {
        let s: LocationSample = serde_json::from_str(
            r#"{"coord":{"lat":47.0,"lon":8.0},"speed_mps":4.2,"ts":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(s.coord.lat(), 47.0);
        assert_eq!(s.speed(), Some(4.2));
        assert_eq!(s.ts.unix_timestamp(), 1_714_557_600);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_ends_after_last_sample() {
        let opts = WatchOptions { interval: Duration::ZERO, distance_filter_m: 0.0 };
        let mut sub = Subscription::spawn(opts, |mut tx| async move {
            tx.send(sample(47.0));
        });
        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.coord.lat(), 47.0);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn distance_filter_drops_small_moves() {
        let opts = WatchOptions { interval: Duration::ZERO, distance_filter_m: 1000.0 };
        let mut sub = Subscription::spawn(opts, |mut tx| async move {
            tx.send(sample(47.0));
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(sample(47.0001));
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(sample(48.0));
        });
        assert_eq!(sub.next().await.unwrap().unwrap().coord.lat(), 47.0);
        assert_eq!(sub.next().await.unwrap().unwrap().coord.lat(), 48.0);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stream_failure_is_delivered() {
        let mut sub = Subscription::spawn(WatchOptions::default(), |tx| async move {
            tx.fail(ProviderError::Stream("device gone".into()));
        });
        let err = sub.next().await.unwrap().unwrap_err();
        assert_eq!(err, ProviderError::Stream("device gone".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_subscription_stops_pump() {
        let (done_tx, mut done_rx) = tokio::sync::oneshot::channel::<()>();
        let sub = Subscription::spawn(WatchOptions::default(), |_tx| async move {
            let _guard = done_tx;
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        drop(sub);
        // aborted task drops its guard, closing the oneshot

        assert!((&mut done_rx).await.is_err());
    }
}
