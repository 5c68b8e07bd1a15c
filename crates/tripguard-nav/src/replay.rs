use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::provider::{LocationProvider, LocationSample, Permission, ProviderError, Subscription, WatchOptions};

/// Replays recorded samples at a fixed pace.
#[derive(Debug, Clone)]
pub struct ReplayProvider {
    samples: Vec<LocationSample>,
    pace: Duration,
    permission: Permission,
}

impl ReplayProvider {
    pub fn new(samples: Vec<LocationSample>, pace: Duration) -> Self {
        Self { samples, pace, permission: Permission::Granted }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    /// One JSON-encoded `LocationSample` per line; blank lines and `#` comments are ignored.
    pub fn from_jsonl(path: &Path, pace: Duration) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read replay file {}", path.display()))?;
        let samples = parse_jsonl(&text).with_context(|| format!("parse replay file {}", path.display()))?;
        info!("replay: loaded {} samples from {}", samples.len(), path.display());
        Ok(Self::new(samples, pace))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn parse_jsonl(text: &str) -> Result<Vec<LocationSample>> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .map(|(i, l)| serde_json::from_str(l).with_context(|| format!("line {}", i + 1)))
        .collect()
}

impl LocationProvider for ReplayProvider {
    async fn request_permission(&mut self) -> Result<Permission, ProviderError> {
        Ok(self.permission)
    }

    async fn current_position(&mut self) -> Result<LocationSample, ProviderError> {
        self.samples
            .first()
            .copied()
            .ok_or_else(|| ProviderError::Unavailable("replay has no samples".into()))
    }

    async fn watch_position(&mut self, opts: WatchOptions) -> Result<Subscription, ProviderError> {
        let samples = self.samples.clone();
        let pace = self.pace;
        Ok(Subscription::spawn(opts, move |mut tx| async move {
            for s in samples {
                if !tx.send(s) {
                    return;
                }
                tokio::time::sleep(pace).await;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn jsonl_skips_comments_and_reports_bad_lines() {
        let text = "# recorded on the A1\n\
                    {\"coord\":{\"lat\":47.0,\"lon\":8.0},\"ts\":\"2024-05-01T10:00:00Z\"}\n\
                    \n\
                    {\"coord\":{\"lat\":47.001,\"lon\":8.0},\"speed_mps\":12.0}\n";
        let samples = parse_jsonl(text).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].speed(), Some(12.0));

        let bad = "{\"coord\":{\"lat\":147.0,\"lon\":8.0}}\n";
        let err = parse_jsonl(bad).unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "{{\"coord\":{{\"lat\":1.0,\"lon\":2.0}}}}").unwrap();
        f.flush().unwrap();
        let p = ReplayProvider::from_jsonl(f.path(), Duration::from_secs(1)).unwrap();
        assert_eq!(p.len(), 1);
    }

    #[tokio::test]
    async fn empty_replay_has_no_position() {
        let mut p = ReplayProvider::new(Vec::new(), Duration::ZERO);
        assert!(p.is_empty());
        assert!(matches!(p.current_position().await, Err(ProviderError::Unavailable(_))));
    }
}
