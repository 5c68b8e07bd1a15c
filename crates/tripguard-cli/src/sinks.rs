use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;
use tripguard_nav::Alerter;
use tripguard_proto::{ActionKind, Alert, TripEvent};

/// Shows alerts on the terminal and in the log.
#[derive(Debug, Default)]
pub struct ConsoleAlerter;

impl Alerter for ConsoleAlerter {
    fn notify(&mut self, alert: &Alert) {
        warn!("alert: {} - {}", alert.title, alert.message.replace('\n', " "));
        println!("[{}]", alert.title);
        println!("{}", alert.message);
        for a in &alert.actions {
            match &a.kind {
                ActionKind::Dismiss => println!("  ({})", a.label),
                ActionKind::Call(number) => println!("  ({}: tel:{})", a.label, number),
                ActionKind::OpenUrl(url) => println!("  ({}: {})", a.label, url),
            }
        }
        if !alert.recipients.is_empty() {
            println!("  -> {}", alert.recipients.join(", "));
        }
    }
}

/// Append-only JSONL log of trip events.
pub struct EventLog {
    out: BufWriter<File>,
}

impl EventLog {
    pub fn open(path: &Path) -> Result<Self> {
        let f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open event log {}", path.display()))?;
        Ok(Self { out: BufWriter::new(f) })
    }

    pub fn write(&mut self, ev: &TripEvent) -> Result<()> {
        serde_json::to_writer(&mut self.out, ev).context("encode event")?;
        self.out.write_all(b"\n").context("write event")?;
        self.out.flush().context("flush event log")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripguard_proto::{DangerLevel, EventKind};

    #[test]
    fn event_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let ev = TripEvent {
            ts_unix_ms: 1_714_557_600_000,
            kind: EventKind::Deviation,
            lat: 47.0,
            lon: 8.0,
            speed_mps: None,
            distance_m: Some(150.0),
            danger_level: Some(DangerLevel::High),
            msg: "off route".into(),
        };

        EventLog::open(&path).unwrap().write(&ev).unwrap();
        EventLog::open(&path).unwrap().write(&ev).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let back: TripEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(back.kind, EventKind::Deviation);
        assert_eq!(back.danger_level, Some(DangerLevel::High));
    }
}
