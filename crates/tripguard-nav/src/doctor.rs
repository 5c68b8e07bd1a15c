use anyhow::Result;

use crate::danger::DangerThresholds;
use crate::geo::Coordinate;
use crate::provider::WatchOptions;
use crate::sos::SosConfig;

pub fn check_destination(dest: Option<&Coordinate>) -> Result<()> {
    let dest = dest.ok_or_else(|| anyhow::anyhow!("trip.destination missing"))?;
    // (0, 0) is almost always an unset field rather than a real trip
    anyhow::ensure!(dest.lat() != 0.0 || dest.lon() != 0.0, "trip.destination is (0, 0)");
    Ok(())
}

pub fn check_thresholds(t: &DangerThresholds) -> Result<()> {
    anyhow::ensure!(
        t.medium_distance_m.is_finite() && t.medium_distance_m > 0.0,
        "danger.medium_distance_m must be > 0"
    );
    anyhow::ensure!(t.high_distance_m.is_finite(), "danger.high_distance_m must be finite");
    anyhow::ensure!(
        t.medium_distance_m < t.high_distance_m,
        "danger.medium_distance_m must be below danger.high_distance_m"
    );
    anyhow::ensure!(
        t.high_speed_mps.is_finite() && t.high_speed_mps > 0.0,
        "danger.high_speed_mps must be > 0"
    );
    Ok(())
}

pub fn check_watch(w: &WatchOptions) -> Result<()> {
    let ms = w.interval.as_millis();
    anyhow::ensure!((100..=60_000).contains(&ms), "location.interval_ms should be 100..60000");
    anyhow::ensure!(
        w.distance_filter_m.is_finite() && w.distance_filter_m >= 0.0,
        "location.distance_filter_m must be >= 0"
    );
    Ok(())
}

pub fn check_sos(cfg: &SosConfig) -> Result<()> {
    anyhow::ensure!(!cfg.emergency_number.trim().is_empty(), "sos.emergency_number missing");
    for c in &cfg.contacts {
        anyhow::ensure!(!c.phone.trim().is_empty(), "sos contact {} has no phone number", c.name);
    }
    Ok(())
}
