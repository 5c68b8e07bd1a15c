use serde::Deserialize;
use tripguard_proto::{DangerLevel, PathDeviation};

const REASON_HIGH: &str = "Significantly off the recommended route";
const REASON_MEDIUM: &str = "Moderately off the recommended route";
const REASON_LOW: &str = "Slightly off the recommended route";
const REASON_SPEED: &str = " - Moving at high speed";

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DangerThresholds {
    #[serde(default = "default_high_distance_m")]
    pub high_distance_m: f64,
    #[serde(default = "default_medium_distance_m")]
    pub medium_distance_m: f64,
    #[serde(default = "default_high_speed_mps")]
    pub high_speed_mps: f64,
}

fn default_high_distance_m() -> f64 {
    100.0
}

fn default_medium_distance_m() -> f64 {
    50.0
}

fn default_high_speed_mps() -> f64 {
    20.0
}

impl Default for DangerThresholds {
    fn default() -> Self {
        Self {
            high_distance_m: default_high_distance_m(),
            medium_distance_m: default_medium_distance_m(),
            high_speed_mps: default_high_speed_mps(),
        }
    }
}

impl DangerThresholds {
    /// Distance decides the base level; speed can only escalate to HIGH and
    /// appends to the distance reason rather than replacing it.
    pub fn assess(&self, distance_m: f64, speed_mps: Option<f64>) -> PathDeviation {
        let (mut danger_level, mut reason) = if distance_m > self.high_distance_m {
            (DangerLevel::High, REASON_HIGH.to_string())
        } else if distance_m > self.medium_distance_m {
            (DangerLevel::Medium, REASON_MEDIUM.to_string())
        } else {
            (DangerLevel::Low, REASON_LOW.to_string())
        };

        if let Some(speed) = speed_mps {
            if speed > 0.0 && speed > self.high_speed_mps {
                danger_level = DangerLevel::High;
                reason.push_str(REASON_SPEED);
            }
        }

        PathDeviation { distance_m, danger_level, reason }
    }
}

pub fn assess_danger(distance_m: f64, speed_mps: Option<f64>) -> PathDeviation {
    DangerThresholds::default().assess(distance_m, speed_mps)
}
