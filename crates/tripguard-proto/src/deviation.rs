use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DangerLevel {
    Low,
    Medium,
    High,
}

impl DangerLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DangerLevel::Low => "LOW",
            DangerLevel::Medium => "MEDIUM",
            DangerLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for DangerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance to the destination plus its classification, recomputed per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathDeviation {
    pub distance_m: f64,
    pub danger_level: DangerLevel,
    pub reason: String,
}

impl PathDeviation {
    /// Distance rounded to whole meters, the way it is shown to the user.
    pub fn rounded_m(&self) -> i64 {
        self.distance_m.round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(DangerLevel::Low < DangerLevel::Medium);
        assert!(DangerLevel::Medium < DangerLevel::High);
    }

    #[test]
    fn level_serializes_in_caps() {
        let s = serde_json::to_string(&DangerLevel::Medium).unwrap();
        assert_eq!(s, "\"MEDIUM\"");
        assert_eq!(DangerLevel::High.to_string(), "HIGH");
    }

    #[test]
    fn rounding_matches_display() {
        let d = PathDeviation {
            distance_m: 150.6,
            danger_level: DangerLevel::High,
            reason: "x".into(),
        };
        assert_eq!(d.rounded_m(), 151);
    }
}
