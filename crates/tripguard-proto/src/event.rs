use serde::{Deserialize, Serialize};

use crate::deviation::DangerLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Location,
    Deviation,
    Alert,
    Sos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripEvent {
    pub ts_unix_ms: i64,
    pub kind: EventKind,
    pub lat: f64,
    pub lon: f64,
    pub speed_mps: Option<f64>,
    pub distance_m: Option<f64>,
    pub danger_level: Option<DangerLevel>,
    pub msg: String,
}
