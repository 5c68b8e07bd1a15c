use serde::{Deserialize, Serialize};
use std::fmt;

/// Familiarity of a route between the same two areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStatus {
    Unusual,
    Normal,
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RouteStatus::Unusual => "UNUSUAL",
            RouteStatus::Normal => "NORMAL",
        })
    }
}

/// Outcome of filing one trip into the route clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMatch {
    pub cluster_id: u64,
    /// Jaccard similarity to the best candidate, three decimals.
    pub similarity: f64,
    pub status: RouteStatus,
    pub trips_count: u32,
    /// A new cluster was opened for this trip.
    #[serde(default)]
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_serializes_with_caps_status() {
        let m = ClusterMatch {
            cluster_id: 3,
            similarity: 0.875,
            status: RouteStatus::Unusual,
            trips_count: 1,
            created: true,
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["status"], "UNUSUAL");
        assert_eq!(v["cluster_id"], 3);
        assert_eq!(RouteStatus::Normal.to_string(), "NORMAL");
    }
}
