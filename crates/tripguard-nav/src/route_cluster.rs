//! Route familiarity: trips between the same two areas are grouped by the
//! overlap of the geohash cells their polylines pass through. A cluster is
//! UNUSUAL until it has been driven `NORMAL_AFTER_TRIPS` times.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};
use tripguard_proto::{ClusterMatch, RouteStatus};

use crate::geo::{Coordinate, GeoError};

/// Minimum Jaccard similarity for a trip to join an existing cluster.
pub const MATCH_SIMILARITY: f64 = 0.70;
pub const NORMAL_AFTER_TRIPS: u32 = 10;
pub const SAMPLE_STEP_M: f64 = 100.0;
/// ~150 m cells along the route.
pub const SIGNATURE_PRECISION: usize = 7;
/// ~5 km cells for origin and destination.
pub const ENDPOINT_PRECISION: usize = 5;

const GEOHASH_BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    #[error("polyline is empty")]
    Empty,
    #[error("polyline truncated at byte {0}")]
    Truncated(usize),
    #[error("invalid polyline byte 0x{byte:02x} at {at}")]
    BadByte { at: usize, byte: u8 },
    #[error("polyline value too long at byte {0}")]
    Overlong(usize),
    #[error("polyline point: {0}")]
    Coordinate(#[from] GeoError),
}

/// Decodes a Google encoded polyline (1e-5 degree precision).
pub fn decode_polyline(encoded: &str) -> Result<Vec<Coordinate>, RouteError> {
    let bytes = encoded.as_bytes();
    let mut idx = 0;
    let (mut lat, mut lon) = (0i64, 0i64);
    let mut out = Vec::new();
    while idx < bytes.len() {
        lat += next_value(bytes, &mut idx)?;
        lon += next_value(bytes, &mut idx)?;
        out.push(Coordinate::new(lat as f64 / 1e5, lon as f64 / 1e5)?);
    }
    Ok(out)
}

fn next_value(bytes: &[u8], idx: &mut usize) -> Result<i64, RouteError> {
    let mut result = 0i64;
    let mut shift = 0;
    loop {
        let &c = bytes.get(*idx).ok_or(RouteError::Truncated(*idx))?;
        if !(63..=126).contains(&c) {
            return Err(RouteError::BadByte { at: *idx, byte: c });
        }
        if shift > 30 {
            return Err(RouteError::Overlong(*idx));
        }
        *idx += 1;
        let chunk = i64::from(c - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    // zigzag
    Ok(if result & 1 == 1 { !(result >> 1) } else { result >> 1 })
}

/// Points every `step_m` meters along the polyline, starting at its first
/// vertex. A tail shorter than one step is dropped.
pub fn resample_every_m(points: &[Coordinate], step_m: f64) -> Vec<Coordinate> {
    let Some((&first, rest)) = points.split_first() else {
        return Vec::new();
    };
    if !(step_m.is_finite() && step_m > 0.0) {
        return points.to_vec();
    }
    let mut out = vec![first];
    let mut acc = 0.0;
    let mut a = first;
    for &b in rest {
        let mut seg = a.distance_m(&b);
        while seg > 0.0 && acc + seg >= step_m {
            let p = a.lerp(&b, (step_m - acc) / seg);
            out.push(p);
            a = p;
            seg = a.distance_m(&b);
            acc = 0.0;
        }
        acc += seg;
        a = b;
    }
    out
}

pub fn geohash(c: Coordinate, precision: usize) -> String {
    let (mut lat_lo, mut lat_hi) = (-90.0_f64, 90.0_f64);
    let (mut lon_lo, mut lon_hi) = (-180.0_f64, 180.0_f64);
    let mut out = String::with_capacity(precision);
    let mut even = true;
    let mut bits = 0;
    let mut ch = 0usize;
    while out.len() < precision {
        let (lo, hi, v) = if even {
            (&mut lon_lo, &mut lon_hi, c.lon())
        } else {
            (&mut lat_lo, &mut lat_hi, c.lat())
        };
        let mid = (*lo + *hi) / 2.0;
        ch <<= 1;
        if v >= mid {
            ch |= 1;
            *lo = mid;
        } else {
            *hi = mid;
        }
        even = !even;
        bits += 1;
        if bits == 5 {
            out.push(GEOHASH_BASE32[ch] as char);
            bits = 0;
            ch = 0;
        }
    }
    out
}

/// Set of cells the route passes through, sampled every `SAMPLE_STEP_M`.
pub fn signature(points: &[Coordinate]) -> BTreeSet<String> {
    resample_every_m(points, SAMPLE_STEP_M)
        .into_iter()
        .map(|p| geohash(p, SIGNATURE_PRECISION))
        .collect()
}

pub fn signature_from_polyline(encoded: &str) -> Result<BTreeSet<String>, RouteError> {
    Ok(signature(&decode_polyline(encoded)?))
}

pub fn endpoint_hash(c: Coordinate) -> String {
    geohash(c, ENDPOINT_PRECISION)
}

/// |A ∩ B| / |A ∪ B|, 0 for two empty sets.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    inter as f64 / union.max(1) as f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCluster {
    pub id: u64,
    pub origin_hash: String,
    pub dest_hash: String,
    /// Signature of the trip that opened the cluster.
    pub geohashes: BTreeSet<String>,
    pub trips_count: u32,
    pub status: RouteStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClusterStore {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    clusters: Vec<RouteCluster>,
}

impl ClusterStore {
    /// Reads a JSON store; a missing file is an empty store.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("routes: no store at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path).with_context(|| format!("read route store {}", path.display()))?;
        serde_json::from_str(&s).with_context(|| format!("parse route store {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let s = serde_json::to_string_pretty(self)?;
        std::fs::write(path, s).with_context(|| format!("write route store {}", path.display()))
    }

    pub fn clusters(&self) -> &[RouteCluster] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Files one trip: joins the most similar cluster with the same endpoint
    /// cells if it reaches `MATCH_SIMILARITY`, otherwise opens a new UNUSUAL one.
    pub fn clusterize(
        &mut self,
        origin: Coordinate,
        destination: Coordinate,
        encoded_polyline: &str,
        now: OffsetDateTime,
    ) -> Result<ClusterMatch, RouteError> {
        let sig = signature_from_polyline(encoded_polyline)?;
        if sig.is_empty() {
            return Err(RouteError::Empty);
        }
        let origin_hash = endpoint_hash(origin);
        let dest_hash = endpoint_hash(destination);

        let mut best = None;
        let mut best_sim = 0.0;
        for (i, c) in self.clusters.iter().enumerate() {
            if c.origin_hash != origin_hash || c.dest_hash != dest_hash {
                continue;
            }
            let sim = jaccard(&sig, &c.geohashes);
            if sim > best_sim {
                best = Some(i);
                best_sim = sim;
            }
        }
        let similarity = (best_sim * 1000.0).round() / 1000.0;

        if let Some(i) = best.filter(|_| best_sim >= MATCH_SIMILARITY) {
            let c = &mut self.clusters[i];
            c.trips_count += 1;
            c.last_seen = now;
            if c.trips_count >= NORMAL_AFTER_TRIPS {
                c.status = RouteStatus::Normal;
            }
            debug!("routes: trip joined cluster {} (sim={}, trips={})", c.id, similarity, c.trips_count);
            return Ok(ClusterMatch {
                cluster_id: c.id,
                similarity,
                status: c.status,
                trips_count: c.trips_count,
                created: false,
            });
        }

        self.next_id += 1;
        let cluster = RouteCluster {
            id: self.next_id,
            origin_hash,
            dest_hash,
            geohashes: sig,
            trips_count: 1,
            status: RouteStatus::Unusual,
            last_seen: now,
        };
        info!(
            "routes: new cluster {} {}->{} ({} cells, best sim={})",
            cluster.id,
            cluster.origin_hash,
            cluster.dest_hash,
            cluster.geohashes.len(),
            similarity
        );
        let m = ClusterMatch {
            cluster_id: cluster.id,
            similarity,
            status: cluster.status,
            trips_count: cluster.trips_count,
            created: true,
        };
        self.clusters.push(cluster);
        Ok(m)
    }
}
