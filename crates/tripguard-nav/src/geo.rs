use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("coordinate is not finite (lat={lat}, lon={lon})")]
    NonFinite { lat: f64, lon: f64 },
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeRange(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeRange(f64),
}

/// WGS-84 position in decimal degrees. Only constructible with in-range values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate", into = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawCoordinate {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = GeoError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lon)
    }
}

impl From<Coordinate> for RawCoordinate {
    fn from(c: Coordinate) -> Self {
        RawCoordinate { lat: c.lat, lon: c.lon }
    }
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(GeoError::NonFinite { lat, lon });
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::LatitudeRange(lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::LongitudeRange(lon));
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn distance_m(&self, other: &Coordinate) -> f64 {
        haversine_m(self.lat, self.lon, other.lat, other.lon)
    }

    /// Linear blend in degree space, `t` clamped to [0, 1]. Good enough for
    /// the short segments of a road polyline; does not wrap the antimeridian.
    pub fn lerp(&self, other: &Coordinate, t: f64) -> Coordinate {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        Coordinate {
            lat: (self.lat + t * (other.lat - self.lat)).clamp(-90.0, 90.0),
            lon: (self.lon + t * (other.lon - self.lon)).clamp(-180.0, 180.0),
        }
    }
}

/// Great-circle surface distance in meters. Inputs are not validated; NaN in, NaN out.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Point `meters` north of `origin`. Only used to build fixtures at known distances.
#[cfg(test)]
pub(crate) fn offset_north(origin: Coordinate, meters: f64) -> Coordinate {
    let dlat = (meters / EARTH_RADIUS_M).to_degrees();
    Coordinate::new(origin.lat + dlat, origin.lon).unwrap()
}
