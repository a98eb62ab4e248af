//! Straight-line travel time estimate (fallback when no router is available).
//!
//! Uses great-circle distance between parking locations and an assumed
//! speed. Ignores the road network entirely, so it only makes sense for
//! ranking nearby parkings.

use crate::traits::{AccessPoint, TravelTimeProvider};

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine-based travel time provider.
///
/// Parkings without a known location are unreachable.
#[derive(Debug, Clone)]
pub struct HaversineTravelTime {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineTravelTime {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineTravelTime {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Calculate haversine distance between two points in kilometers.
    fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
        let (lat1, lng1) = from;
        let (lat2, lng2) = to;

        let delta_lat = (lat2 - lat1).to_radians();
        let delta_lng = (lng2 - lng1).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.to_radians().cos() * lat2.to_radians().cos() * (delta_lng / 2.0).sin().powi(2);

        EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
    }

    fn km_to_seconds(&self, km: f64) -> f64 {
        km / self.speed_kmh * 3600.0
    }
}

impl TravelTimeProvider for HaversineTravelTime {
    fn travel_time(&self, from: &AccessPoint, to: &AccessPoint, _vclass: &str) -> Option<f64> {
        let km = Self::haversine_km(from.location?, to.location?);
        Some(self.km_to_seconds(km))
    }
}
