//! OSRM HTTP adapter for travel times.
//!
//! Uses the `table` service so the whole parking matrix costs one request.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use crate::traits::{AccessPoint, TravelTimeProvider};

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    /// Profile used for classes missing from `profiles`.
    pub profile: String,
    /// Vehicle class → OSRM profile.
    pub profiles: BTreeMap<String, String>,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            profiles: BTreeMap::new(),
            timeout_secs: 10,
        }
    }
}

impl OsrmConfig {
    fn profile_for(&self, vclass: &str) -> &str {
        self.profiles.get(vclass).unwrap_or(&self.profile)
    }
}

#[derive(Debug, Clone)]
pub struct OsrmTravelTime {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmTravelTime {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn table(&self, locations: &[(f64, f64)], vclass: &str) -> Option<Vec<Vec<Option<f64>>>> {
        let coords = locations
            .iter()
            .map(|(lat, lng)| format!("{:.6},{:.6}", lng, lat))
            .collect::<Vec<_>>()
            .join(";");

        let url = format!(
            "{}/table/v1/{}/{}?annotations=duration",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile_for(vclass),
            coords
        );

        let response = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<OsrmTableResponse>());

        match response {
            Ok(body) if body.code == "Ok" => body.durations,
            Ok(body) => {
                warn!(code = %body.code, "OSRM table request rejected");
                None
            }
            Err(err) => {
                warn!(error = %err, "OSRM table request failed");
                None
            }
        }
    }
}

impl TravelTimeProvider for OsrmTravelTime {
    fn travel_time(&self, from: &AccessPoint, to: &AccessPoint, vclass: &str) -> Option<f64> {
        let matrix = self.matrix_for(&[from.clone(), to.clone()], vclass);
        matrix.get(0)?.get(1).copied().flatten()
    }

    /// Points without a location are unreachable. A failed request leaves the
    /// whole matrix unreachable.
    fn matrix_for(&self, points: &[AccessPoint], vclass: &str) -> Vec<Vec<Option<f64>>> {
        let n = points.len();
        let mut matrix = vec![vec![None; n]; n];

        let located: Vec<(usize, (f64, f64))> = points
            .iter()
            .enumerate()
            .filter_map(|(i, point)| point.location.map(|location| (i, location)))
            .collect();
        if located.is_empty() {
            return matrix;
        }

        let locations: Vec<(f64, f64)> = located.iter().map(|(_, location)| *location).collect();
        let Some(durations) = self.table(&locations, vclass) else {
            return matrix;
        };

        for ((i, _), row) in located.iter().zip(durations) {
            for ((j, _), duration) in located.iter().zip(row) {
                matrix[*i][*j] = duration;
            }
        }
        matrix
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    code: String,
    /// `null` entries mark unreachable pairs.
    durations: Option<Vec<Vec<Option<f64>>>>,
}
