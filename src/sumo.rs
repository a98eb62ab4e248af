//! Reads parking areas from a SUMO additional file.
//!
//! See <https://sumo.dlr.de/docs/Simulation/ParkingArea.html>. Only the
//! attributes the monitor needs are kept; other elements in the file are
//! ignored.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde::de::IgnoredAny;

use crate::error::ConfigurationError;
use crate::registry::ParkingDefinition;

#[derive(Debug, Deserialize)]
struct Additional {
    #[serde(rename = "parkingArea", default)]
    parking_areas: Vec<ParkingArea>,
}

#[derive(Debug, Deserialize)]
struct ParkingArea {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@lane")]
    lane: String,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@startPos")]
    start_pos: Option<f64>,
    #[serde(rename = "@endPos")]
    end_pos: Option<f64>,
    #[serde(rename = "@roadsideCapacity", default)]
    roadside_capacity: u32,
    #[serde(rename = "space", default)]
    spaces: Vec<IgnoredAny>,
    #[serde(rename = "param", default)]
    params: Vec<Param>,
}

#[derive(Debug, Deserialize)]
struct Param {
    #[serde(rename = "@key")]
    key: String,
    #[serde(rename = "@value")]
    value: String,
}

/// Parses every `<parkingArea>` of an additional file, in document order.
pub fn parse_parking_areas(xml: &str) -> Result<Vec<ParkingDefinition>, ConfigurationError> {
    let additional: Additional = quick_xml::de::from_str(xml)?;

    let mut seen = BTreeSet::new();
    let mut parkings = Vec::with_capacity(additional.parking_areas.len());
    for area in additional.parking_areas {
        if !seen.insert(area.id.clone()) {
            return Err(ConfigurationError::ParkingFile(format!(
                "parkingArea {} is defined twice",
                area.id
            )));
        }
        let params: BTreeMap<String, String> =
            area.params.into_iter().map(|p| (p.key, p.value)).collect();
        let location = location_from_params(&area.id, &params)?;

        parkings.push(ParkingDefinition {
            id: area.id,
            name: area.name,
            lane: area.lane,
            start_pos: area.start_pos.unwrap_or(0.0),
            end_pos: area.end_pos,
            roadside_capacity: area.roadside_capacity,
            spaces: area.spaces.len() as u32,
            location,
            params,
        });
    }
    Ok(parkings)
}

fn location_from_params(
    id: &str,
    params: &BTreeMap<String, String>,
) -> Result<Option<(f64, f64)>, ConfigurationError> {
    let (Some(lat), Some(lon)) = (params.get("lat"), params.get("lon")) else {
        return Ok(None);
    };
    match (lat.parse::<f64>(), lon.parse::<f64>()) {
        (Ok(lat), Ok(lon)) => Ok(Some((lat, lon))),
        _ => Err(ConfigurationError::ParkingFile(format!(
            "parkingArea {} has a non-numeric lat/lon param",
            id
        ))),
    }
}
