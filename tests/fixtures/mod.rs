//! Test fixtures for parking-monitor.
//!
//! Provides:
//! - Real Monaco parking locations (from OpenStreetMap)
//! - Builders for parking definitions and vehicle snapshots
//! - A deterministic travel time provider

#![allow(dead_code)]

pub mod monaco_parkings;

use std::collections::{BTreeMap, HashMap};

use parking_monitor::{
    AccessPoint, MonitorConfig, Occupant, ParkingDefinition, ParkingOccupancy, StopInfo,
    TelemetryBatch, TravelTimeProvider, VehicleSnapshot,
};
use parking_monitor::tracker::STOP_PARKING_AREA;

pub use monaco_parkings::*;

/// Parking with a single lane `E<id>_0` and the given roadside capacity.
pub fn parking(id: &str, capacity: u32) -> ParkingDefinition {
    ParkingDefinition {
        id: id.to_string(),
        name: None,
        lane: format!("E{}_0", id),
        start_pos: 0.0,
        end_pos: None,
        roadside_capacity: capacity,
        spaces: 0,
        location: None,
        params: BTreeMap::new(),
    }
}

pub fn monaco_definitions(capacity: u32) -> Vec<ParkingDefinition> {
    MONACO_PARKINGS
        .iter()
        .map(|location| ParkingDefinition {
            lane: location.lane.to_string(),
            location: Some(location.coords()),
            ..parking(location.id, capacity)
        })
        .collect()
}

pub fn config(raw: &str) -> MonitorConfig {
    MonitorConfig::from_json(raw).expect("valid test configuration")
}

/// Builder for vehicle snapshots with sensible defaults.
#[derive(Clone, Debug)]
pub struct TestVehicle {
    snapshot: VehicleSnapshot,
}

impl TestVehicle {
    pub fn new(id: &str) -> Self {
        Self {
            snapshot: VehicleSnapshot {
                id: id.to_string(),
                edge: "E0".to_string(),
                vclass: "passenger".to_string(),
                arrived: false,
                stopped: false,
                stops: Vec::new(),
            },
        }
    }

    pub fn vclass(mut self, vclass: &str) -> Self {
        self.snapshot.vclass = vclass.to_string();
        self
    }

    pub fn on_edge(mut self, edge: &str) -> Self {
        self.snapshot.edge = edge.to_string();
        self
    }

    pub fn heading_to(mut self, parking_id: &str) -> Self {
        self.snapshot.stops.push(StopInfo {
            lane: format!("E{}_0", parking_id),
            end_pos: 10.0,
            stopping_place_id: parking_id.to_string(),
            flags: 1 | STOP_PARKING_AREA,
            duration: 600.0,
            until: -1.0,
        });
        self
    }

    pub fn stopped(mut self) -> Self {
        self.snapshot.stopped = true;
        self
    }

    pub fn arrived(mut self) -> Self {
        self.snapshot.arrived = true;
        self
    }

    pub fn build(self) -> VehicleSnapshot {
        self.snapshot
    }
}

/// Builder for one tick of telemetry.
#[derive(Clone, Debug, Default)]
pub struct TestBatch {
    batch: TelemetryBatch,
}

impl TestBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vehicle(mut self, vehicle: TestVehicle) -> Self {
        self.batch.vehicles.push(vehicle.build());
        self
    }

    /// Reports `vehicle_id` parked at `parking_id`.
    pub fn parked(mut self, parking_id: &str, vehicle_id: &str, vclass: &str) -> Self {
        let occupant = Occupant {
            vehicle_id: vehicle_id.to_string(),
            vclass: vclass.to_string(),
        };
        match self
            .batch
            .occupancy
            .iter_mut()
            .find(|report| report.parking_id == parking_id)
        {
            Some(report) => report.occupants.push(occupant),
            None => self.batch.occupancy.push(ParkingOccupancy {
                parking_id: parking_id.to_string(),
                occupants: vec![occupant],
            }),
        }
        self
    }

    pub fn build(self) -> TelemetryBatch {
        self.batch
    }
}

/// Travel times looked up by access edge; missing pairs have no route.
#[derive(Debug, Default)]
pub struct TableTravelTime {
    times: HashMap<(String, String), f64>,
}

impl TableTravelTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, from_edge: &str, to_edge: &str, seconds: f64) -> Self {
        self.times
            .insert((from_edge.to_string(), to_edge.to_string()), seconds);
        self
    }

    pub fn both_ways(self, a: &str, b: &str, seconds: f64) -> Self {
        self.route(a, b, seconds).route(b, a, seconds)
    }
}

impl TravelTimeProvider for TableTravelTime {
    fn travel_time(&self, from: &AccessPoint, to: &AccessPoint, _vclass: &str) -> Option<f64> {
        self.times
            .get(&(from.edge.clone(), to.edge.clone()))
            .copied()
    }
}
