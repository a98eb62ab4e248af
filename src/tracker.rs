//! Per-tick vehicle telemetry.
//!
//! The tracker holds exactly one tick of snapshots. Every refresh replaces the
//! whole table; nothing is carried over from the previous tick.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::NotFoundError;

/// Stop flag bit marking a stop at a parking area (SUMO `setStop` flags).
pub const STOP_PARKING_AREA: u32 = 1 << 6;

/// Prefix of the simulator's internal (junction) edge ids.
pub const JUNCTION_EDGE_MARKER: char = ':';

/// Returns true if the stop flags mark a parking-area stop.
pub fn is_parking_area(flags: u32) -> bool {
    flags & STOP_PARKING_AREA != 0
}

/// One upcoming stop of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopInfo {
    pub lane: String,
    pub end_pos: f64,
    /// Id of the stopping place (parking area, bus stop, ...). Empty if the
    /// stop is on a bare lane position.
    pub stopping_place_id: String,
    pub flags: u32,
    pub duration: f64,
    pub until: f64,
}

impl StopInfo {
    pub fn is_parking_area(&self) -> bool {
        is_parking_area(self.flags)
    }
}

/// Point-in-time record of one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: String,
    /// Current edge; empty while the vehicle is not inserted yet.
    pub edge: String,
    pub vclass: String,
    pub arrived: bool,
    pub stopped: bool,
    #[serde(default)]
    pub stops: Vec<StopInfo>,
}

impl VehicleSnapshot {
    pub fn is_inserted(&self) -> bool {
        !self.edge.is_empty()
    }

    pub fn next_stop(&self) -> Option<&StopInfo> {
        self.stops.first()
    }

    /// Parking targeted by the next stop, if that stop is a parking area.
    pub fn next_parking(&self) -> Option<&str> {
        self.next_stop()
            .filter(|stop| stop.is_parking_area() && !stop.stopping_place_id.is_empty())
            .map(|stop| stop.stopping_place_id.as_str())
    }

    /// A vehicle inside an intersection, or not on the network at all, must
    /// not be rerouted.
    pub fn is_safe_for_reroute(&self) -> bool {
        self.is_inserted() && !self.edge.starts_with(JUNCTION_EDGE_MARKER)
    }
}

/// A vehicle physically parked in a parking area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub vehicle_id: String,
    pub vclass: String,
}

/// Occupants of one parking area as reported by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingOccupancy {
    pub parking_id: String,
    pub occupants: Vec<Occupant>,
}

/// Everything the simulator reports for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    pub vehicles: Vec<VehicleSnapshot>,
    #[serde(default)]
    pub occupancy: Vec<ParkingOccupancy>,
}

#[derive(Debug, Clone)]
pub struct VehicleTracker {
    vclasses: BTreeSet<String>,
    vehicles: BTreeMap<String, VehicleSnapshot>,
    tick: u64,
}

impl VehicleTracker {
    pub fn new(vclasses: BTreeSet<String>) -> Self {
        Self {
            vclasses,
            vehicles: BTreeMap::new(),
            tick: 0,
        }
    }

    /// Replaces the snapshot table with `vehicles`, dropping unmonitored
    /// classes.
    pub fn refresh(&mut self, vehicles: Vec<VehicleSnapshot>) {
        let received = vehicles.len();
        self.vehicles = vehicles
            .into_iter()
            .filter(|vehicle| self.vclasses.contains(&vehicle.vclass))
            .map(|vehicle| (vehicle.id.clone(), vehicle))
            .collect();
        self.tick += 1;
        debug!(
            tick = self.tick,
            received,
            tracked = self.vehicles.len(),
            "vehicle tracker refreshed"
        );
    }

    /// Inserted vehicles of monitored classes, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &VehicleSnapshot> {
        self.vehicles.values().filter(|vehicle| vehicle.is_inserted())
    }

    pub fn get(&self, id: &str) -> Result<&VehicleSnapshot, NotFoundError> {
        self.vehicles
            .get(id)
            .ok_or_else(|| NotFoundError::Vehicle(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vehicles.contains_key(id)
    }

    /// Number of refreshes so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }
}
