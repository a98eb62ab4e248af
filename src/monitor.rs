//! The parking monitor engine.
//!
//! One `ParkingMonitor` owns the whole state of one simulation run, so several
//! runs can live side by side in the same process. It is advanced one tick at
//! a time by the host:
//!
//! 1. the host collects telemetry from the simulator and calls
//!    [`ParkingMonitor::step`];
//! 2. the decision loop queries free places and alternatives, and subscribes
//!    or unsubscribes vehicles.
//!
//! `step` finishes updating vehicles, occupancy and projections before it
//! returns, so every query in a tick sees the same snapshot. The monitor is
//! not thread-safe by itself; a multi-threaded host should wrap it in one
//! lock held for a whole step-then-query batch.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::availability::{self, AvailabilityEstimator, ClassQuery, FreePlaces, FreePlacesOptions};
use crate::config::MonitorConfig;
use crate::error::{NotFoundError, Result};
use crate::ledger::{Reservation, SubscriptionLedger, Subscriptions};
use crate::registry::{Parking, ParkingDefinition, ParkingRegistry};
use crate::sumo;
use crate::tracker::{self, TelemetryBatch, VehicleSnapshot, VehicleTracker};
use crate::traits::TravelTimeProvider;
use crate::travel_time::TravelTimeIndex;

#[derive(Debug, Clone)]
pub struct ParkingMonitor {
    config: MonitorConfig,
    registry: ParkingRegistry,
    tracker: VehicleTracker,
    ledger: SubscriptionLedger,
    travel_times: TravelTimeIndex,
}

/// What changed during one [`ParkingMonitor::step`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub tick: u64,
    pub tracked_vehicles: usize,
    /// Reservations dropped because the vehicle left.
    pub released: Vec<Reservation>,
}

impl ParkingMonitor {
    pub fn new(config: MonitorConfig, definitions: Vec<ParkingDefinition>) -> Result<Self> {
        let registry = ParkingRegistry::load(definitions, &config)?;
        let tracker = VehicleTracker::new(config.vclasses.clone());
        Ok(Self {
            config,
            registry,
            tracker,
            ledger: SubscriptionLedger::new(),
            travel_times: TravelTimeIndex::default(),
        })
    }

    /// Builds a monitor from a JSON configuration document and a SUMO
    /// additional file with the parking areas.
    pub fn from_sources(config_json: &str, parkings_xml: &str) -> Result<Self> {
        let config = MonitorConfig::from_json(config_json)?;
        let definitions = sumo::parse_parking_areas(parkings_xml)?;
        Self::new(config, definitions)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Precomputes travel times between all parkings. Call once, before the
    /// simulation loop.
    pub fn compute_parking_travel_time<P: TravelTimeProvider + ?Sized>(&mut self, provider: &P) {
        self.travel_times = TravelTimeIndex::build(&self.registry, provider, &self.config.routing_vclass);
    }

    pub fn travel_times(&self) -> &TravelTimeIndex {
        &self.travel_times
    }

    pub fn travel_times_mut(&mut self) -> &mut TravelTimeIndex {
        &mut self.travel_times
    }

    /// Advances the monitor to a new tick.
    ///
    /// Vehicles are refreshed first, then occupancy and projections, then
    /// reservations of vehicles that are gone or have left their parking are
    /// released.
    pub fn step(&mut self, batch: TelemetryBatch) -> StepReport {
        let parked_before: HashSet<String> = self
            .ledger
            .reservations()
            .filter(|r| {
                self.registry
                    .get(&r.parking_id)
                    .is_ok_and(|p| p.is_occupant(&r.vehicle_id))
            })
            .map(|r| r.vehicle_id)
            .collect();

        self.tracker.refresh(batch.vehicles);
        self.registry.apply_occupancy(&batch.occupancy);
        availability::refresh_projections(&mut self.registry, &self.tracker);

        let tracker = &self.tracker;
        let registry = &self.registry;
        let released = self.ledger.release_where(|r| {
            let gone = tracker.get(&r.vehicle_id).map_or(true, |v| v.arrived);
            let left = parked_before.contains(&r.vehicle_id)
                && !registry
                    .get(&r.parking_id)
                    .is_ok_and(|p| p.is_occupant(&r.vehicle_id));
            gone || left
        });
        for reservation in &released {
            info!(
                vehicle = %reservation.vehicle_id,
                parking = %reservation.parking_id,
                "reservation released"
            );
        }

        let report = StepReport {
            tick: self.tracker.tick(),
            tracked_vehicles: self.tracker.iter().count(),
            released,
        };
        debug!(tick = report.tick, vehicles = report.tracked_vehicles, "step complete");
        report
    }

    pub fn parkings(&self) -> impl Iterator<Item = &Parking> {
        self.registry.iter()
    }

    pub fn parking(&self, id: &str) -> Result<&Parking, NotFoundError> {
        self.registry.get(id)
    }

    /// Lane of the parking's access point.
    pub fn parking_access(&self, id: &str) -> Result<&str, NotFoundError> {
        Ok(self.registry.get(id)?.lane())
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleSnapshot> {
        self.tracker.iter()
    }

    pub fn vehicle(&self, id: &str) -> Result<&VehicleSnapshot, NotFoundError> {
        self.tracker.get(id)
    }

    pub fn is_safe_for_reroute(&self, vehicle: &VehicleSnapshot) -> bool {
        vehicle.is_safe_for_reroute()
    }

    pub fn is_parking_area(&self, stop_flags: u32) -> bool {
        tracker::is_parking_area(stop_flags)
    }

    fn estimator(&self) -> AvailabilityEstimator<'_> {
        AvailabilityEstimator::new(&self.registry, &self.ledger, self.config.uncertainty)
    }

    pub fn free_places(
        &self,
        parking_id: &str,
        query: ClassQuery<'_>,
        options: FreePlacesOptions,
    ) -> Result<FreePlaces, NotFoundError> {
        self.estimator().free_places(parking_id, query, options)
    }

    /// Free places for one class.
    pub fn free_places_for(
        &self,
        parking_id: &str,
        vclass: &str,
        options: FreePlacesOptions,
    ) -> Result<i64, NotFoundError> {
        match self.free_places(parking_id, ClassQuery::One(vclass), options)? {
            FreePlaces::One(free) => Ok(free),
            FreePlaces::ByClass(_) => unreachable!("scalar query returned a mapping"),
        }
    }

    /// Free places for every class the parking serves.
    pub fn free_places_by_class(
        &self,
        parking_id: &str,
        options: FreePlacesOptions,
    ) -> Result<BTreeMap<String, i64>, NotFoundError> {
        match self.free_places(parking_id, ClassQuery::All, options)? {
            FreePlaces::ByClass(map) => Ok(map),
            FreePlaces::One(_) => unreachable!("aggregated query returned a scalar"),
        }
    }

    /// Up to `k` alternatives to `origin`, closest first by travel time.
    pub fn closest_parkings(&self, origin: &str, k: usize) -> Result<Vec<(f64, String)>, NotFoundError> {
        self.registry.get(origin)?;
        Ok(self
            .travel_times
            .closest(origin, k)
            .into_iter()
            .map(|(time, id)| (time, id.to_string()))
            .collect())
    }

    pub fn subscribe_vehicle_to_parking(
        &mut self,
        parking_id: &str,
        vclass: &str,
        vehicle_id: &str,
    ) -> Result<bool, NotFoundError> {
        self.ledger
            .subscribe(&self.registry, parking_id, vclass, vehicle_id)
    }

    pub fn unsubscribe_vehicle(&mut self, vehicle_id: &str) -> Option<Reservation> {
        self.ledger.unsubscribe(vehicle_id)
    }

    pub fn subscription(&self, parking_id: &str, vclass: &str) -> Result<Subscriptions<'_>, NotFoundError> {
        self.ledger.get(&self.registry, parking_id, vclass)
    }

    /// Subscriptions for every class the parking serves.
    pub fn parking_subscriptions(
        &self,
        parking_id: &str,
    ) -> Result<BTreeMap<String, Subscriptions<'_>>, NotFoundError> {
        let parking = self.registry.get(parking_id)?;
        parking
            .vclasses()
            .map(|vclass| Ok((vclass.to_string(), self.subscription(parking_id, vclass)?)))
            .collect()
    }

    pub fn reservation_of(&self, vehicle_id: &str) -> Option<Reservation> {
        self.ledger.reservation_of(vehicle_id)
    }

    /// Projected vehicles without a reservation, candidates for rerouting
    /// away from an oversubscribed parking.
    pub fn reroute_candidates(
        &self,
        parking_id: &str,
        vclass: &str,
        limit: usize,
    ) -> Result<Vec<String>, NotFoundError> {
        self.estimator().reroute_candidates(parking_id, vclass, limit)
    }

    pub fn oversubscribed(&self, options: FreePlacesOptions) -> Vec<(String, String, i64)> {
        self.estimator().oversubscribed(options)
    }
}

