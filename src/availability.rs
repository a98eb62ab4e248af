//! Free places per parking and class, accounting for vehicles en route and
//! reservations that have not materialized yet.
//!
//! Occupancy, projections and reservations are three views of the same
//! places. The estimator reconciles them so that no vehicle is subtracted
//! twice: a reserved vehicle that is already parked counts as an occupant
//! only, and a projected vehicle that holds a reservation counts as a
//! reservation only when both are requested.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::UncertaintyPolicy;
use crate::error::NotFoundError;
use crate::ledger::SubscriptionLedger;
use crate::registry::{Parking, ParkingRegistry};
use crate::tracker::VehicleTracker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreePlacesOptions {
    /// Subtract reservations whose vehicle is not parked yet.
    pub with_subscriptions: bool,
    /// Subtract vehicles heading to the parking that are not parked yet.
    pub with_projections: bool,
    /// Subtract the configured uncertainty margin.
    pub with_uncertainty: bool,
}

impl FreePlacesOptions {
    pub fn all() -> Self {
        Self {
            with_subscriptions: true,
            with_projections: true,
            with_uncertainty: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassQuery<'a> {
    One(&'a str),
    All,
}

/// Result of a free-places query. Negative values mean the parking is
/// oversubscribed and are never clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreePlaces {
    One(i64),
    ByClass(BTreeMap<String, i64>),
}

impl FreePlaces {
    pub fn as_one(&self) -> Option<i64> {
        match self {
            FreePlaces::One(free) => Some(*free),
            FreePlaces::ByClass(_) => None,
        }
    }

    pub fn as_by_class(&self) -> Option<&BTreeMap<String, i64>> {
        match self {
            FreePlaces::One(_) => None,
            FreePlaces::ByClass(map) => Some(map),
        }
    }
}

/// Rebuilds the projected arrivals of every parking from the current
/// vehicle snapshots.
pub fn refresh_projections(registry: &mut ParkingRegistry, tracker: &VehicleTracker) {
    for parking in registry.iter_mut() {
        parking.clear_projections();
    }

    let mut projected = 0usize;
    let mut unmonitored = 0usize;
    for vehicle in tracker.iter().filter(|v| !v.arrived) {
        let Some(parking_id) = vehicle.next_parking() else {
            continue;
        };
        let Ok(parking) = registry.get_mut(parking_id) else {
            unmonitored += 1;
            continue;
        };
        if parking.is_occupant(&vehicle.id) {
            continue;
        }
        if parking.add_projection(&vehicle.vclass, &vehicle.id) {
            projected += 1;
        }
    }
    debug!(projected, unmonitored, "projections refreshed");
}

pub struct AvailabilityEstimator<'a> {
    registry: &'a ParkingRegistry,
    ledger: &'a SubscriptionLedger,
    uncertainty: UncertaintyPolicy,
}

impl<'a> AvailabilityEstimator<'a> {
    pub fn new(
        registry: &'a ParkingRegistry,
        ledger: &'a SubscriptionLedger,
        uncertainty: UncertaintyPolicy,
    ) -> Self {
        Self {
            registry,
            ledger,
            uncertainty,
        }
    }

    pub fn free_places(
        &self,
        parking_id: &str,
        query: ClassQuery<'_>,
        options: FreePlacesOptions,
    ) -> Result<FreePlaces, NotFoundError> {
        let parking = self.registry.get(parking_id)?;
        match query {
            ClassQuery::One(vclass) => Ok(FreePlaces::One(self.free_for(parking, vclass, options)?)),
            ClassQuery::All => {
                let mut by_class = BTreeMap::new();
                for vclass in parking.vclasses() {
                    by_class.insert(vclass.to_string(), self.free_for(parking, vclass, options)?);
                }
                Ok(FreePlaces::ByClass(by_class))
            }
        }
    }

    fn free_for(
        &self,
        parking: &Parking,
        vclass: &str,
        options: FreePlacesOptions,
    ) -> Result<i64, NotFoundError> {
        let capacity = i64::from(parking.capacity(vclass)?);
        let occupants = parking.occupants(vclass)?;
        let reserved = self.ledger.holders_of(parking.id(), vclass);
        let mut free = capacity - occupants.len() as i64;

        if options.with_subscriptions {
            let pending = reserved.iter().filter(|v| !occupants.contains(*v)).count();
            free -= pending as i64;
        }

        let projections = parking.projections(vclass)?;
        if options.with_projections {
            let in_transit = projections
                .iter()
                .filter(|v| !occupants.contains(*v))
                .filter(|v| !(options.with_subscriptions && reserved.contains(*v)))
                .count();
            free -= in_transit as i64;
        }

        if options.with_uncertainty {
            free -= self.uncertainty.margin(projections.len());
        }
        Ok(free)
    }

    /// Vehicles heading to the parking without a reservation there, in
    /// ascending id order, at most `limit` of them.
    pub fn reroute_candidates(
        &self,
        parking_id: &str,
        vclass: &str,
        limit: usize,
    ) -> Result<Vec<String>, NotFoundError> {
        let parking = self.registry.get(parking_id)?;
        let projections = parking.projections(vclass)?;
        let occupants = parking.occupants(vclass)?;
        let reserved = self.ledger.holders_of(parking_id, vclass);
        Ok(reconcile(projections, reserved, occupants)
            .take(limit)
            .map(str::to_string)
            .collect())
    }

    /// Every (parking, class) pair with negative free places, in load order.
    pub fn oversubscribed(&self, options: FreePlacesOptions) -> Vec<(String, String, i64)> {
        let mut result = Vec::new();
        for parking in self.registry.iter() {
            for vclass in parking.vclasses() {
                // Classes come from the parking itself, so the lookup cannot fail.
                if let Ok(free) = self.free_for(parking, vclass, options) {
                    if free < 0 {
                        result.push((parking.id().to_string(), vclass.to_string(), free));
                    }
                }
            }
        }
        result
    }
}

/// `projected − reserved − parked`, in ascending id order.
fn reconcile<'s>(
    projected: &'s BTreeSet<String>,
    reserved: &'s BTreeSet<String>,
    parked: &'s BTreeSet<String>,
) -> impl Iterator<Item = &'s str> + 's {
    projected
        .difference(reserved)
        .filter(move |v| !parked.contains(*v))
        .map(String::as_str)
}
