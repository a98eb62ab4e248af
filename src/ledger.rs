//! Reservation ledger: vehicles promised a slot, independently of whether
//! they are physically parked.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::error::NotFoundError;
use crate::registry::ParkingRegistry;

static NO_VEHICLES: BTreeSet<String> = BTreeSet::new();

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reservation {
    pub parking_id: String,
    pub vclass: String,
    pub vehicle_id: String,
}

/// Slot count and current holders for one (parking, class) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscriptions<'a> {
    pub slots: u32,
    pub vehicles: &'a BTreeSet<String>,
}

impl Subscriptions<'_> {
    pub fn free_slots(&self) -> u32 {
        self.slots.saturating_sub(self.vehicles.len() as u32)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionLedger {
    holders: BTreeMap<(String, String), BTreeSet<String>>,
    by_vehicle: HashMap<String, (String, String)>,
}

impl SubscriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot of `vclass` at `parking_id` for `vehicle_id`.
    ///
    /// Returns `Ok(false)` without touching the ledger when the slots are
    /// exhausted or the vehicle already holds a reservation anywhere.
    pub fn subscribe(
        &mut self,
        registry: &ParkingRegistry,
        parking_id: &str,
        vclass: &str,
        vehicle_id: &str,
    ) -> Result<bool, NotFoundError> {
        let slots = registry.get(parking_id)?.subscription_slots(vclass)?;
        if self.by_vehicle.contains_key(vehicle_id) {
            debug!(vehicle = %vehicle_id, parking = %parking_id, "already holds a reservation");
            return Ok(false);
        }

        let held = self.holders_of(parking_id, vclass).len();
        assert!(
            held <= slots as usize,
            "ledger diverged: {} reservations for {}/{} with {} slots",
            held,
            parking_id,
            vclass,
            slots
        );
        if held == slots as usize {
            debug!(parking = %parking_id, vclass = %vclass, slots, "reservation slots exhausted");
            return Ok(false);
        }

        let key = (parking_id.to_string(), vclass.to_string());
        self.holders
            .entry(key.clone())
            .or_default()
            .insert(vehicle_id.to_string());
        self.by_vehicle.insert(vehicle_id.to_string(), key);
        debug!(vehicle = %vehicle_id, parking = %parking_id, vclass = %vclass, "subscribed");
        Ok(true)
    }

    /// Drops the reservation of `vehicle_id`, if any.
    pub fn unsubscribe(&mut self, vehicle_id: &str) -> Option<Reservation> {
        let (parking_id, vclass) = self.by_vehicle.remove(vehicle_id)?;
        let key = (parking_id, vclass);
        let removed = self
            .holders
            .get_mut(&key)
            .is_some_and(|holders| holders.remove(vehicle_id));
        assert!(removed, "ledger diverged: {} missing from {:?}", vehicle_id, key);
        debug!(vehicle = %vehicle_id, parking = %key.0, "unsubscribed");

        let (parking_id, vclass) = key;
        Some(Reservation {
            parking_id,
            vclass,
            vehicle_id: vehicle_id.to_string(),
        })
    }

    pub fn get<'a>(
        &'a self,
        registry: &ParkingRegistry,
        parking_id: &str,
        vclass: &str,
    ) -> Result<Subscriptions<'a>, NotFoundError> {
        let slots = registry.get(parking_id)?.subscription_slots(vclass)?;
        Ok(Subscriptions {
            slots,
            vehicles: self.holders_of(parking_id, vclass),
        })
    }

    /// Vehicles holding a reservation for the pair. Unknown pairs are empty.
    pub fn holders_of(&self, parking_id: &str, vclass: &str) -> &BTreeSet<String> {
        self.holders
            .get(&(parking_id.to_string(), vclass.to_string()))
            .unwrap_or(&NO_VEHICLES)
    }

    pub fn reservation_of(&self, vehicle_id: &str) -> Option<Reservation> {
        self.by_vehicle
            .get(vehicle_id)
            .map(|(parking_id, vclass)| Reservation {
                parking_id: parking_id.clone(),
                vclass: vclass.clone(),
                vehicle_id: vehicle_id.to_string(),
            })
    }

    /// All reservations, ordered by parking, class and vehicle.
    pub fn reservations(&self) -> impl Iterator<Item = Reservation> + '_ {
        self.holders.iter().flat_map(|((parking_id, vclass), holders)| {
            holders.iter().map(move |vehicle_id| Reservation {
                parking_id: parking_id.clone(),
                vclass: vclass.clone(),
                vehicle_id: vehicle_id.clone(),
            })
        })
    }

    pub fn len(&self) -> usize {
        self.by_vehicle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_vehicle.is_empty()
    }

    /// Drops every reservation for which `release` returns true.
    pub fn release_where(&mut self, mut release: impl FnMut(&Reservation) -> bool) -> Vec<Reservation> {
        let released: Vec<Reservation> = self.reservations().filter(|r| release(r)).collect();
        for reservation in &released {
            self.unsubscribe(&reservation.vehicle_id);
        }
        released
    }
}
