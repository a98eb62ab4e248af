//! Static parking definitions and their per-class occupancy state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::{ConfigurationError, NotFoundError};
use crate::rules::{Attributes, ParkingSettings};
use crate::tracker::ParkingOccupancy;

/// A parking area as defined in the simulation input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Lane of the access point, e.g. `E12_0`.
    pub lane: String,
    #[serde(default)]
    pub start_pos: f64,
    #[serde(default)]
    pub end_pos: Option<f64>,
    pub roadside_capacity: u32,
    /// Explicit `<space>` places, on top of the roadside capacity.
    #[serde(default)]
    pub spaces: u32,
    /// (lat, lng), when known.
    #[serde(default)]
    pub location: Option<(f64, f64)>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ParkingDefinition {
    pub fn total_capacity(&self) -> u32 {
        self.roadside_capacity + self.spaces
    }

    /// Edge of the access lane (the lane id without its `_<index>` suffix).
    pub fn access_edge(&self) -> &str {
        match self.lane.rsplit_once('_') {
            Some((edge, index)) if index.chars().all(|c| c.is_ascii_digit()) => edge,
            _ => &self.lane,
        }
    }

    /// Attributes visible to rule conditions. Params come first so the
    /// built-in attributes cannot be shadowed.
    pub fn attributes(&self) -> Attributes {
        let mut attributes: Attributes = self
            .params
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        attributes.insert("id".to_string(), json!(self.id));
        attributes.insert("name".to_string(), json!(self.name));
        attributes.insert("lane".to_string(), json!(self.lane));
        attributes.insert("edge".to_string(), json!(self.access_edge()));
        attributes.insert("start_pos".to_string(), json!(self.start_pos));
        attributes.insert("end_pos".to_string(), json!(self.end_pos));
        attributes.insert("roadside_capacity".to_string(), json!(self.roadside_capacity));
        attributes.insert("total_capacity".to_string(), json!(self.total_capacity()));
        attributes
    }
}

/// A monitored parking: its definition, effective settings and the state
/// refreshed every tick.
#[derive(Debug, Clone)]
pub struct Parking {
    definition: ParkingDefinition,
    settings: ParkingSettings,
    occupants_by_class: BTreeMap<String, BTreeSet<String>>,
    /// Includes occupants of unmonitored classes.
    total_occupancy: usize,
    projections_by_class: BTreeMap<String, BTreeSet<String>>,
}

impl Parking {
    fn new(definition: ParkingDefinition, settings: ParkingSettings) -> Self {
        let empty: BTreeMap<String, BTreeSet<String>> = settings
            .capacity_by_class
            .keys()
            .map(|vclass| (vclass.clone(), BTreeSet::new()))
            .collect();
        Self {
            definition,
            settings,
            occupants_by_class: empty.clone(),
            total_occupancy: 0,
            projections_by_class: empty,
        }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &ParkingDefinition {
        &self.definition
    }

    pub fn lane(&self) -> &str {
        &self.definition.lane
    }

    pub fn access_edge(&self) -> &str {
        self.definition.access_edge()
    }

    pub fn location(&self) -> Option<(f64, f64)> {
        self.definition.location
    }

    pub fn total_capacity(&self) -> u32 {
        self.settings.total_capacity
    }

    pub fn total_occupancy(&self) -> usize {
        self.total_occupancy
    }

    pub fn capacity_by_class(&self) -> &BTreeMap<String, u32> {
        &self.settings.capacity_by_class
    }

    /// Monitored classes served by this parking, in order.
    pub fn vclasses(&self) -> impl Iterator<Item = &str> {
        self.settings.capacity_by_class.keys().map(String::as_str)
    }

    pub fn capacity(&self, vclass: &str) -> Result<u32, NotFoundError> {
        self.settings
            .capacity_by_class
            .get(vclass)
            .copied()
            .ok_or_else(|| self.unknown_class(vclass))
    }

    pub fn subscription_slots(&self, vclass: &str) -> Result<u32, NotFoundError> {
        self.capacity(vclass)?;
        Ok(self
            .settings
            .subscriptions_by_class
            .get(vclass)
            .copied()
            .unwrap_or(0))
    }

    pub fn occupants(&self, vclass: &str) -> Result<&BTreeSet<String>, NotFoundError> {
        self.occupants_by_class
            .get(vclass)
            .ok_or_else(|| self.unknown_class(vclass))
    }

    pub fn projections(&self, vclass: &str) -> Result<&BTreeSet<String>, NotFoundError> {
        self.projections_by_class
            .get(vclass)
            .ok_or_else(|| self.unknown_class(vclass))
    }

    pub fn is_occupant(&self, vehicle_id: &str) -> bool {
        self.occupants_by_class
            .values()
            .any(|occupants| occupants.contains(vehicle_id))
    }

    fn unknown_class(&self, vclass: &str) -> NotFoundError {
        NotFoundError::VehicleClass {
            parking: self.definition.id.clone(),
            vclass: vclass.to_string(),
        }
    }

    fn clear_occupancy(&mut self) {
        self.occupants_by_class.values_mut().for_each(BTreeSet::clear);
        self.total_occupancy = 0;
    }

    pub(crate) fn clear_projections(&mut self) {
        self.projections_by_class.values_mut().for_each(BTreeSet::clear);
    }

    /// Records a projected arrival. Unmonitored classes are ignored.
    pub(crate) fn add_projection(&mut self, vclass: &str, vehicle_id: &str) -> bool {
        match self.projections_by_class.get_mut(vclass) {
            Some(projections) => projections.insert(vehicle_id.to_string()),
            None => false,
        }
    }
}

/// All monitored parkings, in load order.
#[derive(Debug, Clone, Default)]
pub struct ParkingRegistry {
    parkings: Vec<Parking>,
    index: HashMap<String, usize>,
}

impl ParkingRegistry {
    /// Builds the registry from raw definitions.
    ///
    /// Blacklisted parkings are skipped, rules are applied (generic first,
    /// then specific), and capacities are restricted to the monitored classes.
    /// A parking left with no monitored class is dropped.
    pub fn load(
        definitions: Vec<ParkingDefinition>,
        config: &MonitorConfig,
    ) -> Result<Self, ConfigurationError> {
        let rules = config.compile_rules()?;
        let received = definitions.len();
        let mut registry = ParkingRegistry::default();

        for definition in definitions {
            if config.blacklist.contains(&definition.id) {
                debug!(parking = %definition.id, "parking blacklisted");
                continue;
            }
            if registry.index.contains_key(&definition.id) {
                return Err(ConfigurationError::ParkingFile(format!(
                    "parking {} is defined twice",
                    definition.id
                )));
            }

            let total = definition.total_capacity();
            let mut settings = ParkingSettings {
                total_capacity: total,
                capacity_by_class: config.vclasses.iter().map(|c| (c.clone(), total)).collect(),
                subscriptions_by_class: config.reservation_slots.clone(),
            };
            let attributes = definition.attributes();
            for rule in rules.for_parking(&definition.id) {
                settings = rule.apply_to(&attributes, settings)?;
            }

            settings
                .capacity_by_class
                .retain(|vclass, _| config.vclasses.contains(vclass));
            if settings.capacity_by_class.is_empty() {
                debug!(parking = %definition.id, "parking serves no monitored class");
                continue;
            }
            let capacity = &settings.capacity_by_class;
            settings
                .subscriptions_by_class
                .retain(|vclass, _| capacity.contains_key(vclass));
            for (vclass, slots) in &settings.subscriptions_by_class {
                if *slots > capacity[vclass] {
                    return Err(ConfigurationError::ConflictingCapacity {
                        parking: definition.id.clone(),
                        reason: format!(
                            "{} reservation slots for {} exceed its capacity of {}",
                            slots, vclass, capacity[vclass]
                        ),
                    });
                }
            }

            registry
                .index
                .insert(definition.id.clone(), registry.parkings.len());
            registry.parkings.push(Parking::new(definition, settings));
        }

        for parking_id in rules.specific.keys() {
            if !registry.index.contains_key(parking_id) {
                warn!(parking = %parking_id, "specific rules name a parking that is not monitored");
            }
        }
        info!(
            received,
            monitored = registry.parkings.len(),
            "parking registry loaded"
        );
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Result<&Parking, NotFoundError> {
        self.index
            .get(id)
            .map(|&i| &self.parkings[i])
            .ok_or_else(|| NotFoundError::Parking(id.to_string()))
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Result<&mut Parking, NotFoundError> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.parkings[i]),
            None => Err(NotFoundError::Parking(id.to_string())),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Parkings in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Parking> {
        self.parkings.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parking> {
        self.parkings.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.parkings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parkings.is_empty()
    }

    /// Replaces the occupancy of every parking with `reports`. Parkings
    /// missing from the reports are empty this tick.
    pub fn apply_occupancy(&mut self, reports: &[ParkingOccupancy]) {
        for parking in &mut self.parkings {
            parking.clear_occupancy();
        }
        for report in reports {
            let Ok(parking) = self.get_mut(&report.parking_id) else {
                continue;
            };
            parking.total_occupancy = report.occupants.len();
            for occupant in &report.occupants {
                if let Some(occupants) = parking.occupants_by_class.get_mut(&occupant.vclass) {
                    occupants.insert(occupant.vehicle_id.clone());
                }
            }
            for (vclass, occupants) in &parking.occupants_by_class {
                let capacity = parking.settings.capacity_by_class[vclass];
                if occupants.len() > capacity as usize {
                    warn!(
                        parking = %report.parking_id,
                        vclass = %vclass,
                        occupied = occupants.len(),
                        capacity,
                        "occupancy exceeds configured class capacity"
                    );
                }
            }
        }
    }
}
