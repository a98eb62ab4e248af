//! parking-monitor core
//!
//! Tracks per-class occupancy of parking areas inside a running traffic
//! simulation and answers, every tick, how many places are free and which
//! parkings are the closest alternatives.

pub mod availability;
pub mod config;
pub mod error;
pub mod haversine;
pub mod ledger;
pub mod monitor;
pub mod osrm;
pub mod registry;
pub mod rules;
pub mod sumo;
pub mod tracker;
pub mod traits;
pub mod travel_time;

pub use availability::{ClassQuery, FreePlaces, FreePlacesOptions};
pub use config::{MonitorConfig, UncertaintyPolicy};
pub use error::{ConfigurationError, MonitorError, NotFoundError};
pub use monitor::{ParkingMonitor, StepReport};
pub use registry::{Parking, ParkingDefinition};
pub use tracker::{Occupant, ParkingOccupancy, StopInfo, TelemetryBatch, VehicleSnapshot};
pub use traits::{AccessPoint, TravelTimeProvider};
