//! Error taxonomy for the parking monitor.
//!
//! Configuration problems are fatal at load time. Lookups of unknown ids are
//! surfaced to the caller and never replaced with a default value.

use thiserror::Error;

/// Problems detected while loading configuration or parking definitions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("rule {rule}: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("parking {parking}: {reason}")]
    ConflictingCapacity { parking: String, reason: String },

    #[error("malformed configuration: {0}")]
    Malformed(String),

    #[error("malformed parking definitions: {0}")]
    ParkingFile(String),
}

impl ConfigurationError {
    pub(crate) fn rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigurationError::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

/// Lookup of an id that is unknown to the monitor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("unknown parking {0}")]
    Parking(String),

    #[error("unknown vehicle {0}")]
    Vehicle(String),

    #[error("parking {parking} does not serve vehicle class {vclass}")]
    VehicleClass { parking: String, vclass: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;

impl From<serde_json::Error> for ConfigurationError {
    fn from(err: serde_json::Error) -> Self {
        ConfigurationError::Malformed(err.to_string())
    }
}

impl From<quick_xml::DeError> for ConfigurationError {
    fn from(err: quick_xml::DeError) -> Self {
        ConfigurationError::ParkingFile(err.to_string())
    }
}
