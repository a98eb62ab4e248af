//! Monitor configuration, consumed once at startup.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::ConfigurationError;
use crate::rules::{Rule, RuleSpec};

const DEFAULT_ROUTING_VCLASS: &str = "passenger";

/// Margin subtracted from free places when a query asks for uncertainty.
///
/// This is a policy knob chosen by the operator; nothing in the monitor
/// estimates it from observed data.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case", deny_unknown_fields)]
pub enum UncertaintyPolicy {
    None,
    /// Constant number of places.
    Fixed { margin: u32 },
    /// `ceil(per_projection * projected vehicles)` places.
    Proportional { per_projection: f64 },
}

impl Default for UncertaintyPolicy {
    fn default() -> Self {
        UncertaintyPolicy::Fixed { margin: 0 }
    }
}

impl UncertaintyPolicy {
    pub fn margin(&self, projected: usize) -> i64 {
        match *self {
            UncertaintyPolicy::None => 0,
            UncertaintyPolicy::Fixed { margin } => i64::from(margin),
            UncertaintyPolicy::Proportional { per_projection } => {
                (per_projection * projected as f64).ceil() as i64
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        match *self {
            UncertaintyPolicy::Proportional { per_projection }
                if !(per_projection.is_finite() && per_projection >= 0.0) =>
            {
                Err(ConfigurationError::Malformed(format!(
                    "uncertainty per_projection must be a non-negative number, got {}",
                    per_projection
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Configuration document as read from JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Parking ids to ignore entirely.
    pub blacklist: BTreeSet<String>,
    /// Vehicle classes to monitor.
    pub vclasses: BTreeSet<String>,
    /// Rules evaluated against every parking, in order.
    pub generic_conf: Vec<RuleSpec>,
    /// Rules evaluated against one parking, after the generic ones.
    pub specific_conf: BTreeMap<String, Vec<RuleSpec>>,
    /// Default reservation slots per class.
    pub reservation_slots: BTreeMap<String, u32>,
    pub uncertainty: UncertaintyPolicy,
    /// Vehicle class used when asking the router for travel times.
    pub routing_vclass: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            blacklist: BTreeSet::new(),
            vclasses: BTreeSet::new(),
            generic_conf: Vec::new(),
            specific_conf: BTreeMap::new(),
            reservation_slots: BTreeMap::new(),
            uncertainty: UncertaintyPolicy::default(),
            routing_vclass: DEFAULT_ROUTING_VCLASS.to_string(),
        }
    }
}

/// Rules compiled from a [`MonitorConfig`].
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    pub generic: Vec<Rule>,
    pub specific: BTreeMap<String, Vec<Rule>>,
}

impl CompiledRules {
    /// Generic rules followed by the rules specific to `parking_id`.
    pub fn for_parking<'a>(&'a self, parking_id: &str) -> impl Iterator<Item = &'a Rule> + 'a {
        let specific = self.specific.get(parking_id).into_iter().flatten();
        self.generic.iter().chain(specific)
    }
}

impl MonitorConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigurationError> {
        let config: MonitorConfig = serde_json::from_str(raw)?;
        config.uncertainty.validate()?;
        if config.vclasses.is_empty() {
            return Err(ConfigurationError::Malformed(
                "vclasses must name at least one vehicle class".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn compile_rules(&self) -> Result<CompiledRules, ConfigurationError> {
        let generic = self
            .generic_conf
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.compile(&format!("generic_conf[{}]", i)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut specific = BTreeMap::new();
        for (parking_id, specs) in &self.specific_conf {
            let rules = specs
                .iter()
                .enumerate()
                .map(|(i, spec)| spec.compile(&format!("specific_conf[{}][{}]", parking_id, i)))
                .collect::<Result<Vec<_>, _>>()?;
            specific.insert(parking_id.clone(), rules);
        }

        Ok(CompiledRules { generic, specific })
    }
}
