//! Declarative rules that derive per-parking configuration.
//!
//! A rule pairs a condition with a list of assignments. Conditions are written
//! in prefix form, e.g. `["and", ["=", {"attr": "edge"}, "E3"], [">=",
//! {"attr": "roadside_capacity"}, 10]]`, and compiled once at load time so a
//! bad operator aborts startup instead of silently skipping the rule.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigurationError;

static MISSING: Value = Value::Null;

/// Attribute values of a parking, as seen by rule conditions.
pub type Attributes = BTreeMap<String, Value>;

/// A rule as it appears in the configuration document.
///
/// Attributes referenced by `cond` may be absent on some parkings, since
/// `<param>` entries are optional. A missing attribute reads as `null`: it
/// equals nothing, differs from everything and fails every ordering, so the
/// rule simply does not match that parking.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub cond: Value,
    pub set_to: Vec<(String, Value)>,
}

impl RuleSpec {
    /// Compiles the rule. `label` identifies the rule in error messages when
    /// it has no explicit name.
    pub fn compile(&self, label: &str) -> Result<Rule, ConfigurationError> {
        let label = match &self.name {
            Some(name) => format!("{} ({})", label, name),
            None => label.to_string(),
        };
        let condition =
            Condition::parse(&self.cond).map_err(|reason| ConfigurationError::rule(&label, reason))?;
        let assignments = self
            .set_to
            .iter()
            .map(|(field, value)| Assignment::parse(field, value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| ConfigurationError::rule(&label, reason))?;

        Ok(Rule {
            label,
            condition,
            assignments,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Attr(String),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Const(bool),
    Compare(Comparison, Operand, Operand),
    In(Operand, Vec<Operand>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Operand {
    fn parse(raw: &Value) -> Result<Operand, String> {
        match raw {
            Value::Object(map) => match (map.len(), map.get("attr")) {
                (1, Some(Value::String(name))) => Ok(Operand::Attr(name.clone())),
                _ => Err(format!("operand {} is not of the form {{\"attr\": <name>}}", raw)),
            },
            Value::Array(_) => Err(format!("operand {} must be a literal or an attribute", raw)),
            literal => Ok(Operand::Literal(literal.clone())),
        }
    }

    fn resolve<'a>(&'a self, attributes: &'a Attributes) -> &'a Value {
        match self {
            Operand::Literal(value) => value,
            Operand::Attr(name) => attributes.get(name).unwrap_or(&MISSING),
        }
    }
}

impl Condition {
    pub fn parse(raw: &Value) -> Result<Condition, String> {
        let items = match raw {
            Value::Bool(value) => return Ok(Condition::Const(*value)),
            Value::Array(items) if !items.is_empty() => items,
            _ => return Err(format!("condition {} is not an operator expression", raw)),
        };
        let op = items[0]
            .as_str()
            .ok_or_else(|| format!("operator {} is not a string", items[0]))?;
        let args = &items[1..];

        let comparison = match op {
            "=" | "==" => Some(Comparison::Eq),
            "!=" => Some(Comparison::Ne),
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Ge),
            _ => None,
        };
        if let Some(comparison) = comparison {
            let [left, right] = args else {
                return Err(format!("operator `{}` takes 2 operands, got {}", op, args.len()));
            };
            return Ok(Condition::Compare(
                comparison,
                Operand::parse(left)?,
                Operand::parse(right)?,
            ));
        }

        match op {
            "in" => {
                let [needle, Value::Array(set)] = args else {
                    return Err("operator `in` takes an operand and a list".to_string());
                };
                let set = set.iter().map(Operand::parse).collect::<Result<_, _>>()?;
                Ok(Condition::In(Operand::parse(needle)?, set))
            }
            "and" | "or" => {
                if args.is_empty() {
                    return Err(format!("operator `{}` needs at least one condition", op));
                }
                let inner = args.iter().map(Condition::parse).collect::<Result<Vec<_>, _>>()?;
                Ok(if op == "and" {
                    Condition::And(inner)
                } else {
                    Condition::Or(inner)
                })
            }
            other => Err(format!("unknown operator `{}`", other)),
        }
    }

    pub fn evaluate(&self, attributes: &Attributes) -> Result<bool, String> {
        match self {
            Condition::Const(value) => Ok(*value),
            Condition::Compare(comparison, left, right) => {
                let left = left.resolve(attributes);
                let right = right.resolve(attributes);
                match comparison {
                    Comparison::Eq => Ok(values_equal(left, right)),
                    Comparison::Ne => Ok(!values_equal(left, right)),
                    _ if left.is_null() || right.is_null() => Ok(false),
                    ordering => {
                        let (l, r) = (as_number(left)?, as_number(right)?);
                        Ok(match ordering {
                            Comparison::Lt => l < r,
                            Comparison::Le => l <= r,
                            Comparison::Gt => l > r,
                            _ => l >= r,
                        })
                    }
                }
            }
            Condition::In(needle, set) => {
                let needle = needle.resolve(attributes);
                for candidate in set {
                    if values_equal(needle, candidate.resolve(attributes)) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::And(inner) => {
                for condition in inner {
                    if !condition.evaluate(attributes)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(inner) => {
                for condition in inner {
                    if condition.evaluate(attributes)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Equality with the same numeric coercion as the ordering operators, so a
/// `"12"` param equals `12` exactly when it is both `<= 12` and `>= 12`.
fn values_equal(left: &Value, right: &Value) -> bool {
    if left.is_number() || right.is_number() {
        return matches!((as_number(left), as_number(right)), (Ok(l), Ok(r)) if l == r);
    }
    left == right
}

/// Numeric strings are accepted so `<param>` values can be compared.
fn as_number(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{} is not a finite number", n)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("`{}` is not numeric", s)),
        other => Err(format!("{} is not numeric", other)),
    }
}

/// A configuration field set by a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    TotalCapacity(u32),
    CapacityByClass(BTreeMap<String, u32>),
    SubscriptionsByClass(BTreeMap<String, u32>),
}

impl Assignment {
    fn parse(field: &str, value: &Value) -> Result<Assignment, String> {
        let invalid = |err: serde_json::Error| format!("invalid value for `{}`: {}", field, err);
        match field {
            "total_capacity" => serde_json::from_value(value.clone())
                .map(Assignment::TotalCapacity)
                .map_err(invalid),
            "capacity_by_class" => serde_json::from_value(value.clone())
                .map(Assignment::CapacityByClass)
                .map_err(invalid),
            "subscriptions_by_class" => serde_json::from_value(value.clone())
                .map(Assignment::SubscriptionsByClass)
                .map_err(invalid),
            other => Err(format!("unknown field `{}`", other)),
        }
    }
}

/// Effective configuration of one parking, derived from its definition and
/// then overwritten field by field by matching rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParkingSettings {
    pub total_capacity: u32,
    pub capacity_by_class: BTreeMap<String, u32>,
    pub subscriptions_by_class: BTreeMap<String, u32>,
}

/// Applies assignments in order. Each assignment replaces the whole field.
pub fn apply(assignments: &[Assignment], mut settings: ParkingSettings) -> ParkingSettings {
    for assignment in assignments {
        match assignment {
            Assignment::TotalCapacity(total) => settings.total_capacity = *total,
            Assignment::CapacityByClass(map) => settings.capacity_by_class = map.clone(),
            Assignment::SubscriptionsByClass(map) => settings.subscriptions_by_class = map.clone(),
        }
    }
    settings
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub label: String,
    pub condition: Condition,
    pub assignments: Vec<Assignment>,
}

impl Rule {
    pub fn matches(&self, attributes: &Attributes) -> Result<bool, ConfigurationError> {
        self.condition
            .evaluate(attributes)
            .map_err(|reason| ConfigurationError::rule(&self.label, reason))
    }

    /// Applies the rule if its condition holds for `attributes`.
    pub fn apply_to(
        &self,
        attributes: &Attributes,
        settings: ParkingSettings,
    ) -> Result<ParkingSettings, ConfigurationError> {
        if self.matches(attributes)? {
            Ok(apply(&self.assignments, settings))
        } else {
            Ok(settings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs() -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("id".to_string(), json!("pA"));
        attributes.insert("edge".to_string(), json!("E3"));
        attributes.insert("roadside_capacity".to_string(), json!(20));
        attributes.insert("zone".to_string(), json!("12"));
        attributes
    }

    fn eval(raw: Value) -> Result<bool, String> {
        Condition::parse(&raw)?.evaluate(&attrs())
    }

    #[test]
    fn test_always_true_literal_comparison() {
        assert_eq!(eval(json!(["=", 1, 1])), Ok(true));
        assert_eq!(eval(json!(["=", 1, 1.0])), Ok(true));
        assert_eq!(eval(json!(true)), Ok(true));
    }

    #[test]
    fn test_attribute_comparisons() {
        assert_eq!(eval(json!(["=", {"attr": "id"}, "pA"])), Ok(true));
        assert_eq!(eval(json!(["!=", {"attr": "id"}, "pA"])), Ok(false));
        assert_eq!(eval(json!([">=", {"attr": "roadside_capacity"}, 20])), Ok(true));
        assert_eq!(eval(json!(["<", {"attr": "roadside_capacity"}, 20])), Ok(false));
        assert_eq!(eval(json!([">", {"attr": "zone"}, 10])), Ok(true));
    }

    #[test]
    fn test_membership_and_logic() {
        assert_eq!(eval(json!(["in", {"attr": "edge"}, ["E1", "E3"]])), Ok(true));
        assert_eq!(eval(json!(["in", {"attr": "edge"}, ["E1", "E2"]])), Ok(false));
        assert_eq!(
            eval(json!(["and", ["=", {"attr": "id"}, "pA"], [">", {"attr": "roadside_capacity"}, 50]])),
            Ok(false)
        );
        assert_eq!(
            eval(json!(["or", ["=", {"attr": "id"}, "pB"], ["in", {"attr": "edge"}, ["E3"]]])),
            Ok(true)
        );
    }

    #[test]
    fn test_malformed_conditions_rejected() {
        assert!(Condition::parse(&json!(["~", 1, 1])).is_err());
        assert!(Condition::parse(&json!(["=", 1])).is_err());
        assert!(Condition::parse(&json!(["and"])).is_err());
        assert!(Condition::parse(&json!("always")).is_err());
        assert!(Condition::parse(&json!(["in", 1, 2])).is_err());
        assert!(Condition::parse(&json!(["=", {"attr": 3}, 1])).is_err());
    }

    #[test]
    fn test_evaluation_errors() {
        assert!(eval(json!(["<", {"attr": "id"}, 3])).is_err());
        assert!(eval(json!([">=", {"attr": "edge"}, 1])).is_err());
    }

    #[test]
    fn test_numeric_string_equality_agrees_with_ordering() {
        assert_eq!(eval(json!([">=", {"attr": "zone"}, 12])), Ok(true));
        assert_eq!(eval(json!(["<=", {"attr": "zone"}, 12])), Ok(true));
        assert_eq!(eval(json!(["=", {"attr": "zone"}, 12])), Ok(true));
        assert_eq!(eval(json!(["=", 12.0, {"attr": "zone"}])), Ok(true));
        assert_eq!(eval(json!(["!=", {"attr": "zone"}, 12])), Ok(false));
        assert_eq!(eval(json!(["in", {"attr": "zone"}, [7, 12]])), Ok(true));
        assert_eq!(eval(json!(["in", {"attr": "zone"}, [7, 13]])), Ok(false));
        assert_eq!(eval(json!(["=", {"attr": "zone"}, "12"])), Ok(true));
        assert_eq!(eval(json!(["=", {"attr": "id"}, 12])), Ok(false));
    }

    #[test]
    fn test_missing_attribute_never_matches() {
        assert_eq!(eval(json!(["=", {"attr": "missing"}, 1])), Ok(false));
        assert_eq!(eval(json!(["!=", {"attr": "missing"}, 1])), Ok(true));
        assert_eq!(eval(json!(["<", {"attr": "missing"}, 1])), Ok(false));
        assert_eq!(eval(json!([">=", {"attr": "missing"}, 1])), Ok(false));
        assert_eq!(eval(json!(["in", {"attr": "missing"}, ["E3", 1]])), Ok(false));
    }

    #[test]
    fn test_compile_names_offending_rule() {
        let spec: RuleSpec = serde_json::from_value(json!({
            "name": "trucks",
            "cond": ["like", 1, 1],
            "set_to": []
        }))
        .unwrap();
        let err = spec.compile("generic_conf[0]").unwrap_err();
        assert!(err.to_string().contains("generic_conf[0] (trucks)"));
        assert!(err.to_string().contains("unknown operator `like`"));
    }

    #[test]
    fn test_compile_rejects_unknown_field() {
        let spec: RuleSpec = serde_json::from_value(json!({
            "cond": ["=", 1, 1],
            "set_to": [["colour", "red"]]
        }))
        .unwrap();
        let err = spec.compile("specific_conf[pA][0]").unwrap_err();
        assert!(err.to_string().contains("unknown field `colour`"));
    }

    #[test]
    fn test_apply_last_write_wins() {
        let spec: RuleSpec = serde_json::from_value(json!({
            "cond": ["=", 1, 1],
            "set_to": [
                ["capacity_by_class", {"truck": 15, "passenger": 50}],
                ["capacity_by_class", {"truck": 3}],
                ["subscriptions_by_class", {"truck": 1}]
            ]
        }))
        .unwrap();
        let rule = spec.compile("r").unwrap();
        let settings = rule.apply_to(&attrs(), ParkingSettings::default()).unwrap();
        assert_eq!(settings.capacity_by_class.len(), 1);
        assert_eq!(settings.capacity_by_class["truck"], 3);
        assert_eq!(settings.subscriptions_by_class["truck"], 1);
    }

    #[test]
    fn test_non_matching_rule_leaves_settings() {
        let spec: RuleSpec = serde_json::from_value(json!({
            "cond": ["=", {"attr": "id"}, "pZ"],
            "set_to": [["total_capacity", 99]]
        }))
        .unwrap();
        let rule = spec.compile("r").unwrap();
        let settings = rule.apply_to(&attrs(), ParkingSettings::default()).unwrap();
        assert_eq!(settings.total_capacity, 0);
    }
}
