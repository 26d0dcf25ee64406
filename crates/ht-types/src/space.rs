//! Search space definitions: parameters, constraints and stopping bounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique search space identifier
pub type SpaceId = String;

/// One concrete assignment of a value to every parameter of a space.
pub type ParameterValues = HashMap<String, ParameterValue>;

/// A concrete parameter value produced by a sampler or reported by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Numeric view of the value (integers widen to floats).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
            Self::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Json(v) => v.as_bool(),
            _ => None,
        }
    }

    /// JSON form, used to compare against categorical choices.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Json(v) => v.clone(),
        }
    }

    /// Whether the value counts as "switched on" for mutual-exclusion rules.
    pub fn is_active(&self) -> bool {
        match self {
            Self::Bool(v) => *v,
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::Json(v) => !(v.is_null() || v == &serde_json::Value::Bool(false)),
        }
    }

    fn loosely_equals(&self, other: &ParameterValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() <= 1e-9,
            _ => self.to_json() == other.to_json(),
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Continuous,
    Discrete,
    Categorical,
    Boolean,
}

/// Legal values of a parameter. Booleans carry no range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterRange {
    Numeric { min: f64, max: f64 },
    Choices { values: Vec<serde_json::Value> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    #[default]
    Uniform,
    Normal,
    LogUniform,
    LogNormal,
}

impl Distribution {
    pub fn is_logarithmic(&self) -> bool {
        matches!(self, Self::LogUniform | Self::LogNormal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    #[default]
    Linear,
    Log,
    Sqrt,
}

/// Conditional rule attached to a parameter. Recorded for callers and
/// strategies; never evaluated by the engine itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDependency {
    pub depends_on: String,
    pub when: ParameterValue,
    pub effect: DependencyEffect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyEffect {
    Enable,
    Disable,
    ModifyRange { min: f64, max: f64 },
}

/// A single tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub range: Option<ParameterRange>,
    #[serde(default)]
    pub distribution: Distribution,
    #[serde(default)]
    pub scale: Scale,
    /// Advisory weight, not enforced.
    #[serde(default = "default_importance")]
    pub importance: f64,
    #[serde(default)]
    pub dependencies: Vec<ParameterDependency>,
    #[serde(default)]
    pub default_value: Option<ParameterValue>,
}

fn default_importance() -> f64 {
    1.0
}

impl ParameterDefinition {
    fn with_kind(
        name: impl Into<String>,
        kind: ParameterKind,
        range: Option<ParameterRange>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            range,
            distribution: Distribution::Uniform,
            scale: Scale::Linear,
            importance: default_importance(),
            dependencies: Vec::new(),
            default_value: None,
        }
    }

    pub fn continuous(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self::with_kind(name, ParameterKind::Continuous, Some(ParameterRange::Numeric { min, max }))
    }

    pub fn discrete(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self::with_kind(
            name,
            ParameterKind::Discrete,
            Some(ParameterRange::Numeric {
                min: min as f64,
                max: max as f64,
            }),
        )
    }

    pub fn categorical(name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self::with_kind(name, ParameterKind::Categorical, Some(ParameterRange::Choices { values }))
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::with_kind(name, ParameterKind::Boolean, None)
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = distribution;
        self
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_default(mut self, value: ParameterValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_dependency(mut self, dependency: ParameterDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Numeric bounds for continuous and discrete parameters.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match (&self.kind, &self.range) {
            (
                ParameterKind::Continuous | ParameterKind::Discrete,
                Some(ParameterRange::Numeric { min, max }),
            ) => Some((*min, *max)),
            _ => None,
        }
    }

    pub fn choices(&self) -> Option<&[serde_json::Value]> {
        match (&self.kind, &self.range) {
            (ParameterKind::Categorical, Some(ParameterRange::Choices { values })) => Some(values),
            _ => None,
        }
    }

    /// Checks that `value` has the right shape and lies within the range.
    pub fn check_value(&self, value: &ParameterValue) -> Result<(), String> {
        match self.kind {
            ParameterKind::Continuous | ParameterKind::Discrete => {
                let (min, max) = self
                    .bounds()
                    .ok_or_else(|| format!("Parameter '{}' has no numeric range", self.name))?;
                let v = match (self.kind, value) {
                    (ParameterKind::Discrete, ParameterValue::Int(v)) => *v as f64,
                    (ParameterKind::Discrete, _) => {
                        return Err(format!(
                            "Parameter '{}' expects an integer, got {value}",
                            self.name
                        ))
                    }
                    (_, other) => other.as_f64().ok_or_else(|| {
                        format!("Parameter '{}' expects a number, got {other}", self.name)
                    })?,
                };
                if !v.is_finite() || v < min || v > max {
                    return Err(format!(
                        "Parameter '{}' value {v} is outside [{min}, {max}]",
                        self.name
                    ));
                }
                Ok(())
            }
            ParameterKind::Categorical => {
                let choices = self
                    .choices()
                    .ok_or_else(|| format!("Parameter '{}' has no choices", self.name))?;
                let json = value.to_json();
                if choices.contains(&json) {
                    Ok(())
                } else {
                    Err(format!(
                        "Parameter '{}' value {value} is not one of the choices",
                        self.name
                    ))
                }
            }
            ParameterKind::Boolean => match value.as_bool() {
                Some(_) => Ok(()),
                None => Err(format!("Parameter '{}' expects a boolean, got {value}", self.name)),
            },
        }
    }

    pub fn contains(&self, value: &ParameterValue) -> bool {
        self.check_value(value).is_ok()
    }

    /// Forces a numeric value into range, rounding for discrete parameters.
    pub fn clamp_numeric(&self, value: f64) -> Option<ParameterValue> {
        let (min, max) = self.bounds()?;
        let clamped = if value.is_finite() { value.clamp(min, max) } else { min };
        Some(match self.kind {
            ParameterKind::Discrete => ParameterValue::Int(clamped.round().clamp(min, max) as i64),
            _ => ParameterValue::Float(clamped),
        })
    }

    /// Position of a value within the range mapped to [0, 1], honouring the
    /// parameter's scale. Categorical values map to their choice index.
    pub fn normalize(&self, value: &ParameterValue) -> Option<f64> {
        match self.kind {
            ParameterKind::Continuous | ParameterKind::Discrete => {
                let (min, max) = self.bounds()?;
                let v = value.as_f64()?;
                let transform = |x: f64| match self.scale {
                    Scale::Linear => x,
                    Scale::Log => x.max(f64::MIN_POSITIVE).ln(),
                    Scale::Sqrt => x.max(0.0).sqrt(),
                };
                let (lo, hi) = (transform(min), transform(max));
                if (hi - lo).abs() < f64::EPSILON {
                    return Some(0.0);
                }
                Some(((transform(v) - lo) / (hi - lo)).clamp(0.0, 1.0))
            }
            ParameterKind::Categorical => {
                let choices = self.choices()?;
                let json = value.to_json();
                let idx = choices.iter().position(|c| c == &json)?;
                if choices.len() <= 1 {
                    Some(0.0)
                } else {
                    Some(idx as f64 / (choices.len() - 1) as f64)
                }
            }
            ParameterKind::Boolean => value.as_bool().map(|b| if b { 1.0 } else { 0.0 }),
        }
    }
}

/// Comparison operator used by inequality constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Ne,
}

impl Comparison {
    fn holds(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Ne => (left - right).abs() > 1e-9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Parameter(String),
    Value(f64),
}

/// Advisory relationship between parameters. Violation detection is left to
/// callers unless a strategy opts into enforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    Equality {
        parameter: String,
        value: ParameterValue,
    },
    Inequality {
        left: String,
        op: Comparison,
        right: Operand,
    },
    Conditional {
        parameter: String,
        equals: ParameterValue,
        then: Box<Constraint>,
    },
    MutualExclusion {
        parameters: Vec<String>,
    },
}

impl Constraint {
    pub fn referenced_parameters(&self) -> Vec<&str> {
        match self {
            Self::Equality { parameter, .. } => vec![parameter.as_str()],
            Self::Inequality { left, right, .. } => match right {
                Operand::Parameter(name) => vec![left.as_str(), name.as_str()],
                Operand::Value(_) => vec![left.as_str()],
            },
            Self::Conditional { parameter, then, .. } => {
                let mut names = vec![parameter.as_str()];
                names.extend(then.referenced_parameters());
                names
            }
            Self::MutualExclusion { parameters } => parameters.iter().map(String::as_str).collect(),
        }
    }

    /// Evaluates the rule against `values`. Rules over missing parameters
    /// are considered satisfied.
    pub fn is_satisfied(&self, values: &ParameterValues) -> bool {
        match self {
            Self::Equality { parameter, value } => values
                .get(parameter)
                .map_or(true, |actual| actual.loosely_equals(value)),
            Self::Inequality { left, op, right } => {
                let lhs = values.get(left).and_then(ParameterValue::as_f64);
                let rhs = match right {
                    Operand::Parameter(name) => values.get(name).and_then(ParameterValue::as_f64),
                    Operand::Value(v) => Some(*v),
                };
                match (lhs, rhs) {
                    (Some(l), Some(r)) => op.holds(l, r),
                    _ => true,
                }
            }
            Self::Conditional {
                parameter,
                equals,
                then,
            } => match values.get(parameter) {
                Some(actual) if actual.loosely_equals(equals) => then.is_satisfied(values),
                _ => true,
            },
            Self::MutualExclusion { parameters } => {
                parameters
                    .iter()
                    .filter(|name| values.get(*name).is_some_and(ParameterValue::is_active))
                    .count()
                    <= 1
            }
        }
    }
}

/// Expected noise in the objective, used when ranking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Stopping bounds of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchBounds {
    pub max_evaluations: usize,
    /// Advisory; enforced by the caller.
    #[serde(default)]
    pub max_time_seconds: Option<f64>,
    #[serde(default = "default_patience")]
    pub early_stopping_patience: usize,
    #[serde(default = "default_target_metric")]
    pub target_metric: String,
    #[serde(default = "default_improvement_threshold")]
    pub improvement_threshold: f64,
    #[serde(default)]
    pub expected_noise: NoiseLevel,
}

fn default_patience() -> usize {
    10
}

fn default_target_metric() -> String {
    "score".to_string()
}

fn default_improvement_threshold() -> f64 {
    1e-3
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            max_evaluations: 100,
            max_time_seconds: None,
            early_stopping_patience: default_patience(),
            target_metric: default_target_metric(),
            improvement_threshold: default_improvement_threshold(),
            expected_noise: NoiseLevel::Medium,
        }
    }
}

impl SearchBounds {
    pub fn with_max_evaluations(mut self, n: usize) -> Self {
        self.max_evaluations = n;
        self
    }
}

/// How the caller intends the space to be covered. Recorded as metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    #[default]
    Random,
    Stratified,
    Adaptive,
}

/// A validated, read-only search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub id: SpaceId,
    pub name: String,
    pub parameters: Vec<ParameterDefinition>,
    pub constraints: Vec<Constraint>,
    pub search_bounds: SearchBounds,
    pub sampling_strategy: SamplingStrategy,
    pub created_at: DateTime<Utc>,
}

impl SearchSpace {
    pub fn parameter(&self, name: &str) -> Option<&ParameterDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn dimension(&self) -> usize {
        self.parameters.len()
    }

    /// Lists every way `values` fails to be a configuration of this space:
    /// missing keys, unknown keys and out-of-range values.
    pub fn configuration_violations(&self, values: &ParameterValues) -> Vec<String> {
        let mut violations = Vec::new();
        for param in &self.parameters {
            match values.get(&param.name) {
                Some(value) => {
                    if let Err(message) = param.check_value(value) {
                        violations.push(message);
                    }
                }
                None => violations.push(format!("Missing value for parameter '{}'", param.name)),
            }
        }
        let mut unknown: Vec<&String> = values
            .keys()
            .filter(|name| self.parameter(name).is_none())
            .collect();
        unknown.sort();
        for name in unknown {
            violations.push(format!("Unknown parameter '{name}'"));
        }
        violations
    }

    /// Indices of constraints that `values` violates.
    pub fn violated_constraints(&self, values: &ParameterValues) -> Vec<usize> {
        self.constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_satisfied(values))
            .map(|(i, _)| i)
            .collect()
    }
}
