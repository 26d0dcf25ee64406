//! Search space validation, complexity estimation and strategy ranking.

use chrono::{DateTime, Utc};
use ht_types::{
    Constraint, NoiseLevel, ParameterDefinition, ParameterKind, ParameterRange,
    SamplingStrategy, SearchBounds, SearchSpace, SpaceId, StrategyKind, TuneResult,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Caller-supplied description of a search space, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpaceDefinition {
    pub name: String,
    pub parameters: Vec<ParameterDefinition>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub search_bounds: SearchBounds,
    #[serde(default)]
    pub sampling_strategy: SamplingStrategy,
}

impl SearchSpaceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            constraints: Vec::new(),
            search_bounds: SearchBounds::default(),
            sampling_strategy: SamplingStrategy::Random,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterDefinition) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_max_evaluations(mut self, n: usize) -> Self {
        self.search_bounds.max_evaluations = n;
        self
    }

    pub fn with_noise(mut self, noise: NoiseLevel) -> Self {
        self.search_bounds.expected_noise = noise;
        self
    }

    pub fn into_space(self, id: SpaceId, created_at: DateTime<Utc>) -> SearchSpace {
        SearchSpace {
            id,
            name: self.name,
            parameters: self.parameters,
            constraints: self.constraints,
            search_bounds: self.search_bounds,
            sampling_strategy: self.sampling_strategy,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    /// Non-fatal observations about the space.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityEstimate {
    pub dimensions: usize,
    pub continuous: usize,
    pub discrete: usize,
    pub categorical: usize,
    pub boolean: usize,
    pub constraints: usize,
    pub level: ComplexityLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecommendation {
    pub strategy: StrategyKind,
    pub score: f64,
    pub reason: String,
}

/// Everything `define_search_space` learns about a valid definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceAssessment {
    pub validation: ValidationReport,
    pub complexity: ComplexityEstimate,
    pub recommended_strategies: Vec<StrategyRecommendation>,
}

/// Every rule `definition` breaks. Empty means valid.
pub fn validation_violations(definition: &SearchSpaceDefinition) -> Vec<String> {
    let mut violations = Vec::new();

    if definition.parameters.is_empty() {
        violations.push("Search space must have at least one parameter".to_string());
    }

    let declared: HashSet<&str> = definition.parameters.iter().map(|p| p.name.as_str()).collect();
    let mut seen = HashSet::new();
    for (i, param) in definition.parameters.iter().enumerate() {
        let label = if param.name.trim().is_empty() {
            violations.push(format!("Parameter at position {i} must have a non-empty name"));
            format!("#{i}")
        } else {
            if !seen.insert(param.name.as_str()) {
                violations.push(format!("Duplicate parameter name '{}'", param.name));
            }
            param.name.clone()
        };

        let range_ok = check_range(param, &label, &mut violations);

        if range_ok {
            if let Some(default) = &param.default_value {
                if let Err(message) = param.check_value(default) {
                    violations.push(format!("Default value is invalid: {message}"));
                }
            }
        }

        for dependency in &param.dependencies {
            if !declared.contains(dependency.depends_on.as_str()) {
                violations.push(format!(
                    "Parameter '{label}' depends on unknown parameter '{}'",
                    dependency.depends_on
                ));
            }
        }
    }

    for (i, constraint) in definition.constraints.iter().enumerate() {
        for name in constraint.referenced_parameters() {
            if !declared.contains(name) {
                violations.push(format!("Constraint {i} references unknown parameter '{name}'"));
            }
        }
    }

    let bounds = &definition.search_bounds;
    if bounds.max_evaluations == 0 {
        violations.push("maxEvaluations must be greater than 0".to_string());
    }
    if let Some(seconds) = bounds.max_time_seconds {
        if !(seconds > 0.0) {
            violations.push(format!("maxTimeSeconds must be positive, got {seconds}"));
        }
    }

    violations
}

fn check_range(param: &ParameterDefinition, label: &str, violations: &mut Vec<String>) -> bool {
    let before = violations.len();
    match (param.kind, &param.range) {
        (ParameterKind::Boolean, _) => {}
        (_, None) => violations.push(format!("Parameter '{label}' must have a range")),
        (
            ParameterKind::Continuous | ParameterKind::Discrete,
            Some(ParameterRange::Numeric { min, max }),
        ) => {
            if !min.is_finite() || !max.is_finite() {
                violations.push(format!("Parameter '{label}' range bounds must be finite"));
            } else if min > max {
                violations.push(format!("Parameter '{label}' range min {min} exceeds max {max}"));
            }
            if param.kind == ParameterKind::Discrete && (min.fract() != 0.0 || max.fract() != 0.0) {
                violations.push(format!(
                    "Parameter '{label}' is discrete but its bounds are not integers"
                ));
            }
            let logarithmic = param.distribution.is_logarithmic();
            if param.kind == ParameterKind::Continuous && logarithmic && *min <= 0.0 {
                violations.push(format!(
                    "Parameter '{label}' uses a logarithmic distribution and needs min > 0"
                ));
            }
        }
        (ParameterKind::Categorical, Some(ParameterRange::Choices { values })) => {
            if values.is_empty() {
                violations.push(format!("Parameter '{label}' must list at least one choice"));
            }
        }
        (kind, Some(_)) => violations.push(format!(
            "Parameter '{label}' has a range that does not match its kind {kind:?}"
        )),
    }
    violations.len() == before
}

/// Validate a definition, returning every violation at once on failure.
pub fn assess(definition: &SearchSpaceDefinition) -> TuneResult<SpaceAssessment> {
    let violations = validation_violations(definition);
    if !violations.is_empty() {
        return Err(ValidationError::InvalidSearchSpace { violations }.into());
    }

    let complexity = estimate_complexity(definition);
    let recommended_strategies = recommend_strategies(&complexity, &definition.search_bounds);
    Ok(SpaceAssessment {
        validation: ValidationReport {
            valid: true,
            warnings: warnings(definition),
        },
        complexity,
        recommended_strategies,
    })
}

fn warnings(definition: &SearchSpaceDefinition) -> Vec<String> {
    let mut warnings = Vec::new();
    if !definition.constraints.is_empty() {
        warnings.push(format!(
            "{} constraint(s) are advisory and only enforced by strategies that opt in",
            definition.constraints.len()
        ));
    }
    let conditional: Vec<&str> = definition
        .parameters
        .iter()
        .filter(|p| !p.dependencies.is_empty())
        .map(|p| p.name.as_str())
        .collect();
    if !conditional.is_empty() {
        warnings.push(format!(
            "Dependencies on {} are recorded but not evaluated automatically",
            conditional.join(", ")
        ));
    }
    warnings
}

pub fn estimate_complexity(definition: &SearchSpaceDefinition) -> ComplexityEstimate {
    let count =
        |kind: ParameterKind| definition.parameters.iter().filter(|p| p.kind == kind).count();
    let dimensions = definition.parameters.len();
    let constraints = definition.constraints.len();

    let by_dimensions = if dimensions > 50 {
        ComplexityLevel::High
    } else if dimensions > 10 {
        ComplexityLevel::Medium
    } else {
        ComplexityLevel::Low
    };
    let by_constraints = if constraints > 10 {
        ComplexityLevel::High
    } else if constraints > 5 {
        ComplexityLevel::Medium
    } else {
        ComplexityLevel::Low
    };

    ComplexityEstimate {
        dimensions,
        continuous: count(ParameterKind::Continuous),
        discrete: count(ParameterKind::Discrete),
        categorical: count(ParameterKind::Categorical),
        boolean: count(ParameterKind::Boolean),
        constraints,
        level: by_dimensions.max(by_constraints),
    }
}

/// Declared operating window of a strategy.
struct Suitability {
    kind: StrategyKind,
    base: f64,
    dimensions: (usize, usize),
    noise: (NoiseLevel, NoiseLevel),
    min_budget: usize,
    summary: &'static str,
}

const SUITABILITY: [Suitability; 4] = [
    Suitability {
        kind: StrategyKind::Perturbation,
        base: 0.9,
        dimensions: (1, 20),
        noise: (NoiseLevel::Low, NoiseLevel::Medium),
        min_budget: 10,
        summary: "exploits regions that scored above average",
    },
    Suitability {
        kind: StrategyKind::Genetic,
        base: 0.85,
        dimensions: (3, 100),
        noise: (NoiseLevel::Medium, NoiseLevel::High),
        min_budget: 30,
        summary: "recombines the best configurations and copes with mixed parameter kinds",
    },
    Suitability {
        kind: StrategyKind::ResourceStaged,
        base: 0.8,
        dimensions: (1, usize::MAX),
        noise: (NoiseLevel::Medium, NoiseLevel::High),
        min_budget: 40,
        summary: "spends budget only on candidates that survive early stages",
    },
    Suitability {
        kind: StrategyKind::Random,
        base: 0.6,
        dimensions: (1, usize::MAX),
        noise: (NoiseLevel::Low, NoiseLevel::High),
        min_budget: 1,
        summary: "unbiased baseline for any space",
    },
];

fn noise_distance(noise: NoiseLevel, window: (NoiseLevel, NoiseLevel)) -> usize {
    let level = noise as usize;
    let (lo, hi) = (window.0 as usize, window.1 as usize);
    if level < lo {
        lo - level
    } else {
        level.saturating_sub(hi)
    }
}

/// Rank every strategy by fit. Strategies outside their window are still
/// listed with a lower score and a reason naming the mismatch.
pub fn recommend_strategies(
    complexity: &ComplexityEstimate,
    bounds: &SearchBounds,
) -> Vec<StrategyRecommendation> {
    let dims = complexity.dimensions;
    let categorical_share = if dims == 0 {
        0.0
    } else {
        (complexity.categorical + complexity.boolean) as f64 / dims as f64
    };

    let mut ranked: Vec<StrategyRecommendation> = SUITABILITY
        .iter()
        .map(|s| {
            let mut score = s.base;
            let mut notes = vec![s.summary.to_string()];

            let (lo, hi) = s.dimensions;
            let dim_gap = if dims < lo { lo - dims } else { dims.saturating_sub(hi) };
            if dim_gap > 0 {
                score -= (0.05 * dim_gap as f64).min(0.5);
                notes.push(format!("{dims} dimensions is outside its window"));
            }

            let noise_gap = noise_distance(bounds.expected_noise, s.noise);
            if noise_gap > 0 {
                score -= 0.25 * noise_gap as f64;
                let note = format!("{:?} noise is outside its window", bounds.expected_noise);
                notes.push(note.to_lowercase());
            }

            if bounds.max_evaluations < s.min_budget {
                score -= 0.2;
                notes.push(format!(
                    "budget of {} evaluations is below the {} it works best with",
                    bounds.max_evaluations, s.min_budget
                ));
            }

            if s.kind == StrategyKind::Genetic && categorical_share > 0.3 {
                score += 0.05;
            }

            StrategyRecommendation {
                strategy: s.kind,
                score: score.clamp(0.0, 1.0),
                reason: notes.join("; "),
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked
}
