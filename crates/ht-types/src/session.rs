//! Tuning session records and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::errors::{NotFoundError, TuneError};
use crate::space::{ParameterValues, SpaceId};

/// Unique tuning session identifier.
pub type SessionId = String;

/// Unique configuration identifier.
pub type ConfigurationId = String;

/// Lifecycle state for a tuning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Search strategy bound to a session at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Random,
    /// Perturbation-guided exploitation, accepted under the name "bayesian".
    Perturbation,
    Genetic,
    /// Successive halving over a resource budget.
    ResourceStaged,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Random,
        StrategyKind::Perturbation,
        StrategyKind::Genetic,
        StrategyKind::ResourceStaged,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Perturbation => "bayesian",
            Self::Genetic => "genetic",
            Self::ResourceStaged => "resource_staged",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "random" => Ok(Self::Random),
            "bayesian" | "perturbation" => Ok(Self::Perturbation),
            "genetic" | "evolutionary" => Ok(Self::Genetic),
            "resource_staged" | "successive_halving" | "hyperband" => Ok(Self::ResourceStaged),
            _ => Err(NotFoundError::Strategy {
                strategy: s.to_string(),
            }
            .into()),
        }
    }
}

/// Strategy-specific knobs. Fields a strategy does not use are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    /// Genetic: probability of re-sampling each gene from scratch.
    pub mutation_rate: f64,
    /// Genetic: probability of inheriting each gene from the first parent.
    pub crossover_probability: f64,
    /// Perturbation: relative width of the uniform perturbation.
    pub perturbation_scale: f64,
    /// Resource-staged: keep the top 1/eta at each rung.
    pub reduction_factor: u32,
    pub min_resource: f64,
    pub max_resource: f64,
    /// Retry generation until constraints hold (bounded attempts).
    pub enforce_constraints: bool,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            mutation_rate: 0.1,
            crossover_probability: 0.5,
            perturbation_scale: 0.1,
            reduction_factor: 3,
            min_resource: 1.0,
            max_resource: 27.0,
            enforce_constraints: false,
        }
    }
}

/// Session-level knobs adjusted by the adaptive scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveSettings {
    pub exploration_rate: f64,
    pub convergence_threshold: f64,
    pub diversity_maintenance: bool,
    /// Hint only; the engine never runs evaluations itself.
    pub parallelism: usize,
    pub resource_adaptation: bool,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            exploration_rate: 0.8,
            convergence_threshold: 0.95,
            diversity_maintenance: true,
            parallelism: 1,
            resource_adaptation: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStrategy {
    pub kind: StrategyKind,
    pub params: StrategyParams,
    pub adaptive: AdaptiveSettings,
}

impl SessionStrategy {
    /// `kind` with default knobs.
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            params: StrategyParams::default(),
            adaptive: AdaptiveSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub evaluations_completed: usize,
    pub total_evaluations: usize,
    /// Seconds between start and the most recent report.
    pub elapsed_seconds: f64,
    pub current_best_score: Option<f64>,
    pub convergence_indicator: f64,
}

impl SessionProgress {
    pub fn new(total_evaluations: usize) -> Self {
        Self {
            evaluations_completed: 0,
            total_evaluations,
            elapsed_seconds: 0.0,
            current_best_score: None,
            convergence_indicator: 0.0,
        }
    }

    pub fn fraction_complete(&self) -> f64 {
        if self.total_evaluations == 0 {
            return 1.0;
        }
        (self.evaluations_completed as f64 / self.total_evaluations as f64).min(1.0)
    }
}

/// Where a suggested configuration came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    Bootstrap,
    Random,
    Perturbation { reference: ConfigurationId },
    Crossover { parents: [ConfigurationId; 2] },
    Promotion { from: ConfigurationId },
    WarmStart { source_session: SessionId },
    Reported,
}

/// One candidate assignment of values, with its score once reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterConfiguration {
    pub id: ConfigurationId,
    pub values: ParameterValues,
    pub score: Option<f64>,
    pub metrics: HashMap<String, f64>,
    pub stability: Option<f64>,
    pub generalization: Option<f64>,
    /// Budget the caller should spend evaluating this candidate.
    pub resource_budget: Option<f64>,
    pub stage: Option<u32>,
    pub origin: CandidateOrigin,
}

impl ParameterConfiguration {
    pub fn new(id: ConfigurationId, values: ParameterValues, origin: CandidateOrigin) -> Self {
        Self {
            id,
            values,
            score: None,
            metrics: HashMap::new(),
            stability: None,
            generalization: None,
            resource_budget: None,
            stage: None,
            origin,
        }
    }

    pub fn with_stage(mut self, stage: u32, resource_budget: f64) -> Self {
        self.stage = Some(stage);
        self.resource_budget = Some(resource_budget);
        self
    }
}

/// Caller-reported resource consumption of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceUsage {
    pub cpu_seconds: Option<f64>,
    pub gpu_seconds: Option<f64>,
    pub memory_mb: Option<f64>,
}

/// Immutable record of one reported evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Zero-based position in the session history.
    pub sequence: usize,
    pub configuration_id: ConfigurationId,
    pub parameters: ParameterValues,
    pub primary_metric: f64,
    pub auxiliary_metrics: HashMap<String, f64>,
    pub duration_seconds: Option<f64>,
    pub resource_usage: ResourceUsage,
    pub resource_budget: Option<f64>,
    pub stage: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregates recomputed from the full history after every report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub count: usize,
    pub best_score: Option<f64>,
    pub worst_score: Option<f64>,
    pub average_score: Option<f64>,
    pub variance: f64,
    pub std_dev: f64,
    /// Additive appearance counter per parameter.
    pub parameter_importance: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInsights {
    pub plateau_detected: bool,
    pub oscillation_detected: bool,
    pub evaluations_since_improvement: usize,
    /// Evaluations whose parameters violate at least one constraint.
    pub constraint_violations: usize,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStopRecommendation {
    pub should_stop: bool,
    pub confidence: f64,
    pub reason: String,
}

/// The full state of one tuning session as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningSession {
    pub id: SessionId,
    pub space_id: SpaceId,
    pub status: SessionStatus,
    pub strategy: SessionStrategy,
    pub progress: SessionProgress,
    pub best_configuration: Option<ParameterConfiguration>,
    pub history: Vec<EvaluationResult>,
    pub statistics: SessionStatistics,
    pub insights: SessionInsights,
    pub completion_reason: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TuningSession {
    pub fn new(
        id: SessionId,
        space_id: SpaceId,
        strategy: SessionStrategy,
        total_evaluations: usize,
    ) -> Self {
        Self {
            id,
            space_id,
            status: SessionStatus::Pending,
            strategy,
            progress: SessionProgress::new(total_evaluations),
            best_configuration: None,
            history: Vec::new(),
            statistics: SessionStatistics::default(),
            insights: SessionInsights::default(),
            completion_reason: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = SessionStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub fn mark_paused(&mut self) {
        self.status = SessionStatus::Paused;
    }

    pub fn mark_completed(&mut self, reason: impl Into<String>) {
        self.status = SessionStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.completion_reason = Some(reason.into());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = SessionStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Replace the best configuration if `result` strictly improves on it.
    /// Ties keep the earlier winner. Returns whether the best changed.
    pub fn update_best(&mut self, result: &EvaluationResult) -> bool {
        let improved = match &self.best_configuration {
            None => true,
            Some(best) => best.score.map_or(true, |score| result.primary_metric > score),
        };
        if improved {
            let mut best = ParameterConfiguration::new(
                result.configuration_id.clone(),
                result.parameters.clone(),
                CandidateOrigin::Reported,
            );
            best.score = Some(result.primary_metric);
            best.metrics = result.auxiliary_metrics.clone();
            best.stability = result.auxiliary_metrics.get("stability").copied();
            best.generalization = result.auxiliary_metrics.get("generalization").copied();
            best.resource_budget = result.resource_budget;
            best.stage = result.stage;
            self.best_configuration = Some(best);
            self.progress.current_best_score = Some(result.primary_metric);
        }
        improved
    }
}
