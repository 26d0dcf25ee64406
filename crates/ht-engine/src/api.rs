//! Request and response types of the engine operations.

use ht_optimizer::{
    AnalysisResults, ComplexityEstimate, SessionSummary, StrategyRecommendation, TransferResult,
    ValidationReport,
};
use ht_types::{
    AdaptiveSettings, ConfigurationId, EarlyStopRecommendation, EvaluationResult,
    ParameterConfiguration, ParameterValues, ResourceUsage, SessionId, SessionInsights,
    SessionProgress, SessionStatus, SpaceId, StrategyKind, StrategyParams,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefineSearchSpaceResponse {
    pub space_id: SpaceId,
    pub validation: ValidationReport,
    pub complexity_estimate: ComplexityEstimate,
    pub recommended_strategies: Vec<StrategyRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartTuningRequest {
    pub space_id: SpaceId,
    /// Strategy name or alias, e.g. `random`, `bayesian`, `hyperband`.
    pub strategy: String,
    #[serde(default)]
    pub strategy_params: StrategyParams,
    #[serde(default)]
    pub adaptive_settings: AdaptiveSettings,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub seconds_per_evaluation: Option<f64>,
}

impl StartTuningRequest {
    pub fn new(space_id: impl Into<SpaceId>, strategy: impl Into<String>) -> Self {
        Self {
            space_id: space_id.into(),
            strategy: strategy.into(),
            strategy_params: StrategyParams::default(),
            adaptive_settings: AdaptiveSettings::default(),
            seed: None,
            seconds_per_evaluation: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_params(mut self, params: StrategyParams) -> Self {
        self.strategy_params = params;
        self
    }

    pub fn with_adaptive_settings(mut self, settings: AdaptiveSettings) -> Self {
        self.adaptive_settings = settings;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartTuningResponse {
    pub session_id: SessionId,
    pub strategy: StrategyKind,
    pub initial_suggestions: Vec<ParameterConfiguration>,
    pub estimated_duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub session_id: SessionId,
    /// `None` once the session stops issuing candidates.
    pub suggestion: Option<ParameterConfiguration>,
    pub reason: Option<String>,
    pub status: SessionStatus,
    pub progress: SessionProgress,
    pub adaptive_settings: AdaptiveSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvaluationRequest {
    pub configuration_id: ConfigurationId,
    /// Required when `configuration_id` is not an outstanding suggestion.
    #[serde(default)]
    pub parameters: Option<ParameterValues>,
    pub primary_metric: f64,
    #[serde(default)]
    pub auxiliary_metrics: HashMap<String, f64>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub resource_usage: ResourceUsage,
}

impl ReportEvaluationRequest {
    pub fn new(configuration_id: impl Into<ConfigurationId>, primary_metric: f64) -> Self {
        Self {
            configuration_id: configuration_id.into(),
            parameters: None,
            primary_metric,
            auxiliary_metrics: HashMap::new(),
            duration_seconds: None,
            resource_usage: ResourceUsage::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: ParameterValues) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.auxiliary_metrics.insert(name.into(), value);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvaluationResponse {
    pub evaluation: EvaluationResult,
    pub best_score: Option<f64>,
    pub progress: SessionProgress,
    pub insights: SessionInsights,
    pub early_stop_recommendation: EarlyStopRecommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub results: AnalysisResults,
    pub session_summary: SessionSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferKnowledgeRequest {
    pub source_session_ids: Vec<SessionId>,
    pub target_session_id: SessionId,
    /// `warm_start`, `meta_learning` or `surrogate_transfer`.
    pub transfer_strategy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferKnowledgeResponse {
    pub transfer_result: TransferResult,
    pub expected_speedup: f64,
}
