//! # ht-optimizer
//!
//! Candidate generation and bookkeeping for HyperTune.
//!
//! Provides parameter sampling, the search strategies (random,
//! perturbation-guided, genetic, resource-staged), running statistics,
//! convergence tracking, the adaptive scheduler, search space validation,
//! result analysis and knowledge transfer between sessions.

mod analysis;
mod convergence;
mod insights;
mod sampler;
mod scheduler;
mod staged;
mod statistics;
mod strategy;
mod transfer;
mod validation;

pub use analysis::{
    analyze, AnalysisResults, AnalysisType, ConvergenceReport, ParameterInteraction,
    ParameterSensitivity, Recommendations, SessionSummary, StrategySwitch, SuggestedRange,
};
pub use convergence::{
    convergence_indicator, early_stop_recommendation, has_stalled, ConvergenceState,
    ConvergenceTracker, CONVERGENCE_WINDOW, MIN_IMPROVEMENT,
};
pub use insights::derive_insights;
pub use sampler::{sample, sample_configuration};
pub use scheduler::{adaptive_settings_violations, AdaptiveScheduler};
pub use staged::ResourceStagedSearch;
pub use statistics::compute_statistics;
pub use strategy::{
    rank_by_score, strategy_params_violations, CandidateGenerator, GenerationContext,
    GeneticSearch, PerturbationSearch, RandomSearch, SearchStrategy,
};
pub use transfer::{
    adapt_to_space, expected_speedup, plan_transfer, TransferPlan, TransferResult, TransferSeed,
    TransferStrategy, DEFAULT_TOP_K,
};
pub use validation::{
    assess, estimate_complexity, recommend_strategies, validation_violations, ComplexityEstimate,
    ComplexityLevel, SearchSpaceDefinition, SpaceAssessment, StrategyRecommendation,
    ValidationReport,
};

