//! # ht-engine
//!
//! The HyperTune tuning engine. [`TuningEngine`] owns the search space
//! registry and a [`SessionManager`]; every session runs behind its own
//! mutex so different sessions progress in parallel.
//!
//! ```no_run
//! use ht_engine::{EngineConfig, ReportEvaluationRequest, StartTuningRequest, TuningEngine};
//! use ht_optimizer::SearchSpaceDefinition;
//! use ht_types::ParameterDefinition;
//!
//! # fn main() -> ht_types::TuneResult<()> {
//! let engine = TuningEngine::new(EngineConfig::default())?;
//! let space = engine.define_search_space(
//!     SearchSpaceDefinition::new("mlp")
//!         .with_parameter(ParameterDefinition::continuous("lr", 1e-4, 1e-1))
//!         .with_max_evaluations(20),
//! )?;
//! let session = engine.start_tuning(StartTuningRequest::new(space.space_id, "bayesian"))?;
//! while let Some(config) = engine.suggest_configuration(&session.session_id)?.suggestion {
//!     let score = 1.0; // train and evaluate `config.values` here
//!     let report = ReportEvaluationRequest::new(config.id, score);
//!     engine.report_evaluation(&session.session_id, report)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod engine;
pub mod events;
pub mod manager;
pub mod session;

pub use api::{
    AnalysisResponse, DefineSearchSpaceResponse, ReportEvaluationRequest,
    ReportEvaluationResponse, StartTuningRequest, StartTuningResponse, SuggestionResponse,
    TransferKnowledgeRequest, TransferKnowledgeResponse,
};
pub use config::{EngineConfig, IdScheme, StorageConfig};
pub use engine::TuningEngine;
pub use events::{EventSink, SessionEvent};
pub use manager::SessionManager;
pub use session::{bootstrap_size, SessionState, MAX_EVALUATIONS_REACHED};
