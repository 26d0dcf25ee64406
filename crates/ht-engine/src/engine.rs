//! The tuning engine: search space registry plus the session manager.

use chrono::Utc;
use dashmap::DashMap;
use ht_optimizer::{
    adaptive_settings_violations, assess, strategy_params_violations, AnalysisType,
    SearchSpaceDefinition, SessionSummary,
};
use ht_store::TuningStore;
use ht_types::{
    IdGenerator, IdKind, NotFoundError, SearchSpace, SessionStrategy, SpaceId, StrategyKind,
    TuneResult, TuningSession, ValidationError,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{
    AnalysisResponse, DefineSearchSpaceResponse, ReportEvaluationRequest,
    ReportEvaluationResponse, StartTuningRequest, StartTuningResponse, SuggestionResponse,
    TransferKnowledgeRequest, TransferKnowledgeResponse,
};
use crate::config::EngineConfig;
use crate::events::EventSink;
use crate::manager::SessionManager;

/// Entry point for every tuning operation. Safe to share across threads.
pub struct TuningEngine {
    config: EngineConfig,
    ids: Arc<dyn IdGenerator>,
    store: Arc<dyn TuningStore>,
    spaces: DashMap<SpaceId, Arc<SearchSpace>>,
    sessions: SessionManager,
}

impl TuningEngine {
    /// Build an engine from `config`, opening the configured store.
    pub fn new(config: EngineConfig) -> TuneResult<Self> {
        Self::with_events(config, EventSink::disabled())
    }

    pub fn with_events(config: EngineConfig, events: EventSink) -> TuneResult<Self> {
        config.validate()?;
        let ids = config.id_generator();
        let store = config.open_store()?;
        Ok(Self::with_parts(config, ids, store, events))
    }

    pub fn from_env() -> TuneResult<Self> {
        Self::new(EngineConfig::from_env()?)
    }

    pub fn with_parts(
        config: EngineConfig,
        ids: Arc<dyn IdGenerator>,
        store: Arc<dyn TuningStore>,
        events: EventSink,
    ) -> Self {
        let sessions = SessionManager::new(&config, Arc::clone(&ids), Arc::clone(&store), events);
        Self {
            config,
            ids,
            store,
            spaces: DashMap::new(),
            sessions,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate and register a search space. Invalid definitions register
    /// nothing and report every violation at once.
    pub fn define_search_space(
        &self,
        definition: SearchSpaceDefinition,
    ) -> TuneResult<DefineSearchSpaceResponse> {
        let assessment = assess(&definition).map_err(|e| {
            debug!(space = %definition.name, error = %e, "search space rejected");
            e
        })?;

        let space_id = self.ids.next_id(IdKind::Space);
        let space = definition.into_space(space_id.clone(), Utc::now());
        if let Err(e) = self.store.save_search_space(&space) {
            warn!(space = %space_id, error = %e, "failed to persist search space");
        }
        info!(
            space = %space_id,
            name = %space.name,
            dimensions = space.dimension(),
            complexity = ?assessment.complexity.level,
            "search space defined"
        );
        self.spaces.insert(space_id.clone(), Arc::new(space));

        Ok(DefineSearchSpaceResponse {
            space_id,
            validation: assessment.validation,
            complexity_estimate: assessment.complexity,
            recommended_strategies: assessment.recommended_strategies,
        })
    }

    /// Registered space, rehydrated from the store on a registry miss.
    pub fn search_space(&self, space_id: &str) -> TuneResult<Arc<SearchSpace>> {
        if let Some(space) = self.spaces.get(space_id) {
            return Ok(Arc::clone(space.value()));
        }
        match self.store.load_search_space(space_id) {
            Ok(Some(space)) => {
                debug!(space = space_id, "search space rehydrated from store");
                let space = Arc::new(space);
                self.spaces.insert(space_id.to_string(), Arc::clone(&space));
                return Ok(space);
            }
            Ok(None) => {}
            Err(e) => warn!(space = space_id, error = %e, "failed to load stored search space"),
        }
        Err(NotFoundError::Space {
            space_id: space_id.to_string(),
        }
        .into())
    }

    pub fn start_tuning(&self, request: StartTuningRequest) -> TuneResult<StartTuningResponse> {
        let space = self.search_space(&request.space_id)?;
        let kind: StrategyKind = request.strategy.parse()?;

        let seconds_per_evaluation = request
            .seconds_per_evaluation
            .unwrap_or(self.config.default_seconds_per_evaluation);
        let mut violations = strategy_params_violations(&request.strategy_params);
        violations.extend(adaptive_settings_violations(&request.adaptive_settings));
        if !(seconds_per_evaluation.is_finite() && seconds_per_evaluation > 0.0) {
            violations.push(format!(
                "seconds_per_evaluation must be positive, got {seconds_per_evaluation}"
            ));
        }
        if !violations.is_empty() {
            return Err(ValidationError::InvalidConfiguration { violations }.into());
        }

        let total = space.search_bounds.max_evaluations;
        let strategy = SessionStrategy {
            kind,
            params: request.strategy_params,
            adaptive: request.adaptive_settings,
        };
        let (session_id, initial_suggestions) =
            self.sessions.start(space, strategy, request.seed)?;

        Ok(StartTuningResponse {
            session_id,
            strategy: kind,
            initial_suggestions,
            estimated_duration_seconds: total as f64 * seconds_per_evaluation,
        })
    }

    pub fn suggest_configuration(&self, session_id: &str) -> TuneResult<SuggestionResponse> {
        self.sessions.suggest(session_id)
    }

    pub fn report_evaluation(
        &self,
        session_id: &str,
        request: ReportEvaluationRequest,
    ) -> TuneResult<ReportEvaluationResponse> {
        self.sessions.report(session_id, request)
    }

    pub fn analyze_results(
        &self,
        session_id: &str,
        analysis_type: AnalysisType,
    ) -> TuneResult<AnalysisResponse> {
        self.sessions.analyze(session_id, analysis_type)
    }

    pub fn transfer_knowledge(
        &self,
        request: TransferKnowledgeRequest,
    ) -> TuneResult<TransferKnowledgeResponse> {
        self.sessions.transfer(request)
    }

    pub fn pause_session(&self, session_id: &str) -> TuneResult<TuningSession> {
        self.sessions.pause(session_id)
    }

    pub fn resume_session(&self, session_id: &str) -> TuneResult<TuningSession> {
        self.sessions.resume(session_id)
    }

    pub fn session(&self, session_id: &str) -> TuneResult<TuningSession> {
        self.sessions.snapshot(session_id)
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions.list()
    }
}
