//! Registry of live sessions.
//!
//! Each session sits behind its own mutex inside a concurrent map. The map
//! entry is cloned out before locking, so no map shard lock is held while a
//! session works, and no operation ever holds two session locks at once.

use dashmap::DashMap;
use ht_optimizer::{AnalysisType, SessionSummary, TransferStrategy};
use ht_store::TuningStore;
use ht_types::{
    IdGenerator, IdKind, NotFoundError, ParameterConfiguration, SearchSpace, SessionId,
    SessionStatus, SessionStrategy, TuneResult, TuningSession, ValidationError,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{
    AnalysisResponse, ReportEvaluationRequest, ReportEvaluationResponse, SuggestionResponse,
    TransferKnowledgeRequest, TransferKnowledgeResponse,
};
use crate::config::EngineConfig;
use crate::events::EventSink;
use crate::session::SessionState;

type SessionHandle = Arc<Mutex<SessionState>>;

pub struct SessionManager {
    sessions: DashMap<SessionId, SessionHandle>,
    ids: Arc<dyn IdGenerator>,
    store: Arc<dyn TuningStore>,
    events: EventSink,
    default_seed: Option<u64>,
    max_constraint_attempts: usize,
    warm_start_top_k: usize,
}

impl SessionManager {
    pub fn new(
        config: &EngineConfig,
        ids: Arc<dyn IdGenerator>,
        store: Arc<dyn TuningStore>,
        events: EventSink,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            ids,
            store,
            events,
            default_seed: config.seed,
            max_constraint_attempts: config.max_constraint_attempts,
            warm_start_top_k: config.warm_start_top_k,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn handle(&self, session_id: &str) -> TuneResult<SessionHandle> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                NotFoundError::Session {
                    session_id: session_id.to_string(),
                }
                .into()
            })
    }

    fn persist(&self, record: &TuningSession) {
        match self.store.save_session(record) {
            Ok(()) => debug!(session = %record.id, status = %record.status, "session persisted"),
            Err(e) => warn!(session = %record.id, error = %e, "failed to persist session"),
        }
    }

    /// Run `op` under the session lock. The record is persisted when the
    /// operation succeeds or when it left the session failed.
    fn with_session<T, F>(&self, session_id: &str, op: F) -> TuneResult<T>
    where
        F: FnOnce(&mut SessionState) -> TuneResult<T>,
    {
        let handle = self.handle(session_id)?;
        let mut state = handle.lock();
        let result = op(&mut state);
        if result.is_ok() || state.status() == SessionStatus::Failed {
            self.persist(state.record());
        }
        result
    }

    /// Create a session over `space`, issue its bootstrap batch and register
    /// it. Nothing is registered if the start fails.
    pub fn start(
        &self,
        space: Arc<SearchSpace>,
        strategy: SessionStrategy,
        seed: Option<u64>,
    ) -> TuneResult<(SessionId, Vec<ParameterConfiguration>)> {
        let session_id = self.ids.next_id(IdKind::Session);
        let record = TuningSession::new(
            session_id.clone(),
            space.id.clone(),
            strategy,
            space.search_bounds.max_evaluations,
        );
        let mut state = SessionState::new(
            record,
            space,
            seed.or(self.default_seed),
            self.max_constraint_attempts,
            self.events.clone(),
        );
        let batch = state.start(self.ids.as_ref())?;
        self.persist(state.record());
        self.sessions
            .insert(session_id.clone(), Arc::new(Mutex::new(state)));
        Ok((session_id, batch))
    }

    pub fn suggest(&self, session_id: &str) -> TuneResult<SuggestionResponse> {
        self.with_session(session_id, |state| state.suggest(self.ids.as_ref()))
    }

    pub fn report(
        &self,
        session_id: &str,
        request: ReportEvaluationRequest,
    ) -> TuneResult<ReportEvaluationResponse> {
        self.with_session(session_id, |state| state.report(request))
    }

    pub fn pause(&self, session_id: &str) -> TuneResult<TuningSession> {
        self.with_session(session_id, |state| {
            state.pause()?;
            Ok(state.record().clone())
        })
    }

    pub fn resume(&self, session_id: &str) -> TuneResult<TuningSession> {
        self.with_session(session_id, |state| {
            state.resume()?;
            Ok(state.record().clone())
        })
    }

    pub fn analyze(
        &self,
        session_id: &str,
        analysis_type: AnalysisType,
    ) -> TuneResult<AnalysisResponse> {
        let handle = self.handle(session_id)?;
        let state = handle.lock();
        Ok(AnalysisResponse {
            results: state.analyze(analysis_type),
            session_summary: SessionSummary::of(state.record()),
        })
    }

    /// Current record of a session, falling back to the store for sessions
    /// that are not live in this process.
    pub fn snapshot(&self, session_id: &str) -> TuneResult<TuningSession> {
        if let Ok(handle) = self.handle(session_id) {
            return Ok(handle.lock().record().clone());
        }
        match self.store.load_session(session_id) {
            Ok(Some(record)) => return Ok(record),
            Ok(None) => {}
            Err(e) => warn!(session = session_id, error = %e, "failed to load stored session"),
        }
        Err(NotFoundError::Session {
            session_id: session_id.to_string(),
        }
        .into())
    }

    /// Summaries of the live sessions, ordered by id.
    pub fn list(&self) -> Vec<SessionSummary> {
        let handles: Vec<SessionHandle> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut summaries: Vec<SessionSummary> = handles
            .iter()
            .map(|handle| SessionSummary::of(handle.lock().record()))
            .collect();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        summaries
    }

    /// Seed the target from completed sources. Sources are read one at a
    /// time; the target is locked only after every source was copied.
    pub fn transfer(
        &self,
        request: TransferKnowledgeRequest,
    ) -> TuneResult<TransferKnowledgeResponse> {
        let strategy: TransferStrategy = request.transfer_strategy.parse()?;
        let target_id = request.target_session_id.as_str();

        if request.source_session_ids.is_empty() {
            return Err(invalid_transfer("at least one source session is required"));
        }
        if request.source_session_ids.iter().any(|id| id == target_id) {
            return Err(invalid_transfer(format!(
                "session {target_id} cannot transfer knowledge to itself"
            )));
        }
        let target = self.handle(target_id)?;

        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        for source_id in &request.source_session_ids {
            if !seen.insert(source_id.as_str()) {
                continue;
            }
            let record = self.snapshot(source_id)?;
            if record.status != SessionStatus::Completed {
                return Err(invalid_transfer(format!(
                    "source session {source_id} is {}, only completed sessions can be transferred",
                    record.status
                )));
            }
            sources.push(record);
        }

        let mut state = target.lock();
        let result =
            state.transfer_from(strategy, &sources, self.warm_start_top_k, self.ids.as_ref())?;
        self.persist(state.record());
        info!(
            target = target_id,
            seeded = result.seeded,
            speedup = result.expected_speedup,
            "transfer applied"
        );
        Ok(TransferKnowledgeResponse {
            expected_speedup: result.expected_speedup,
            transfer_result: result,
        })
    }
}

fn invalid_transfer(message: impl Into<String>) -> ht_types::TuneError {
    ValidationError::InvalidTransfer {
        message: message.into(),
    }
    .into()
}
