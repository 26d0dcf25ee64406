//! Mutable state behind one tuning session.
//!
//! A [`SessionState`] is only ever reached through the manager's
//! per-session mutex, so its methods take `&mut self` freely. Internal
//! failures (including panics inside strategies or statistics) move the
//! session to `failed`, keep the history, and surface as
//! [`TuneError::Internal`].

use chrono::Utc;
use ht_optimizer::{
    analyze, compute_statistics, derive_insights, early_stop_recommendation, has_stalled,
    plan_transfer, AdaptiveScheduler, AnalysisResults, AnalysisType, CandidateGenerator,
    ConvergenceState, ConvergenceTracker, GenerationContext, TransferResult, TransferSeed,
    TransferStrategy, MIN_IMPROVEMENT,
};
use ht_types::{
    internal_error, AdaptiveSettings, CandidateOrigin, ConfigurationId, EvaluationResult,
    IdGenerator, IdKind, NotFoundError, ParameterConfiguration, SearchSpace, SessionStatus,
    StateError, TuneError, TuneResult, TuningSession, ValidationError,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::{ReportEvaluationRequest, ReportEvaluationResponse, SuggestionResponse};
use crate::events::{EventSink, SessionEvent};

/// Reason given once the evaluation budget is used up.
pub const MAX_EVALUATIONS_REACHED: &str = "Maximum evaluations reached.";

/// Size of the random batch issued by `start`:
/// `max(1, min(5, floor(max_evaluations / 10)))`.
pub fn bootstrap_size(max_evaluations: usize) -> usize {
    (max_evaluations / 10).clamp(1, 5)
}

pub struct SessionState {
    record: TuningSession,
    space: Arc<SearchSpace>,
    generator: CandidateGenerator,
    rng: ChaCha8Rng,
    /// Suggestions issued and not yet reported.
    pending: HashMap<ConfigurationId, ParameterConfiguration>,
    /// Bootstrap candidates in issue order.
    bootstrap: Vec<ConfigurationId>,
    /// Transferred configurations, drained before the strategy runs.
    warm_pool: VecDeque<ParameterConfiguration>,
    tracker: ConvergenceTracker,
    scheduler: AdaptiveScheduler,
    settings: AdaptiveSettings,
    convergence: ConvergenceState,
    max_constraint_attempts: usize,
    events: EventSink,
}

impl SessionState {
    pub fn new(
        record: TuningSession,
        space: Arc<SearchSpace>,
        seed: Option<u64>,
        max_constraint_attempts: usize,
        events: EventSink,
    ) -> Self {
        let generator = CandidateGenerator::new(record.strategy.kind, &record.strategy.params);
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let settings = record.strategy.adaptive.clone();
        Self {
            tracker: ConvergenceTracker::new(&space.search_bounds),
            scheduler: AdaptiveScheduler::new(settings.clone()),
            settings,
            record,
            space,
            generator,
            rng,
            pending: HashMap::new(),
            bootstrap: Vec::new(),
            warm_pool: VecDeque::new(),
            convergence: ConvergenceState::default(),
            max_constraint_attempts: max_constraint_attempts.max(1),
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn status(&self) -> SessionStatus {
        self.record.status
    }

    pub fn record(&self) -> &TuningSession {
        &self.record
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn settings(&self) -> &AdaptiveSettings {
        &self.settings
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn warm_pool_len(&self) -> usize {
        self.warm_pool.len()
    }

    fn state_error(&self, operation: &str) -> TuneError {
        StateError {
            session_id: self.record.id.clone(),
            status: self.record.status,
            operation: operation.to_string(),
        }
        .into()
    }

    fn issue(&mut self, config: ParameterConfiguration) -> ParameterConfiguration {
        self.pending.insert(config.id.clone(), config.clone());
        self.events.emit(SessionEvent::SuggestionIssued {
            session_id: self.record.id.clone(),
            configuration_id: config.id.clone(),
        });
        config
    }

    /// Outstanding candidates are dropped once the session stops.
    fn retire_candidates(&mut self) {
        self.pending.clear();
        self.bootstrap.clear();
        self.warm_pool.clear();
    }

    fn fail(&mut self, error: TuneError) -> TuneError {
        let message = error.to_string();
        warn!(session = %self.record.id, error = %message, "session failed");
        self.record.mark_failed(message.clone());
        self.retire_candidates();
        self.events.emit(SessionEvent::Failed {
            session_id: self.record.id.clone(),
            error: message,
        });
        error
    }

    fn complete(&mut self, reason: &str) {
        info!(
            session = %self.record.id,
            evaluations = self.record.progress.evaluations_completed,
            best = ?self.record.progress.current_best_score,
            reason,
            "session completed"
        );
        self.record.mark_completed(reason);
        self.retire_candidates();
        self.events.emit(SessionEvent::Completed {
            session_id: self.record.id.clone(),
            reason: reason.to_string(),
        });
    }

    /// Issue the random bootstrap batch and move to `running`.
    pub fn start(&mut self, ids: &dyn IdGenerator) -> TuneResult<Vec<ParameterConfiguration>> {
        if self.record.status != SessionStatus::Pending {
            return Err(self.state_error("start"));
        }

        let count = bootstrap_size(self.record.progress.total_evaluations);
        let mut batch = Vec::with_capacity(count);
        for _ in 0..count {
            let values = match ht_optimizer::sample_configuration(&self.space, &mut self.rng) {
                Ok(values) => values,
                Err(e) => return Err(self.fail(e)),
            };
            let config = ParameterConfiguration::new(
                ids.next_id(IdKind::Configuration),
                values,
                CandidateOrigin::Bootstrap,
            );
            self.bootstrap.push(config.id.clone());
            batch.push(self.issue(config));
        }

        self.record.mark_running();
        info!(
            session = %self.record.id,
            strategy = %self.record.strategy.kind,
            bootstrap = count,
            "session started"
        );
        self.events.emit(SessionEvent::Started {
            session_id: self.record.id.clone(),
            strategy: self.record.strategy.kind,
            bootstrap: count,
        });
        Ok(batch)
    }

    /// Why the session should stop issuing candidates, if it should.
    /// Budget, then convergence, then stall.
    pub fn stop_reason(&self) -> Option<String> {
        let progress = &self.record.progress;
        if progress.evaluations_completed >= progress.total_evaluations {
            return Some(MAX_EVALUATIONS_REACHED.to_string());
        }
        if progress.convergence_indicator > self.settings.convergence_threshold {
            return Some(format!(
                "Converged: indicator {:.4} exceeds threshold {}.",
                progress.convergence_indicator, self.settings.convergence_threshold
            ));
        }
        if has_stalled(&self.record.history) {
            return Some(format!(
                "No improvement of at least {MIN_IMPROVEMENT} over the last 10 evaluations."
            ));
        }
        None
    }

    fn response(
        &self,
        suggestion: Option<ParameterConfiguration>,
        reason: Option<String>,
    ) -> SuggestionResponse {
        SuggestionResponse {
            session_id: self.record.id.clone(),
            suggestion,
            reason,
            status: self.record.status,
            progress: self.record.progress.clone(),
            adaptive_settings: self.settings.clone(),
        }
    }

    pub fn suggest(&mut self, ids: &dyn IdGenerator) -> TuneResult<SuggestionResponse> {
        if self.record.status != SessionStatus::Running {
            return Err(self.state_error("suggest"));
        }

        if let Some(reason) = self.stop_reason() {
            self.complete(&reason);
            return Ok(self.response(None, Some(reason)));
        }

        if let Some(seed) = self.warm_pool.pop_front() {
            debug!(session = %self.record.id, configuration = %seed.id, "issuing warm-start seed");
            let config = self.issue(seed);
            return Ok(self.response(Some(config), None));
        }

        let id = ids.next_id(IdKind::Configuration);
        let config = self.guarded("candidate generation", |s| s.generate(id))?;

        debug!(
            session = %self.record.id,
            configuration = %config.id,
            strategy = self.generator.name(),
            stage = ?config.stage,
            "suggestion issued"
        );
        let config = self.issue(config);
        Ok(self.response(Some(config), None))
    }

    /// Run the strategy, retrying for constraint satisfaction when enabled,
    /// and re-validate the result against the space.
    fn generate(&mut self, id: ConfigurationId) -> TuneResult<ParameterConfiguration> {
        let enforce =
            self.record.strategy.params.enforce_constraints && !self.space.constraints.is_empty();
        let attempts = if enforce { self.max_constraint_attempts } else { 1 };
        let ctx = GenerationContext {
            space: &self.space,
            history: &self.record.history,
            diversity_pressure: self.scheduler.diversity_pressure(&self.convergence),
        };

        let mut config = self.generator.generate(&ctx, id.clone(), &mut self.rng)?;
        for _ in 1..attempts {
            if self.space.violated_constraints(&config.values).is_empty() {
                break;
            }
            config = self.generator.generate(&ctx, id.clone(), &mut self.rng)?;
        }

        let violations = self.space.configuration_violations(&config.values);
        if !violations.is_empty() {
            return Err(internal_error!(
                "strategy {} proposed an invalid configuration: {}",
                self.generator.name(),
                violations.join("; ")
            ));
        }
        Ok(config)
    }

    pub fn report(
        &mut self,
        request: ReportEvaluationRequest,
    ) -> TuneResult<ReportEvaluationResponse> {
        if !matches!(self.record.status, SessionStatus::Running | SessionStatus::Paused) {
            return Err(self.state_error("report"));
        }
        if !request.primary_metric.is_finite() {
            return Err(ValidationError::InvalidReport {
                message: format!("primary metric must be finite, got {}", request.primary_metric),
            }
            .into());
        }
        let non_finite = request.auxiliary_metrics.iter().find(|(_, v)| !v.is_finite());
        if let Some((name, value)) = non_finite {
            return Err(ValidationError::InvalidReport {
                message: format!("auxiliary metric '{name}' must be finite, got {value}"),
            }
            .into());
        }

        let pending = self.pending.get(&request.configuration_id);
        let (parameters, resource_budget, stage) = match pending {
            Some(config) => (config.values.clone(), config.resource_budget, config.stage),
            None => match &request.parameters {
                Some(values) => {
                    let violations = self.space.configuration_violations(values);
                    if !violations.is_empty() {
                        return Err(ValidationError::InvalidConfiguration { violations }.into());
                    }
                    (values.clone(), None, None)
                }
                None => {
                    return Err(NotFoundError::Configuration {
                        session_id: self.record.id.clone(),
                        configuration_id: request.configuration_id.clone(),
                    }
                    .into())
                }
            },
        };
        self.pending.remove(&request.configuration_id);

        let result = EvaluationResult {
            sequence: self.record.history.len(),
            configuration_id: request.configuration_id,
            parameters,
            primary_metric: request.primary_metric,
            auxiliary_metrics: request.auxiliary_metrics,
            duration_seconds: request.duration_seconds,
            resource_usage: request.resource_usage,
            resource_budget,
            stage,
            timestamp: Utc::now(),
        };

        self.guarded("recording evaluation", |s| Ok(s.absorb(result)))
    }

    /// Run `op` with panics caught. An error or panic inside it fails the
    /// session; the history stays as it was.
    fn guarded<T, F>(&mut self, operation: &str, op: F) -> TuneResult<T>
    where
        F: FnOnce(&mut Self) -> TuneResult<T>,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| op(self))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.fail(e)),
            Err(payload) => {
                let error = internal_error!("{} panicked: {}", operation, panic_message(payload));
                Err(self.fail(error))
            }
        }
    }

    /// Append `result` and recompute every derived view.
    fn absorb(&mut self, result: EvaluationResult) -> ReportEvaluationResponse {
        let improved = self.record.update_best(&result);
        self.record.history.push(result.clone());

        let history = &self.record.history;
        self.record.statistics = compute_statistics(history);
        self.convergence = self.tracker.assess(history);
        self.record.insights = derive_insights(&self.space, history, &self.convergence);

        let progress = &mut self.record.progress;
        progress.evaluations_completed += 1;
        progress.convergence_indicator = self.convergence.indicator;
        if let Some(started) = self.record.started_at {
            let elapsed_ms = (result.timestamp - started).num_milliseconds().max(0);
            progress.elapsed_seconds = elapsed_ms as f64 / 1000.0;
        }
        self.settings = self.scheduler.update(progress, &self.convergence);
        self.record.strategy.adaptive = self.settings.clone();

        debug!(
            session = %self.record.id,
            configuration = %result.configuration_id,
            metric = result.primary_metric,
            completed = progress.evaluations_completed,
            indicator = self.convergence.indicator,
            "evaluation recorded"
        );
        self.events.emit(SessionEvent::EvaluationRecorded {
            session_id: self.record.id.clone(),
            configuration_id: result.configuration_id.clone(),
            sequence: result.sequence,
            primary_metric: result.primary_metric,
        });
        if improved {
            self.events.emit(SessionEvent::NewBest {
                session_id: self.record.id.clone(),
                configuration_id: result.configuration_id.clone(),
                score: result.primary_metric,
            });
        }

        ReportEvaluationResponse {
            best_score: self.record.progress.current_best_score,
            progress: self.record.progress.clone(),
            insights: self.record.insights.clone(),
            early_stop_recommendation: early_stop_recommendation(
                &self.record.history,
                self.convergence.indicator,
            ),
            evaluation: result,
        }
    }

    pub fn pause(&mut self) -> TuneResult<()> {
        if self.record.status != SessionStatus::Running {
            return Err(self.state_error("pause"));
        }
        self.record.mark_paused();
        info!(session = %self.record.id, "session paused");
        self.events.emit(SessionEvent::Paused {
            session_id: self.record.id.clone(),
        });
        Ok(())
    }

    pub fn resume(&mut self) -> TuneResult<()> {
        if self.record.status != SessionStatus::Paused {
            return Err(self.state_error("resume"));
        }
        self.record.mark_running();
        info!(session = %self.record.id, "session resumed");
        self.events.emit(SessionEvent::Resumed {
            session_id: self.record.id.clone(),
        });
        Ok(())
    }

    pub fn analyze(&self, analysis_type: AnalysisType) -> AnalysisResults {
        analyze(analysis_type, &self.space, &self.record)
    }

    /// Queue transferred configurations ahead of the strategy.
    pub fn seed(&mut self, seeds: Vec<TransferSeed>, ids: &dyn IdGenerator) -> TuneResult<usize> {
        self.ensure_transfer_target()?;
        let count = seeds.len();
        for seed in seeds {
            self.warm_pool.push_back(ParameterConfiguration::new(
                ids.next_id(IdKind::Configuration),
                seed.values,
                CandidateOrigin::WarmStart {
                    source_session: seed.source_session,
                },
            ));
        }
        Ok(count)
    }

    fn ensure_transfer_target(&self) -> TuneResult<()> {
        if matches!(self.record.status, SessionStatus::Running | SessionStatus::Paused) {
            Ok(())
        } else {
            Err(self.state_error("transfer knowledge into"))
        }
    }

    /// Bootstrap candidates issued and not yet reported, in issue order.
    fn pending_bootstrap(&self) -> Vec<ConfigurationId> {
        self.bootstrap
            .iter()
            .filter(|id| self.pending.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Plan a transfer from completed `sources` and queue its seeds.
    ///
    /// Each seed takes the place of one unreported bootstrap candidate; the
    /// most recently issued ones are withdrawn and listed in the result.
    /// Once the bootstrap has been reported nothing is skipped and no
    /// speedup is claimed.
    pub fn transfer_from(
        &mut self,
        strategy: TransferStrategy,
        sources: &[TuningSession],
        top_k: usize,
        ids: &dyn IdGenerator,
    ) -> TuneResult<TransferResult> {
        self.ensure_transfer_target()?;
        let pending_bootstrap = self.pending_bootstrap();
        let plan = plan_transfer(
            strategy,
            sources,
            &self.space,
            pending_bootstrap.len(),
            top_k,
            &mut self.rng,
        )?;
        let mut result = plan.result;
        self.seed(plan.seeds, ids)?;

        let keep = pending_bootstrap.len() - result.bootstrap_skipped;
        let withdrawn = pending_bootstrap[keep..].to_vec();
        for id in &withdrawn {
            self.pending.remove(id);
        }
        result.withdrawn_configurations = withdrawn;

        info!(
            session = %self.record.id,
            strategy = strategy.name(),
            sources = sources.len(),
            seeded = result.seeded,
            withdrawn = result.bootstrap_skipped,
            "knowledge transferred"
        );
        self.events.emit(SessionEvent::KnowledgeTransferred {
            session_id: self.record.id.clone(),
            sources: sources.iter().map(|s| s.id.clone()).collect(),
            strategy,
            seeded: result.seeded,
        });
        Ok(result)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use ht_types::{
        ErrorKind, ParameterDefinition, ParameterValue, ParameterValues, SamplingStrategy,
        SearchBounds, SequentialIdGenerator, SessionStrategy, StrategyKind,
    };

    fn space(max_evaluations: usize) -> Arc<SearchSpace> {
        Arc::new(SearchSpace {
            id: "space-1".into(),
            name: "lr".into(),
            parameters: vec![ParameterDefinition::continuous("lr", 0.0001, 0.1)],
            constraints: vec![],
            search_bounds: SearchBounds::default().with_max_evaluations(max_evaluations),
            sampling_strategy: SamplingStrategy::Random,
            created_at: Utc::now(),
        })
    }

    fn state(kind: StrategyKind, max_evaluations: usize, events: EventSink) -> SessionState {
        let space = space(max_evaluations);
        let record = TuningSession::new(
            "session-1".into(),
            space.id.clone(),
            SessionStrategy::new(kind),
            max_evaluations,
        );
        SessionState::new(record, space, Some(7), 10, events)
    }

    fn lr(value: f64) -> ParameterValues {
        let mut values = ParameterValues::new();
        values.insert("lr".into(), ParameterValue::Float(value));
        values
    }

    #[test]
    fn bootstrap_size_follows_budget() {
        assert_eq!(bootstrap_size(1), 1);
        assert_eq!(bootstrap_size(20), 2);
        assert_eq!(bootstrap_size(100), 5);
        assert_eq!(bootstrap_size(1000), 5);
    }

    #[test]
    fn start_issues_pending_bootstrap() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Random, 20, EventSink::disabled());
        let batch = s.start(&ids).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|c| c.origin == CandidateOrigin::Bootstrap));
        assert_eq!(s.pending_count(), 2);
        assert_eq!(s.status(), SessionStatus::Running);
        assert_eq!(s.start(&ids).unwrap_err().kind(), ErrorKind::State);
    }

    #[test]
    fn report_resolves_pending_and_explicit_parameters() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Random, 20, EventSink::disabled());
        let batch = s.start(&ids).unwrap();

        let response = s.report(ReportEvaluationRequest::new(batch[0].id.clone(), 0.4)).unwrap();
        assert_eq!(response.evaluation.parameters, batch[0].values);
        assert_eq!(s.pending_count(), 1);

        let response = s
            .report(ReportEvaluationRequest::new("external-1", 0.9).with_parameters(lr(0.01)))
            .unwrap();
        assert_eq!(response.best_score, Some(0.9));
        assert_eq!(response.progress.evaluations_completed, 2);

        let missing = s.report(ReportEvaluationRequest::new("nobody", 0.1)).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let out_of_range = s
            .report(ReportEvaluationRequest::new("external-2", 0.1).with_parameters(lr(5.0)))
            .unwrap_err();
        assert_eq!(out_of_range.kind(), ErrorKind::Validation);

        let nan = s
            .report(ReportEvaluationRequest::new(batch[1].id.clone(), f64::NAN))
            .unwrap_err();
        assert_eq!(nan.kind(), ErrorKind::Validation);
        assert_eq!(s.pending_count(), 1);
        assert_eq!(s.record().history.len(), 2);
    }

    #[test]
    fn budget_exhaustion_completes_the_session() {
        let ids = SequentialIdGenerator::new();
        let (tx, rx) = unbounded();
        let mut s = state(StrategyKind::Random, 3, EventSink::new(tx));
        s.start(&ids).unwrap();
        for i in 0..3 {
            let request =
                ReportEvaluationRequest::new(format!("t-{i}"), i as f64).with_parameters(lr(0.01));
            s.report(request).unwrap();
        }

        let response = s.suggest(&ids).unwrap();
        assert!(response.suggestion.is_none());
        assert_eq!(response.reason.as_deref(), Some(MAX_EVALUATIONS_REACHED));
        assert_eq!(response.status, SessionStatus::Completed);
        assert_eq!(s.suggest(&ids).unwrap_err().kind(), ErrorKind::State);

        let events: Vec<SessionEvent> = rx.try_iter().collect();
        assert!(matches!(events.last(), Some(SessionEvent::Completed { .. })));
        assert_eq!(
            events.iter().filter(|e| matches!(e, SessionEvent::NewBest { .. })).count(),
            3
        );
    }

    #[test]
    fn convergence_stops_before_budget() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Random, 100, EventSink::disabled());
        s.start(&ids).unwrap();
        for i in 0..10 {
            s.report(ReportEvaluationRequest::new(format!("t-{i}"), 0.5).with_parameters(lr(0.01)))
                .unwrap();
        }
        let response = s.suggest(&ids).unwrap();
        assert!(response.suggestion.is_none());
        assert!(response.reason.unwrap().starts_with("Converged"));
    }

    #[test]
    fn stall_stops_when_the_last_ten_do_not_improve() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Random, 100, EventSink::disabled());
        s.start(&ids).unwrap();
        let scores = [5.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        for (i, score) in scores.iter().enumerate() {
            let request =
                ReportEvaluationRequest::new(format!("t-{i}"), *score).with_parameters(lr(0.01));
            s.report(request).unwrap();
        }
        let response = s.suggest(&ids).unwrap();
        assert!(response.reason.unwrap().starts_with("No improvement"));
    }

    #[test]
    fn pause_blocks_suggest_but_not_report() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Genetic, 20, EventSink::disabled());
        let batch = s.start(&ids).unwrap();
        s.pause().unwrap();
        assert_eq!(s.suggest(&ids).unwrap_err().kind(), ErrorKind::State);
        s.report(ReportEvaluationRequest::new(batch[0].id.clone(), 0.3)).unwrap();
        assert_eq!(s.status(), SessionStatus::Paused);
        assert!(s.pause().is_err());
        s.resume().unwrap();
        assert!(s.resume().is_err());
        assert!(s.suggest(&ids).unwrap().suggestion.is_some());
    }

    #[test]
    fn warm_seeds_are_issued_first() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Perturbation, 20, EventSink::disabled());
        s.start(&ids).unwrap();
        let seeded = s
            .seed(
                vec![TransferSeed {
                    source_session: "session-0".into(),
                    source_configuration: "config-0".into(),
                    source_score: 1.0,
                    values: lr(0.05),
                }],
                &ids,
            )
            .unwrap();
        assert_eq!(seeded, 1);

        let first = s.suggest(&ids).unwrap().suggestion.unwrap();
        assert_eq!(first.values, lr(0.05));
        assert_eq!(
            first.origin,
            CandidateOrigin::WarmStart {
                source_session: "session-0".into()
            }
        );
        let second = s.suggest(&ids).unwrap().suggestion.unwrap();
        assert!(!matches!(second.origin, CandidateOrigin::WarmStart { .. }));
    }

    #[test]
    fn exploration_rate_decays_with_reports() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Random, 20, EventSink::disabled());
        s.start(&ids).unwrap();
        let mut previous = s.settings().exploration_rate;
        for i in 0..8 {
            let request =
                ReportEvaluationRequest::new(format!("t-{i}"), i as f64).with_parameters(lr(0.01));
            s.report(request).unwrap();
            assert!(s.settings().exploration_rate <= previous);
            previous = s.settings().exploration_rate;
        }
        assert!(previous < 0.8);
    }

    fn completed_source(id: &str, scores: &[f64]) -> TuningSession {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Random, scores.len(), EventSink::disabled());
        s.start(&ids).unwrap();
        for (i, score) in scores.iter().enumerate() {
            let request = ReportEvaluationRequest::new(format!("{id}-{i}"), *score)
                .with_parameters(lr(0.001 * (i + 1) as f64));
            s.report(request).unwrap();
        }
        assert!(s.suggest(&ids).unwrap().suggestion.is_none());
        let mut record = s.record().clone();
        record.id = id.into();
        record
    }

    #[test]
    fn warm_start_withdraws_the_bootstrap_it_replaces() {
        let ids = SequentialIdGenerator::new();
        let source = completed_source("source", &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7]);

        let mut s = state(StrategyKind::Random, 50, EventSink::disabled());
        let batch = s.start(&ids).unwrap();
        assert_eq!(batch.len(), 5);

        let result = s.transfer_from(TransferStrategy::WarmStart, &[source], 3, &ids).unwrap();
        assert_eq!(result.seeded, 3);
        assert_eq!(result.bootstrap_skipped, 3);
        let withdrawn: Vec<ConfigurationId> = batch[2..].iter().map(|c| c.id.clone()).collect();
        assert_eq!(result.withdrawn_configurations, withdrawn);
        assert!((result.expected_speedup - 50.0 / 47.0).abs() < 1e-12);
        assert_eq!(s.pending_count(), 2);

        for id in &withdrawn {
            let err = s.report(ReportEvaluationRequest::new(id.clone(), 1.0)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
        s.report(ReportEvaluationRequest::new(batch[0].id.clone(), 1.0)).unwrap();
    }

    #[test]
    fn warm_start_after_bootstrap_claims_no_speedup() {
        let ids = SequentialIdGenerator::new();
        let source = completed_source("source", &[0.1, 0.2, 0.3]);

        let mut s = state(StrategyKind::Random, 20, EventSink::disabled());
        for config in s.start(&ids).unwrap() {
            s.report(ReportEvaluationRequest::new(config.id, 0.5)).unwrap();
        }

        let result = s.transfer_from(TransferStrategy::WarmStart, &[source], 5, &ids).unwrap();
        assert_eq!(result.seeded, 3);
        assert!(result.effective);
        assert_eq!(result.bootstrap_skipped, 0);
        assert!(result.withdrawn_configurations.is_empty());
        assert_eq!(result.expected_speedup, 1.0);
        assert_eq!(s.warm_pool_len(), 3);
    }

    #[test]
    fn completion_drops_outstanding_candidates() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Random, 2, EventSink::disabled());
        s.start(&ids).unwrap();
        s.seed(
            vec![TransferSeed {
                source_session: "session-0".into(),
                source_configuration: "config-0".into(),
                source_score: 1.0,
                values: lr(0.05),
            }],
            &ids,
        )
        .unwrap();
        s.suggest(&ids).unwrap();
        assert_eq!(s.pending_count(), 2);

        for i in 0..2 {
            let request =
                ReportEvaluationRequest::new(format!("t-{i}"), 0.1).with_parameters(lr(0.01));
            s.report(request).unwrap();
        }
        s.seed(
            vec![TransferSeed {
                source_session: "session-0".into(),
                source_configuration: "config-1".into(),
                source_score: 1.0,
                values: lr(0.02),
            }],
            &ids,
        )
        .unwrap();
        assert!(s.suggest(&ids).unwrap().suggestion.is_none());
        assert_eq!(s.pending_count(), 0);
        assert_eq!(s.warm_pool_len(), 0);
    }

    #[test]
    fn sampling_errors_during_suggest_fail_the_session() {
        let ids = SequentialIdGenerator::new();
        let (tx, rx) = unbounded();
        let mut s = state(StrategyKind::Random, 20, EventSink::new(tx));
        s.start(&ids).unwrap();
        s.report(ReportEvaluationRequest::new("t-0", 1.0).with_parameters(lr(0.01))).unwrap();

        let mut broken = (*s.space).clone();
        broken.parameters[0].range = None;
        s.space = Arc::new(broken);

        let err = s.suggest(&ids).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(s.status(), SessionStatus::Failed);
        assert!(s.record().error.is_some());
        assert_eq!(s.record().history.len(), 1);
        assert_eq!(s.pending_count(), 0);
        assert_eq!(s.suggest(&ids).unwrap_err().kind(), ErrorKind::State);
        assert!(rx.try_iter().any(|e| matches!(e, SessionEvent::Failed { .. })));
    }

    #[test]
    fn invalid_proposals_fail_the_session() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Perturbation, 20, EventSink::disabled());
        s.start(&ids).unwrap();
        s.report(ReportEvaluationRequest::new("t-0", 1.0).with_parameters(lr(0.01))).unwrap();

        // The inherited float no longer fits the now-discrete parameter.
        let mut narrowed = (*s.space).clone();
        narrowed.parameters = vec![ParameterDefinition::discrete("lr", 1, 4)];
        s.space = Arc::new(narrowed);

        let err = s.suggest(&ids).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("proposed an invalid configuration"));
        assert_eq!(s.status(), SessionStatus::Failed);
        assert_eq!(s.record().history.len(), 1);
    }

    #[test]
    fn panics_inside_guarded_work_fail_the_session() {
        let ids = SequentialIdGenerator::new();
        let mut s = state(StrategyKind::Random, 20, EventSink::disabled());
        s.start(&ids).unwrap();
        s.report(ReportEvaluationRequest::new("t-0", 1.0).with_parameters(lr(0.01))).unwrap();

        let err = s
            .guarded("recording evaluation", |_: &mut SessionState| -> TuneResult<()> {
                panic!("boom")
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("recording evaluation panicked: boom"));
        assert_eq!(s.status(), SessionStatus::Failed);
        assert!(s.record().error.as_deref().unwrap().contains("boom"));
        assert_eq!(s.record().history.len(), 1);
        assert_eq!(s.suggest(&ids).unwrap_err().kind(), ErrorKind::State);
    }
}
