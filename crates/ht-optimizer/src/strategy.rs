//! Candidate generation strategies.
//!
//! The strategy is chosen once when a session starts and stored as a
//! [`CandidateGenerator`]; every `suggest` call dispatches through an
//! exhaustive match rather than re-parsing a strategy name.

use ht_types::{
    CandidateOrigin, ConfigurationId, EvaluationResult, ParameterConfiguration, ParameterKind,
    ParameterValues, SearchSpace, StrategyKind, StrategyParams, TuneResult,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Ordering;

use crate::sampler::{sample, sample_configuration};
use crate::staged::ResourceStagedSearch;
use crate::statistics::mean;

/// Everything a strategy may consult when proposing a candidate.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub space: &'a SearchSpace,
    pub history: &'a [EvaluationResult],
    /// Set when the session has plateaued and diversity maintenance is on.
    pub diversity_pressure: bool,
}

/// Common interface of all search strategies.
pub trait SearchStrategy {
    /// Propose the next configuration, using `id` as its identifier.
    fn propose<R: Rng + ?Sized>(
        &mut self,
        ctx: &GenerationContext<'_>,
        id: ConfigurationId,
        rng: &mut R,
    ) -> TuneResult<ParameterConfiguration>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Closed set of strategies, selected at session start.
#[derive(Debug, Clone)]
pub enum CandidateGenerator {
    Random(RandomSearch),
    Perturbation(PerturbationSearch),
    Genetic(GeneticSearch),
    ResourceStaged(ResourceStagedSearch),
}

impl CandidateGenerator {
    pub fn new(kind: StrategyKind, params: &StrategyParams) -> Self {
        match kind {
            StrategyKind::Random => Self::Random(RandomSearch),
            StrategyKind::Perturbation => {
                Self::Perturbation(PerturbationSearch::new(params.perturbation_scale))
            }
            StrategyKind::Genetic => Self::Genetic(GeneticSearch::new(
                params.mutation_rate,
                params.crossover_probability,
            )),
            StrategyKind::ResourceStaged => Self::ResourceStaged(ResourceStagedSearch::new(
                params.reduction_factor,
                params.min_resource,
                params.max_resource,
            )),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Random(_) => StrategyKind::Random,
            Self::Perturbation(_) => StrategyKind::Perturbation,
            Self::Genetic(_) => StrategyKind::Genetic,
            Self::ResourceStaged(_) => StrategyKind::ResourceStaged,
        }
    }

    pub fn generate<R: Rng + ?Sized>(
        &mut self,
        ctx: &GenerationContext<'_>,
        id: ConfigurationId,
        rng: &mut R,
    ) -> TuneResult<ParameterConfiguration> {
        match self {
            Self::Random(s) => s.propose(ctx, id, rng),
            Self::Perturbation(s) => s.propose(ctx, id, rng),
            Self::Genetic(s) => s.propose(ctx, id, rng),
            Self::ResourceStaged(s) => s.propose(ctx, id, rng),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Random(s) => s.name(),
            Self::Perturbation(s) => s.name(),
            Self::Genetic(s) => s.name(),
            Self::ResourceStaged(s) => s.name(),
        }
    }
}

/// Checks strategy knobs before a session is created.
pub fn strategy_params_violations(params: &StrategyParams) -> Vec<String> {
    let mut violations = Vec::new();
    if !(0.0..=1.0).contains(&params.mutation_rate) {
        violations.push(format!(
            "mutation_rate must be within [0, 1], got {}",
            params.mutation_rate
        ));
    }
    if !(0.0..=1.0).contains(&params.crossover_probability) {
        violations.push(format!(
            "crossover_probability must be within [0, 1], got {}",
            params.crossover_probability
        ));
    }
    if !(params.perturbation_scale >= 0.0 && params.perturbation_scale.is_finite()) {
        violations.push(format!(
            "perturbation_scale must be a non-negative number, got {}",
            params.perturbation_scale
        ));
    }
    if params.reduction_factor < 2 {
        violations.push(format!(
            "reduction_factor must be at least 2, got {}",
            params.reduction_factor
        ));
    }
    if !(params.min_resource > 0.0 && params.min_resource <= params.max_resource) {
        violations.push(format!(
            "resource bounds must satisfy 0 < min_resource <= max_resource, got [{}, {}]",
            params.min_resource, params.max_resource
        ));
    }
    violations
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSearch;

impl SearchStrategy for RandomSearch {
    fn propose<R: Rng + ?Sized>(
        &mut self,
        ctx: &GenerationContext<'_>,
        id: ConfigurationId,
        rng: &mut R,
    ) -> TuneResult<ParameterConfiguration> {
        let values = sample_configuration(ctx.space, rng)?;
        Ok(ParameterConfiguration::new(id, values, CandidateOrigin::Random))
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Perturbation-guided search ----

/// Biases sampling toward regions that scored above average.
///
/// No surrogate model is fitted. A reference is drawn among evaluations
/// above the running mean and its continuous parameters are nudged by a
/// relative uniform perturbation; everything else is inherited. Only an
/// empty history falls back to random sampling.
#[derive(Debug, Clone)]
pub struct PerturbationSearch {
    scale: f64,
}

impl PerturbationSearch {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }
}

impl SearchStrategy for PerturbationSearch {
    fn propose<R: Rng + ?Sized>(
        &mut self,
        ctx: &GenerationContext<'_>,
        id: ConfigurationId,
        rng: &mut R,
    ) -> TuneResult<ParameterConfiguration> {
        if ctx.history.is_empty() {
            return RandomSearch.propose(ctx, id, rng);
        }

        let scores: Vec<f64> = ctx.history.iter().map(|r| r.primary_metric).collect();
        let average = mean(&scores).unwrap_or(0.0);
        let mut promising: Vec<&EvaluationResult> = ctx
            .history
            .iter()
            .filter(|r| r.primary_metric > average)
            .collect();
        if promising.is_empty() {
            // Every score equals the mean.
            promising = ctx.history.iter().collect();
        }
        let reference = match promising.choose(rng) {
            Some(r) => *r,
            None => return RandomSearch.propose(ctx, id, rng),
        };

        let scale = if ctx.diversity_pressure {
            self.scale * 2.0
        } else {
            self.scale
        };

        let mut values = ParameterValues::with_capacity(ctx.space.parameters.len());
        for param in &ctx.space.parameters {
            let inherited = reference.parameters.get(&param.name);
            let value = match (param.kind, inherited) {
                (ParameterKind::Continuous, Some(v)) => match v.as_f64() {
                    Some(base) => {
                        let factor = 1.0 + rng.gen_range(-scale..=scale);
                        match param.clamp_numeric(base * factor) {
                            Some(clamped) => clamped,
                            None => sample(param, rng)?,
                        }
                    }
                    None => sample(param, rng)?,
                },
                (_, Some(v)) => v.clone(),
                (_, None) => sample(param, rng)?,
            };
            values.insert(param.name.clone(), value);
        }

        Ok(ParameterConfiguration::new(
            id,
            values,
            CandidateOrigin::Perturbation {
                reference: reference.configuration_id.clone(),
            },
        ))
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}

// ---- Genetic search ----

/// Selection, uniform crossover and mutation over the evaluation history.
///
/// No population is kept between calls: the two best evaluations so far are
/// the parents of every child.
#[derive(Debug, Clone)]
pub struct GeneticSearch {
    mutation_rate: f64,
    crossover_probability: f64,
}

impl GeneticSearch {
    pub fn new(mutation_rate: f64, crossover_probability: f64) -> Self {
        Self {
            mutation_rate,
            crossover_probability,
        }
    }

    fn effective_mutation_rate(&self, diversity_pressure: bool) -> f64 {
        if diversity_pressure {
            (self.mutation_rate * 2.0).min(0.5).max(self.mutation_rate)
        } else {
            self.mutation_rate
        }
    }
}

/// History ordered by score, best first. Ties keep report order.
pub fn rank_by_score(history: &[EvaluationResult]) -> Vec<&EvaluationResult> {
    let mut ranked: Vec<&EvaluationResult> = history.iter().collect();
    ranked.sort_by(|a, b| {
        b.primary_metric
            .partial_cmp(&a.primary_metric)
            .unwrap_or(Ordering::Equal)
            .then(a.sequence.cmp(&b.sequence))
    });
    ranked
}

impl SearchStrategy for GeneticSearch {
    fn propose<R: Rng + ?Sized>(
        &mut self,
        ctx: &GenerationContext<'_>,
        id: ConfigurationId,
        rng: &mut R,
    ) -> TuneResult<ParameterConfiguration> {
        if ctx.history.len() < 2 {
            return RandomSearch.propose(ctx, id, rng);
        }

        let ranked = rank_by_score(ctx.history);
        let (first, second) = (ranked[0], ranked[1]);
        let mutation_rate = self.effective_mutation_rate(ctx.diversity_pressure);

        let mut values = ParameterValues::with_capacity(ctx.space.parameters.len());
        for param in &ctx.space.parameters {
            let parent = if rng.gen::<f64>() < self.crossover_probability {
                first
            } else {
                second
            };
            let gene = match parent.parameters.get(&param.name) {
                Some(v) if rng.gen::<f64>() >= mutation_rate => v.clone(),
                _ => sample(param, rng)?,
            };
            values.insert(param.name.clone(), gene);
        }

        Ok(ParameterConfiguration::new(
            id,
            values,
            CandidateOrigin::Crossover {
                parents: [first.configuration_id.clone(), second.configuration_id.clone()],
            },
        ))
    }

    fn name(&self) -> &str {
        "genetic"
    }
}
