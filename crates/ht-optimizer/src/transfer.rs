//! Knowledge transfer between sessions.

use ht_types::{
    ConfigurationId, EvaluationResult, NotFoundError, ParameterValues, SearchSpace, SessionId,
    TuneError, TuneResult, TuningSession,
};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::sampler::sample;

/// Evaluations taken from the sources when no other limit is configured.
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStrategy {
    WarmStart,
    /// Accepted for compatibility; transfers nothing.
    MetaLearning,
    /// Accepted for compatibility; transfers nothing.
    SurrogateTransfer,
}

impl TransferStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WarmStart => "warm_start",
            Self::MetaLearning => "meta_learning",
            Self::SurrogateTransfer => "surrogate_transfer",
        }
    }
}

impl FromStr for TransferStrategy {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "warm_start" => Ok(Self::WarmStart),
            "meta_learning" => Ok(Self::MetaLearning),
            "surrogate_transfer" => Ok(Self::SurrogateTransfer),
            _ => Err(NotFoundError::Strategy {
                strategy: s.to_string(),
            }
            .into()),
        }
    }
}

/// One source evaluation adapted to the target space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSeed {
    pub source_session: SessionId,
    pub source_configuration: ConfigurationId,
    pub source_score: f64,
    pub values: ParameterValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub strategy: TransferStrategy,
    pub seeded: usize,
    /// Target parameters that took a value from a source.
    pub transferred_parameters: Vec<String>,
    /// Source parameters the target space does not declare.
    pub skipped_parameters: Vec<String>,
    pub source_evaluations_considered: usize,
    pub effective: bool,
    /// Pending bootstrap candidates the seeds replace.
    pub bootstrap_skipped: usize,
    /// Identifiers of the withdrawn bootstrap candidates. Reports naming
    /// them are no longer accepted without explicit parameters.
    #[serde(default)]
    pub withdrawn_configurations: Vec<ConfigurationId>,
    pub expected_speedup: f64,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub seeds: Vec<TransferSeed>,
    pub result: TransferResult,
}

/// The `k` best evaluations across all sources, best first. Ties are
/// broken by source order then report order.
pub fn top_evaluations(
    sources: &[TuningSession],
    k: usize,
) -> Vec<(&SessionId, &EvaluationResult)> {
    let mut all: Vec<(usize, &SessionId, &EvaluationResult)> = sources
        .par_iter()
        .enumerate()
        .flat_map_iter(|(i, session)| session.history.iter().map(move |r| (i, &session.id, r)))
        .collect();
    all.sort_by(|a, b| {
        b.2.primary_metric
            .partial_cmp(&a.2.primary_metric)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
            .then(a.2.sequence.cmp(&b.2.sequence))
    });
    all.into_iter().take(k).map(|(_, id, r)| (id, r)).collect()
}

/// Map source values onto `space`: in-range values are kept, numeric values
/// are clamped, anything else is re-sampled. Returns the adapted values and
/// the names that came from the source.
pub fn adapt_to_space<R: Rng + ?Sized>(
    source: &ParameterValues,
    space: &SearchSpace,
    rng: &mut R,
) -> TuneResult<(ParameterValues, Vec<String>)> {
    let mut values = ParameterValues::with_capacity(space.parameters.len());
    let mut transferred = Vec::new();
    for param in &space.parameters {
        let adapted = match source.get(&param.name) {
            Some(v) if param.contains(v) => Some(v.clone()),
            Some(v) => v
                .as_f64()
                .and_then(|x| param.clamp_numeric(x))
                .filter(|clamped| param.contains(clamped)),
            None => None,
        };
        let value = match adapted {
            Some(v) => {
                transferred.push(param.name.clone());
                v
            }
            None => sample(param, rng)?,
        };
        values.insert(param.name.clone(), value);
    }
    Ok((values, transferred))
}

/// `total / (total - skipped)`, where `skipped` counts bootstrap candidates
/// that were actually withdrawn in favour of seeds.
pub fn expected_speedup(total_evaluations: usize, skipped: usize) -> f64 {
    if total_evaluations == 0 || skipped >= total_evaluations {
        return 1.0;
    }
    total_evaluations as f64 / (total_evaluations - skipped) as f64
}

/// Build the seeds a target session should receive from `sources`.
///
/// `pending_bootstrap` is the number of bootstrap candidates the target has
/// issued and not yet seen reported. Each seed replaces one of them, so the
/// speedup only counts `min(seeded, pending_bootstrap)` skipped slots.
pub fn plan_transfer<R: Rng + ?Sized>(
    strategy: TransferStrategy,
    sources: &[TuningSession],
    target_space: &SearchSpace,
    pending_bootstrap: usize,
    top_k: usize,
    rng: &mut R,
) -> TuneResult<TransferPlan> {
    let considered = sources.iter().map(|s| s.history.len()).sum();

    if strategy != TransferStrategy::WarmStart {
        return Ok(TransferPlan {
            seeds: Vec::new(),
            result: TransferResult {
                strategy,
                seeded: 0,
                transferred_parameters: Vec::new(),
                skipped_parameters: Vec::new(),
                source_evaluations_considered: considered,
                effective: false,
                bootstrap_skipped: 0,
                withdrawn_configurations: Vec::new(),
                expected_speedup: 1.0,
                note: format!("{} is accepted but transfers no knowledge", strategy.name()),
            },
        });
    }

    let mut seeds = Vec::new();
    let mut transferred = BTreeSet::new();
    let mut skipped = BTreeSet::new();
    for (session_id, result) in top_evaluations(sources, top_k) {
        let (values, names) = adapt_to_space(&result.parameters, target_space, rng)?;
        transferred.extend(names);
        skipped.extend(
            result
                .parameters
                .keys()
                .filter(|name| target_space.parameter(name).is_none())
                .cloned(),
        );
        seeds.push(TransferSeed {
            source_session: session_id.clone(),
            source_configuration: result.configuration_id.clone(),
            source_score: result.primary_metric,
            values,
        });
    }

    let seeded = seeds.len();
    let bootstrap_skipped = seeded.min(pending_bootstrap);
    let total = target_space.search_bounds.max_evaluations;
    let note = if seeded == 0 {
        "Source sessions have no evaluations to transfer".to_string()
    } else {
        format!("Seeded {seeded} configuration(s) ahead of the strategy")
    };
    Ok(TransferPlan {
        seeds,
        result: TransferResult {
            strategy,
            seeded,
            transferred_parameters: transferred.into_iter().collect(),
            skipped_parameters: skipped.into_iter().collect(),
            source_evaluations_considered: considered,
            effective: seeded > 0,
            bootstrap_skipped,
            withdrawn_configurations: Vec::new(),
            expected_speedup: expected_speedup(total, bootstrap_skipped),
            note,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::{evaluation, mixed_space};
    use ht_types::{ParameterDefinition, ParameterValue, SessionStrategy, StrategyKind};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn source(id: &str, rows: &[(f64, f64)]) -> TuningSession {
        let mut session = TuningSession::new(
            id.into(),
            "space-0".into(),
            SessionStrategy::new(StrategyKind::Random),
            rows.len(),
        );
        for (i, (x, score)) in rows.iter().enumerate() {
            let mut values = ParameterValues::new();
            values.insert("x".into(), ParameterValue::Float(*x));
            values.insert("legacy".into(), ParameterValue::Bool(true));
            session.history.push(evaluation(i, values, *score));
        }
        session.mark_completed("done");
        session
    }

    fn target() -> SearchSpace {
        SearchSpace {
            parameters: vec![
                ParameterDefinition::continuous("x", 0.0, 1.0),
                ParameterDefinition::discrete("depth", 1, 4),
            ],
            search_bounds: ht_types::SearchBounds::default().with_max_evaluations(50),
            ..mixed_space()
        }
    }

    #[test]
    fn names_parse_with_dashes() {
        assert_eq!("warm-start".parse::<TransferStrategy>().unwrap(), TransferStrategy::WarmStart);
        assert_eq!(
            "surrogate_transfer".parse::<TransferStrategy>().unwrap(),
            TransferStrategy::SurrogateTransfer
        );
        assert!("telepathy".parse::<TransferStrategy>().is_err());
    }

    #[test]
    fn top_k_spans_sources() {
        let sources = vec![
            source("a", &[(0.1, 0.2), (0.2, 0.9)]),
            source("b", &[(0.3, 0.5), (0.4, 0.95)]),
        ];
        let top = top_evaluations(&sources, 3);
        let scores: Vec<f64> = top.iter().map(|(_, r)| r.primary_metric).collect();
        assert_eq!(scores, vec![0.95, 0.9, 0.5]);
        assert_eq!(top[0].0, "b");
    }

    #[test]
    fn adaptation_clamps_and_fills_missing() {
        let space = target();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut values = ParameterValues::new();
        values.insert("x".into(), ParameterValue::Float(4.0));
        let (adapted, transferred) = adapt_to_space(&values, &space, &mut rng).unwrap();
        assert_eq!(adapted["x"], ParameterValue::Float(1.0));
        assert!(space.parameters[1].contains(&adapted["depth"]));
        assert_eq!(transferred, vec!["x".to_string()]);
    }

    #[test]
    fn warm_start_plan_reports_speedup() {
        let sources = vec![source("a", &[(0.1, 0.2), (0.2, 0.9), (0.5, 0.4)])];
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let space = target();
        let plan = plan_transfer(TransferStrategy::WarmStart, &sources, &space, 5, 5, &mut rng)
            .unwrap();

        assert_eq!(plan.seeds.len(), 3);
        assert_eq!(plan.result.bootstrap_skipped, 3);
        assert_eq!(plan.seeds[0].source_score, 0.9);
        assert!(plan.result.effective);
        assert_eq!(plan.result.skipped_parameters, vec!["legacy".to_string()]);
        assert_eq!(plan.result.transferred_parameters, vec!["x".to_string()]);
        assert!((plan.result.expected_speedup - 50.0 / 47.0).abs() < 1e-12);
    }

    #[test]
    fn placeholder_strategies_do_nothing() {
        let sources = vec![source("a", &[(0.1, 0.2)])];
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for strategy in [TransferStrategy::MetaLearning, TransferStrategy::SurrogateTransfer] {
            let plan =
                plan_transfer(strategy, &sources, &target(), 5, DEFAULT_TOP_K, &mut rng).unwrap();
            assert!(plan.seeds.is_empty());
            assert!(!plan.result.effective);
            assert_eq!(plan.result.expected_speedup, 1.0);
            assert_eq!(plan.result.source_evaluations_considered, 1);
        }
    }

    #[test]
    fn speedup_counts_only_skipped_bootstrap_slots() {
        assert_eq!(expected_speedup(10, 0), 1.0);
        assert!((expected_speedup(10, 2) - 1.25).abs() < 1e-12);
        assert_eq!(expected_speedup(1, 5), 1.0);
    }

    #[test]
    fn seeds_without_pending_bootstrap_claim_no_speedup() {
        let sources = vec![source("a", &[(0.1, 0.2), (0.2, 0.9)])];
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let space = target();
        let plan = plan_transfer(TransferStrategy::WarmStart, &sources, &space, 0, 5, &mut rng)
            .unwrap();

        assert_eq!(plan.seeds.len(), 2);
        assert!(plan.result.effective);
        assert_eq!(plan.result.bootstrap_skipped, 0);
        assert_eq!(plan.result.expected_speedup, 1.0);
    }
}
