//! Post-hoc analysis of a session's evaluation history.
//!
//! Every function here is a pure function of the space and the session
//! record: no clock, no randomness, ordered maps only. Running the same
//! analysis twice over an unchanged history yields identical output.

use ht_types::{
    EarlyStopRecommendation, EvaluationResult, ParameterKind, ParameterValue, SearchSpace,
    SessionId, SessionStatus, StrategyKind, TuneError, TuningSession, ValidationError,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::convergence::{early_stop_recommendation, ConvergenceTracker};
use crate::statistics::{correlation, max, mean, min};
use crate::strategy::rank_by_score;

/// Strongest pairwise interactions reported.
pub const MAX_INTERACTIONS: usize = 10;
/// Share of the history, best first, used to narrow ranges.
pub const TOP_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Sensitivity,
    Interactions,
    Convergence,
    Recommendations,
    Comprehensive,
}

impl FromStr for AnalysisType {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sensitivity" => Ok(Self::Sensitivity),
            "interactions" => Ok(Self::Interactions),
            "convergence" => Ok(Self::Convergence),
            "recommendations" => Ok(Self::Recommendations),
            "comprehensive" => Ok(Self::Comprehensive),
            other => Err(ValidationError::UnknownAnalysisType { name: other.to_string() }.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSensitivity {
    /// In [0, 1]; larger means the score moves more with this parameter.
    pub sensitivity: f64,
    /// Signed correlation with the score for ordered parameters.
    pub correlation: Option<f64>,
    /// Best-scoring choice on average, for categorical parameters.
    pub best_choice: Option<serde_json::Value>,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInteraction {
    pub first: String,
    pub second: String,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub evaluations: usize,
    pub indicator: f64,
    pub plateau_detected: bool,
    pub oscillation_detected: bool,
    pub evaluations_since_improvement: usize,
    /// Best score seen after each evaluation.
    pub running_best: Vec<f64>,
    pub early_stop: EarlyStopRecommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuggestedRange {
    Numeric { min: f64, max: f64 },
    Choices { values: Vec<serde_json::Value> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySwitch {
    pub strategy: StrategyKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    /// Ranges spanned by the best evaluations, per parameter.
    pub narrowed_ranges: BTreeMap<String, SuggestedRange>,
    pub strategy_switch: Option<StrategySwitch>,
    pub budget_advice: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub strategy: StrategyKind,
    pub evaluations_completed: usize,
    pub total_evaluations: usize,
    pub best_score: Option<f64>,
    pub best_configuration_id: Option<String>,
    pub completion_reason: Option<String>,
}

impl SessionSummary {
    pub fn of(session: &TuningSession) -> Self {
        Self {
            session_id: session.id.clone(),
            status: session.status,
            strategy: session.strategy.kind,
            evaluations_completed: session.progress.evaluations_completed,
            total_evaluations: session.progress.total_evaluations,
            best_score: session.progress.current_best_score,
            best_configuration_id: session.best_configuration.as_ref().map(|c| c.id.clone()),
            completion_reason: session.completion_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub analysis_type: AnalysisType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<BTreeMap<String, ParameterSensitivity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactions: Option<Vec<ParameterInteraction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Recommendations>,
}

pub fn analyze(
    analysis_type: AnalysisType,
    space: &SearchSpace,
    session: &TuningSession,
) -> AnalysisResults {
    let wants =
        |t: AnalysisType| analysis_type == t || analysis_type == AnalysisType::Comprehensive;
    let history = &session.history;

    AnalysisResults {
        analysis_type,
        sensitivity: wants(AnalysisType::Sensitivity).then(|| sensitivity(space, history)),
        interactions: wants(AnalysisType::Interactions).then(|| interactions(space, history)),
        convergence: wants(AnalysisType::Convergence).then(|| convergence_report(space, history)),
        recommendations: wants(AnalysisType::Recommendations)
            .then(|| recommendations(space, session)),
    }
}

fn scores(history: &[EvaluationResult]) -> Vec<f64> {
    history.iter().map(|r| r.primary_metric).collect()
}

/// Normalised values of one parameter paired with scores, skipping
/// evaluations that lack it.
fn normalized_series(
    space: &SearchSpace,
    name: &str,
    history: &[EvaluationResult],
) -> (Vec<f64>, Vec<f64>) {
    let Some(param) = space.parameter(name) else {
        return (Vec::new(), Vec::new());
    };
    history
        .iter()
        .filter_map(|r| {
            let x = r.parameters.get(name).and_then(|v| param.normalize(v))?;
            Some((x, r.primary_metric))
        })
        .unzip()
}

pub fn sensitivity(
    space: &SearchSpace,
    history: &[EvaluationResult],
) -> BTreeMap<String, ParameterSensitivity> {
    space
        .parameters
        .iter()
        .map(|param| {
            let entry = if param.kind == ParameterKind::Categorical {
                categorical_sensitivity(&param.name, history)
            } else {
                let (xs, ys) = normalized_series(space, &param.name, history);
                let corr = correlation(&xs, &ys);
                ParameterSensitivity {
                    sensitivity: corr.map_or(0.0, f64::abs),
                    correlation: corr,
                    best_choice: None,
                    samples: xs.len(),
                }
            };
            (param.name.clone(), entry)
        })
        .collect()
}

/// Spread of per-choice mean scores relative to the overall score range.
fn categorical_sensitivity(name: &str, history: &[EvaluationResult]) -> ParameterSensitivity {
    let mut by_choice: BTreeMap<String, (serde_json::Value, Vec<f64>)> = BTreeMap::new();
    for result in history {
        if let Some(value) = result.parameters.get(name) {
            let json = value.to_json();
            by_choice
                .entry(json.to_string())
                .or_insert_with(|| (json, Vec::new()))
                .1
                .push(result.primary_metric);
        }
    }

    let samples = by_choice.values().map(|(_, s)| s.len()).sum();
    let means: Vec<(serde_json::Value, f64)> = by_choice
        .into_values()
        .filter_map(|(choice, s)| mean(&s).map(|m| (choice, m)))
        .collect();

    let all = scores(history);
    let range = match (max(&all), min(&all)) {
        (Some(hi), Some(lo)) => hi - lo,
        _ => 0.0,
    };

    // First choice wins ties.
    let mut best: Option<&(serde_json::Value, f64)> = None;
    for item in &means {
        if best.map_or(true, |b| item.1 > b.1) {
            best = Some(item);
        }
    }
    let averages: Vec<f64> = means.iter().map(|(_, m)| *m).collect();
    let spread = match (max(&averages), min(&averages)) {
        (Some(hi), Some(lo)) if averages.len() > 1 && range > f64::EPSILON => {
            ((hi - lo) / range).clamp(0.0, 1.0)
        }
        _ => 0.0,
    };

    ParameterSensitivity {
        sensitivity: spread,
        correlation: None,
        best_choice: best.map(|(choice, _)| choice.clone()),
        samples,
    }
}

/// Pairwise interaction strength `|corr(z_i * z_j, score)|` over centred
/// normalised values, strongest first.
pub fn interactions(
    space: &SearchSpace,
    history: &[EvaluationResult],
) -> Vec<ParameterInteraction> {
    if history.len() < 3 {
        return Vec::new();
    }
    let ys = scores(history);

    // Evaluations missing a parameter are centred to zero for it.
    let centred: Vec<(String, Vec<f64>)> = space
        .parameters
        .iter()
        .map(|param| {
            let raw: Vec<Option<f64>> = history
                .iter()
                .map(|r| r.parameters.get(&param.name).and_then(|v| param.normalize(v)))
                .collect();
            let present: Vec<f64> = raw.iter().flatten().copied().collect();
            let m = mean(&present).unwrap_or(0.0);
            let z = raw.into_iter().map(|x| x.map_or(0.0, |x| x - m)).collect();
            (param.name.clone(), z)
        })
        .collect();

    let pairs: Vec<(usize, usize)> = (0..centred.len())
        .flat_map(|i| ((i + 1)..centred.len()).map(move |j| (i, j)))
        .collect();

    let mut found: Vec<ParameterInteraction> = pairs
        .par_iter()
        .filter_map(|&(i, j)| {
            let product: Vec<f64> = centred[i]
                .1
                .iter()
                .zip(&centred[j].1)
                .map(|(a, b)| a * b)
                .collect();
            let strength = correlation(&product, &ys)?.abs();
            Some(ParameterInteraction {
                first: centred[i].0.clone(),
                second: centred[j].0.clone(),
                strength,
            })
        })
        .collect();

    found.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.first.cmp(&b.first))
            .then_with(|| a.second.cmp(&b.second))
    });
    found.truncate(MAX_INTERACTIONS);
    found
}

pub fn convergence_report(space: &SearchSpace, history: &[EvaluationResult]) -> ConvergenceReport {
    let state = ConvergenceTracker::new(&space.search_bounds).assess(history);
    let running_best = history
        .iter()
        .scan(f64::NEG_INFINITY, |best, r| {
            *best = best.max(r.primary_metric);
            Some(*best)
        })
        .collect();

    ConvergenceReport {
        evaluations: history.len(),
        indicator: state.indicator,
        plateau_detected: state.plateau,
        oscillation_detected: state.oscillating,
        evaluations_since_improvement: state.evaluations_since_improvement,
        running_best,
        early_stop: early_stop_recommendation(history, state.indicator),
    }
}

pub fn recommendations(space: &SearchSpace, session: &TuningSession) -> Recommendations {
    let history = &session.history;
    let ranked = rank_by_score(history);
    let keep = ((ranked.len() as f64 * TOP_FRACTION).ceil() as usize).max(1);
    let top = &ranked[..keep.min(ranked.len())];

    let mut narrowed_ranges = BTreeMap::new();
    if history.len() >= 2 {
        for param in &space.parameters {
            let values: Vec<&ParameterValue> = top
                .iter()
                .filter_map(|r| r.parameters.get(&param.name))
                .collect();
            if values.is_empty() {
                continue;
            }
            let range = match param.kind {
                ParameterKind::Continuous | ParameterKind::Discrete => {
                    let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                    match (min(&numbers), max(&numbers)) {
                        (Some(min), Some(max)) => SuggestedRange::Numeric { min, max },
                        _ => continue,
                    }
                }
                ParameterKind::Categorical | ParameterKind::Boolean => {
                    let mut distinct: BTreeMap<String, serde_json::Value> = BTreeMap::new();
                    for value in values {
                        let json = value.to_json();
                        distinct.insert(json.to_string(), json);
                    }
                    SuggestedRange::Choices {
                        values: distinct.into_values().collect(),
                    }
                }
            };
            narrowed_ranges.insert(param.name.clone(), range);
        }
    }

    let report = convergence_report(space, history);
    let current = session.strategy.kind;
    let strategy_switch = if (report.plateau_detected || report.oscillation_detected)
        && current != StrategyKind::Genetic
    {
        Some(StrategySwitch {
            strategy: StrategyKind::Genetic,
            reason: "Scores have plateaued or oscillate; \
                     recombination may escape the current region"
                .into(),
        })
    } else if report.indicator > 0.8 && current == StrategyKind::Random {
        Some(StrategySwitch {
            strategy: StrategyKind::Perturbation,
            reason: "Scores are settling; exploit the best region with perturbation".into(),
        })
    } else {
        None
    };

    let completed = session.progress.evaluations_completed;
    let remaining = session.progress.total_evaluations.saturating_sub(completed);
    let suggested_budget = space.dimension() * 10;
    let budget_advice = if report.early_stop.should_stop {
        "Recent evaluations stopped improving; stop here or widen the search space".to_string()
    } else if remaining == 0 {
        format!("Evaluation budget of {completed} is exhausted")
    } else if session.progress.total_evaluations < suggested_budget {
        format!(
            "Budget of {} evaluations is small for {} dimensions; \
             consider at least {suggested_budget}",
            session.progress.total_evaluations,
            space.dimension()
        )
    } else {
        format!("Continue with the remaining {remaining} evaluations")
    };

    Recommendations {
        narrowed_ranges,
        strategy_switch,
        budget_advice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::{evaluation, mixed_space};
    use ht_types::{ParameterDefinition, ParameterValues, SessionStrategy};
    use serde_json::json;

    fn session_with(space: &SearchSpace, rows: &[(f64, f64, &str, f64)]) -> TuningSession {
        let mut session = TuningSession::new(
            "session-1".into(),
            space.id.clone(),
            SessionStrategy::new(StrategyKind::Random),
            20,
        );
        for (i, (x, y, opt, score)) in rows.iter().enumerate() {
            let mut values = ParameterValues::new();
            values.insert("x".into(), ParameterValue::Float(*x));
            values.insert("y".into(), ParameterValue::Float(*y));
            values.insert("opt".into(), ParameterValue::Json(json!(opt)));
            let result = evaluation(i, values, *score);
            session.update_best(&result);
            session.history.push(result);
            session.progress.evaluations_completed += 1;
        }
        session
    }

    fn space() -> SearchSpace {
        SearchSpace {
            parameters: vec![
                ParameterDefinition::continuous("x", 0.0, 1.0),
                ParameterDefinition::continuous("y", 0.0, 1.0),
                ParameterDefinition::categorical("opt", vec![json!("adam"), json!("sgd")]),
            ],
            ..mixed_space()
        }
    }

    fn rows() -> Vec<(f64, f64, &'static str, f64)> {
        vec![
            (0.1, 0.9, "sgd", 0.1),
            (0.3, 0.2, "adam", 0.35),
            (0.5, 0.7, "sgd", 0.45),
            (0.7, 0.4, "adam", 0.8),
            (0.9, 0.1, "adam", 0.95),
        ]
    }

    #[test]
    fn analysis_type_parses_names() {
        assert_eq!("Comprehensive".parse::<AnalysisType>().unwrap(), AnalysisType::Comprehensive);
        assert!("bogus".parse::<AnalysisType>().is_err());
    }

    #[test]
    fn sensitivity_ranks_the_driving_parameter() {
        let space = space();
        let session = session_with(&space, &rows());
        let result = sensitivity(&space, &session.history);

        assert!(result["x"].sensitivity > 0.95);
        assert!(result["x"].correlation.unwrap() > 0.0);
        assert!(result["y"].sensitivity < result["x"].sensitivity);
        assert_eq!(result["opt"].best_choice, Some(json!("adam")));
        assert!(result["opt"].sensitivity > 0.0);
        assert_eq!(result["opt"].samples, 5);
    }

    #[test]
    fn interactions_are_sorted_and_bounded() {
        let space = space();
        let session = session_with(&space, &rows());
        let found = interactions(&space, &session.history);
        assert!(found.len() <= 3);
        assert!(found.windows(2).all(|w| w[0].strength >= w[1].strength));
        assert!(found.iter().all(|i| (0.0..=1.0 + 1e-12).contains(&i.strength)));
        assert!(interactions(&space, &session.history[..2]).is_empty());
    }

    #[test]
    fn convergence_report_traces_running_best() {
        let space = space();
        let session = session_with(&space, &rows());
        let report = convergence_report(&space, &session.history);
        assert_eq!(report.running_best, vec![0.1, 0.35, 0.45, 0.8, 0.95]);
        assert_eq!(report.evaluations, 5);
        assert!(!report.early_stop.should_stop);
    }

    #[test]
    fn recommendations_narrow_to_the_best_region() {
        let space = space();
        let session = session_with(&space, &rows());
        let recs = recommendations(&space, &session);
        assert_eq!(recs.narrowed_ranges["x"], SuggestedRange::Numeric { min: 0.9, max: 0.9 });
        assert_eq!(
            recs.narrowed_ranges["opt"],
            SuggestedRange::Choices { values: vec![json!("adam")] }
        );
        assert!(recs.budget_advice.contains("consider at least 30"), "{}", recs.budget_advice);
    }

    #[test]
    fn analysis_is_deterministic() {
        let space = space();
        let session = session_with(&space, &rows());
        let first = analyze(AnalysisType::Comprehensive, &space, &session);
        let second = analyze(AnalysisType::Comprehensive, &space, &session);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert!(first.sensitivity.is_some() && first.recommendations.is_some());

        let only = analyze(AnalysisType::Convergence, &space, &session);
        assert!(only.sensitivity.is_none());
        assert!(only.convergence.is_some());
    }

    #[test]
    fn empty_history_yields_neutral_results() {
        let space = space();
        let session = session_with(&space, &[]);
        let result = analyze(AnalysisType::Comprehensive, &space, &session);
        assert_eq!(result.sensitivity.unwrap()["x"].sensitivity, 0.0);
        assert!(result.interactions.unwrap().is_empty());
        assert!(result.recommendations.unwrap().narrowed_ranges.is_empty());
    }
}
