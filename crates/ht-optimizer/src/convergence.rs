//! Convergence indicator, plateau and oscillation detection, early stopping.

use ht_types::{EarlyStopRecommendation, EvaluationResult, SearchBounds};
use serde::{Deserialize, Serialize};

use crate::statistics::{max, recent_scores, variance};

/// Number of recent scores the convergence indicator looks at.
pub const CONVERGENCE_WINDOW: usize = 10;
/// Number of recent scores the early-stop recommendation looks at.
pub const EARLY_STOP_WINDOW: usize = 5;
/// Improvements below this are treated as no improvement.
pub const MIN_IMPROVEMENT: f64 = 1e-3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceState {
    pub indicator: f64,
    pub plateau: bool,
    pub oscillating: bool,
    pub evaluations_since_improvement: usize,
}

/// Derives convergence signals from recent score history.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    patience: usize,
    improvement_threshold: f64,
}

impl ConvergenceTracker {
    pub fn new(bounds: &SearchBounds) -> Self {
        Self {
            patience: bounds.early_stopping_patience,
            improvement_threshold: bounds.improvement_threshold.max(0.0),
        }
    }

    pub fn assess(&self, history: &[EvaluationResult]) -> ConvergenceState {
        let since = self.evaluations_since_improvement(history);
        ConvergenceState {
            indicator: convergence_indicator(history),
            plateau: self.patience > 0 && since >= self.patience,
            oscillating: is_oscillating(history),
            evaluations_since_improvement: since,
        }
    }

    /// Evaluations reported after the last one that beat the running best by
    /// more than the improvement threshold.
    pub fn evaluations_since_improvement(&self, history: &[EvaluationResult]) -> usize {
        let mut best = f64::NEG_INFINITY;
        let mut last_improvement = None;
        for (i, result) in history.iter().enumerate() {
            let improved = result.primary_metric > best + self.improvement_threshold;
            if best == f64::NEG_INFINITY || improved {
                last_improvement = Some(i);
            }
            best = best.max(result.primary_metric);
        }
        match last_improvement {
            Some(i) => history.len() - 1 - i,
            None => 0,
        }
    }
}

/// `1 - variance/max` over the last ten scores, clamped to [0, 1].
/// Zero until ten evaluations exist.
pub fn convergence_indicator(history: &[EvaluationResult]) -> f64 {
    if history.len() < CONVERGENCE_WINDOW {
        return 0.0;
    }
    let recent = recent_scores(history, CONVERGENCE_WINDOW);
    let peak = max(&recent).unwrap_or(0.0).abs().max(f64::EPSILON);
    (1.0 - variance(&recent) / peak).clamp(0.0, 1.0)
}

/// Successive differences of the last ten scores flip sign in at least 70%
/// of transitions.
pub fn is_oscillating(history: &[EvaluationResult]) -> bool {
    let recent = recent_scores(history, CONVERGENCE_WINDOW);
    let diffs: Vec<f64> = recent
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| d.abs() > MIN_IMPROVEMENT)
        .collect();
    if diffs.len() < 4 {
        return false;
    }
    let flips = diffs
        .windows(2)
        .filter(|w| w[0].signum() != w[1].signum())
        .count();
    flips as f64 / (diffs.len() - 1) as f64 >= 0.7
}

/// Best of the last `window` scores minus the best before the window.
/// `None` when nothing precedes the window.
pub fn window_improvement(history: &[EvaluationResult], window: usize) -> Option<f64> {
    if history.len() <= window {
        return None;
    }
    let split = history.len() - window;
    let before: Vec<f64> = history[..split].iter().map(|r| r.primary_metric).collect();
    let within: Vec<f64> = history[split..].iter().map(|r| r.primary_metric).collect();
    Some(max(&within)? - max(&before)?)
}

/// True when at least ten evaluations exist and the last ten failed to
/// improve on the earlier best by [`MIN_IMPROVEMENT`].
pub fn has_stalled(history: &[EvaluationResult]) -> bool {
    history.len() >= CONVERGENCE_WINDOW
        && window_improvement(history, CONVERGENCE_WINDOW)
            .is_some_and(|gain| gain < MIN_IMPROVEMENT)
}

pub fn early_stop_recommendation(
    history: &[EvaluationResult],
    indicator: f64,
) -> EarlyStopRecommendation {
    match window_improvement(history, EARLY_STOP_WINDOW) {
        Some(gain) if gain < MIN_IMPROVEMENT => EarlyStopRecommendation {
            should_stop: true,
            confidence: (0.5 + 0.5 * indicator).clamp(0.0, 1.0),
            reason: format!(
                "Best of the last {EARLY_STOP_WINDOW} evaluations \
                 improved the previous best by {gain:.4}"
            ),
        },
        Some(gain) => EarlyStopRecommendation {
            should_stop: false,
            confidence: (0.5 + 0.5 * indicator).clamp(0.0, 1.0),
            reason: format!("Recent evaluations still improving (gain {gain:.4})"),
        },
        None => EarlyStopRecommendation {
            should_stop: false,
            confidence: 0.0,
            reason: format!("Fewer than {} evaluations recorded", EARLY_STOP_WINDOW + 1),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::evaluation;
    use ht_types::ParameterValues;

    fn history(scores: &[f64]) -> Vec<EvaluationResult> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| evaluation(i, ParameterValues::new(), *s))
            .collect()
    }

    #[test]
    fn indicator_is_zero_before_ten_evaluations() {
        assert_eq!(convergence_indicator(&history(&[1.0; 9])), 0.0);
    }

    #[test]
    fn indicator_is_one_for_identical_scores() {
        assert_eq!(convergence_indicator(&history(&[0.8; 12])), 1.0);
    }

    #[test]
    fn indicator_uses_last_ten_scores() {
        let scores: Vec<f64> = (1..=20).map(|i| i as f64 * 0.1).collect();
        let indicator = convergence_indicator(&history(&scores));
        // variance of 1.1..=2.0 is 0.0825, max is 2.0
        assert!((indicator - (1.0 - 0.0825 / 2.0)).abs() < 1e-9);
    }

    #[test]
    fn indicator_is_clamped_for_noisy_scores() {
        let scores = [0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0, 10.0, 0.0, 1.0];
        assert_eq!(convergence_indicator(&history(&scores)), 0.0);
    }

    #[test]
    fn oscillation_detected_for_zig_zag() {
        let scores = [1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0, 2.0];
        assert!(is_oscillating(&history(&scores)));
        let rising: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(!is_oscillating(&history(&rising)));
    }

    #[test]
    fn plateau_counts_evaluations_since_improvement() {
        let bounds = SearchBounds {
            early_stopping_patience: 3,
            ..SearchBounds::default()
        };
        let tracker = ConvergenceTracker::new(&bounds);
        let state = tracker.assess(&history(&[0.1, 0.5, 0.5, 0.5, 0.5]));
        assert_eq!(state.evaluations_since_improvement, 3);
        assert!(state.plateau);

        let state = tracker.assess(&history(&[0.1, 0.5, 0.5, 0.9]));
        assert_eq!(state.evaluations_since_improvement, 0);
        assert!(!state.plateau);
    }

    #[test]
    fn stall_requires_a_preceding_best() {
        let flat = history(&[1.0; 10]);
        assert!(!has_stalled(&flat));
        let flat = history(&[1.0; 11]);
        assert!(has_stalled(&flat));
        let rising: Vec<f64> = (0..15).map(|i| i as f64).collect();
        assert!(!has_stalled(&history(&rising)));
    }

    #[test]
    fn early_stop_recommendation_follows_last_five() {
        let rec = early_stop_recommendation(&history(&[1.0, 2.0, 3.0]), 0.0);
        assert!(!rec.should_stop);

        let rec = early_stop_recommendation(&history(&[1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0]), 0.9);
        assert!(rec.should_stop);
        assert!((rec.confidence - 0.95).abs() < 1e-12);

        let rec = early_stop_recommendation(&history(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 3.0]), 0.0);
        assert!(!rec.should_stop);
    }
}
