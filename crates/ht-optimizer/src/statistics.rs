//! Aggregates over the evaluation history.

use ht_types::{EvaluationResult, SessionStatistics};
use std::collections::BTreeMap;

/// Amount added to a parameter's importance each time it appears in a
/// reported evaluation.
pub const IMPORTANCE_INCREMENT: f64 = 0.1;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population variance; zero for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    match mean(values) {
        Some(m) if values.len() > 1 => {
            values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
        }
        _ => 0.0,
    }
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| match acc {
        Some(m) if m >= v => Some(m),
        _ => Some(v),
    })
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| match acc {
        Some(m) if m <= v => Some(m),
        _ => Some(v),
    })
}

/// Pearson correlation, `None` when either side has no spread.
pub fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx <= f64::EPSILON || vy <= f64::EPSILON {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

/// Recompute every aggregate from scratch over `history`.
pub fn compute_statistics(history: &[EvaluationResult]) -> SessionStatistics {
    let scores: Vec<f64> = history.iter().map(|r| r.primary_metric).collect();
    let variance = variance(&scores);

    let mut parameter_importance = BTreeMap::new();
    for result in history {
        for name in result.parameters.keys() {
            *parameter_importance.entry(name.clone()).or_insert(0.0) += IMPORTANCE_INCREMENT;
        }
    }

    SessionStatistics {
        count: history.len(),
        best_score: max(&scores),
        worst_score: min(&scores),
        average_score: mean(&scores),
        variance,
        std_dev: variance.sqrt(),
        parameter_importance,
    }
}

/// Scores of the most recent `n` evaluations, oldest first.
pub fn recent_scores(history: &[EvaluationResult], n: usize) -> Vec<f64> {
    let start = history.len().saturating_sub(n);
    history[start..].iter().map(|r| r.primary_metric).collect()
}
