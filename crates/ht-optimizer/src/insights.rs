//! Human-readable observations recomputed after every report.

use ht_types::{EvaluationResult, SearchSpace, SessionInsights};

use crate::convergence::ConvergenceState;

pub fn derive_insights(
    space: &SearchSpace,
    history: &[EvaluationResult],
    convergence: &ConvergenceState,
) -> SessionInsights {
    let constraint_violations = history
        .iter()
        .filter(|r| !space.violated_constraints(&r.parameters).is_empty())
        .count();

    let mut messages = Vec::new();
    if convergence.plateau {
        messages.push(format!(
            "No improvement above {} for {} evaluations",
            space.search_bounds.improvement_threshold, convergence.evaluations_since_improvement
        ));
    }
    if convergence.oscillating {
        messages.push("Recent scores oscillate; the objective may be noisy".to_string());
    }
    if constraint_violations > 0 {
        messages.push(format!(
            "{constraint_violations} evaluated configuration(s) violate a constraint"
        ));
    }

    SessionInsights {
        plateau_detected: convergence.plateau,
        oscillation_detected: convergence.oscillating,
        evaluations_since_improvement: convergence.evaluations_since_improvement,
        constraint_violations,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::{evaluation, mixed_space};
    use ht_types::{Comparison, Constraint, Operand, ParameterValue, ParameterValues};

    #[test]
    fn counts_constraint_violations_and_flags() {
        let mut space = mixed_space();
        space.constraints.push(Constraint::Inequality {
            left: "lr".into(),
            op: Comparison::Lt,
            right: Operand::Value(0.05),
        });

        let mut low = ParameterValues::new();
        low.insert("lr".into(), ParameterValue::Float(0.01));
        let mut high = ParameterValues::new();
        high.insert("lr".into(), ParameterValue::Float(0.08));
        let history = vec![evaluation(0, low, 0.4), evaluation(1, high, 0.3)];

        let convergence = ConvergenceState {
            plateau: true,
            evaluations_since_improvement: 12,
            ..ConvergenceState::default()
        };
        let insights = derive_insights(&space, &history, &convergence);
        assert_eq!(insights.constraint_violations, 1);
        assert!(insights.plateau_detected);
        assert_eq!(insights.messages.len(), 2);
    }

    #[test]
    fn quiet_history_has_no_messages() {
        let insights = derive_insights(&mixed_space(), &[], &ConvergenceState::default());
        assert_eq!(insights, SessionInsights::default());
    }
}
