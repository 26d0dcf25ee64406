//! Adaptive adjustment of session-level knobs.

use ht_types::{AdaptiveSettings, SessionProgress};

use crate::convergence::ConvergenceState;

/// Rate at which exploration decays with progress.
const EXPLORATION_DECAY: f64 = 2.0;

/// Recomputes [`AdaptiveSettings`] from the settings a session started
/// with, its progress and its convergence state.
#[derive(Debug, Clone)]
pub struct AdaptiveScheduler {
    initial: AdaptiveSettings,
}

impl AdaptiveScheduler {
    pub fn new(initial: AdaptiveSettings) -> Self {
        Self { initial }
    }

    pub fn initial(&self) -> &AdaptiveSettings {
        &self.initial
    }

    /// `initial_rate * exp(-2 * completed / total)`; non-increasing in
    /// `completed` and independent of the strategy.
    pub fn exploration_rate(&self, progress: &SessionProgress) -> f64 {
        let fraction = if progress.total_evaluations == 0 {
            1.0
        } else {
            progress.evaluations_completed as f64 / progress.total_evaluations as f64
        };
        (self.initial.exploration_rate * (-EXPLORATION_DECAY * fraction).exp()).clamp(0.0, 1.0)
    }

    pub fn update(
        &self,
        progress: &SessionProgress,
        convergence: &ConvergenceState,
    ) -> AdaptiveSettings {
        let parallelism = if self.initial.resource_adaptation {
            let scaled = self.initial.parallelism as f64 * (1.0 - convergence.indicator);
            (scaled.ceil() as usize).max(1)
        } else {
            self.initial.parallelism
        };

        AdaptiveSettings {
            exploration_rate: self.exploration_rate(progress),
            convergence_threshold: self.initial.convergence_threshold,
            diversity_maintenance: self.initial.diversity_maintenance,
            parallelism,
            resource_adaptation: self.initial.resource_adaptation,
        }
    }

    /// Whether strategies should widen their search to escape a plateau.
    pub fn diversity_pressure(&self, convergence: &ConvergenceState) -> bool {
        self.initial.diversity_maintenance && convergence.plateau
    }
}

/// Checks adaptive settings before a session is created.
pub fn adaptive_settings_violations(settings: &AdaptiveSettings) -> Vec<String> {
    let mut violations = Vec::new();
    if !(0.0..=1.0).contains(&settings.exploration_rate) {
        violations.push(format!(
            "exploration_rate must be within [0, 1], got {}",
            settings.exploration_rate
        ));
    }
    if !(0.0..=1.0).contains(&settings.convergence_threshold) {
        violations.push(format!(
            "convergence_threshold must be within [0, 1], got {}",
            settings.convergence_threshold
        ));
    }
    if settings.parallelism == 0 {
        violations.push("parallelism must be at least 1".to_string());
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(done: usize, total: usize) -> SessionProgress {
        let mut p = SessionProgress::new(total);
        p.evaluations_completed = done;
        p
    }

    #[test]
    fn exploration_rate_starts_at_initial_and_decays() {
        let scheduler = AdaptiveScheduler::new(AdaptiveSettings::default());
        assert!((scheduler.exploration_rate(&progress(0, 50)) - 0.8).abs() < 1e-12);
        let end = scheduler.exploration_rate(&progress(50, 50));
        assert!((end - 0.8 * (-2.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn exploration_rate_is_non_increasing() {
        let scheduler = AdaptiveScheduler::new(AdaptiveSettings::default());
        let convergence = ConvergenceState::default();
        let mut previous = f64::INFINITY;
        for done in 0..=40 {
            let settings = scheduler.update(&progress(done, 40), &convergence);
            assert!(settings.exploration_rate <= previous);
            previous = settings.exploration_rate;
        }
    }

    #[test]
    fn resource_adaptation_scales_parallelism() {
        let scheduler = AdaptiveScheduler::new(AdaptiveSettings {
            parallelism: 8,
            resource_adaptation: true,
            ..AdaptiveSettings::default()
        });
        let converged = ConvergenceState {
            indicator: 0.9,
            ..ConvergenceState::default()
        };
        assert_eq!(scheduler.update(&progress(10, 20), &converged).parallelism, 1);
        let fresh = ConvergenceState::default();
        assert_eq!(scheduler.update(&progress(1, 20), &fresh).parallelism, 8);
    }

    #[test]
    fn settings_validation() {
        assert!(adaptive_settings_violations(&AdaptiveSettings::default()).is_empty());
        let bad = AdaptiveSettings {
            exploration_rate: 1.5,
            parallelism: 0,
            ..AdaptiveSettings::default()
        };
        assert_eq!(adaptive_settings_violations(&bad).len(), 2);
    }

    #[test]
    fn diversity_pressure_needs_plateau_and_setting() {
        let plateau = ConvergenceState {
            plateau: true,
            ..ConvergenceState::default()
        };
        assert!(AdaptiveScheduler::new(AdaptiveSettings::default()).diversity_pressure(&plateau));
        let off = AdaptiveScheduler::new(AdaptiveSettings {
            diversity_maintenance: false,
            ..AdaptiveSettings::default()
        });
        assert!(!off.diversity_pressure(&plateau));
    }
}
