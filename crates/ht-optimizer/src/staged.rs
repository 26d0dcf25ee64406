//! Resource-staged search (successive halving).
//!
//! Candidates are evaluated at exponentially spaced budgets ("rungs"). Rung 0
//! receives `eta^s_max` random candidates at `min_resource`; once all of
//! them are reported the best `1/eta` are re-issued at `eta` times the
//! budget, until a single survivor runs at `max_resource`. Then a new
//! bracket begins.
//!
//! | Rung | Budget | Candidates (eta = 3, 1..27) |
//! |------|--------|-----------------------------|
//! | 0    | 1      | 27                          |
//! | 1    | 3      | 9                           |
//! | 2    | 9      | 3                           |
//! | 3    | 27     | 1                           |
//!
//! While a rung still waits on outstanding results the strategy hands out
//! plain random candidates outside the bracket, so callers never block.

use ht_types::{
    CandidateOrigin, ConfigurationId, ParameterConfiguration, ParameterValues, TuneResult,
};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::sampler::sample_configuration;
use crate::strategy::{GenerationContext, SearchStrategy};

#[derive(Debug, Clone)]
pub struct ResourceStagedSearch {
    reduction_factor: u32,
    min_resource: f64,
    max_resource: f64,
    bracket: u32,
    rung: u32,
    rung_members: Vec<ConfigurationId>,
    promotions: VecDeque<(ConfigurationId, ParameterValues)>,
}

impl ResourceStagedSearch {
    pub fn new(reduction_factor: u32, min_resource: f64, max_resource: f64) -> Self {
        Self {
            reduction_factor: reduction_factor.max(2),
            min_resource,
            max_resource,
            bracket: 0,
            rung: 0,
            rung_members: Vec::new(),
            promotions: VecDeque::new(),
        }
    }

    /// Index of the last rung (`s_max`).
    pub fn max_rung(&self) -> u32 {
        let eta = self.reduction_factor as f64;
        let mut rung = 0;
        while self.min_resource * eta.powi(rung as i32 + 1) <= self.max_resource * (1.0 + 1e-9) {
            rung += 1;
        }
        rung
    }

    /// Number of candidates evaluated at `rung` within one bracket.
    pub fn rung_size(&self, rung: u32) -> usize {
        (self.reduction_factor as usize).pow(self.max_rung().saturating_sub(rung))
    }

    pub fn budget(&self, rung: u32) -> f64 {
        let growth = (self.reduction_factor as f64).powi(rung as i32);
        (self.min_resource * growth).min(self.max_resource)
    }

    pub fn bracket(&self) -> u32 {
        self.bracket
    }

    pub fn rung(&self) -> u32 {
        self.rung
    }

    fn issue(
        &mut self,
        id: ConfigurationId,
        values: ParameterValues,
        origin: CandidateOrigin,
    ) -> ParameterConfiguration {
        self.rung_members.push(id.clone());
        let budget = self.budget(self.rung);
        ParameterConfiguration::new(id, values, origin).with_stage(self.rung, budget)
    }

    /// Best score reported for each member of the current rung.
    fn rung_scores(&self, ctx: &GenerationContext<'_>) -> HashMap<&str, (f64, ParameterValues)> {
        let mut scores: HashMap<&str, (f64, ParameterValues)> = HashMap::new();
        for member in &self.rung_members {
            for result in ctx.history.iter().filter(|r| &r.configuration_id == member) {
                let entry = scores
                    .entry(member.as_str())
                    .or_insert((f64::NEG_INFINITY, result.parameters.clone()));
                if result.primary_metric > entry.0 {
                    *entry = (result.primary_metric, result.parameters.clone());
                }
            }
        }
        scores
    }

    fn advance(&mut self, ctx: &GenerationContext<'_>) -> bool {
        let scores = self.rung_scores(ctx);
        if scores.len() < self.rung_members.len() {
            return false;
        }

        if self.rung >= self.max_rung() {
            self.bracket += 1;
            self.rung = 0;
            self.rung_members.clear();
            debug!(bracket = self.bracket, "resource-staged bracket complete, starting next");
            return true;
        }

        let keep = (self.rung_members.len() / self.reduction_factor as usize).max(1);
        let mut ranked: Vec<(usize, &ConfigurationId)> =
            self.rung_members.iter().enumerate().collect();
        ranked.sort_by(|(ia, a), (ib, b)| {
            let sa = scores[a.as_str()].0;
            let sb = scores[b.as_str()].0;
            sb.partial_cmp(&sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ia.cmp(ib))
        });
        let promoted: Vec<(ConfigurationId, ParameterValues)> = ranked
            .into_iter()
            .take(keep)
            .map(|(_, id)| (id.clone(), scores[id.as_str()].1.clone()))
            .collect();

        self.promotions.extend(promoted);
        self.rung += 1;
        self.rung_members.clear();
        debug!(
            bracket = self.bracket,
            rung = self.rung,
            promoted = keep,
            "resource-staged rung promoted"
        );
        true
    }
}

impl SearchStrategy for ResourceStagedSearch {
    fn propose<R: Rng + ?Sized>(
        &mut self,
        ctx: &GenerationContext<'_>,
        id: ConfigurationId,
        rng: &mut R,
    ) -> TuneResult<ParameterConfiguration> {
        loop {
            if let Some((from, values)) = self.promotions.pop_front() {
                return Ok(self.issue(id, values, CandidateOrigin::Promotion { from }));
            }

            if self.rung_members.len() < self.rung_size(self.rung) {
                let values = sample_configuration(ctx.space, rng)?;
                return Ok(self.issue(id, values, CandidateOrigin::Random));
            }

            if !self.advance(ctx) {
                // Rung still waiting on results: hand out an unstaged candidate.
                let values = sample_configuration(ctx.space, rng)?;
                return Ok(ParameterConfiguration::new(id, values, CandidateOrigin::Random));
            }
        }
    }

    fn name(&self) -> &str {
        "resource_staged"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::{evaluation, mixed_space};
    use ht_types::EvaluationResult;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn ctx<'a>(
        space: &'a ht_types::SearchSpace,
        history: &'a [EvaluationResult],
    ) -> GenerationContext<'a> {
        GenerationContext {
            space,
            history,
            diversity_pressure: false,
        }
    }

    #[test]
    fn rung_layout_matches_reduction_factor() {
        let search = ResourceStagedSearch::new(3, 1.0, 27.0);
        assert_eq!(search.max_rung(), 3);
        assert_eq!(search.rung_size(0), 27);
        assert_eq!(search.rung_size(3), 1);
        assert_eq!(search.budget(2), 9.0);
    }

    #[test]
    fn waiting_rung_degrades_to_unstaged_random() {
        let space = mixed_space();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut search = ResourceStagedSearch::new(2, 1.0, 2.0);
        let history: Vec<EvaluationResult> = Vec::new();

        let a = search.propose(&ctx(&space, &history), "a".into(), &mut rng).unwrap();
        let b = search.propose(&ctx(&space, &history), "b".into(), &mut rng).unwrap();
        assert_eq!(a.stage, Some(0));
        assert_eq!(b.stage, Some(0));

        let filler = search.propose(&ctx(&space, &history), "c".into(), &mut rng).unwrap();
        assert_eq!(filler.stage, None);
        assert!(space.configuration_violations(&filler.values).is_empty());
    }

    #[test]
    fn best_of_rung_is_promoted_with_larger_budget() {
        let space = mixed_space();
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let mut search = ResourceStagedSearch::new(2, 1.0, 2.0);
        let empty: Vec<EvaluationResult> = Vec::new();

        let a = search.propose(&ctx(&space, &empty), "a".into(), &mut rng).unwrap();
        let b = search.propose(&ctx(&space, &empty), "b".into(), &mut rng).unwrap();

        let mut ra = evaluation(0, a.values.clone(), 0.2);
        ra.configuration_id = "a".into();
        let mut rb = evaluation(1, b.values.clone(), 0.6);
        rb.configuration_id = "b".into();
        let history = vec![ra, rb];

        let promoted = search.propose(&ctx(&space, &history), "c".into(), &mut rng).unwrap();
        assert_eq!(promoted.stage, Some(1));
        assert_eq!(promoted.resource_budget, Some(2.0));
        assert_eq!(promoted.values, b.values);
        assert_eq!(promoted.origin, CandidateOrigin::Promotion { from: "b".into() });

        let mut rc = evaluation(2, promoted.values.clone(), 0.7);
        rc.configuration_id = "c".into();
        let mut history = history;
        history.push(rc);

        let next = search.propose(&ctx(&space, &history), "d".into(), &mut rng).unwrap();
        assert_eq!(search.bracket(), 1);
        assert_eq!(next.stage, Some(0));
        assert_eq!(next.resource_budget, Some(1.0));
    }
}
