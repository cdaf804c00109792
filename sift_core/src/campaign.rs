use crate::metrics::ScoreMetrics;
use crate::score::ProgScore;
use serde::Serialize;
use tracing::info;

const DEFAULT_ITERATIONS: u32 = 25;
const MIN_SCORED_ITERATIONS: u32 = 15;
const SCORED_ITERATION_RANGE: f64 = 35.0;
const CONSERVATIVE_ABOVE: f64 = 0.7;
const AGGRESSIVE_BELOW: f64 = 0.3;

/// How hard a campaign should mutate its seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationStrategy {
    /// Small argument-level changes that keep a strong seed's structure.
    Conservative,
    Standard,
    /// Structural changes for seeds that scored poorly.
    Aggressive,
}

/// Bookkeeping for one series of mutations seeded from a baseline input.
///
/// The baseline score decides how many mutations to attempt and how
/// aggressive they should be; every attempt is then judged against it.
#[derive(Debug, Clone, PartialEq)]
pub struct Campaign {
    baseline: f64,
    scoring_enabled: bool,
    attempted: u64,
    improved: u64,
}

impl Campaign {
    pub fn start(baseline: &ProgScore, scoring_enabled: bool) -> Self {
        Self {
            baseline: baseline.total,
            scoring_enabled,
            attempted: 0,
            improved: 0,
        }
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn iterations(&self) -> u32 {
        if !self.scoring_enabled {
            return DEFAULT_ITERATIONS;
        }
        let extra = (self.baseline.clamp(0.0, 1.0) * SCORED_ITERATION_RANGE).floor() as u32;
        MIN_SCORED_ITERATIONS + extra
    }

    pub fn strategy(&self) -> MutationStrategy {
        if !self.scoring_enabled {
            MutationStrategy::Standard
        } else if self.baseline > CONSERVATIVE_ABOVE {
            MutationStrategy::Conservative
        } else if self.baseline < AGGRESSIVE_BELOW {
            MutationStrategy::Aggressive
        } else {
            MutationStrategy::Standard
        }
    }

    /// Counts one mutation attempt and reports whether it beat the baseline.
    pub fn observe(&mut self, mutation: &ProgScore) -> bool {
        self.attempted += 1;
        let improved = self.scoring_enabled && mutation.total > self.baseline;
        if improved {
            self.improved += 1;
        }
        improved
    }

    pub fn attempted(&self) -> u64 {
        self.attempted
    }

    pub fn improved(&self) -> u64 {
        self.improved
    }

    /// Records the campaign into `metrics`; campaigns that attempted nothing,
    /// or ran with scoring disabled, are not recorded.
    pub fn finish(self, metrics: &ScoreMetrics) {
        if !self.scoring_enabled || self.attempted == 0 {
            return;
        }
        info!(
            baseline = self.baseline,
            improved = self.improved,
            attempted = self.attempted,
            "campaign finished"
        );
        metrics.record_campaign(self.improved, self.attempted, self.baseline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(total: f64) -> ProgScore {
        ProgScore {
            total,
            ..ProgScore::neutral()
        }
    }

    #[test]
    fn iterations_scale_with_baseline() {
        assert_eq!(Campaign::start(&scored(0.0), true).iterations(), 15);
        assert_eq!(Campaign::start(&scored(0.5), true).iterations(), 32);
        assert_eq!(Campaign::start(&scored(1.0), true).iterations(), 50);
        assert_eq!(Campaign::start(&scored(0.9), false).iterations(), 25);
    }

    #[test]
    fn strategy_follows_thresholds() {
        assert_eq!(
            Campaign::start(&scored(0.71), true).strategy(),
            MutationStrategy::Conservative
        );
        assert_eq!(
            Campaign::start(&scored(0.7), true).strategy(),
            MutationStrategy::Standard
        );
        assert_eq!(
            Campaign::start(&scored(0.3), true).strategy(),
            MutationStrategy::Standard
        );
        assert_eq!(
            Campaign::start(&scored(0.29), true).strategy(),
            MutationStrategy::Aggressive
        );
        assert_eq!(
            Campaign::start(&scored(0.1), false).strategy(),
            MutationStrategy::Standard
        );
    }

    #[test]
    fn only_strict_improvements_count() {
        let mut campaign = Campaign::start(&scored(0.5), true);
        assert!(!campaign.observe(&scored(0.5)));
        assert!(campaign.observe(&scored(0.51)));
        assert!(!campaign.observe(&scored(0.2)));
        assert_eq!(campaign.attempted(), 3);
        assert_eq!(campaign.improved(), 1);

        let metrics = ScoreMetrics::new();
        campaign.finish(&metrics);
        let snap = metrics.snapshot();
        assert_eq!(snap.campaigns.campaigns, 1);
        assert_eq!(snap.campaigns.mutations, 3);
        assert_eq!(snap.campaigns.successful_mutations, 1);
        assert_eq!(snap.campaigns.average_baseline_score, 0.5);
    }

    #[test]
    fn empty_or_disabled_campaigns_are_not_recorded() {
        let metrics = ScoreMetrics::new();
        Campaign::start(&scored(0.5), true).finish(&metrics);

        let mut disabled = Campaign::start(&scored(0.5), false);
        assert!(!disabled.observe(&scored(0.9)));
        disabled.finish(&metrics);

        assert_eq!(metrics.snapshot().campaigns.campaigns, 0);
    }
}
