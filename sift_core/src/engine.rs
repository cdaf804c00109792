use crate::campaign::Campaign;
use crate::config::{ConfigError, ScoreConfig};
use crate::input::InputId;
use crate::log_matcher::LogMatcherError;
use crate::metrics::{MetricsSnapshot, ScoreMetrics};
use crate::outcome::ExecutionOutcome;
use crate::scheduler::{Scheduler, WeightedScheduler};
use crate::score::ProgScore;
use crate::selector::WeightedSelector;
use crate::tracker::ScoreTracker;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pattern(#[from] LogMatcherError),
}

/// Share of `max_score_cache` freed when the cache overflows, as a divisor.
const EVICTION_HEADROOM_DIVISOR: usize = 10;

/// Cache size that eviction shrinks to once `max` is exceeded.
fn low_water_mark(max: usize) -> usize {
    max - max / EVICTION_HEADROOM_DIVISOR
}

/// Wires the tracker, selector and metrics together for a fuzzing loop.
///
/// Each processed outcome is scored, its total becomes the input's selection
/// weight, and the observation is recorded in the metrics. The components are
/// shared through `Arc`, so worker threads can hold clones of the engine's
/// parts or of the engine itself.
///
/// Scoring, the weight update and eviction run under one admission lock, so
/// the tracker and the selector always hold the same identities between calls.
#[derive(Debug)]
pub struct ScoringEngine {
    tracker: Arc<ScoreTracker>,
    selector: Arc<WeightedSelector>,
    metrics: Arc<ScoreMetrics>,
    admission: Mutex<()>,
}

impl ScoringEngine {
    /// Validates `config`, then builds the engine and installs its extra log patterns.
    pub fn new(config: ScoreConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let tracker = ScoreTracker::new(config.clone());
        for pattern in &config.extra_patterns {
            tracker.add_log_pattern(&pattern.regex, pattern.score, &pattern.category)?;
        }
        Ok(Self {
            tracker: Arc::new(tracker),
            selector: Arc::new(WeightedSelector::new()),
            metrics: Arc::new(ScoreMetrics::new()),
            admission: Mutex::new(()),
        })
    }

    pub fn tracker(&self) -> &Arc<ScoreTracker> {
        &self.tracker
    }

    pub fn selector(&self) -> &Arc<WeightedSelector> {
        &self.selector
    }

    pub fn metrics(&self) -> &Arc<ScoreMetrics> {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// A scheduler that draws from this engine's selector and tracker.
    pub fn scheduler(&self) -> WeightedScheduler {
        WeightedScheduler::new(Arc::clone(&self.tracker), Arc::clone(&self.selector))
    }

    /// Scores one execution and feeds the result to the selector and metrics.
    ///
    /// `selected_by_weight` tells the metrics whether the executed input was
    /// picked by weighted selection.
    pub fn process_outcome(
        &self,
        id: InputId,
        outcome: &ExecutionOutcome,
        selected_by_weight: bool,
    ) -> ProgScore {
        self.admit(id, outcome, selected_by_weight).0
    }

    /// Like [`ScoringEngine::process_outcome`], and also reports the score to
    /// `scheduler` and makes it forget every identity evicted along the way.
    pub fn process_feedback(
        &self,
        scheduler: &mut dyn Scheduler,
        id: InputId,
        outcome: &ExecutionOutcome,
        selected_by_weight: bool,
    ) -> ProgScore {
        let (score, evicted) = self.admit(id, outcome, selected_by_weight);
        scheduler.report_feedback(id, &score, outcome.crashed);
        for gone in &evicted {
            scheduler.forget(gone);
        }
        score
    }

    fn admit(
        &self,
        id: InputId,
        outcome: &ExecutionOutcome,
        selected_by_weight: bool,
    ) -> (ProgScore, Vec<InputId>) {
        let _admission = self.admission.lock();
        let started = Instant::now();
        let score = self.tracker.update_score(id, outcome);
        let latency = started.elapsed();

        self.metrics.record_score(&score, selected_by_weight, latency);
        if !score.is_computed() {
            return (score, Vec::new());
        }
        self.selector.update_weight(id, score.total);
        let evicted = self.evict_locked();
        (score, evicted)
    }

    /// Evicts the lowest scores once the cache holds more than
    /// `max_score_cache`, from both the tracker and the selector. Returns the
    /// evicted identities.
    ///
    /// The cache is shrunk to a little below the limit so that eviction runs
    /// once per batch of new inputs rather than on every one.
    pub fn enforce_cache_limit(&self) -> Vec<InputId> {
        let _admission = self.admission.lock();
        self.evict_locked()
    }

    fn evict_locked(&self) -> Vec<InputId> {
        let max = self.tracker.max_score_cache();
        if self.tracker.len() <= max {
            return Vec::new();
        }
        let evicted = self.tracker.evict_to(low_water_mark(max));
        for id in &evicted {
            self.selector.remove(id);
        }
        debug!(evicted = evicted.len(), max, "enforced score cache limit");
        evicted
    }

    /// Starts a mutation campaign seeded from `seed`, using its current score
    /// (neutral if unscored) as the baseline.
    pub fn start_campaign(&self, seed: &InputId) -> Campaign {
        Campaign::start(&self.tracker.get_score(seed), self.tracker.is_enabled())
    }

    /// Scores one campaign mutation. Improvements over the baseline are also
    /// recorded by [`ScoringEngine::process_outcome`] as selector weights.
    pub fn observe_mutation(
        &self,
        campaign: &mut Campaign,
        id: InputId,
        outcome: &ExecutionOutcome,
    ) -> ProgScore {
        let score = self.process_outcome(id, outcome, false);
        campaign.observe(&score);
        score
    }

    pub fn finish_campaign(&self, campaign: Campaign) {
        campaign.finish(&self.metrics);
    }

    /// Validates and installs a new configuration, replacing the old one whole.
    ///
    /// Extra patterns that are not yet in the matcher are added; patterns
    /// are never removed.
    pub fn update_config(&self, config: ScoreConfig) -> Result<(), EngineError> {
        config.validate()?;
        let _admission = self.admission.lock();
        let previous = self.tracker.config();
        for pattern in &config.extra_patterns {
            if !previous.extra_patterns.contains(pattern) {
                self.tracker
                    .add_log_pattern(&pattern.regex, pattern.score, &pattern.category)?;
            }
        }
        self.tracker.update_config(config);
        self.evict_locked();
        Ok(())
    }
}
