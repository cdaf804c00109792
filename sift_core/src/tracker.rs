use crate::config::ScoreConfig;
use crate::input::InputId;
use crate::log_matcher::{LogMatcherError, LogPatternMatcher};
use crate::outcome::ExecutionOutcome;
use crate::score::ProgScore;
use crate::signal::{Signal, SignalSignature};
use crate::time_stats::{TimeSnapshot, TimeStatistics};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::f64::consts::E;
use std::time::SystemTime;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct TrackerState {
    scores: HashMap<InputId, ProgScore>,
    pc_hit_counts: HashMap<u64, u64>,
    path_frequency: HashMap<SignalSignature, u64>,
}

impl TrackerState {
    /// Scores coverage novelty and folds the signal into the hit counts.
    ///
    /// Each element is classified before its own count is incremented.
    fn coverage_score(&mut self, signal: Option<&Signal>) -> (f64, usize) {
        let Some(signal) = signal.filter(|s| !s.is_empty()) else {
            return (0.0, 0);
        };
        let mut new_count = 0usize;
        for pc in signal.iter() {
            let hits = self.pc_hit_counts.entry(pc).or_insert(0);
            if *hits == 0 {
                new_count += 1;
            }
            *hits += 1;
        }
        let new_ratio = new_count as f64 / signal.len() as f64;
        let score = (1.0 + new_ratio * E).ln() / (1.0 + E).ln();
        (score.min(1.0), new_count)
    }

    fn rarity_score(&self, signature: Option<&SignalSignature>) -> f64 {
        let Some(signature) = signature else {
            return 0.0;
        };
        match self.path_frequency.get(signature).copied().unwrap_or(0) {
            0 => 1.0,
            frequency => (1.0 / (1.0 + (frequency as f64).ln())).min(1.0),
        }
    }
}

type EvictionKey = (InputId, f64, Option<SystemTime>);

fn eviction_order(a: &EvictionKey, b: &EvictionKey) -> Ordering {
    a.1.total_cmp(&b.1)
        .then_with(|| a.2.cmp(&b.2))
        .then_with(|| a.0.cmp(&b.0))
}

/// Scores executions and remembers the latest score of every input.
///
/// All coverage and path bookkeeping sits behind one lock: an update holds it
/// exclusively from the first read of the counters to the last write, so
/// concurrent updates never lose increments.
#[derive(Debug)]
pub struct ScoreTracker {
    config: RwLock<ScoreConfig>,
    state: RwLock<TrackerState>,
    time_stats: TimeStatistics,
    log_matcher: LogPatternMatcher,
}

impl Default for ScoreTracker {
    fn default() -> Self {
        Self::new(ScoreConfig::default())
    }
}

impl ScoreTracker {
    /// Creates a tracker with the built-in log patterns.
    ///
    /// `config.extra_patterns` is not installed here; use
    /// [`ScoreTracker::add_log_pattern`] (the engine does this on construction).
    pub fn new(config: ScoreConfig) -> Self {
        let time_stats = TimeStatistics::new(config.time_window_size);
        Self {
            config: RwLock::new(config),
            state: RwLock::new(TrackerState::default()),
            time_stats,
            log_matcher: LogPatternMatcher::new(),
        }
    }

    pub fn max_score_cache(&self) -> usize {
        self.config.read().max_score_cache
    }

    pub fn config(&self) -> ScoreConfig {
        self.config.read().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.read().enabled
    }

    /// Chance of a weighted pick, or `None` while scoring is disabled.
    pub fn weighted_select_prob(&self) -> Option<f64> {
        let config = self.config.read();
        config.enabled.then_some(config.weighted_select_prob)
    }

    /// Replaces the configuration wholesale.
    pub fn update_config(&self, config: ScoreConfig) {
        info!(
            enabled = config.enabled,
            weights = ?config.weights(),
            "replacing score configuration"
        );
        self.time_stats.set_capacity(config.time_window_size);
        *self.config.write() = config;
    }

    pub fn add_log_pattern(
        &self,
        expr: &str,
        score: f64,
        category: &str,
    ) -> Result<(), LogMatcherError> {
        self.log_matcher.add_pattern(expr, score, category)
    }

    pub fn log_matcher(&self) -> &LogPatternMatcher {
        &self.log_matcher
    }

    /// Scores one execution of `id` and caches the result.
    ///
    /// Every dimension is computed against the statistics as they were before
    /// this execution; the execution is folded in afterwards. With scoring
    /// disabled this returns the neutral score and touches nothing.
    pub fn update_score(&self, id: InputId, outcome: &ExecutionOutcome) -> ProgScore {
        let (enabled, weights) = {
            let config = self.config.read();
            (config.enabled, config.weights())
        };
        if !enabled {
            return ProgScore::neutral();
        }

        let mut state = self.state.write();

        let signal = outcome.signal.as_ref().filter(|s| !s.is_empty());
        let signature = signal.map(Signal::signature);

        let (coverage, new_elements) = state.coverage_score(signal);
        let rarity = state.rarity_score(signature.as_ref());
        let log = if outcome.log_lines.is_empty() {
            0.0
        } else {
            self.log_matcher.score(&outcome.log_lines)
        };
        let time_anomaly = if outcome.elapsed.is_zero() {
            0.0
        } else {
            self.time_stats.anomaly_score(outcome.elapsed)
        };

        let [coverage_weight, rarity_weight, log_weight, time_weight] = weights;
        let total = coverage_weight * coverage
            + rarity_weight * rarity
            + log_weight * log
            + time_weight * time_anomaly;

        let score = ProgScore {
            total,
            coverage,
            rarity,
            log,
            time_anomaly,
            new_elements,
            computed_at: Some(SystemTime::now()),
        };
        state.scores.insert(id, score.clone());

        if let Some(signature) = signature {
            *state.path_frequency.entry(signature).or_insert(0) += 1;
        }
        if !outcome.elapsed.is_zero() {
            self.time_stats.add_sample(outcome.elapsed);
        }

        debug!(
            %id,
            total,
            coverage,
            rarity,
            log,
            time_anomaly,
            new_elements,
            "scored input"
        );
        score
    }

    /// The cached score of `id`, or the neutral score if it was never scored.
    pub fn get_score(&self, id: &InputId) -> ProgScore {
        self.try_get_score(id).unwrap_or_else(ProgScore::neutral)
    }

    pub fn try_get_score(&self, id: &InputId) -> Option<ProgScore> {
        self.state.read().scores.get(id).cloned()
    }

    /// Up to `limit` identities, highest total first. Ties keep identity order.
    pub fn top_scored(&self, limit: usize) -> Vec<InputId> {
        let state = self.state.read();
        let mut ranked: Vec<(InputId, f64)> = state
            .scores
            .iter()
            .map(|(id, score)| (*id, score.total))
            .collect();
        drop(state);

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().take(limit).map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().scores.is_empty()
    }

    /// Drops cached scores until at most `max` remain and returns the dropped ids.
    ///
    /// The lowest totals go first; among equal totals the older score goes first.
    /// Only the victims are ordered, the rest of the cache is partitioned around
    /// them. Coverage and path statistics are kept.
    pub fn evict_to(&self, max: usize) -> Vec<InputId> {
        let mut state = self.state.write();
        if state.scores.len() <= max {
            return Vec::new();
        }
        let mut ranked: Vec<EvictionKey> = state
            .scores
            .iter()
            .map(|(id, score)| (*id, score.total, score.computed_at))
            .collect();

        let excess = ranked.len() - max;
        let victims = if excess < ranked.len() {
            ranked.select_nth_unstable_by(excess, eviction_order).0
        } else {
            &mut ranked[..]
        };
        victims.sort_unstable_by(eviction_order);

        let evicted: Vec<InputId> = victims.iter().map(|(id, ..)| *id).collect();
        for id in &evicted {
            state.scores.remove(id);
        }
        debug!(evicted = evicted.len(), remaining = state.scores.len(), "evicted scores");
        evicted
    }

    pub fn forget(&self, id: &InputId) -> Option<ProgScore> {
        self.state.write().scores.remove(id)
    }

    /// How many scored executions reached coverage element `pc`.
    pub fn hit_count(&self, pc: u64) -> u64 {
        self.state.read().pc_hit_counts.get(&pc).copied().unwrap_or(0)
    }

    /// Sum of all coverage hit counts.
    pub fn total_hits(&self) -> u64 {
        self.state.read().pc_hit_counts.values().sum()
    }

    /// Distinct coverage elements reached so far.
    pub fn covered_elements(&self) -> usize {
        self.state.read().pc_hit_counts.len()
    }

    /// How many scored executions produced exactly this signal set.
    pub fn path_frequency(&self, signal: &Signal) -> u64 {
        self.state
            .read()
            .path_frequency
            .get(&signal.signature())
            .copied()
            .unwrap_or(0)
    }

    pub fn time_snapshot(&self) -> TimeSnapshot {
        self.time_stats.snapshot()
    }
}
