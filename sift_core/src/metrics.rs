use crate::score::ProgScore;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Running aggregate of one quantity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunningStat {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl RunningStat {
    /// Folds in the `n`-th observation (1-based).
    fn observe(&mut self, x: f64, n: u64) {
        if n <= 1 {
            *self = RunningStat {
                mean: x,
                min: x,
                max: x,
            };
            return;
        }
        self.mean += (x - self.mean) / n as f64;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }
}

/// Per-dimension running means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DimensionAverages {
    pub coverage: f64,
    pub rarity: f64,
    pub log: f64,
    pub time_anomaly: f64,
}

/// Aggregates over mutation campaigns seeded from one baseline input each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CampaignStats {
    pub campaigns: u64,
    pub mutations: u64,
    pub successful_mutations: u64,
    pub average_baseline_score: f64,
}

/// A consistent copy of [`ScoreMetrics`] at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_scored: u64,
    pub weight_selected: u64,
    pub total_score: RunningStat,
    pub dimensions: DimensionAverages,
    pub total_latency: Duration,
    pub campaigns: CampaignStats,
    pub last_updated: SystemTime,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            total_scored: 0,
            weight_selected: 0,
            total_score: RunningStat::default(),
            dimensions: DimensionAverages::default(),
            total_latency: Duration::ZERO,
            campaigns: CampaignStats::default(),
            last_updated: SystemTime::now(),
        }
    }
}

impl MetricsSnapshot {
    /// Share of scored inputs that were picked by weighted selection.
    pub fn selection_ratio(&self) -> f64 {
        if self.total_scored == 0 {
            return 0.0;
        }
        self.weight_selected as f64 / self.total_scored as f64
    }

    pub fn average_latency(&self) -> Duration {
        match u32::try_from(self.total_scored) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_latency / n,
            Err(_) => Duration::from_secs_f64(
                self.total_latency.as_secs_f64() / self.total_scored as f64,
            ),
        }
    }

    /// Share of campaign mutations that improved on their baseline score.
    pub fn campaign_success_rate(&self) -> f64 {
        if self.campaigns.mutations == 0 {
            return 0.0;
        }
        self.campaigns.successful_mutations as f64 / self.campaigns.mutations as f64
    }

    pub fn average_mutations_per_campaign(&self) -> f64 {
        if self.campaigns.campaigns == 0 {
            return 0.0;
        }
        self.campaigns.mutations as f64 / self.campaigns.campaigns as f64
    }

    fn observe_dimensions(&mut self, coverage: f64, rarity: f64, log: f64, time_anomaly: f64) {
        let n = self.total_scored.max(1);
        let dims = &mut self.dimensions;
        if n == 1 {
            *dims = DimensionAverages {
                coverage,
                rarity,
                log,
                time_anomaly,
            };
        } else {
            let n = n as f64;
            dims.coverage += (coverage - dims.coverage) / n;
            dims.rarity += (rarity - dims.rarity) / n;
            dims.log += (log - dims.log) / n;
            dims.time_anomaly += (time_anomaly - dims.time_anomaly) / n;
        }
    }

    fn observe_total(&mut self, total: f64, was_weight_selected: bool, latency: Duration) {
        self.total_scored += 1;
        if was_weight_selected {
            self.weight_selected += 1;
        }
        self.total_score.observe(total, self.total_scored);
        self.total_latency += latency;
    }
}

/// Process-wide scoring telemetry.
///
/// Updates are short increments under one lock; readers take a
/// [`MetricsSnapshot`] rather than looking at live counters.
#[derive(Debug, Default)]
pub struct ScoreMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl ScoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, total: f64, was_weight_selected: bool, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.observe_total(total, was_weight_selected, latency);
        inner.last_updated = SystemTime::now();
    }

    /// Folds in the dimension scores of the observation last passed to
    /// [`ScoreMetrics::record`]. Prefer [`ScoreMetrics::record_score`], which
    /// does both under one lock.
    pub fn record_dimensions(&self, coverage: f64, rarity: f64, log: f64, time_anomaly: f64) {
        self.inner
            .lock()
            .observe_dimensions(coverage, rarity, log, time_anomaly);
    }

    pub fn record_score(&self, score: &ProgScore, was_weight_selected: bool, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.observe_total(score.total, was_weight_selected, latency);
        inner.observe_dimensions(score.coverage, score.rarity, score.log, score.time_anomaly);
        inner.last_updated = SystemTime::now();
    }

    pub fn record_campaign(
        &self,
        successful_mutations: u64,
        total_mutations: u64,
        baseline_score: f64,
    ) {
        let mut inner = self.inner.lock();
        let stats = &mut inner.campaigns;
        stats.campaigns += 1;
        stats.mutations += total_mutations;
        stats.successful_mutations += successful_mutations;
        if stats.campaigns == 1 {
            stats.average_baseline_score = baseline_score;
        } else {
            stats.average_baseline_score +=
                (baseline_score - stats.average_baseline_score) / stats.campaigns as f64;
        }
        inner.last_updated = SystemTime::now();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().clone()
    }
}
