use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::VecDeque;
use std::time::Duration;

/// Below this many observed samples the anomaly score is always zero.
pub const MIN_SAMPLES_FOR_ANOMALY: u64 = 10;

/// A z-score at or beyond this is reported as the maximal anomaly.
const SATURATING_Z_SCORE: f64 = 2.0;

pub const DEFAULT_WINDOW_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeSnapshot {
    pub mean: f64,
    pub std_dev: f64,
    /// Samples observed over the lifetime of the statistics, not just those
    /// still inside the window.
    pub count: u64,
}

#[derive(Debug)]
struct TimeState {
    samples: VecDeque<u64>,
    capacity: usize,
    count: u64,
    mean: f64,
    variance: f64,
    std_dev: f64,
    dirty: bool,
}

impl TimeState {
    fn recalculate(&mut self) {
        if self.samples.is_empty() {
            self.dirty = false;
            return;
        }
        let n = self.samples.len() as f64;
        let sum: f64 = self.samples.iter().map(|&s| s as f64).sum();
        self.mean = sum / n;
        self.variance = self
            .samples
            .iter()
            .map(|&s| {
                let diff = s as f64 - self.mean;
                diff * diff
            })
            .sum::<f64>()
            / n;
        self.std_dev = self.variance.sqrt();
        self.dirty = false;
    }
}

/// Rolling statistics over recent execution durations.
///
/// Scores how unusual a duration is relative to the recent window, so the
/// detector calibrates itself to the target's normal latency.
#[derive(Debug)]
pub struct TimeStatistics {
    state: RwLock<TimeState>,
}

impl Default for TimeStatistics {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl TimeStatistics {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: RwLock::new(TimeState {
                samples: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                count: 0,
                mean: 0.0,
                variance: 0.0,
                std_dev: 0.0,
                dirty: true,
            }),
        }
    }

    pub fn add_sample(&self, duration: Duration) {
        let mut state = self.state.write();
        state.samples.push_back(duration_nanos(duration));
        state.count += 1;
        state.dirty = true;

        if state.samples.len() > state.capacity {
            let keep = (state.capacity / 2).max(1);
            let drop = state.samples.len() - keep;
            state.samples.drain(..drop);
        }
    }

    /// Returns a value in `[0, 1]`; `1.0` means two or more standard
    /// deviations away from the mean.
    pub fn anomaly_score(&self, duration: Duration) -> f64 {
        self.z_score(duration)
            .map(|z| (z / SATURATING_Z_SCORE).min(1.0))
            .unwrap_or(0.0)
    }

    /// Distance of `duration` from the window mean in standard deviations.
    ///
    /// `None` when there are too few samples or the window has no variance.
    pub fn z_score(&self, duration: Duration) -> Option<f64> {
        let state = self.fresh_state();
        if state.count < MIN_SAMPLES_FOR_ANOMALY || state.std_dev == 0.0 {
            return None;
        }
        Some((duration_nanos(duration) as f64 - state.mean).abs() / state.std_dev)
    }

    pub fn snapshot(&self) -> TimeSnapshot {
        let state = self.fresh_state();
        TimeSnapshot {
            mean: state.mean,
            std_dev: state.std_dev,
            count: state.count,
        }
    }

    /// Changes the window size; an oversized window is compacted on the next sample.
    pub fn set_capacity(&self, capacity: usize) {
        self.state.write().capacity = capacity.max(1);
    }

    pub fn window_len(&self) -> usize {
        self.state.read().samples.len()
    }

    /// Read access to state whose cached statistics are current.
    ///
    /// A stale cache is refreshed under the write lock, which is then
    /// downgraded in place so no writer can slip in before the read.
    fn fresh_state(&self) -> RwLockReadGuard<'_, TimeState> {
        let state = self.state.read();
        if !state.dirty {
            return state;
        }
        drop(state);

        let mut state = self.state.write();
        if state.dirty {
            state.recalculate();
        }
        RwLockWriteGuard::downgrade(state)
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use std::sync::Arc;

    fn nanos(n: u64) -> Duration {
        Duration::from_nanos(n)
    }

    #[test]
    fn too_few_samples_scores_zero() {
        let stats = TimeStatistics::new(100);
        for i in 0..9 {
            stats.add_sample(nanos(1_000 + i * 500));
            assert_eq!(stats.anomaly_score(nanos(1_000_000_000)), 0.0);
        }
        assert!(stats.z_score(nanos(1_000_000_000)).is_none());
    }

    #[test]
    fn outlier_scores_higher_than_mean() {
        let stats = TimeStatistics::new(1_000);
        let mut rng = ChaCha8Rng::from_seed([7; 32]);
        for _ in 0..100 {
            let jitter: u64 = rng.random_range(0..100_000);
            stats.add_sample(nanos(950_000 + jitter));
        }

        let normal = stats.anomaly_score(nanos(1_000_000));
        let slow = stats.anomaly_score(nanos(5_000_000));
        assert!(
            normal < slow,
            "expected mean duration ({normal}) to score below the outlier ({slow})"
        );
        assert_eq!(slow, 1.0);
        assert!((0.0..=1.0).contains(&normal));
    }

    #[test]
    fn zero_variance_scores_zero() {
        let stats = TimeStatistics::new(100);
        for _ in 0..20 {
            stats.add_sample(nanos(500));
        }
        assert_eq!(stats.anomaly_score(nanos(10_000)), 0.0);
        let snap = stats.snapshot();
        assert_eq!(snap.mean, 500.0);
        assert_eq!(snap.std_dev, 0.0);
        assert_eq!(snap.count, 20);
    }

    #[test]
    fn z_score_of_two_saturates() {
        let stats = TimeStatistics::new(100);
        // Alternating 0/200 gives mean 100 and standard deviation 100.
        for i in 0..20 {
            stats.add_sample(nanos(if i % 2 == 0 { 0 } else { 200 }));
        }
        assert_eq!(stats.z_score(nanos(100)), Some(0.0));
        assert!((stats.anomaly_score(nanos(200)) - 0.5).abs() < 1e-12);
        assert_eq!(stats.anomaly_score(nanos(300)), 1.0);
        assert_eq!(stats.anomaly_score(nanos(900)), 1.0);
    }

    #[test]
    fn overflow_keeps_newest_half() {
        let stats = TimeStatistics::new(10);
        for i in 1..=11 {
            stats.add_sample(nanos(i));
        }
        assert_eq!(stats.window_len(), 5);
        let snap = stats.snapshot();
        // Samples 7..=11 remain.
        assert_eq!(snap.mean, 9.0);
        assert_eq!(snap.count, 11);
    }

    #[test]
    fn snapshot_tracks_new_samples() {
        let stats = TimeStatistics::new(100);
        stats.add_sample(nanos(10));
        assert_eq!(stats.snapshot().mean, 10.0);
        stats.add_sample(nanos(30));
        assert_eq!(stats.snapshot().mean, 20.0);
    }

    #[test]
    fn concurrent_readers_and_writers() {
        let stats = Arc::new(TimeStatistics::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        stats.add_sample(nanos(1_000 + (i + t) % 50));
                        let score = stats.anomaly_score(nanos(1_025));
                        assert!((0.0..=1.0).contains(&score));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().count, 2_000);
        assert!(stats.window_len() <= 64);
    }
}
