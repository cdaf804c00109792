use crate::input::InputId;
use parking_lot::Mutex;
use rand::Rng;
use rand_core::RngCore;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct SelectorState {
    weights: BTreeMap<InputId, f64>,
    /// Prefix sums over the positive weights, parallel to `ids`.
    cumulative: Vec<f64>,
    ids: Vec<InputId>,
    stale: bool,
}

impl SelectorState {
    fn rebuild(&mut self) {
        self.cumulative.clear();
        self.ids.clear();
        let mut running = 0.0;
        for (id, &weight) in &self.weights {
            if weight > 0.0 {
                running += weight;
                self.cumulative.push(running);
                self.ids.push(*id);
            }
        }
        self.stale = false;
    }

    fn fresh(&mut self) -> &Self {
        if self.stale {
            self.rebuild();
        }
        self
    }
}

/// Roulette-wheel selection over input identities.
///
/// Each identity is drawn with probability proportional to its latest weight.
/// Identities with a weight of zero or less are remembered but never drawn.
/// The cumulative index is rebuilt lazily on the first draw after a change,
/// after which each draw is a binary search.
#[derive(Debug, Default)]
pub struct WeightedSelector {
    state: Mutex<SelectorState>,
}

impl WeightedSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the weight of `id`, replacing any previous weight.
    pub fn update_weight(&self, id: InputId, weight: f64) {
        let mut state = self.state.lock();
        state.weights.insert(id, weight);
        state.stale = true;
    }

    pub fn remove(&self, id: &InputId) -> Option<f64> {
        let mut state = self.state.lock();
        let removed = state.weights.remove(id);
        if removed.is_some() {
            state.stale = true;
        }
        removed
    }

    pub fn weight(&self, id: &InputId) -> Option<f64> {
        self.state.lock().weights.get(id).copied()
    }

    /// Number of identities with a recorded weight, drawable or not.
    pub fn len(&self) -> usize {
        self.state.lock().weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().weights.is_empty()
    }

    /// Sum of all positive weights.
    pub fn total_weight(&self) -> f64 {
        let mut state = self.state.lock();
        state.fresh().cumulative.last().copied().unwrap_or(0.0)
    }

    /// Draws an identity using `u` in `[0, 1)` as the random variate.
    ///
    /// Returns `None` when no identity has a positive weight. Values of `u`
    /// outside `[0, 1)` are clamped into range.
    pub fn select_weighted(&self, u: f64) -> Option<InputId> {
        let mut state = self.state.lock();
        let state = state.fresh();
        let total = *state.cumulative.last()?;

        let u = if u.is_nan() { 0.0 } else { u.clamp(0.0, 1.0) };
        let target = u * total;
        let index = state
            .cumulative
            .partition_point(|&sum| sum < target)
            .min(state.ids.len() - 1);
        Some(state.ids[index])
    }

    pub fn select(&self, rng: &mut dyn RngCore) -> Option<InputId> {
        let u: f64 = rng.random();
        self.select_weighted(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn id(name: &str) -> InputId {
        InputId::from_bytes(name.as_bytes())
    }

    #[test]
    fn empty_selector_selects_nothing() {
        let selector = WeightedSelector::new();
        assert_eq!(selector.select_weighted(0.5), None);
        assert_eq!(selector.total_weight(), 0.0);
        assert!(selector.is_empty());
    }

    #[test]
    fn non_positive_weights_are_never_drawn() {
        let selector = WeightedSelector::new();
        selector.update_weight(id("zero"), 0.0);
        selector.update_weight(id("negative"), -3.0);
        assert_eq!(selector.select_weighted(0.3), None);
        assert_eq!(selector.len(), 2);

        selector.update_weight(id("live"), 0.25);
        for u in [0.0, 0.1, 0.5, 0.99] {
            assert_eq!(selector.select_weighted(u), Some(id("live")));
        }
        assert_eq!(selector.total_weight(), 0.25);
    }

    #[test]
    fn variate_maps_through_cumulative_weights() {
        let selector = WeightedSelector::new();
        let (a, b) = (id("a"), id("b"));
        selector.update_weight(a, 1.0);
        selector.update_weight(b, 3.0);
        assert_eq!(selector.total_weight(), 4.0);

        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first_share = selector.weight(&first).unwrap() / 4.0;
        assert_eq!(selector.select_weighted(0.0), Some(first));
        assert_eq!(selector.select_weighted(first_share - 0.01), Some(first));
        assert_eq!(selector.select_weighted(first_share + 0.01), Some(second));
        assert_eq!(selector.select_weighted(0.999_999), Some(second));
        assert_eq!(selector.select_weighted(7.0), Some(second));
        assert_eq!(selector.select_weighted(f64::NAN), Some(first));
    }

    #[test]
    fn last_write_wins() {
        let selector = WeightedSelector::new();
        selector.update_weight(id("a"), 5.0);
        selector.update_weight(id("a"), 0.0);
        selector.update_weight(id("b"), 1.0);
        assert_eq!(selector.weight(&id("a")), Some(0.0));
        assert_eq!(selector.total_weight(), 1.0);
        for u in [0.0, 0.5, 0.9] {
            assert_eq!(selector.select_weighted(u), Some(id("b")));
        }

        assert_eq!(selector.remove(&id("b")), Some(1.0));
        assert_eq!(selector.select_weighted(0.5), None);
    }

    #[test]
    fn draws_converge_to_weight_ratio() {
        let selector = WeightedSelector::new();
        selector.update_weight(id("A"), 1.0);
        selector.update_weight(id("B"), 9.0);

        let mut rng = ChaCha8Rng::from_seed([3; 32]);
        let draws = 20_000;
        let b_count = (0..draws)
            .filter(|_| selector.select(&mut rng) == Some(id("B")))
            .count();
        let ratio = b_count as f64 / draws as f64;
        assert!(
            (ratio - 0.9).abs() <= 0.02,
            "B drawn {ratio:.4} of the time, expected 0.90 +/- 0.02"
        );
    }

    #[test]
    fn concurrent_updates_and_draws() {
        let selector = std::sync::Arc::new(WeightedSelector::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let selector = std::sync::Arc::clone(&selector);
                std::thread::spawn(move || {
                    for i in 0..250u64 {
                        let key = InputId::from_bytes(&(t * 1_000 + i).to_le_bytes());
                        selector.update_weight(key, (i % 7) as f64);
                        let _ = selector.select_weighted((i as f64) / 250.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(selector.len(), 1_000);
        let expected: f64 = 4.0 * (0..250u64).map(|i| (i % 7) as f64).sum::<f64>();
        assert!((selector.total_weight() - expected).abs() < 1e-6);
    }
}
