use crate::input::InputId;
use crate::score::ProgScore;
use crate::selector::WeightedSelector;
use crate::tracker::ScoreTracker;
use rand::Rng;
use rand_core::RngCore;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use thiserror::Error;

/// How many of the best-scored inputs the weighted fallback chooses among.
pub const DEFAULT_TOP_N: usize = 50;

/// Errors that can occur during scheduler operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    /// No input has been reported yet, so there is nothing to pick.
    #[error("No known inputs, cannot schedule next input")]
    NothingToSchedule,
}

/// An input chosen for mutation, and whether score-based selection chose it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pick {
    pub id: InputId,
    pub weighted: bool,
}

/// A `Scheduler` is responsible for selecting the next input to be mutated.
///
/// Schedulers learn about inputs through [`Scheduler::report_feedback`] and
/// may use the reported scores to prioritize them.
pub trait Scheduler: Send + Sync {
    /// Selects the identity of the next input to mutate.
    ///
    /// # Returns
    /// The chosen [`Pick`], or `SchedulerError::NothingToSchedule` if no
    /// input has been reported yet.
    fn next(&mut self, rng: &mut dyn RngCore) -> Result<Pick, SchedulerError>;

    /// Reports the score of an executed input.
    ///
    /// # Arguments
    /// * `id`: The identity of the executed input.
    /// * `score`: The score it received.
    /// * `is_solution`: Whether the execution was reported as a bug.
    fn report_feedback(&mut self, id: InputId, score: &ProgScore, is_solution: bool);

    /// Stops scheduling `id`, e.g. once its score has been evicted.
    fn forget(&mut self, id: &InputId);
}

/// Picks uniformly among every input reported so far.
///
/// Scores are ignored; this is the default strategy that weighted selection
/// falls back to.
#[derive(Default, Debug)]
pub struct RandomScheduler {
    known: Vec<InputId>,
    /// Position of every known id in `known`.
    positions: HashMap<InputId, usize>,
}

impl RandomScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

impl Scheduler for RandomScheduler {
    fn next(&mut self, rng: &mut dyn RngCore) -> Result<Pick, SchedulerError> {
        if self.known.is_empty() {
            return Err(SchedulerError::NothingToSchedule);
        }
        let index = rng.random_range(0..self.known.len());
        Ok(Pick {
            id: self.known[index],
            weighted: false,
        })
    }

    fn report_feedback(&mut self, id: InputId, _score: &ProgScore, _is_solution: bool) {
        if let Entry::Vacant(slot) = self.positions.entry(id) {
            slot.insert(self.known.len());
            self.known.push(id);
        }
    }

    fn forget(&mut self, id: &InputId) {
        let Some(index) = self.positions.remove(id) else {
            return;
        };
        self.known.swap_remove(index);
        if let Some(moved) = self.known.get(index) {
            self.positions.insert(*moved, index);
        }
    }
}

/// Biases picks toward high-scoring inputs.
///
/// With the configured `weighted_select_prob` a pick is drawn from the
/// [`WeightedSelector`]; if it holds no positive weight, one of the top
/// scored inputs is taken instead. All other picks, and every pick while
/// scoring is disabled, use the uniform [`RandomScheduler`] strategy.
#[derive(Debug)]
pub struct WeightedScheduler {
    tracker: Arc<ScoreTracker>,
    selector: Arc<WeightedSelector>,
    fallback: RandomScheduler,
    top_n: usize,
}

impl WeightedScheduler {
    pub fn new(tracker: Arc<ScoreTracker>, selector: Arc<WeightedSelector>) -> Self {
        Self {
            tracker,
            selector,
            fallback: RandomScheduler::new(),
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n.max(1);
        self
    }

    fn weighted_pick(&self, rng: &mut dyn RngCore) -> Option<InputId> {
        if let Some(id) = self.selector.select(rng) {
            return Some(id);
        }
        let top = self.tracker.top_scored(self.top_n);
        if top.is_empty() {
            return None;
        }
        Some(top[rng.random_range(0..top.len())])
    }
}

impl Scheduler for WeightedScheduler {
    fn next(&mut self, rng: &mut dyn RngCore) -> Result<Pick, SchedulerError> {
        if let Some(prob) = self.tracker.weighted_select_prob() {
            if rng.random::<f64>() < prob {
                if let Some(id) = self.weighted_pick(rng) {
                    return Ok(Pick { id, weighted: true });
                }
            }
        }
        self.fallback.next(rng)
    }

    fn report_feedback(&mut self, id: InputId, score: &ProgScore, is_solution: bool) {
        self.fallback.report_feedback(id, score, is_solution);
    }

    fn forget(&mut self, id: &InputId) {
        self.fallback.forget(id);
    }
}
