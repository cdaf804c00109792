pub mod campaign;
pub mod config;
pub mod engine;
pub mod input;
pub mod log_matcher;
pub mod metrics;
pub mod outcome;
pub mod scheduler;
pub mod score;
pub mod selector;
pub mod signal;
pub mod time_stats;
pub mod tracker;

pub use campaign::{Campaign, MutationStrategy};
pub use config::{ConfigError, ExtraLogPattern, ScoreConfig, SiftConfig};
pub use engine::{EngineError, ScoringEngine};
pub use input::{Input, InputId};
pub use log_matcher::{LogMatcherError, LogPatternMatcher, extract_log_lines};
pub use metrics::{MetricsSnapshot, ScoreMetrics};
pub use outcome::ExecutionOutcome;
pub use scheduler::{Pick, RandomScheduler, Scheduler, SchedulerError, WeightedScheduler};
pub use score::{NEUTRAL_SCORE, ProgScore};
pub use selector::WeightedSelector;
pub use signal::{Signal, SignalSignature};
pub use time_stats::{TimeSnapshot, TimeStatistics};
pub use tracker::ScoreTracker;
