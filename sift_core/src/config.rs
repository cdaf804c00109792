use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Tolerance when checking that the four weights sum to one.
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid scoring configuration: {0}")]
    InvalidConfig(String),
}

/// A log pattern added on top of the built-in severity table.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExtraLogPattern {
    pub regex: String,
    pub score: f64,
    pub category: String,
}

/// Weights and limits for the scoring engine.
///
/// Replaced as a whole, never edited in place once a tracker holds it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScoreConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_coverage_weight")]
    pub coverage_weight: f64,
    #[serde(default = "default_rarity_weight")]
    pub rarity_weight: f64,
    #[serde(default = "default_kernel_log_weight")]
    pub kernel_log_weight: f64,
    #[serde(default = "default_time_anomaly_weight")]
    pub time_anomaly_weight: f64,
    #[serde(default = "default_max_score_cache")]
    pub max_score_cache: usize,
    #[serde(default = "default_time_window_size")]
    pub time_window_size: usize,
    /// Chance that the next pick comes from the weighted selector instead of
    /// the default strategy.
    #[serde(default = "default_weighted_select_prob")]
    pub weighted_select_prob: f64,
    #[serde(default)]
    pub extra_patterns: Vec<ExtraLogPattern>,
}

fn default_enabled() -> bool {
    true
}
fn default_coverage_weight() -> f64 {
    0.4
}
fn default_rarity_weight() -> f64 {
    0.3
}
fn default_kernel_log_weight() -> f64 {
    0.2
}
fn default_time_anomaly_weight() -> f64 {
    0.1
}
pub fn default_max_score_cache() -> usize {
    10_000
}
pub fn default_time_window_size() -> usize {
    10_000
}
pub fn default_weighted_select_prob() -> f64 {
    0.3
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            coverage_weight: default_coverage_weight(),
            rarity_weight: default_rarity_weight(),
            kernel_log_weight: default_kernel_log_weight(),
            time_anomaly_weight: default_time_anomaly_weight(),
            max_score_cache: default_max_score_cache(),
            time_window_size: default_time_window_size(),
            weighted_select_prob: default_weighted_select_prob(),
            extra_patterns: Vec::new(),
        }
    }
}

impl ScoreConfig {
    /// A configuration with scoring switched off; every score is neutral.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn weights(&self) -> [f64; 4] {
        [
            self.coverage_weight,
            self.rarity_weight,
            self.kernel_log_weight,
            self.time_anomaly_weight,
        ]
    }

    /// Checks the configuration before it is handed to a tracker.
    ///
    /// Trackers trust their configuration and do not re-check it per call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            "coverage_weight",
            "rarity_weight",
            "kernel_log_weight",
            "time_anomaly_weight",
        ];
        for (name, weight) in names.iter().zip(self.weights()) {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {weight}"
                )));
            }
        }
        let sum: f64 = self.weights().iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(ConfigError::InvalidConfig(format!(
                "weights must sum to 1.0, got {sum}"
            )));
        }
        if !(0.0..=1.0).contains(&self.weighted_select_prob) {
            return Err(ConfigError::InvalidConfig(format!(
                "weighted_select_prob must be within [0, 1], got {}",
                self.weighted_select_prob
            )));
        }
        if self.max_score_cache == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_score_cache must be positive".to_string(),
            ));
        }
        if self.time_window_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "time_window_size must be positive".to_string(),
            ));
        }
        for pattern in &self.extra_patterns {
            if !(0.0..=1.0).contains(&pattern.score) {
                return Err(ConfigError::InvalidConfig(format!(
                    "score for log pattern {:?} must be within [0, 1], got {}",
                    pattern.regex, pattern.score
                )));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SiftConfig {
    #[serde(default)]
    pub scoring: ScoreConfig,
}

impl SiftConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: SiftConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        config
            .scoring
            .validate()
            .map_err(|e| anyhow::anyhow!("Rejected config file {:?}: {}", path, e))?;

        Ok(config)
    }
}
