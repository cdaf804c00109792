use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Total assigned to inputs that have not been scored, or when scoring is off.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// The priority of one input after one execution, with its per-dimension parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgScore {
    pub total: f64,
    pub coverage: f64,
    pub rarity: f64,
    pub log: f64,
    pub time_anomaly: f64,
    /// Coverage elements this execution was the first to reach.
    pub new_elements: usize,
    /// `None` for the neutral placeholder, which was never computed.
    pub computed_at: Option<SystemTime>,
}

impl ProgScore {
    pub fn neutral() -> Self {
        ProgScore {
            total: NEUTRAL_SCORE,
            coverage: 0.0,
            rarity: 0.0,
            log: 0.0,
            time_anomaly: 0.0,
            new_elements: 0,
            computed_at: None,
        }
    }

    pub fn is_computed(&self) -> bool {
        self.computed_at.is_some()
    }
}

impl Default for ProgScore {
    fn default() -> Self {
        Self::neutral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_score_is_midpoint_and_uncomputed() {
        let score = ProgScore::neutral();
        assert_eq!(score.total, 0.5);
        assert_eq!(score.coverage, 0.0);
        assert!(!score.is_computed());
        assert_eq!(score, ProgScore::default());
    }

    #[test]
    fn serializes_dimension_fields() {
        let json = serde_json::to_value(ProgScore::neutral()).unwrap();
        assert_eq!(json["total"], 0.5);
        assert_eq!(json["time_anomaly"], 0.0);
        assert!(json["computed_at"].is_null());
    }
}
