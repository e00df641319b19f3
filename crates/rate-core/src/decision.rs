use serde::{Deserialize, Serialize};

use crate::RateHistory;

/// Outcome of comparing an observed rate against the threshold and the last alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AlertDecision {
    /// Rate is at or above the threshold.
    AboveThreshold,
    /// Below the threshold and no alert has ever been sent.
    FirstBelowThreshold,
    /// Below the threshold and strictly lower than the last alerted rate.
    Improved { previous: f64 },
    /// Below the threshold but not lower than the last alerted rate.
    NotImproved { previous: f64 },
}

impl AlertDecision {
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            AlertDecision::FirstBelowThreshold | AlertDecision::Improved { .. }
        )
    }

    pub fn describe(&self, current_rate: f64, threshold: f64) -> String {
        match self {
            AlertDecision::AboveThreshold => format!(
                "Current rate {}% is above threshold {}%, no alert needed",
                current_rate, threshold
            ),
            AlertDecision::FirstBelowThreshold => format!(
                "Rate {}% is below threshold {}% for the first time",
                current_rate, threshold
            ),
            AlertDecision::Improved { previous } => format!(
                "Rate dropped from {}% to {}%, sending alert",
                previous, current_rate
            ),
            AlertDecision::NotImproved { previous } => format!(
                "Rate {}% is below threshold but not lower than last alert ({}%), no alert needed",
                current_rate, previous
            ),
        }
    }
}

/// Classify `current_rate` against `threshold` and the alert history.
///
/// Alerts only fire for rates strictly below the threshold, and after the
/// first alert only for rates strictly below the last alerted rate.
pub fn decide(current_rate: f64, threshold: f64, history: &RateHistory) -> AlertDecision {
    if current_rate.is_nan() || current_rate >= threshold {
        return AlertDecision::AboveThreshold;
    }

    match history.last_alerted_rate {
        None => AlertDecision::FirstBelowThreshold,
        Some(previous) if current_rate < previous => AlertDecision::Improved { previous },
        Some(previous) => AlertDecision::NotImproved { previous },
    }
}

pub fn should_alert(current_rate: f64, threshold: f64, history: &RateHistory) -> bool {
    decide(current_rate, threshold, history).should_alert()
}
