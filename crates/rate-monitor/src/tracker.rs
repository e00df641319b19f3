use rate_core::{decide, timestamp_now, AlertDecision, RateError, RateHistory};

use crate::history_store::HistoryStore;

const SUMMARY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Owns the rate history for the lifetime of the process.
///
/// Every mutation is persisted before it becomes visible in memory, so the
/// in-memory copy never runs ahead of what is on disk.
pub struct Tracker {
    store: HistoryStore,
    history: RateHistory,
}

impl Tracker {
    /// Load history from `store`. A corrupt document is an error, never a reset.
    pub fn load(store: HistoryStore) -> Result<Self, RateError> {
        let history = store.load()?;
        Ok(Self { store, history })
    }

    pub fn history(&self) -> &RateHistory {
        &self.history
    }

    /// Record an observed rate. Called once per successful poll.
    pub fn record_check(&mut self, rate: f64) -> Result<(), RateError> {
        let mut next = self.history.clone();
        next.last_checked_rate = Some(rate);
        next.last_check_time = Some(timestamp_now());
        self.commit(next)?;
        tracing::debug!("Recorded rate check: {}%", rate);
        Ok(())
    }

    pub fn decide(&self, rate: f64, threshold: f64) -> AlertDecision {
        decide(rate, threshold, &self.history)
    }

    pub fn evaluate(&self, rate: f64, threshold: f64) -> bool {
        self.decide(rate, threshold).should_alert()
    }

    /// Record a delivered alert. Only call after the notification was sent.
    ///
    /// The alert is stamped with the current check time, so it never
    /// post-dates the check that triggered it.
    pub fn record_alert(&mut self, rate: f64) -> Result<(), RateError> {
        let mut next = self.history.clone();
        next.last_alerted_rate = Some(rate);
        next.last_alert_time = Some(next.last_check_time.unwrap_or_else(timestamp_now));
        next.alert_count += 1;
        if next.last_check_time.is_none() {
            next.last_checked_rate = Some(rate);
            next.last_check_time = next.last_alert_time;
        }
        self.commit(next)?;
        tracing::info!(
            "Recorded alert #{} for rate: {}%",
            self.history.alert_count,
            rate
        );
        Ok(())
    }

    pub fn summary(&self) -> String {
        let h = &self.history;
        let (Some(checked_at), Some(checked_rate)) = (h.last_check_time, h.last_checked_rate)
        else {
            return "No rate checks performed yet.".to_string();
        };

        let mut lines = vec![
            format!("Last checked: {}", checked_at.format(SUMMARY_TIME_FORMAT)),
            format!("Latest rate: {}%", checked_rate),
        ];

        match (h.last_alerted_rate, h.last_alert_time) {
            (Some(alerted_rate), Some(alerted_at)) => {
                lines.push(format!("Last alerted rate: {}%", alerted_rate));
                lines.push(format!("Last alert time: {}", alerted_at.format(SUMMARY_TIME_FORMAT)));
                lines.push(format!("Total alerts sent: {}", h.alert_count));
            }
            _ => lines.push("No alerts sent yet".to_string()),
        }

        lines.join("\n")
    }

    fn commit(&mut self, next: RateHistory) -> Result<(), RateError> {
        self.store.save(&next)?;
        self.history = next;
        Ok(())
    }
}
