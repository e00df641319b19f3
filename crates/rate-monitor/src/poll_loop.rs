use rate_core::{AlertDecision, AlertSink, RateError, RateSnapshot, RateSource};
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

use crate::tracker::Tracker;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub threshold: f64,
    pub interval: Duration,
    pub subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    NoAlert,
    Alerted,
}

/// Drives fetch -> decide -> notify -> record, one cycle at a time.
pub struct PollLoop<S, N> {
    source: S,
    notifier: N,
    tracker: Tracker,
    settings: PollSettings,
    cycles: u64,
    alerts_sent: u64,
}

impl<S: RateSource, N: AlertSink> PollLoop<S, N> {
    pub fn new(source: S, notifier: N, tracker: Tracker, settings: PollSettings) -> Self {
        Self {
            source,
            notifier,
            tracker,
            settings,
            cycles: 0,
            alerts_sent: 0,
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// One poll. The check is recorded whenever a rate was obtained; the alert
    /// is recorded only if delivery succeeded.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, RateError> {
        let threshold = self.settings.threshold;
        let snapshot = self.source.current_rate().await?;
        tracing::info!("{}: {}%", snapshot.term, snapshot.rate);

        self.tracker.record_check(snapshot.rate)?;

        let decision = self.tracker.decide(snapshot.rate, threshold);
        tracing::info!("{}", decision.describe(snapshot.rate, threshold));
        if !decision.should_alert() {
            return Ok(CycleOutcome::NoAlert);
        }

        let body = self.alert_body(&snapshot, &decision);
        self.notifier
            .send_alert(&self.settings.subject, &body)
            .await
            .map_err(|e| match e {
                RateError::Delivery(msg) => RateError::Delivery(format!(
                    "alert for {}% (threshold {}%) not sent, history left unchanged: {}",
                    snapshot.rate, threshold, msg
                )),
                other => other,
            })?;

        self.tracker.record_alert(snapshot.rate)?;
        self.alerts_sent += 1;
        Ok(CycleOutcome::Alerted)
    }

    /// Poll until `shutdown` flips to `true`.
    ///
    /// Shutdown is only observed between cycles; the interval is measured
    /// from the end of each cycle.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Tracker {
        tracing::info!(
            "Polling every {}s (threshold {}%)",
            self.settings.interval.as_secs(),
            self.settings.threshold
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.cycles += 1;
            let span = tracing::info_span!("poll_cycle", cycle = self.cycles);
            match self.run_cycle().instrument(span).await {
                Ok(outcome) => tracing::debug!("Cycle #{} finished: {:?}", self.cycles, outcome),
                Err(e) => self.log_cycle_error(&e),
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        tracing::info!(
            "Poll loop stopped after {} cycles ({} alerts sent)",
            self.cycles,
            self.alerts_sent
        );
        self.tracker
    }

    fn alert_body(&self, snapshot: &RateSnapshot, decision: &AlertDecision) -> String {
        let mut body = format!(
            "{} is now {}%, which is below your threshold of {}%. It's time to refinance!",
            snapshot.term, snapshot.rate, self.settings.threshold
        );
        if let AlertDecision::Improved { previous } = decision {
            body.push_str(&format!("\nThat is down from {}% at the last alert.", previous));
        }
        body.push_str(&format!("\n\nSource: {}\n\n{}", snapshot.source, self.tracker.summary()));
        body
    }

    fn log_cycle_error(&self, error: &RateError) {
        let threshold = self.settings.threshold;
        match error {
            RateError::Fetch(_) => {
                tracing::warn!(threshold, "Cycle #{} skipped: {}", self.cycles, error)
            }
            RateError::Delivery(_) => {
                tracing::warn!(threshold, "Cycle #{}: {}", self.cycles, error)
            }
            _ => tracing::error!(threshold, "Cycle #{} failed: {}", self.cycles, error),
        }
    }
}

/// Resolves once the flag is `true`; never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history_store::HistoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const TERM: &str = "30 year fixed rate";

    /// Returns scripted results; optionally requests shutdown while serving a call.
    struct ScriptedSource {
        results: Mutex<VecDeque<Result<f64, RateError>>>,
        calls: Arc<Mutex<usize>>,
        stop_on_call: Option<(usize, watch::Sender<bool>)>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<f64, RateError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: Arc::new(Mutex::new(0)),
                stop_on_call: None,
            }
        }
    }

    #[async_trait]
    impl RateSource for ScriptedSource {
        async fn current_rate(&self) -> Result<RateSnapshot, RateError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if let Some((n, tx)) = &self.stop_on_call {
                if call == *n {
                    tx.send(true).unwrap();
                }
            }
            let next = self
                .results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RateError::Fetch("script exhausted".into())));
            next.map(|rate| RateSnapshot::new(rate, TERM, "https://example.com/home-loans/"))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        failures: Arc<Mutex<VecDeque<bool>>>,
    }

    impl RecordingSink {
        fn failing_first(n: usize) -> Self {
            let sink = Self::default();
            sink.failures.lock().unwrap().extend(std::iter::repeat(true).take(n));
            sink
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send_alert(&self, subject: &str, body: &str) -> Result<(), RateError> {
            if self.failures.lock().unwrap().pop_front().unwrap_or(false) {
                return Err(RateError::Delivery("connection reset".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            threshold: 6.5,
            interval: Duration::from_millis(1),
            subject: "Mortgage Rate Alert".to_string(),
        }
    }

    fn poller(
        dir: &tempfile::TempDir,
        results: Vec<Result<f64, RateError>>,
        sink: RecordingSink,
    ) -> PollLoop<ScriptedSource, RecordingSink> {
        let tracker = Tracker::load(HistoryStore::new(dir.path().join("state.json"))).unwrap();
        PollLoop::new(ScriptedSource::new(results), sink, tracker, settings())
    }

    fn stored(dir: &tempfile::TempDir) -> rate_core::RateHistory {
        HistoryStore::new(dir.path().join("state.json")).load().unwrap()
    }

    #[tokio::test]
    async fn test_first_qualifying_rate_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        let mut poll = poller(&dir, vec![Ok(6.25)], sink.clone());

        assert_eq!(poll.run_cycle().await.unwrap(), CycleOutcome::Alerted);

        let h = stored(&dir);
        assert_eq!(h.alert_count, 1);
        assert_eq!(h.last_alerted_rate, Some(6.25));
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "Mortgage Rate Alert");
        assert!(sent[0].1.starts_with(
            "30 year fixed rate is now 6.25%, which is below your threshold of 6.5%."
        ));
    }

    #[tokio::test]
    async fn test_no_realert_without_improvement_then_realert_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        let mut poll = poller(&dir, vec![Ok(6.25), Ok(6.30), Ok(6.25), Ok(6.10)], sink.clone());

        assert_eq!(poll.run_cycle().await.unwrap(), CycleOutcome::Alerted);
        assert_eq!(poll.run_cycle().await.unwrap(), CycleOutcome::NoAlert);
        assert_eq!(stored(&dir).last_checked_rate, Some(6.30));
        assert_eq!(poll.run_cycle().await.unwrap(), CycleOutcome::NoAlert);
        assert_eq!(poll.run_cycle().await.unwrap(), CycleOutcome::Alerted);

        let h = stored(&dir);
        assert_eq!(h.alert_count, 2);
        assert_eq!(h.last_alerted_rate, Some(6.10));
        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].1.contains("down from 6.25%"));
        assert!(sent[1].1.contains("Last alerted rate: 6.25%"));
    }

    #[tokio::test]
    async fn test_above_threshold_records_check_only() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        let mut poll = poller(&dir, vec![Ok(6.75)], sink.clone());

        assert_eq!(poll.run_cycle().await.unwrap(), CycleOutcome::NoAlert);

        let h = stored(&dir);
        assert_eq!(h.last_checked_rate, Some(6.75));
        assert_eq!(h.alert_count, 0);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_leaves_alert_unrecorded() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::failing_first(1);
        let mut poll = poller(&dir, vec![Ok(6.25), Ok(6.25)], sink.clone());

        let err = poll.run_cycle().await.unwrap_err();
        assert!(matches!(err, RateError::Delivery(ref m) if m.contains("6.25%")));
        let h = stored(&dir);
        assert_eq!(h.last_checked_rate, Some(6.25));
        assert_eq!(h.alert_count, 0);
        assert!(h.last_alerted_rate.is_none());

        // Same rate next cycle: the engine decides identically and retries.
        assert_eq!(poll.run_cycle().await.unwrap(), CycleOutcome::Alerted);
        assert_eq!(stored(&dir).alert_count, 1);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_and_extraction_errors_skip_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut poll = poller(
            &dir,
            vec![
                Err(RateError::Fetch("timed out".into())),
                Err(RateError::Extraction("Rates table not found in the HTML".into())),
            ],
            RecordingSink::default(),
        );

        assert!(matches!(poll.run_cycle().await, Err(RateError::Fetch(_))));
        assert!(matches!(poll.run_cycle().await, Err(RateError::Extraction(_))));
        assert!(!poll.tracker().history().has_checked());
        assert!(!dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn test_run_survives_errors_and_stops_between_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);
        let sink = RecordingSink::default();

        let mut source = ScriptedSource::new(vec![
            Err(RateError::Fetch("connection reset".into())),
            Err(RateError::Extraction("layout changed".into())),
            Ok(6.25),
            Ok(6.00),
        ]);
        let calls = Arc::clone(&source.calls);
        // Shutdown arrives while the third cycle is in flight.
        source.stop_on_call = Some((3, tx));

        let tracker = Tracker::load(HistoryStore::new(dir.path().join("state.json"))).unwrap();
        let poll = PollLoop::new(source, sink.clone(), tracker, settings());

        let tracker = tokio::time::timeout(Duration::from_secs(5), poll.run(rx))
            .await
            .expect("poll loop did not stop");

        assert_eq!(*calls.lock().unwrap(), 3);
        // The in-flight cycle completed before stopping.
        assert_eq!(tracker.history().alert_count, 1);
        assert_eq!(stored(&dir).last_alerted_rate, Some(6.25));
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_run_exits_immediately_when_already_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let source = ScriptedSource::new(vec![Ok(6.0)]);
        let calls = Arc::clone(&source.calls);
        let tracker = Tracker::load(HistoryStore::new(dir.path().join("state.json"))).unwrap();

        PollLoop::new(source, RecordingSink::default(), tracker, settings())
            .run(rx)
            .await;
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
