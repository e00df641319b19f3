use rate_core::{RateError, RateHistory};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// JSON file persistence for [`RateHistory`].
///
/// Writes go to a sibling temp file which is fsynced and renamed over the
/// target, so a crash leaves either the old document or the new one.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored history, or a fresh one if no document exists yet.
    pub fn load(&self) -> Result<RateHistory, RateError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    "No existing rate history at {}, starting fresh",
                    self.path.display()
                );
                return Ok(RateHistory::default());
            }
            Err(e) => {
                return Err(RateError::Persistence(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let history: RateHistory = serde_json::from_str(&raw).map_err(|e| {
            RateError::CorruptState(format!("{}: {}", self.path.display(), e))
        })?;
        history.validate().map_err(|e| match e {
            RateError::CorruptState(msg) => {
                RateError::CorruptState(format!("{}: {}", self.path.display(), msg))
            }
            other => other,
        })?;

        tracing::debug!("Loaded rate history from {}", self.path.display());
        Ok(history)
    }

    pub fn save(&self, history: &RateHistory) -> Result<(), RateError> {
        let persist_err =
            |e: std::io::Error| RateError::Persistence(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }

        let json = serde_json::to_string_pretty(history)
            .map_err(|e| RateError::Persistence(format!("Failed to serialize history: {}", e)))?;

        let tmp = self.temp_path();
        {
            let mut file = fs::File::create(&tmp).map_err(persist_err)?;
            file.write_all(json.as_bytes()).map_err(persist_err)?;
            file.write_all(b"\n").map_err(persist_err)?;
            file.sync_all().map_err(persist_err)?;
        }
        fs::rename(&tmp, &self.path).map_err(persist_err)?;

        tracing::info!("Saved rate history to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rate_state.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_history() -> RateHistory {
        RateHistory {
            last_checked_rate: Some(6.3),
            last_check_time: Some(Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 5).unwrap()),
            last_alerted_rate: Some(6.125),
            last_alert_time: Some(Utc.with_ymd_and_hms(2026, 9, 28, 8, 0, 4).unwrap()),
            alert_count: 3,
        }
    }

    #[test]
    fn test_missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("state.json"));

        assert_eq!(store.load().unwrap(), RateHistory::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("state.json"));
        let history = sample_history();

        store.save(&history).unwrap();
        assert_eq!(store.load().unwrap(), history);
    }

    #[test]
    fn test_round_trip_preserves_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("state.json"));
        let history = RateHistory {
            last_checked_rate: Some(6.75),
            last_check_time: Some(Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 5).unwrap()),
            ..RateHistory::default()
        };

        store.save(&history).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, history);
        assert!(loaded.last_alerted_rate.is_none());

        store.save(&loaded).unwrap();
        assert_eq!(store.load().unwrap(), history);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("state.json");
        let store = HistoryStore::new(&path);

        store.save(&sample_history()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("state.json"));

        store.save(&sample_history()).unwrap();
        store.save(&RateHistory::default()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["state.json".to_string()]);
        assert_eq!(store.load().unwrap(), RateHistory::default());
    }

    #[test]
    fn test_text_alert_count_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"alert_count": "three"}"#).unwrap();

        let err = HistoryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, RateError::CorruptState(_)));
    }

    #[test]
    fn test_negative_alert_count_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"alert_count": -2}"#).unwrap();

        assert!(matches!(
            HistoryStore::new(&path).load(),
            Err(RateError::CorruptState(_))
        ));
    }

    #[test]
    fn test_unparseable_document_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            HistoryStore::new(&path).load(),
            Err(RateError::CorruptState(_))
        ));
    }

    #[test]
    fn test_contradictory_document_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"last_checked_rate": 6.2, "last_check_time": "2026-10-01T08:00:05Z",
                "last_alerted_rate": 6.2, "last_alert_time": "2026-10-01T08:00:05Z",
                "alert_count": 0}"#,
        )
        .unwrap();

        let err = HistoryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, RateError::CorruptState(ref m) if m.contains("alert_count")));
    }

    #[test]
    fn test_document_from_earlier_version_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{
  "last_checked_rate": 6.25,
  "last_alerted_rate": 6.25,
  "last_alert_time": "2025-04-02T07:00:01.532100",
  "last_check_time": "2025-04-02T07:00:00.981200",
  "alert_count": 1
}"#,
        )
        .unwrap();

        let history = HistoryStore::new(&path).load().unwrap();
        assert_eq!(history.alert_count, 1);
        assert_eq!(
            history.last_alert_time,
            Some(Utc.with_ymd_and_hms(2025, 4, 2, 7, 0, 1).unwrap())
        );
    }
}
