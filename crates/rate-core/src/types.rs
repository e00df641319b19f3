use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::RateError;

/// Current time truncated to whole seconds, the precision the state file keeps.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// A single observed rate for the monitored term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Percentage, e.g. `6.125` for 6.125%.
    pub rate: f64,
    pub term: String,
    pub source: String,
    pub observed_at: DateTime<Utc>,
}

impl RateSnapshot {
    pub fn new(rate: f64, term: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            rate,
            term: term.into(),
            source: source.into(),
            observed_at: timestamp_now(),
        }
    }
}

/// Persisted check/alert history for the monitored term.
///
/// Field names are part of the on-disk format. Unknown fields are ignored and
/// missing fields fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateHistory {
    pub last_checked_rate: Option<f64>,
    #[serde(with = "timestamp")]
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_alerted_rate: Option<f64>,
    #[serde(with = "timestamp")]
    pub last_alert_time: Option<DateTime<Utc>>,
    pub alert_count: u64,
}

impl RateHistory {
    pub fn has_checked(&self) -> bool {
        self.last_check_time.is_some()
    }

    pub fn has_alerted(&self) -> bool {
        self.last_alerted_rate.is_some()
    }

    /// Check the cross-field invariants a well-formed history must satisfy.
    pub fn validate(&self) -> Result<(), RateError> {
        if self.last_checked_rate.is_some() != self.last_check_time.is_some() {
            return Err(RateError::CorruptState(
                "last_checked_rate and last_check_time must be set together".to_string(),
            ));
        }
        if self.last_alerted_rate.is_some() != self.last_alert_time.is_some() {
            return Err(RateError::CorruptState(
                "last_alerted_rate and last_alert_time must be set together".to_string(),
            ));
        }
        if (self.alert_count == 0) != self.last_alerted_rate.is_none() {
            return Err(RateError::CorruptState(format!(
                "alert_count {} disagrees with last_alerted_rate {:?}",
                self.alert_count, self.last_alerted_rate
            )));
        }
        if self.has_alerted() && !self.has_checked() {
            return Err(RateError::CorruptState(
                "alert recorded without any rate check".to_string(),
            ));
        }
        for (name, rate) in [
            ("last_checked_rate", self.last_checked_rate),
            ("last_alerted_rate", self.last_alerted_rate),
        ] {
            if let Some(r) = rate {
                if !r.is_finite() || r < 0.0 {
                    return Err(RateError::CorruptState(format!(
                        "{} must be a non-negative percentage, got {}",
                        name, r
                    )));
                }
            }
        }
        Ok(())
    }
}

/// RFC 3339 timestamps at second precision.
///
/// Deserialization also accepts naive ISO-8601 values (no offset, optional
/// fractional seconds), which are read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        parse(&raw)
            .map(|ts| Some(ts.trunc_subsecs(0)))
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw:?}")))
    }

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}
