use notification_service::{NotificationConfig, SmtpTls};
use rate_core::RateError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_DEPLOYMENT: &str = "development";

/// One deployment profile from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Alert when the observed rate drops strictly below this percentage.
    pub threshold: f64,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    pub smtp: SmtpConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub term: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: rate_scraper::DEFAULT_URL.to_string(),
            term: rate_scraper::DEFAULT_TERM.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
    /// Run a single cycle and exit (cron-style deployments).
    pub run_once: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            run_once: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address; defaults to `username`.
    #[serde(default)]
    pub from: Option<String>,
    /// STARTTLS on a plain connection.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Implicit TLS from the first byte.
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(alias = "to")]
    pub recipients: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/tmp/mortgage_rate_state.json")
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_smtp_timeout() -> u64 {
    30
}

fn default_subject() -> String {
    "Mortgage Rate Alert".to_string()
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    profiles: HashMap<String, serde_yaml::Value>,
}

impl MonitorConfig {
    /// Read the YAML file and pick the profile named by `DEPLOYMENT`.
    pub fn load() -> Result<Self, RateError> {
        let path = env::var("MONITOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let deployment =
            env::var("DEPLOYMENT").unwrap_or_else(|_| DEFAULT_DEPLOYMENT.to_string());

        let mut config = Self::from_file(Path::new(&path), &deployment)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path, deployment: &str) -> Result<Self, RateError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RateError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw, deployment)
    }

    pub fn from_yaml(raw: &str, deployment: &str) -> Result<Self, RateError> {
        let file: ConfigFile = serde_yaml::from_str(raw)
            .map_err(|e| RateError::Config(format!("Invalid config YAML: {}", e)))?;

        let profile = file.profiles.get(deployment).cloned().ok_or_else(|| {
            let mut known: Vec<_> = file.profiles.keys().cloned().collect();
            known.sort();
            RateError::Config(format!(
                "Profile {:?} not found (available: {})",
                deployment,
                known.join(", ")
            ))
        })?;

        serde_yaml::from_value(profile)
            .map_err(|e| RateError::Config(format!("Invalid profile {:?}: {}", deployment, e)))
    }

    /// Secrets and paths that commonly live in `.env` rather than the YAML file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = env::var("SMTP_USERNAME") {
            self.smtp.username = username;
        }
        if let Ok(password) = env::var("SMTP_PASSWORD") {
            self.smtp.password = password;
        }
        if let Ok(state_file) = env::var("RATE_STATE_FILE") {
            self.state_file = PathBuf::from(state_file);
        }
    }

    pub fn validate(&self) -> Result<(), RateError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(RateError::Config(format!(
                "threshold must be a positive percentage, got {}",
                self.threshold
            )));
        }
        if self.source.term.trim().is_empty() {
            return Err(RateError::Config("source.term must not be empty".into()));
        }
        if !(self.source.url.starts_with("http://") || self.source.url.starts_with("https://")) {
            return Err(RateError::Config(format!(
                "source.url must be an http(s) URL, got {:?}",
                self.source.url
            )));
        }
        if self.source.timeout_secs == 0 || self.smtp.timeout_secs == 0 {
            return Err(RateError::Config("timeouts must be at least 1 second".into()));
        }
        if self.poll.interval_secs == 0 {
            return Err(RateError::Config("poll.interval_secs must be positive".into()));
        }
        if self.smtp.host.trim().is_empty() {
            return Err(RateError::Config("smtp.host must not be empty".into()));
        }
        if self.smtp.username.trim().is_empty() || self.smtp.password.is_empty() {
            return Err(RateError::Config(
                "smtp.username and smtp.password are required (or set SMTP_USERNAME/SMTP_PASSWORD)"
                    .into(),
            ));
        }
        if self.smtp.use_tls && self.smtp.use_ssl {
            return Err(RateError::Config(
                "smtp.use_tls (STARTTLS) and smtp.use_ssl (implicit TLS) are mutually exclusive"
                    .into(),
            ));
        }
        if self.email.recipients.is_empty() {
            return Err(RateError::Config("email.to must list at least one recipient".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.source.timeout_secs)
    }

    pub fn notification_config(&self) -> NotificationConfig {
        let smtp_tls = if self.smtp.use_ssl {
            SmtpTls::Tls
        } else if self.smtp.use_tls {
            SmtpTls::StartTls
        } else {
            SmtpTls::None
        };

        NotificationConfig {
            smtp_host: self.smtp.host.clone(),
            smtp_port: self.smtp.port,
            smtp_username: Some(self.smtp.username.clone()),
            smtp_password: Some(self.smtp.password.clone()),
            smtp_from: self
                .smtp
                .from
                .clone()
                .unwrap_or_else(|| self.smtp.username.clone()),
            smtp_to: self.email.recipients.clone(),
            smtp_tls,
            smtp_timeout: Duration::from_secs(self.smtp.timeout_secs),
        }
    }
}
