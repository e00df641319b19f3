mod smtp;
mod templates;

pub use smtp::SmtpNotifier;
pub use templates::EmailTemplate;

use async_trait::async_trait;
use rate_core::{AlertSink, RateError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A notification alert to be dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// SMTP settings for the email channel.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub smtp_to: Vec<String>,
    pub smtp_tls: SmtpTls,
    pub smtp_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

/// Dispatches alerts to every configured channel.
pub struct NotificationService {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl NotificationService {
    /// Build the service with an SMTP channel from `config`.
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let notifier = SmtpNotifier::new(config)?;
        tracing::info!(
            "Email notifications enabled (SMTP {}:{} -> {} recipients)",
            config.smtp_host,
            config.smtp_port,
            config.smtp_to.len()
        );
        Ok(Self::from_channels(vec![Box::new(notifier)]))
    }

    pub fn from_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send to all channels, awaiting completion. Fails if any channel failed.
    pub async fn dispatch(&self, alert: &Alert) -> Result<(), NotificationError> {
        if self.channels.is_empty() {
            return Err(NotificationError::Config(
                "No notification channels configured".into(),
            ));
        }

        let mut failures = Vec::new();
        for channel in &self.channels {
            match channel.send(alert).await {
                Ok(()) => tracing::info!("Sent \"{}\" via {}", alert.title, channel.name()),
                Err(e) => {
                    tracing::warn!("Failed to send notification via {}: {}", channel.name(), e);
                    failures.push(format!("{}: {}", channel.name(), e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::Smtp(failures.join("; ")))
        }
    }
}

#[async_trait]
impl AlertSink for NotificationService {
    async fn send_alert(&self, subject: &str, body: &str) -> Result<(), RateError> {
        self.dispatch(&Alert::new(subject, body))
            .await
            .map_err(|e| RateError::Delivery(e.to_string()))
    }
}
