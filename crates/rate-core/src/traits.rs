use async_trait::async_trait;

use crate::{RateError, RateSnapshot};

/// Source of the currently published rate for the monitored term.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn current_rate(&self) -> Result<RateSnapshot, RateError>;
}

/// Outbound alert delivery (email, webhook, ...).
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, subject: &str, body: &str) -> Result<(), RateError>;
}
