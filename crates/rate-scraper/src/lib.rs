mod html;

pub use html::{extract_rate, RATES_TABLE_CLASS, RATE_ROW_CLASS};

use async_trait::async_trait;
use rate_core::{RateError, RateSnapshot, RateSource};
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_URL: &str = "https://www.onpointcu.com/home-loans/";
pub const DEFAULT_TERM: &str = "30 year fixed rate";

const USER_AGENT: &str = concat!("mortgage-rate-monitor/", env!("CARGO_PKG_VERSION"));

/// Scrapes one term's rate from one page.
#[derive(Clone)]
pub struct RateScraper {
    client: Client,
    url: String,
    term: String,
}

impl RateScraper {
    pub fn new(
        url: impl Into<String>,
        term: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RateError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RateError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            term: term.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// GET the rates page; non-2xx responses are errors.
    pub async fn fetch(&self) -> Result<String, RateError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RateError::Fetch(format!("GET {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateError::Fetch(format!("GET {}: HTTP {}", self.url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RateError::Fetch(format!("Reading body from {}: {}", self.url, e)))?;
        tracing::debug!("Fetched {} bytes from {}", body.len(), self.url);
        Ok(body)
    }
}

#[async_trait]
impl RateSource for RateScraper {
    async fn current_rate(&self) -> Result<RateSnapshot, RateError> {
        let html = self.fetch().await?;
        let rate = extract_rate(&html, &self.term)?;
        Ok(RateSnapshot::new(rate, &self.term, &self.url))
    }
}
