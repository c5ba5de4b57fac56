//! HTTP client for the external forecasting/pricing engine.

use crate::config::AnalyticsConfig;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("analytics request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("analytics engine returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Clone)]
pub struct AnalyticsClient {
    client: Client,
    base_url: String,
    pricing_units: u32,
    pricing_months: u32,
}

impl AnalyticsClient {
    pub fn new(config: &AnalyticsConfig) -> Result<Self, AnalyticsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            pricing_units: config.pricing_units,
            pricing_months: config.pricing_months,
        })
    }

    /// `GET /forecast?csv_url=<url>`
    pub async fn forecast(&self, csv_url: &str) -> Result<Value, AnalyticsError> {
        self.get("forecast", &[("csv_url", csv_url.to_string())])
            .await
    }

    /// `GET /pricing?csv_url=<url>&units=<n>&month=<n>`
    pub async fn pricing(&self, csv_url: &str) -> Result<Value, AnalyticsError> {
        self.get(
            "pricing",
            &[
                ("csv_url", csv_url.to_string()),
                ("units", self.pricing_units.to_string()),
                ("month", self.pricing_months.to_string()),
            ],
        )
        .await
    }

    async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, AnalyticsError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyticsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}
