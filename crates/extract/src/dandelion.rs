use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ExtractError;
use crate::schema::{parse_annotations, Annotation};
use crate::usage::{QuotaReading, UsageMeter, UsageSnapshot};
use crate::Annotator;

/// Environment variable holding the API credential.
pub const TOKEN_ENV: &str = "DAND_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DandelionConfig {
    pub endpoint: String,
    pub min_confidence: f64,
    pub request_timeout_secs: u64,
}

impl Default for DandelionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.dandelion.eu/datatxt/nex/v1".to_string(),
            min_confidence: 0.7,
            request_timeout_secs: 30,
        }
    }
}

/// Client for the Dandelion entity extraction endpoint.
pub struct DandelionClient {
    config: DandelionConfig,
    token: String,
    client: reqwest::Client,
    usage: UsageMeter,
}

#[derive(Serialize)]
struct NexQuery<'a> {
    text: &'a str,
    token: &'a str,
    min_confidence: f64,
    include: &'static str,
}

impl DandelionClient {
    pub fn new(config: DandelionConfig, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            token,
            client,
            usage: UsageMeter::new(),
        })
    }

    /// Build a client with the credential from the process environment.
    ///
    /// Running without a credential would silently find nothing, so a missing
    /// or blank token is an error.
    pub fn from_env(config: DandelionConfig) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("{} is not set; an annotation API token is required", TOKEN_ENV))?;

        Self::new(config, token)
    }

    pub fn config(&self) -> &DandelionConfig {
        &self.config
    }

    async fn request(&mut self, text: &str) -> Result<Vec<Annotation>, ExtractError> {
        let query = NexQuery {
            text,
            token: &self.token,
            min_confidence: self.config.min_confidence,
            include: "abstract",
        };

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&query)
            .send()
            .await?;

        // Quota headers come back on errors too
        let reading = QuotaReading::from_headers(response.headers());
        self.usage.record(reading);
        let snapshot = self.usage.snapshot();
        tracing::info!(
            units = snapshot.last_call_units,
            total_units = snapshot.total_units,
            units_remaining = ?snapshot.units_remaining,
            reset = ?snapshot.reset,
            "Annotation quota"
        );

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ExtractError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_annotations(&body, self.config.min_confidence)
    }
}

impl Annotator for DandelionClient {
    async fn annotate(&mut self, text: &str) -> Result<Vec<Annotation>, ExtractError> {
        self.request(text).await
    }

    fn usage(&self) -> Option<UsageSnapshot> {
        Some(self.usage.snapshot())
    }
}
