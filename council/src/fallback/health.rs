//! Provider health probing.
//!
//! The production probe issues a `HEAD` against each provider's public API
//! endpoint. Unauthenticated requests are expected to fail auth; a 401/403
//! still proves the API is reachable.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::circuit_breaker::CircuitState;

/// Health probing errors.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// What a single probe observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Available,
    RateLimited,
    Unavailable,
}

/// A probe result with its round-trip time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub response_time: Duration,
}

/// Snapshot of a provider's health after a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub available: bool,
    pub last_checked: DateTime<Utc>,
    pub response_time_ms: u64,
    pub failure_count: u32,
    pub circuit_state: CircuitState,
    pub rate_limit_hits: u32,
}

/// Checks whether a provider's API is reachable.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, provider: &str) -> Result<ProbeOutcome, HealthError>;
}

/// Well-known health endpoints per provider family.
pub fn default_endpoints() -> BTreeMap<String, String> {
    [
        ("anthropic", "https://api.anthropic.com/v1/messages"),
        ("openai", "https://api.openai.com/v1/models"),
        ("google", "https://generativelanguage.googleapis.com/v1/models"),
        ("xai", "https://api.x.ai/v1/models"),
    ]
    .into_iter()
    .map(|(p, url)| (p.to_string(), url.to_string()))
    .collect()
}

/// Map an HTTP status code to a probe status.
pub fn classify_status(status: u16) -> ProbeStatus {
    match status {
        200 | 401 | 403 => ProbeStatus::Available,
        429 => ProbeStatus::RateLimited,
        _ => ProbeStatus::Unavailable,
    }
}

/// `HEAD`-request probe over reqwest.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    endpoints: BTreeMap<String, String>,
}

impl HttpHealthProbe {
    /// Probe with the default endpoints and the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, HealthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HealthError::Client(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoints: default_endpoints(),
        })
    }

    /// Add or replace the endpoint for `provider`.
    pub fn with_endpoint(mut self, provider: &str, url: &str) -> Self {
        self.endpoints.insert(provider.to_string(), url.to_string());
        self
    }

    pub fn endpoints(&self) -> &BTreeMap<String, String> {
        &self.endpoints
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, provider: &str) -> Result<ProbeOutcome, HealthError> {
        let endpoint = self
            .endpoints
            .get(provider)
            .ok_or_else(|| HealthError::UnknownProvider(provider.to_string()))?;

        let start = Instant::now();
        let status = match self.client.head(endpoint).send().await {
            Ok(resp) => classify_status(resp.status().as_u16()),
            Err(e) => {
                tracing::warn!("Health probe for {} failed: {}", provider, e);
                ProbeStatus::Unavailable
            }
        };

        Ok(ProbeOutcome {
            status,
            response_time: start.elapsed(),
        })
    }
}
