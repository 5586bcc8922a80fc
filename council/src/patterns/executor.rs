//! The execution seam: how patterns talk to model backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One model's answer to one prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: String,
    pub output: String,
    #[serde(default)]
    pub duration: Duration,
    #[serde(default)]
    pub tokens: u64,
    #[serde(default)]
    pub cost: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Self-reported confidence in [0, 1], if the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ModelResponse {
    pub fn success(model: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            output: output.into(),
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Error text, or a generic message for an unsuccessful response
    /// without one.
    pub fn failure_reason(&self) -> &str {
        self.error.as_deref().unwrap_or("model reported failure")
    }
}

/// Executes prompts against named models.
///
/// Backend errors are opaque to the patterns, so the seam uses `anyhow`.
/// An `Ok` response with `success == false` is also a failure.
#[async_trait]
pub trait ModelExecutor: Send + Sync {
    async fn execute(&self, model: &str, prompt: &str) -> anyhow::Result<ModelResponse>;
}

/// Shared handle to a [`ModelExecutor`].
pub type SharedExecutor = Arc<dyn ModelExecutor>;

/// Receives every per-call outcome a pattern produces.
pub trait ExecutionObserver: Send + Sync {
    /// Called once per model call. `role` is the chain step's role, or
    /// `"ensemble"` for ensemble participants.
    fn observe(&self, role: &str, response: &ModelResponse);
}

/// Shared handle to an [`ExecutionObserver`].
pub type SharedObserver = Arc<dyn ExecutionObserver>;
