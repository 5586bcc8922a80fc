//! Chain-of-models execution.
//!
//! Steps run strictly in order. Each successful step's (optionally
//! transformed) output becomes the next step's input; a failed step leaves
//! the input unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};

use super::executor::{ModelResponse, SharedExecutor, SharedObserver};
use super::transform::Transform;
use crate::otel;

/// Placeholder replaced by the step's input.
pub const INPUT_PLACEHOLDER: &str = "{{input}}";
/// Placeholder replaced by earlier step outputs when `pass_context` is set.
pub const CONTEXT_PLACEHOLDER: &str = "{{context}}";

/// One step in a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    pub name: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    /// Prompt template. Empty means "send the input as-is".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt: String,
    /// Output transform name: `extract_code`, `first_line`, or `trim`.
    #[serde(default, alias = "transform_output", skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

impl ChainStep {
    pub fn new(name: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = prompt.to_string();
        self
    }

    pub fn with_transform(mut self, transform: &str) -> Self {
        self.transform = Some(transform.to_string());
        self
    }

    fn build_prompt(&self, input: &str, context: Option<&str>) -> String {
        if self.prompt.is_empty() {
            return input.to_string();
        }
        self.prompt
            .replace(CONTEXT_PLACEHOLDER, context.unwrap_or(""))
            .replace(INPUT_PLACEHOLDER, input)
    }

    fn observed_role(&self) -> &str {
        if self.role.is_empty() {
            "chain"
        } else {
            &self.role
        }
    }
}

/// A sequence of steps plus execution policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub steps: Vec<ChainStep>,
    /// Make `{{context}}` available to step prompts.
    #[serde(default)]
    pub pass_context: bool,
    /// Halt at the first failed step.
    #[serde(default)]
    pub stop_on_error: bool,
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub model: String,
    pub input: String,
    pub output: String,
    pub duration: Duration,
    pub cost: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainResult {
    pub steps: Vec<StepResult>,
    pub final_output: String,
    pub total_duration: Duration,
    pub total_cost: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs a [`ChainConfig`] against a model executor.
pub struct ChainExecutor {
    executor: SharedExecutor,
    config: ChainConfig,
    observer: Option<SharedObserver>,
}

impl ChainExecutor {
    pub fn new(executor: SharedExecutor, config: ChainConfig) -> Self {
        Self {
            executor,
            config,
            observer: None,
        }
    }

    /// Report every step outcome to `observer`.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run every step against `initial_input`.
    pub async fn execute(&self, initial_input: &str) -> ChainResult {
        let span = otel::chain_span(self.config.steps.len());
        let result = self.run(initial_input).instrument(span.clone()).await;
        otel::record_chain_result(
            &span,
            result.success,
            result.total_duration.as_millis() as u64,
            result.total_cost,
        );
        result
    }

    async fn run(&self, initial_input: &str) -> ChainResult {
        let mut result = ChainResult {
            steps: Vec::with_capacity(self.config.steps.len()),
            ..Default::default()
        };
        let mut current = initial_input.to_string();
        let mut transcript: Vec<String> = Vec::new();

        for (i, step) in self.config.steps.iter().enumerate() {
            let context = self
                .config
                .pass_context
                .then(|| transcript.join("\n\n"));
            let prompt = step.build_prompt(&current, context.as_deref());

            let start = Instant::now();
            let outcome = self
                .executor
                .execute(&step.model, &prompt)
                .instrument(otel::chain_step_span(&step.name, &step.model))
                .await;
            let elapsed = start.elapsed();

            let response = match outcome {
                Ok(mut response) => {
                    response.model = step.model.clone();
                    if response.duration.is_zero() {
                        response.duration = elapsed;
                    }
                    response
                }
                Err(e) => ModelResponse::failure(&step.model, format!("{:#}", e))
                    .with_duration(elapsed),
            };

            if let Some(observer) = &self.observer {
                observer.observe(step.observed_role(), &response);
            }

            result.total_cost += response.cost;
            result.total_duration += elapsed;

            let error = (!response.success).then(|| response.failure_reason().to_string());
            result.steps.push(StepResult {
                name: step.name.clone(),
                model: step.model.clone(),
                input: current.clone(),
                output: response.output.clone(),
                duration: elapsed,
                cost: response.cost,
                success: response.success,
                error: error.clone(),
            });

            match error {
                None => {
                    let transform = step
                        .transform
                        .as_deref()
                        .map(Transform::parse)
                        .unwrap_or(Transform::Identity);
                    current = transform.apply(&response.output);
                    transcript.push(format!("[{}]\n{}", step.name, response.output));
                    debug!(step = %step.name, model = %step.model, "chain step complete");
                }
                Some(reason) => {
                    warn!(step = %step.name, model = %step.model, error = %reason, "chain step failed");
                    if self.config.stop_on_error {
                        result.success = false;
                        result.error =
                            Some(format!("step {} ({}) failed: {}", i + 1, step.name, reason));
                        return result;
                    }
                }
            }
        }

        result.success = result.steps.iter().all(|s| s.success);
        result.final_output = current;
        result
    }
}
