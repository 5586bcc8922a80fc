//! Parallel ensemble execution with voting.
//!
//! Every model runs as its own tokio task under one shared deadline. Each
//! participant yields exactly one [`ModelResponse`]: executor errors, panics,
//! and deadline aborts all become failure responses. Responses are reported
//! in configured model order regardless of completion order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

use super::executor::{ModelResponse, SharedExecutor, SharedObserver};
use super::voting::{self, VotingStrategy};
use crate::otel;

/// Deadline applied when [`EnsembleConfig::timeout`] is unset.
pub const DEFAULT_ENSEMBLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Error text for participants cut off by the deadline.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// Role reported to observers for ensemble participants.
pub const ENSEMBLE_ROLE: &str = "ensemble";

/// Which models to ask and how to decide between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub models: Vec<String>,
    #[serde(default)]
    pub voting_strategy: VotingStrategy,
    /// Minimum agreement in [0, 1] for the result to count as a success.
    #[serde(default)]
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Minimum successful responses. Unset or zero means a strict majority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_responses: Option<usize>,
}

impl EnsembleConfig {
    pub fn new(models: &[&str], voting_strategy: VotingStrategy) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            voting_strategy,
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_min_responses(mut self, min_responses: usize) -> Self {
        self.min_responses = Some(min_responses);
        self
    }

    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_ENSEMBLE_TIMEOUT)
    }

    pub fn required_responses(&self) -> usize {
        match self.min_responses {
            Some(n) if n > 0 => n,
            _ => self.models.len() / 2 + 1,
        }
    }
}

/// Outcome of one ensemble run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// One entry per configured model, in configured order.
    pub responses: Vec<ModelResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub winner_output: String,
    /// Successful responses per normalized output.
    pub votes: BTreeMap<String, usize>,
    pub agreement: f64,
    pub duration: Duration,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnsembleResult {
    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.success).count()
    }
}

/// Runs an [`EnsembleConfig`] against a model executor.
pub struct EnsembleExecutor {
    executor: SharedExecutor,
    config: EnsembleConfig,
    observer: Option<SharedObserver>,
}

impl EnsembleExecutor {
    pub fn new(executor: SharedExecutor, config: EnsembleConfig) -> Self {
        Self {
            executor,
            config,
            observer: None,
        }
    }

    /// Report every participant's response to `observer`.
    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Ask every model and vote on the answers.
    pub async fn execute(&self, prompt: &str) -> EnsembleResult {
        let span = otel::ensemble_span(
            &self.config.voting_strategy.to_string(),
            self.config.models.len(),
        );
        let result = self.run(prompt).instrument(span.clone()).await;
        otel::record_ensemble_result(
            &span,
            result.success,
            result.agreement,
            result.duration.as_millis() as u64,
        );
        result
    }

    async fn run(&self, prompt: &str) -> EnsembleResult {
        let start = Instant::now();
        let deadline = start + self.config.effective_timeout();
        let responses = self.collect(prompt, start, deadline).await;

        if let Some(observer) = &self.observer {
            for response in &responses {
                observer.observe(ENSEMBLE_ROLE, response);
            }
        }

        let mut result = EnsembleResult {
            votes: voting::tally(&responses),
            responses,
            duration: start.elapsed(),
            ..Default::default()
        };
        self.decide(&mut result);
        result
    }

    async fn collect(&self, prompt: &str, start: Instant, deadline: Instant) -> Vec<ModelResponse> {
        let models = &self.config.models;
        let mut slots: Vec<Option<ModelResponse>> = vec![None; models.len()];
        let mut aborts = Vec::with_capacity(models.len());
        let mut pending = FuturesUnordered::new();

        for (idx, model) in models.iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let model = model.clone();
            let prompt = prompt.to_string();
            let handle = tokio::spawn(
                async move {
                    let call_start = Instant::now();
                    let outcome = executor.execute(&model, &prompt).await;
                    (outcome, call_start.elapsed())
                }
                .in_current_span(),
            );
            aborts.push(handle.abort_handle());
            pending.push(async move { (idx, handle.await) });
        }

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((idx, joined))) => {
                    slots[idx] = Some(settle(&models[idx], joined));
                }
                Ok(None) => break,
                Err(_) => {
                    for (idx, abort) in aborts.iter().enumerate() {
                        if slots[idx].is_none() {
                            warn!(model = %models[idx], "ensemble participant exceeded deadline");
                            abort.abort();
                        }
                    }
                    break;
                }
            }
        }

        let elapsed = start.elapsed();
        slots
            .into_iter()
            .zip(models)
            .map(|(slot, model)| {
                slot.unwrap_or_else(|| {
                    ModelResponse::failure(model.as_str(), DEADLINE_EXCEEDED).with_duration(elapsed)
                })
            })
            .collect()
    }

    fn decide(&self, result: &mut EnsembleResult) {
        let successes = result.success_count();
        let required = self.config.required_responses();
        if successes < required {
            warn!(successes, required, "ensemble did not collect enough responses");
            result.error = Some(format!(
                "insufficient responses: got {}, need {}",
                successes, required
            ));
            return;
        }

        let Some(outcome) = voting::vote(self.config.voting_strategy, &result.responses) else {
            result.error = Some("no successful responses".to_string());
            return;
        };

        let winner = &result.responses[outcome.winner];
        result.winner = Some(winner.model.clone());
        result.winner_output = winner.output.clone();
        result.agreement = outcome.agreement;

        if outcome.agreement < self.config.threshold {
            info!(
                agreement = outcome.agreement,
                threshold = self.config.threshold,
                "ensemble agreement below threshold"
            );
            result.error = Some(format!(
                "agreement {:.2} below threshold {:.2}",
                outcome.agreement, self.config.threshold
            ));
            return;
        }

        debug!(winner = %winner.model, agreement = outcome.agreement, "ensemble decided");
        result.success = true;
    }
}

fn settle(
    model: &str,
    joined: Result<(anyhow::Result<ModelResponse>, Duration), JoinError>,
) -> ModelResponse {
    match joined {
        Ok((Ok(mut response), elapsed)) => {
            response.model = model.to_string();
            if response.duration.is_zero() {
                response.duration = elapsed;
            }
            response
        }
        Ok((Err(e), elapsed)) => {
            warn!(model = %model, "ensemble participant failed: {:#}", e);
            ModelResponse::failure(model, format!("{:#}", e)).with_duration(elapsed)
        }
        Err(e) => {
            warn!(model = %model, "ensemble participant task failed: {}", e);
            ModelResponse::failure(model, format!("task failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::executor::{ExecutionObserver, ModelExecutor};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Per-model canned answers with a per-model delay.
    struct Scripted {
        answers: HashMap<&'static str, (&'static str, u64)>,
    }

    impl Scripted {
        fn new(answers: &[(&'static str, &'static str, u64)]) -> Arc<Self> {
            Arc::new(Self {
                answers: answers.iter().map(|(m, a, d)| (*m, (*a, *d))).collect(),
            })
        }
    }

    #[async_trait]
    impl ModelExecutor for Scripted {
        async fn execute(&self, model: &str, _prompt: &str) -> anyhow::Result<ModelResponse> {
            let Some((answer, delay)) = self.answers.get(model).copied() else {
                anyhow::bail!("no such model {}", model);
            };
            tokio::time::sleep(Duration::from_secs(delay)).await;
            match answer {
                "PANIC" => panic!("backend exploded"),
                "FAIL" => Ok(ModelResponse::failure(model, "refused")),
                _ => Ok(ModelResponse::success(model, answer)),
            }
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl ExecutionObserver for Recorder {
        fn observe(&self, role: &str, response: &ModelResponse) {
            self.0
                .lock()
                .unwrap()
                .push((role.to_string(), response.model.clone()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_majority_wins_and_order_is_preserved() {
        let exec = Scripted::new(&[("m1", "A", 3), ("m2", "A", 1), ("m3", "B", 2)]);
        let config = EnsembleConfig::new(&["m1", "m2", "m3"], VotingStrategy::Majority);
        let result = EnsembleExecutor::new(exec, config).execute("q").await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.winner.as_deref(), Some("m1"));
        assert_eq!(result.winner_output, "A");
        assert!((result.agreement - 2.0 / 3.0).abs() < 1e-9);
        let order: Vec<_> = result.responses.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(order, vec!["m1", "m2", "m3"]);
        assert_eq!(result.votes.get("a"), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_slow_participants() {
        let exec = Scripted::new(&[("fast1", "X", 1), ("fast2", "X", 2), ("slow", "X", 600)]);
        let config = EnsembleConfig::new(&["fast1", "fast2", "slow"], VotingStrategy::Consensus)
            .with_timeout(Duration::from_secs(10));
        let result = EnsembleExecutor::new(exec, config).execute("q").await;

        assert_eq!(result.responses.len(), 3);
        assert_eq!(result.responses[2].error.as_deref(), Some(DEADLINE_EXCEEDED));
        assert!(result.success);
        assert_eq!(result.agreement, 1.0);
        assert!(result.duration <= Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_insufficient_responses() {
        let exec = Scripted::new(&[("m1", "A", 1), ("m2", "FAIL", 1), ("m3", "PANIC", 1)]);
        let config = EnsembleConfig::new(&["m1", "m2", "m3"], VotingStrategy::Majority);
        let result = EnsembleExecutor::new(exec, config).execute("q").await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("insufficient responses: got 1, need 2")
        );
        assert!(result.winner.is_none());
        assert!(result.responses[2]
            .error
            .as_deref()
            .unwrap()
            .starts_with("task failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_failure_still_reports_winner() {
        let exec = Scripted::new(&[("m1", "A", 1), ("m2", "B", 1), ("m3", "A", 1)]);
        let config = EnsembleConfig::new(&["m1", "m2", "m3"], VotingStrategy::Majority)
            .with_threshold(0.9);
        let result = EnsembleExecutor::new(exec, config).execute("q").await;

        assert!(!result.success);
        assert_eq!(result.winner.as_deref(), Some("m1"));
        assert_eq!(
            result.error.as_deref(),
            Some("agreement 0.67 below threshold 0.90")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_every_participant() {
        let exec = Scripted::new(&[("m1", "A", 1), ("m2", "A", 1)]);
        let recorder = Arc::new(Recorder::default());
        let config = EnsembleConfig::new(&["m1", "m2", "missing"], VotingStrategy::Weighted)
            .with_min_responses(1);
        let result = EnsembleExecutor::new(exec, config)
            .with_observer(recorder.clone())
            .execute("q")
            .await;

        assert!(result.success);
        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(role, _)| role == ENSEMBLE_ROLE));
    }

    #[test]
    fn test_config_defaults() {
        let config = EnsembleConfig::new(&["a", "b", "c", "d"], VotingStrategy::Best);
        assert_eq!(config.required_responses(), 3);
        assert_eq!(config.effective_timeout(), DEFAULT_ENSEMBLE_TIMEOUT);
        assert_eq!(config.clone().with_min_responses(0).required_responses(), 3);
        assert_eq!(config.with_min_responses(1).required_responses(), 1);
    }
}
