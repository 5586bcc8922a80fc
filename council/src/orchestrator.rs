//! The council: router, fallback manager, and metrics wired together.
//!
//! Pattern executors built here report every model call back through an
//! [`OutcomeRecorder`], so live outcomes reach both the metrics store and
//! the provider circuit breakers without the caller doing anything.

use std::sync::Arc;

use tracing::warn;

use crate::config::RoutingConfig;
use crate::fallback::{
    is_rate_limit_error, FallbackManager, FallbackSettings, HealthError, HealthProbe,
    RecoveryHandle, RecoveryTask, SharedFallbackManager,
};
use crate::metrics::{SharedMetricsStore, TaskMetric};
use crate::patterns::{
    ChainConfig, ChainExecutor, EnsembleConfig, EnsembleExecutor, ExecutionObserver,
    ModelResponse, SharedExecutor, SharedObserver,
};
use crate::router::{provider_for_model, RouteError, RouteRequest, RouteResult, Router, SharedRouter};

// =============================================================================
// OutcomeRecorder
// =============================================================================

/// Feeds per-call outcomes into the metrics store and circuit breakers.
pub struct OutcomeRecorder {
    fallback: SharedFallbackManager,
    metrics: SharedMetricsStore,
}

impl OutcomeRecorder {
    pub fn new(fallback: SharedFallbackManager, metrics: SharedMetricsStore) -> Self {
        Self { fallback, metrics }
    }

    /// Record a finished task. Persistence failures are logged, not returned.
    pub fn record_task(&self, task: TaskMetric) {
        let rate_limited = !task.success && task.error.as_deref().is_some_and(is_rate_limit_error);
        self.fallback
            .record_request_outcome(&task.provider, task.success, task.error.as_deref());
        if rate_limited {
            if let Err(e) = self.metrics.record_rate_limit(&task.provider) {
                warn!(provider = %task.provider, "failed to record rate limit: {}", e);
            }
        }
        if let Err(e) = self.metrics.record_task(task) {
            warn!("failed to record task metric: {}", e);
        }
    }
}

impl ExecutionObserver for OutcomeRecorder {
    fn observe(&self, role: &str, response: &ModelResponse) {
        self.record_task(task_from_response(role, response));
    }
}

/// Build a metric for one model call.
pub fn task_from_response(role: &str, response: &ModelResponse) -> TaskMetric {
    let task = TaskMetric::new(role, &response.model)
        .with_provider(provider_for_model(&response.model))
        .with_duration(response.duration)
        .with_tokens(response.tokens)
        .with_cost(response.cost);
    if response.success {
        task
    } else {
        task.failed(response.failure_reason())
    }
}

// =============================================================================
// Council
// =============================================================================

/// Entry point combining routing, failover, patterns, and metrics.
pub struct Council {
    router: SharedRouter,
    fallback: SharedFallbackManager,
    metrics: SharedMetricsStore,
    recorder: Arc<OutcomeRecorder>,
}

impl Council {
    /// Build a council that health-checks providers over HTTP.
    pub fn new(
        config: RoutingConfig,
        settings: FallbackSettings,
        metrics: SharedMetricsStore,
    ) -> Result<Self, HealthError> {
        let router = Router::new(config).shared();
        let fallback = FallbackManager::with_http_probe(router.clone(), settings)?.shared();
        Ok(Self::assemble(router, fallback, metrics))
    }

    /// Build a council with a custom health probe.
    pub fn with_probe(
        config: RoutingConfig,
        settings: FallbackSettings,
        probe: Arc<dyn HealthProbe>,
        metrics: SharedMetricsStore,
    ) -> Self {
        let router = Router::new(config).shared();
        let fallback = FallbackManager::new(router.clone(), probe, settings).shared();
        Self::assemble(router, fallback, metrics)
    }

    fn assemble(
        router: SharedRouter,
        fallback: SharedFallbackManager,
        metrics: SharedMetricsStore,
    ) -> Self {
        let recorder = Arc::new(OutcomeRecorder::new(fallback.clone(), metrics.clone()));
        Self {
            router,
            fallback,
            metrics,
            recorder,
        }
    }

    pub fn router(&self) -> &SharedRouter {
        &self.router
    }

    pub fn fallback(&self) -> &SharedFallbackManager {
        &self.fallback
    }

    pub fn metrics(&self) -> &SharedMetricsStore {
        &self.metrics
    }

    /// Observer that records into this council.
    pub fn observer(&self) -> SharedObserver {
        self.recorder.clone()
    }

    /// Route around providers whose circuit is open.
    pub fn route(&self, request: &RouteRequest) -> Result<RouteResult, RouteError> {
        self.fallback.route_with_fallback(request)
    }

    /// A chain executor whose calls are recorded by this council.
    pub fn chain(&self, config: ChainConfig, executor: SharedExecutor) -> ChainExecutor {
        ChainExecutor::new(executor, config).with_observer(self.observer())
    }

    /// An ensemble executor whose calls are recorded by this council.
    pub fn ensemble(&self, config: EnsembleConfig, executor: SharedExecutor) -> EnsembleExecutor {
        EnsembleExecutor::new(executor, config).with_observer(self.observer())
    }

    /// Record the outcome of a call made outside the pattern executors,
    /// typically one placed on a [`RouteResult`].
    pub fn record_outcome(&self, route: &RouteResult, role: &str, response: &ModelResponse) {
        let task = task_from_response(role, response)
            .with_provider(&route.provider)
            .with_complexity(route.complexity)
            .with_fallback(route.fallback);
        self.recorder.record_task(task);
    }

    /// Start the background recovery sweep.
    pub fn start_recovery(&self) -> RecoveryHandle {
        RecoveryTask::new(self.fallback.clone()).spawn()
    }

    /// Swap in a new routing config.
    pub fn reload_config(&self, config: RoutingConfig) {
        self.fallback.reload_config(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{CircuitState, ProbeOutcome, ProbeStatus};
    use crate::metrics::MetricsStore;
    use crate::patterns::{ChainStep, ModelExecutor, VotingStrategy};
    use async_trait::async_trait;
    use std::time::Duration;

    struct AlwaysUp;

    #[async_trait]
    impl HealthProbe for AlwaysUp {
        async fn probe(&self, _provider: &str) -> Result<ProbeOutcome, HealthError> {
            Ok(ProbeOutcome {
                status: ProbeStatus::Available,
                response_time: Duration::from_millis(1),
            })
        }
    }

    /// Fails every call to OpenAI models with a rate-limit error.
    struct OpenAiThrottled;

    #[async_trait]
    impl ModelExecutor for OpenAiThrottled {
        async fn execute(&self, model: &str, prompt: &str) -> anyhow::Result<ModelResponse> {
            if model.starts_with("gpt-") {
                return Ok(ModelResponse::failure(model, "429 Too Many Requests"));
            }
            Ok(ModelResponse::success(model, prompt).with_cost(0.01).with_tokens(100))
        }
    }

    fn council(threshold: u32) -> Council {
        let settings = FallbackSettings {
            failure_threshold: threshold,
            rate_limit_threshold: 1,
            ..Default::default()
        };
        Council::with_probe(
            RoutingConfig::default(),
            settings,
            Arc::new(AlwaysUp),
            MetricsStore::in_memory().shared(),
        )
    }

    #[tokio::test]
    async fn test_chain_outcomes_reach_metrics_and_breakers() {
        let council = council(5);
        let config = ChainConfig {
            steps: vec![
                ChainStep::new("draft", "sonnet-4.5").with_role("implementer"),
                ChainStep::new("review", "gpt-5.2").with_role("reviewer"),
            ],
            ..Default::default()
        };
        let result = council
            .chain(config, Arc::new(OpenAiThrottled))
            .execute("task")
            .await;
        assert!(!result.success);

        let summary = council.metrics().summary();
        assert_eq!(summary.total_tasks, 2);
        assert_eq!(summary.completed_tasks, 1);
        assert_eq!(
            council.metrics().provider_metrics("openai").unwrap().rate_limit_hits,
            1
        );
        assert_eq!(
            council.fallback().breaker("openai").unwrap().state(),
            CircuitState::Open
        );
        assert!(!council.router().provider_status("openai"));
    }

    #[tokio::test]
    async fn test_ensemble_records_each_participant() {
        let council = council(5);
        let config = EnsembleConfig::new(&["sonnet-4.5", "gemini-3-flash"], VotingStrategy::Majority);
        let result = council
            .ensemble(config, Arc::new(OpenAiThrottled))
            .execute("same")
            .await;
        assert!(result.success);
        assert_eq!(council.metrics().role_metrics("ensemble").unwrap().total_tasks, 2);
    }

    #[test]
    fn test_record_outcome_uses_route_details() {
        let council = council(1);
        let route = council.route(&RouteRequest::new("implementer")).unwrap();
        let response = ModelResponse::failure(&route.model, "connection reset");
        council.record_outcome(&route, "implementer", &response);

        let task = &council.metrics().recent_tasks(1)[0];
        assert_eq!(task.provider, route.provider);
        assert_eq!(task.complexity, Some(route.complexity));
        assert_eq!(
            council.fallback().breaker(&route.provider).unwrap().state(),
            CircuitState::Open
        );

        let rerouted = council.route(&RouteRequest::new("implementer")).unwrap();
        assert_ne!(rerouted.provider, route.provider);
        assert!(rerouted.fallback);
    }

    #[tokio::test]
    async fn test_recovery_can_be_started_and_stopped() {
        let council = council(5);
        let handle = council.start_recovery();
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
