//! Pattern and metrics integration tests.
//!
//! Tests verify:
//! - Majority and consensus voting results on small fixed ballots
//! - Vote results do not depend on response order
//! - A failing middle chain step does not stop later steps
//! - Preset chains run end to end through a council
//! - Metrics summaries and model comparisons after recorded tasks

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use council::fallback::{HealthError, HealthProbe, ProbeOutcome, ProbeStatus};
use council::patterns::presets;
use council::patterns::{vote, ChainStep, ModelExecutor};
use council::{
    ChainConfig, ChainExecutor, Council, EnsembleConfig, EnsembleExecutor, FallbackSettings,
    MetricsStore, ModelResponse, RoutingConfig, TaskMetric, VotingStrategy,
};

fn ok(model: &str, output: &str) -> ModelResponse {
    ModelResponse::success(model, output)
}

/// Records prompts; fails models listed in `failing`.
struct Recording {
    failing: Vec<&'static str>,
    seen: Mutex<Vec<(String, String)>>,
}

impl Recording {
    fn new(failing: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            failing: failing.to_vec(),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ModelExecutor for Recording {
    async fn execute(&self, model: &str, prompt: &str) -> anyhow::Result<ModelResponse> {
        self.seen
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));
        if self.failing.iter().any(|f| *f == model) {
            anyhow::bail!("{} unavailable", model);
        }
        Ok(ModelResponse::success(model, format!("{}({})", model, prompt))
            .with_cost(0.5)
            .with_tokens(10))
    }
}

struct AlwaysUp;

#[async_trait]
impl HealthProbe for AlwaysUp {
    async fn probe(&self, _provider: &str) -> Result<ProbeOutcome, HealthError> {
        Ok(ProbeOutcome {
            status: ProbeStatus::Available,
            response_time: std::time::Duration::ZERO,
        })
    }
}

// ── Voting ─────────────────────────────────────────────────────────

#[test]
fn test_majority_over_aab() {
    let responses = vec![ok("m1", "A"), ok("m2", "A"), ok("m3", "B")];
    let outcome = vote(VotingStrategy::Majority, &responses).unwrap();
    assert_eq!(responses[outcome.winner].output, "A");
    assert!((outcome.agreement - 2.0 / 3.0).abs() < 1e-9);
    assert!(outcome.agreement >= 0.5);
}

#[test]
fn test_consensus_unanimous_and_split() {
    let unanimous = vec![ok("m1", "A"), ok("m2", "A"), ok("m3", "A")];
    let outcome = vote(VotingStrategy::Consensus, &unanimous).unwrap();
    assert_eq!(unanimous[outcome.winner].output, "A");
    assert_eq!(outcome.agreement, 1.0);

    let split = vec![ok("m1", "A"), ok("m2", "B"), ok("m3", "A")];
    let outcome = vote(VotingStrategy::Consensus, &split).unwrap();
    assert_eq!(split[outcome.winner].output, "A");
    assert!((outcome.agreement - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn prop_vote_is_order_invariant() {
    let base = vec![
        ok("m1", "Here is the answer: 4").with_confidence(0.9),
        ok("m2", "B").with_confidence(0.4),
        ok("m3", "the answer: 4").with_confidence(0.3),
        ok("m4", "B").with_confidence(0.5),
        ModelResponse::failure("m5", "down"),
    ];
    let orders: [[usize; 5]; 4] = [
        [0, 1, 2, 3, 4],
        [4, 3, 2, 1, 0],
        [1, 3, 0, 4, 2],
        [2, 0, 4, 1, 3],
    ];

    for strategy in [
        VotingStrategy::Majority,
        VotingStrategy::Consensus,
        VotingStrategy::Weighted,
    ] {
        let mut winners = Vec::new();
        for order in &orders {
            let shuffled: Vec<ModelResponse> = order.iter().map(|&i| base[i].clone()).collect();
            let outcome = vote(strategy, &shuffled).unwrap();
            winners.push((shuffled[outcome.winner].model.clone(), outcome.agreement));
        }
        for w in &winners[1..] {
            assert_eq!(w.0, winners[0].0, "{} winner changed with order", strategy);
            assert!((w.1 - winners[0].1).abs() < 1e-12);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_ensemble_with_failed_member_still_votes() {
    struct Fixed;
    #[async_trait]
    impl ModelExecutor for Fixed {
        async fn execute(&self, model: &str, _prompt: &str) -> anyhow::Result<ModelResponse> {
            match model {
                "m3" => anyhow::bail!("HTTP 500"),
                _ => Ok(ModelResponse::success(model, "  Yes ")),
            }
        }
    }
    let config = EnsembleConfig::new(&["m1", "m2", "m3"], VotingStrategy::Consensus)
        .with_threshold(0.66);
    let result = EnsembleExecutor::new(Arc::new(Fixed), config)
        .execute("ship it?")
        .await;
    assert!(result.success);
    assert_eq!(result.agreement, 1.0);
    assert_eq!(result.votes.get("yes"), Some(&2));
    assert_eq!(result.responses[2].error.as_deref(), Some("HTTP 500"));
}

// ── Chains ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failing_middle_step_passes_input_through() {
    let exec = Recording::new(&["m2"]);
    let config = ChainConfig {
        steps: vec![
            ChainStep::new("one", "m1"),
            ChainStep::new("two", "m2").with_transform("first_line"),
            ChainStep::new("three", "m3"),
        ],
        pass_context: false,
        stop_on_error: false,
    };
    let result = ChainExecutor::new(exec.clone(), config).execute("x").await;

    assert!(!result.success);
    assert_eq!(result.steps.len(), 3);
    assert!(!result.steps[1].success);
    assert_eq!(result.steps[1].error.as_deref(), Some("m2 unavailable"));
    assert_eq!(result.steps[2].input, result.steps[1].input);
    assert_eq!(result.steps[2].input, "m1(x)");
    assert_eq!(result.final_output, "m3(m1(x))");
    assert!((result.total_cost - 1.0).abs() < 1e-9);

    let seen = exec.seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[2], ("m3".to_string(), "m1(x)".to_string()));
}

#[tokio::test]
async fn test_preset_chain_through_council() {
    let council = Council::with_probe(
        RoutingConfig::default(),
        FallbackSettings::default(),
        Arc::new(AlwaysUp),
        MetricsStore::in_memory().shared(),
    );
    let exec = Recording::new(&[]);
    let chain = presets::get_chain("code-review").unwrap();
    let result = council.chain(chain, exec.clone()).execute("fn main() {}").await;

    assert!(result.success);
    assert_eq!(result.steps.len(), 3);
    let seen = exec.seen.lock().unwrap();
    assert!(seen[0].1.starts_with("Review this code for issues:"));
    assert!(seen[0].1.ends_with("fn main() {}"));

    let reviewer = council.metrics().role_metrics("reviewer").unwrap();
    assert_eq!(reviewer.total_tasks, 3);
    assert_eq!(reviewer.total_tokens, 30);
}

// ── Metrics ────────────────────────────────────────────────────────

#[test]
fn test_summary_after_one_task() {
    let store = MetricsStore::in_memory();
    store
        .record_task(TaskMetric::new("r", "m").with_cost(2.0))
        .unwrap();

    let summary = store.summary();
    assert_eq!(summary.total_tasks, 1);
    assert_eq!(summary.completed_tasks, 1);
    assert_eq!(summary.avg_success_rate, 1.0);
    assert_eq!(summary.total_cost, 2.0);
    assert_eq!(summary.top_model.as_deref(), Some("m"));
}

#[test]
fn prop_compare_models_antisymmetric() {
    let store = MetricsStore::in_memory();
    let models = ["a", "b", "c"];
    for (i, model) in models.iter().enumerate() {
        for n in 0..=i {
            let task = TaskMetric::new("r", model).with_cost(n as f64);
            let task = if n % 2 == 1 { task.failed("x") } else { task };
            store.record_task(task).unwrap();
        }
    }

    for a in models {
        for b in models {
            let ab = store.compare_models(a, b).unwrap();
            let ba = store.compare_models(b, a).unwrap();
            assert_eq!(ab.task_diff, -ba.task_diff);
            assert_eq!(ab.duration_diff_ms, -ba.duration_diff_ms);
            assert!((ab.cost_diff + ba.cost_diff).abs() < 1e-9);
        }
    }
    assert!(store.compare_models("a", "zzz").is_none());
}

#[test]
fn test_metrics_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("council-metrics.json");
    {
        let store = MetricsStore::open(&path).unwrap();
        store.record_task(TaskMetric::new("r", "gpt-5.2")).unwrap();
        store.record_rate_limit("openai").unwrap();
    }
    let store = MetricsStore::open(&path).unwrap();
    let openai = store.provider_metrics("openai").unwrap();
    assert_eq!(openai.total_tasks, 1);
    assert_eq!(openai.rate_limit_hits, 1);
    assert_eq!(store.model_ranking(), vec!["gpt-5.2"]);
}
