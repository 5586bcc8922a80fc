//! Metric records and the aggregates derived from them.
//!
//! Aggregates are caches over the task stream: [`Metrics::replay`] rebuilds
//! them from history alone (rate-limit hits excepted, which are not tasks).

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ComplexityLevel;
use crate::router::provider_for_model;

/// Schema version of the persisted metrics document.
pub const CURRENT_METRICS_VERSION: u32 = 1;

/// Oldest tasks are evicted past this many.
pub const MAX_TASK_HISTORY: usize = 1000;

/// Flagship-tier baseline used for cost savings, in dollars per 1M tokens.
pub const FLAGSHIP_COST_PER_MILLION_TOKENS: f64 = 75.0;

/// Durations are persisted as whole milliseconds. Everything recorded is
/// kept at that precision so a reloaded document replays exactly.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// ---------------------------------------------------------------------------
// TaskMetric
// ---------------------------------------------------------------------------

/// One execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetric {
    pub id: String,
    pub role: String,
    pub model: String,
    pub provider: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "duration_ms", with = "duration_ms", default)]
    pub duration: Duration,
    #[serde(default)]
    pub tokens: u64,
    #[serde(default)]
    pub cost: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<ComplexityLevel>,
    #[serde(default)]
    pub fallback: bool,
}

impl TaskMetric {
    /// A successful task for `role` on `model`, with the provider inferred
    /// from the model name.
    pub fn new(role: &str, model: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            role: role.to_string(),
            model: model.to_string(),
            provider: provider_for_model(model).to_string(),
            started_at: now,
            completed_at: Some(now),
            duration: Duration::ZERO,
            tokens: 0,
            cost: 0.0,
            success: true,
            error: None,
            complexity: None,
            fallback: false,
        }
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    /// Mark the task failed with `error`.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    /// Set the duration, truncated to whole milliseconds, back-dating
    /// `started_at` from `completed_at`.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = whole_millis(duration);
        if let (Some(done), Ok(d)) = (self.completed_at, chrono::Duration::from_std(self.duration)) {
            self.started_at = done - d;
        }
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_complexity(mut self, complexity: ComplexityLevel) -> Self {
        self.complexity = Some(complexity);
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

fn rate(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn whole_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis((total.as_millis() / u128::from(count)) as u64)
}

/// Running totals for one role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleMetrics {
    pub role: String,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    #[serde(rename = "total_duration_ms", with = "duration_ms", default)]
    pub total_duration: Duration,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Tasks per model.
    #[serde(default)]
    pub model_usage: BTreeMap<String, u64>,
    #[serde(rename = "avg_duration_ms", with = "duration_ms", default)]
    pub avg_duration: Duration,
    pub success_rate: f64,
}

impl RoleMetrics {
    fn new(role: &str) -> Self {
        Self {
            role: role.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, task: &TaskMetric) {
        self.total_tasks += 1;
        if task.success {
            self.completed_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }
        self.total_duration += task.duration;
        self.total_tokens += task.tokens;
        self.total_cost += task.cost;
        *self.model_usage.entry(task.model.clone()).or_default() += 1;
        self.avg_duration = average(self.total_duration, self.total_tasks);
        self.success_rate = rate(self.completed_tasks, self.total_tasks);
    }
}

/// Running totals for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub model: String,
    pub provider: String,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    #[serde(rename = "total_duration_ms", with = "duration_ms", default)]
    pub total_duration: Duration,
    pub total_tokens: u64,
    pub total_cost: f64,
    #[serde(rename = "avg_duration_ms", with = "duration_ms", default)]
    pub avg_duration: Duration,
    pub success_rate: f64,
    /// Tasks per role.
    #[serde(default)]
    pub role_usage: BTreeMap<String, u64>,
}

impl ModelMetrics {
    fn new(model: &str, provider: &str) -> Self {
        Self {
            model: model.to_string(),
            provider: provider.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, task: &TaskMetric) {
        self.total_tasks += 1;
        if task.success {
            self.completed_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }
        self.total_duration += task.duration;
        self.total_tokens += task.tokens;
        self.total_cost += task.cost;
        *self.role_usage.entry(task.role.clone()).or_default() += 1;
        self.avg_duration = average(self.total_duration, self.total_tasks);
        self.success_rate = rate(self.completed_tasks, self.total_tasks);
    }
}

/// Running totals for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub provider: String,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub total_cost: f64,
    pub rate_limit_hits: u64,
    #[serde(rename = "total_latency_ms", with = "duration_ms", default)]
    pub total_latency: Duration,
    #[serde(rename = "avg_latency_ms", with = "duration_ms", default)]
    pub avg_latency: Duration,
    /// Share of tasks that succeeded, in [0, 1].
    pub availability: f64,
}

impl ProviderMetrics {
    fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, task: &TaskMetric) {
        self.total_tasks += 1;
        if task.success {
            self.completed_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }
        self.total_cost += task.cost;
        self.total_latency += task.duration;
        self.avg_latency = average(self.total_latency, self.total_tasks);
        self.availability = rate(self.completed_tasks, self.total_tasks);
    }
}

// ---------------------------------------------------------------------------
// Metrics document
// ---------------------------------------------------------------------------

/// The whole persisted metrics document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub version: u32,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub by_role: BTreeMap<String, RoleMetrics>,
    #[serde(default)]
    pub by_model: BTreeMap<String, ModelMetrics>,
    #[serde(default)]
    pub by_provider: BTreeMap<String, ProviderMetrics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_history: Vec<TaskMetric>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            version: CURRENT_METRICS_VERSION,
            updated_at: Utc::now(),
            by_role: BTreeMap::new(),
            by_model: BTreeMap::new(),
            by_provider: BTreeMap::new(),
            task_history: Vec::new(),
        }
    }
}

impl Metrics {
    /// Fold `task` into every aggregate and append it to history.
    pub fn record(&mut self, mut task: TaskMetric) {
        task.duration = whole_millis(task.duration);
        self.aggregate(&task);
        self.task_history.push(task);
        if self.task_history.len() > MAX_TASK_HISTORY {
            let excess = self.task_history.len() - MAX_TASK_HISTORY;
            self.task_history.drain(..excess);
        }
        self.updated_at = Utc::now();
    }

    pub fn record_rate_limit(&mut self, provider: &str) {
        self.by_provider
            .entry(provider.to_string())
            .or_insert_with(|| ProviderMetrics::new(provider))
            .rate_limit_hits += 1;
        self.updated_at = Utc::now();
    }

    /// Rebuild a document from a task stream.
    pub fn replay<'a>(tasks: impl IntoIterator<Item = &'a TaskMetric>) -> Self {
        let mut metrics = Self::default();
        for task in tasks {
            metrics.record(task.clone());
        }
        metrics
    }

    fn aggregate(&mut self, task: &TaskMetric) {
        self.by_role
            .entry(task.role.clone())
            .or_insert_with(|| RoleMetrics::new(&task.role))
            .record(task);
        self.by_model
            .entry(task.model.clone())
            .or_insert_with(|| ModelMetrics::new(&task.model, &task.provider))
            .record(task);
        self.by_provider
            .entry(task.provider.clone())
            .or_insert_with(|| ProviderMetrics::new(&task.provider))
            .record(task);
    }

    pub fn summary(&self) -> MetricsSummary {
        let mut summary = MetricsSummary::default();
        let mut total_tokens = 0u64;
        for rm in self.by_role.values() {
            summary.total_tasks += rm.total_tasks;
            summary.completed_tasks += rm.completed_tasks;
            summary.total_cost += rm.total_cost;
            total_tokens += rm.total_tokens;
        }
        summary.avg_success_rate = rate(summary.completed_tasks, summary.total_tasks);
        summary.top_model = top_by_tasks(self.by_model.iter().map(|(k, m)| (k, m.total_tasks)));
        summary.top_provider =
            top_by_tasks(self.by_provider.iter().map(|(k, p)| (k, p.total_tasks)));

        let flagship_cost = total_tokens as f64 * FLAGSHIP_COST_PER_MILLION_TOKENS / 1_000_000.0;
        if flagship_cost > 0.0 {
            summary.cost_savings = (1.0 - summary.total_cost / flagship_cost) * 100.0;
        }
        summary
    }

    /// Deltas of `a` minus `b`, or `None` if either has no data.
    pub fn compare_models(&self, a: &str, b: &str) -> Option<ModelComparison> {
        let ma = self.by_model.get(a)?;
        let mb = self.by_model.get(b)?;
        Some(ModelComparison {
            model_a: a.to_string(),
            model_b: b.to_string(),
            task_diff: ma.total_tasks as i64 - mb.total_tasks as i64,
            success_diff: ma.success_rate - mb.success_rate,
            duration_diff_ms: ma.avg_duration.as_millis() as i64
                - mb.avg_duration.as_millis() as i64,
            cost_diff: ma.total_cost - mb.total_cost,
        })
    }

    /// Models by success rate, best first; ties by name.
    pub fn model_ranking(&self) -> Vec<String> {
        let mut ranked: Vec<(&String, f64)> = self
            .by_model
            .iter()
            .map(|(name, m)| (name, m.success_rate))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Highest count wins; the map's key order makes ties go to the smallest name.
fn top_by_tasks<'a>(counts: impl Iterator<Item = (&'a String, u64)>) -> Option<String> {
    let mut top: Option<(&String, u64)> = None;
    for (name, count) in counts {
        if count > top.map_or(0, |(_, c)| c) {
            top = Some((name, count));
        }
    }
    top.map(|(name, _)| name.clone())
}

/// Cross-cutting view over all aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub total_cost: f64,
    pub avg_success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_provider: Option<String>,
    /// Savings versus running every token on a flagship model, in percent.
    #[serde(rename = "cost_savings_percent")]
    pub cost_savings: f64,
}

/// Per-field deltas between two models (`a` minus `b`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub model_a: String,
    pub model_b: String,
    pub task_diff: i64,
    pub success_diff: f64,
    pub duration_diff_ms: i64,
    pub cost_diff: f64,
}
