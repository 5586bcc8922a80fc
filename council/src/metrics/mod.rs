//! Execution Metrics Module
//!
//! Aggregates task outcomes by role, model, and provider:
//!
//! ```text
//! TaskMetric ──▶ MetricsStore::record_task
//!                  ├─ by_role      RoleMetrics
//!                  ├─ by_model     ModelMetrics
//!                  ├─ by_provider  ProviderMetrics
//!                  └─ task_history (bounded)
//! ```

pub mod error;
pub mod store;
pub mod types;

pub use error::{MetricsError, MetricsResult};
pub use store::{MetricsStore, SharedMetricsStore, METRICS_FILE_NAME};
pub use types::{
    Metrics, MetricsSummary, ModelComparison, ModelMetrics, ProviderMetrics, RoleMetrics,
    TaskMetric, CURRENT_METRICS_VERSION, FLAGSHIP_COST_PER_MILLION_TOKENS, MAX_TASK_HISTORY,
};
