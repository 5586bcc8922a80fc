//! Thread-safe metrics store with optional JSON persistence.
//!
//! Every mutation happens under one write lock, so readers never see a
//! half-applied task. When backed by a file, the document is rewritten
//! atomically (temp file + rename) after each mutation; the persist lock
//! keeps snapshots from landing out of order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use super::error::{MetricsError, MetricsResult};
use super::types::{
    Metrics, MetricsSummary, ModelComparison, ModelMetrics, ProviderMetrics, RoleMetrics,
    TaskMetric, CURRENT_METRICS_VERSION,
};
use crate::config::loader::write_atomic;

/// File name used by [`MetricsStore::open_in`].
pub const METRICS_FILE_NAME: &str = "council-metrics.json";

/// Shared handle to a [`MetricsStore`].
pub type SharedMetricsStore = Arc<MetricsStore>;

/// Aggregated execution metrics.
pub struct MetricsStore {
    path: Option<PathBuf>,
    metrics: RwLock<Metrics>,
    persist: Mutex<()>,
}

impl MetricsStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            metrics: RwLock::new(Metrics::default()),
            persist: Mutex::new(()),
        }
    }

    /// Open the metrics file at `path`, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> MetricsResult<Self> {
        let path = path.into();
        let metrics = if path.exists() {
            load(&path)?
        } else {
            Metrics::default()
        };
        debug!(path = %path.display(), tasks = metrics.task_history.len(), "metrics store opened");
        Ok(Self {
            path: Some(path),
            metrics: RwLock::new(metrics),
            persist: Mutex::new(()),
        })
    }

    /// Open [`METRICS_FILE_NAME`] inside `dir`.
    pub fn open_in(dir: &Path) -> MetricsResult<Self> {
        Self::open(dir.join(METRICS_FILE_NAME))
    }

    pub fn shared(self) -> SharedMetricsStore {
        Arc::new(self)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Record one task outcome.
    ///
    /// The in-memory update always applies; an error means only that the
    /// file could not be written.
    pub fn record_task(&self, task: TaskMetric) -> MetricsResult<()> {
        self.mutate(|m| m.record(task))
    }

    /// Count a rate-limit hit against `provider`.
    pub fn record_rate_limit(&self, provider: &str) -> MetricsResult<()> {
        self.mutate(|m| m.record_rate_limit(provider))
    }

    /// Drop all history and aggregates.
    pub fn reset(&self) -> MetricsResult<()> {
        self.mutate(|m| *m = Metrics::default())
    }

    fn mutate(&self, apply: impl FnOnce(&mut Metrics)) -> MetricsResult<()> {
        let _persist = self.persist.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = {
            let mut metrics = self.write();
            apply(&mut metrics);
            match &self.path {
                Some(_) => Some(serde_json::to_vec_pretty(&*metrics)?),
                None => None,
            }
        };

        if let (Some(path), Some(bytes)) = (&self.path, snapshot) {
            write_atomic(path, &bytes).map_err(|e| {
                warn!(path = %path.display(), "failed to persist metrics: {}", e);
                MetricsError::Io {
                    path: path.clone(),
                    source: e,
                }
            })?;
        }
        Ok(())
    }

    // =========================================================================
    // Reads (all return copies)
    // =========================================================================

    pub fn metrics(&self) -> Metrics {
        self.read().clone()
    }

    pub fn summary(&self) -> MetricsSummary {
        self.read().summary()
    }

    pub fn compare_models(&self, a: &str, b: &str) -> Option<ModelComparison> {
        self.read().compare_models(a, b)
    }

    pub fn role_metrics(&self, role: &str) -> Option<RoleMetrics> {
        self.read().by_role.get(role).cloned()
    }

    pub fn model_metrics(&self, model: &str) -> Option<ModelMetrics> {
        self.read().by_model.get(model).cloned()
    }

    pub fn provider_metrics(&self, provider: &str) -> Option<ProviderMetrics> {
        self.read().by_provider.get(provider).cloned()
    }

    /// The `n` most recent tasks, oldest first.
    pub fn recent_tasks(&self, n: usize) -> Vec<TaskMetric> {
        let metrics = self.read();
        let history = &metrics.task_history;
        history[history.len().saturating_sub(n)..].to_vec()
    }

    pub fn model_ranking(&self) -> Vec<String> {
        self.read().model_ranking()
    }

    fn read(&self) -> RwLockReadGuard<'_, Metrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Metrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn load(path: &Path) -> MetricsResult<Metrics> {
    let data = std::fs::read_to_string(path).map_err(|e| MetricsError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut metrics: Metrics =
        serde_json::from_str(&data).map_err(|e| MetricsError::Deserialize {
            path: path.to_path_buf(),
            source: e,
        })?;
    if metrics.version == 0 {
        metrics.version = CURRENT_METRICS_VERSION;
    }
    Ok(metrics)
}
