//! Council: role-aware model routing for agent orchestration
//!
//! This library decides which model serves which request and how provider
//! failures are absorbed:
//! - Role and complexity based routing with ordered fallback chains
//! - Per-provider circuit breakers with health probing and background recovery
//! - Chain (sequential) and ensemble (parallel with voting) execution patterns
//! - Outcome metrics aggregated by role, model, and provider
//!
//! # Architecture
//!
//! ```text
//! RouteRequest ──▶ FallbackManager ──▶ Router ──▶ RouteResult
//!                       ▲   (open circuits excluded)
//!                       │
//! ModelExecutor ◀── Chain / Ensemble ──▶ OutcomeRecorder ──▶ MetricsStore
//!                                              │
//!                                              └──▶ circuit breakers
//! ```
//!
//! Backends are not part of this crate: callers supply a
//! [`patterns::ModelExecutor`] that runs a prompt against a named model.
//!
//! # Usage
//!
//! ```no_run
//! use council::{Council, FallbackSettings, MetricsStore, RouteRequest, RoutingConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let council = Council::new(
//!     RoutingConfig::default(),
//!     FallbackSettings::from_env(),
//!     MetricsStore::in_memory().shared(),
//! )?;
//! let route = council.route(&RouteRequest::new("implementer"))?;
//! println!("{} via {}", route.model, route.provider);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod fallback;
pub mod metrics;
pub mod orchestrator;
pub mod otel;
pub mod patterns;
pub mod router;

pub use config::{ComplexityLevel, ConfigError, ConfigPaths, RoutingConfig};
pub use fallback::{
    CircuitBreaker, CircuitState, FallbackManager, FallbackSettings, RecoveryHandle, RecoveryTask,
};
pub use metrics::{MetricsError, MetricsStore, MetricsSummary, TaskMetric};
pub use orchestrator::{Council, OutcomeRecorder};
pub use patterns::{
    ChainConfig, ChainExecutor, ChainResult, EnsembleConfig, EnsembleExecutor, EnsembleResult,
    ModelExecutor, ModelResponse, Pattern, VotingStrategy,
};
pub use router::{RouteError, RouteRequest, RouteResult, Router, TaskSignal};
