//! Role/complexity → model selection with fallback.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::complexity::{assess, TaskSignal};
use super::provider::provider_for_model;
use crate::config::{ComplexityLevel, RoutingConfig, AUTO_MODEL};

/// Routing failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no available models for role {role}")]
    NoModelAvailable { role: String },
}

/// A request to pick a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRequest {
    pub role: String,
    /// Optional task signal used for complexity assessment.
    #[serde(default)]
    pub task: Option<TaskSignal>,
    /// Caller override. `"auto"` or `None` means no override.
    #[serde(default)]
    pub preferred_model: Option<String>,
    #[serde(default)]
    pub exclude_providers: Vec<String>,
}

impl RouteRequest {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Default::default()
        }
    }

    pub fn with_task(mut self, task: TaskSignal) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_preferred_model(mut self, model: impl Into<String>) -> Self {
        self.preferred_model = Some(model.into());
        self
    }

    pub fn excluding(mut self, provider: impl Into<String>) -> Self {
        self.exclude_providers.push(provider.into());
        self
    }
}

/// The routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResult {
    pub model: String,
    pub provider: String,
    pub rationale: String,
    pub complexity: ComplexityLevel,
    /// True when anything other than the first choice was returned.
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

struct RouterState {
    config: Arc<RoutingConfig>,
    provider_status: HashMap<String, bool>,
}

impl RouterState {
    fn is_available(&self, provider: &str, exclude: &[String]) -> bool {
        if exclude.iter().any(|p| p == provider) {
            return false;
        }
        self.is_up(provider)
    }

    /// A configured provider must be enabled regardless of live status.
    /// Providers without a status entry (including "unknown") are assumed up.
    fn is_up(&self, provider: &str) -> bool {
        let enabled = self
            .config
            .providers
            .get(provider)
            .map_or(true, |pc| pc.enabled);
        enabled && self.provider_status.get(provider).copied().unwrap_or(true)
    }
}

/// Shared reference to a [`Router`].
pub type SharedRouter = Arc<Router>;

/// Selects a model for a role, honouring provider availability.
///
/// Routing itself is pure; the only mutable state is the per-provider
/// availability map, which the fallback manager flips as breakers trip.
pub struct Router {
    state: RwLock<RouterState>,
}

impl Router {
    pub fn new(config: RoutingConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<RoutingConfig>) -> Self {
        let provider_status = config
            .providers
            .iter()
            .map(|(name, pc)| (name.clone(), pc.enabled))
            .collect();
        Self {
            state: RwLock::new(RouterState {
                config,
                provider_status,
            }),
        }
    }

    pub fn shared(self) -> SharedRouter {
        Arc::new(self)
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<RoutingConfig> {
        Arc::clone(&self.read().config)
    }

    /// Swap in a new configuration. Providers not seen before get their
    /// status seeded from `enabled`; known providers keep their live status.
    pub fn reload_config(&self, config: RoutingConfig) {
        let mut state = self.write();
        for (name, pc) in &config.providers {
            state
                .provider_status
                .entry(name.clone())
                .or_insert(pc.enabled);
        }
        state.config = Arc::new(config);
        info!("routing config reloaded");
    }

    pub fn set_provider_status(&self, provider: &str, available: bool) {
        self.write()
            .provider_status
            .insert(provider.to_string(), available);
    }

    /// Live availability for `provider`; unknown providers report available
    /// and disabled ones never do.
    pub fn provider_status(&self, provider: &str) -> bool {
        self.read().is_up(provider)
    }

    /// Pick a model for `request`.
    pub fn route(&self, request: &RouteRequest) -> Result<RouteResult, RouteError> {
        let state = self.read();
        let config = &state.config;
        let exclude = &request.exclude_providers;
        let complexity = assess(request.task.as_ref());

        let mut fallback = false;
        let mut fallback_reason = None;

        if let Some(preferred) = request
            .preferred_model
            .as_deref()
            .filter(|m| !m.is_empty() && *m != AUTO_MODEL)
        {
            let provider = provider_for_model(preferred);
            if state.is_available(provider, exclude) {
                debug!(role = %request.role, model = preferred, "routing to preferred model");
                return Ok(RouteResult {
                    model: preferred.to_string(),
                    provider: provider.to_string(),
                    rationale: "User-specified model preference".to_string(),
                    complexity,
                    fallback: false,
                    fallback_reason: None,
                });
            }
            fallback = true;
            fallback_reason = Some(format!("Preferred model {} unavailable", preferred));
        }

        let role = request.role.as_str();
        let (model, rationale) = if config.supports_complexity_routing(role) {
            (
                config.model_for_complexity(role, complexity),
                format!("Complexity-based routing: {} task", complexity),
            )
        } else {
            let rationale = match config.rationale(role) {
                "" => "Role-based model selection".to_string(),
                r => r.to_string(),
            };
            (config.model_for_role(role), rationale)
        };

        let provider = config
            .provider_override(role)
            .unwrap_or_else(|| provider_for_model(model));
        if state.is_available(provider, exclude) {
            debug!(role, model, provider, %complexity, "routed");
            return Ok(RouteResult {
                model: model.to_string(),
                provider: provider.to_string(),
                rationale,
                complexity,
                fallback,
                fallback_reason,
            });
        }

        for candidate in config.fallback_chain(role) {
            let fb_provider = provider_for_model(candidate);
            if state.is_available(fb_provider, exclude) {
                let reason = fallback_reason
                    .unwrap_or_else(|| format!("Primary model {} unavailable", model));
                info!(role, model = %candidate, reason = %reason, "routing to fallback model");
                return Ok(RouteResult {
                    model: candidate.clone(),
                    provider: fb_provider.to_string(),
                    rationale,
                    complexity,
                    fallback: true,
                    fallback_reason: Some(reason),
                });
            }
        }

        for (name, pc) in config.providers_by_priority() {
            if !state.is_available(name, exclude) {
                continue;
            }
            if let Some(emergency) = pc.models.first() {
                info!(role, model = %emergency, provider = name, "emergency fallback");
                return Ok(RouteResult {
                    model: emergency.clone(),
                    provider: name.to_string(),
                    rationale,
                    complexity,
                    fallback: true,
                    fallback_reason: Some(
                        "All preferred models unavailable, using emergency fallback".to_string(),
                    ),
                });
            }
        }

        Err(RouteError::NoModelAvailable {
            role: role.to_string(),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RouterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RouterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

/// Route `role` against the stock configuration.
pub fn quick_route(role: &str) -> Result<String, RouteError> {
    Router::default()
        .route(&RouteRequest::new(role))
        .map(|r| r.model)
}

/// Route `role` against the stock configuration at a fixed complexity.
pub fn route_with_complexity(role: &str, level: ComplexityLevel) -> Result<String, RouteError> {
    Router::default()
        .route(&RouteRequest::new(role).with_task(TaskSignal::preset(level)))
        .map(|r| r.model)
}
