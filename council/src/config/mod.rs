//! Routing Configuration Model
//!
//! Declares which model each role prefers, what to fall back to, which
//! providers are enabled, and (optionally) per-complexity model tiers.
//!
//! # Layout
//!
//! ```text
//! RoutingConfig
//!   ├─ version
//!   ├─ roles      { role-name → RoleConfig { model, fallback[], complexity? } }
//!   ├─ defaults   DefaultConfig { model, fallback[] }
//!   └─ providers  { provider-name → ProviderConfig { enabled, priority, models[] } }
//! ```
//!
//! The model is data plus accessors only. Loading and saving live in
//! [`loader`]; shareable presets live in [`profiles`].

pub mod loader;
pub mod profiles;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use loader::{load_config, load_or_create, save_config, ConfigError, ConfigPaths};
pub use profiles::{Profile, ProfileMetrics};

/// Current schema version of the persisted routing configuration.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Sentinel model name meaning "let the caller decide".
pub const AUTO_MODEL: &str = "auto";

/// Task complexity tier used to pick among role-specific models.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl ComplexityLevel {
    /// Parse a tier name. Unrecognised names map to [`ComplexityLevel::Medium`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Models to use per complexity tier. Blank entries defer to the role's flat model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityConfig {
    #[serde(default)]
    pub high: String,
    #[serde(default)]
    pub medium: String,
    #[serde(default)]
    pub low: String,
}

impl ComplexityConfig {
    /// Model for `level`, or `None` when that tier is blank.
    pub fn model_for(&self, level: ComplexityLevel) -> Option<&str> {
        let model = match level {
            ComplexityLevel::High => &self.high,
            ComplexityLevel::Medium => &self.medium,
            ComplexityLevel::Low => &self.low,
        };
        if model.is_empty() {
            None
        } else {
            Some(model.as_str())
        }
    }
}

/// Model configuration for a single role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Preferred model for this role.
    #[serde(default)]
    pub model: String,

    /// Models tried in order when the preferred one is unavailable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<String>,

    /// Why this model was chosen. Informational only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rationale: String,

    /// Enables tier selection through [`RoleConfig::complexity`].
    #[serde(default)]
    pub complexity_routing: bool,

    /// Overrides provider inference for this role's primary model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<ComplexityConfig>,
}

impl RoleConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_fallback<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Enable complexity routing with the given high/medium/low models.
    pub fn with_complexity(mut self, high: &str, medium: &str, low: &str) -> Self {
        self.complexity_routing = true;
        self.complexity = Some(ComplexityConfig {
            high: high.to_string(),
            medium: medium.to_string(),
            low: low.to_string(),
        });
        self
    }
}

/// Settings applied when a role has no configuration of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultConfig {
    #[serde(default)]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<String>,
}

/// Provider-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Requests per minute. Advisory only.
    #[serde(default)]
    pub rate_limit: u32,

    /// Emergency fallback ordering; higher is preferred.
    #[serde(default)]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

impl ProviderConfig {
    pub fn enabled(priority: i32, models: &[&str]) -> Self {
        Self {
            enabled: true,
            rate_limit: 60,
            priority,
            models: models.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }
}

/// Top-level routing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub version: u32,

    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultConfig>,

    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for RoutingConfig {
    /// The stock role/model matrix.
    fn default() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            "coordinator".to_string(),
            RoleConfig::new("opus-4.5-thinking")
                .with_fallback(["sonnet-4.5", "gpt-5.2-high"])
                .with_rationale("Strategic coordination requires sustained reasoning"),
        );
        roles.insert(
            "implementer".to_string(),
            RoleConfig::new("sonnet-4.5")
                .with_fallback(["gpt-5.2", "gemini-3-flash"])
                .with_rationale("Best coding model for multi-file tasks")
                .with_complexity("opus-4.5", "sonnet-4.5", "gemini-3-flash"),
        );
        roles.insert(
            "reviewer".to_string(),
            RoleConfig::new("gpt-5.2-high")
                .with_fallback(["opus-4.5", "sonnet-4.5"])
                .with_rationale(
                    "Different model family provides fresh perspective on code review",
                ),
        );
        roles.insert(
            "monitor".to_string(),
            RoleConfig::new("gemini-3-flash")
                .with_fallback(["sonnet-4.5", "gpt-5.2"])
                .with_rationale("Fast, cost-effective monitoring"),
        );
        roles.insert(
            "lifecycle".to_string(),
            RoleConfig::new("gemini-3-flash")
                .with_fallback(["sonnet-4.5"])
                .with_rationale("Lightweight lifecycle management"),
        );
        roles.insert(
            "interactive".to_string(),
            RoleConfig::new(AUTO_MODEL).with_rationale("User preference for interactive work"),
        );

        let mut providers = BTreeMap::new();
        providers.insert(
            "anthropic".to_string(),
            ProviderConfig::enabled(
                100,
                &["opus-4.5-thinking", "opus-4.5", "sonnet-4.5", "sonnet-4.5-thinking"],
            ),
        );
        providers.insert(
            "openai".to_string(),
            ProviderConfig::enabled(90, &["gpt-5.2", "gpt-5.2-high", "gpt-5.1-codex-max", "o4-mini"]),
        );
        providers.insert(
            "google".to_string(),
            ProviderConfig::enabled(80, &["gemini-3-pro", "gemini-3-flash"]),
        );

        Self {
            version: CURRENT_CONFIG_VERSION,
            roles,
            defaults: Some(DefaultConfig {
                model: "sonnet-4.5".to_string(),
                provider: None,
                fallback: vec!["gpt-5.2".to_string(), "gemini-3-flash".to_string()],
            }),
            providers,
        }
    }
}

impl RoutingConfig {
    /// An empty configuration: no roles, no defaults, no providers.
    pub fn empty() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            roles: BTreeMap::new(),
            defaults: None,
            providers: BTreeMap::new(),
        }
    }

    /// Fill in fields a hand-written or older document may omit.
    pub fn normalize(&mut self) {
        if self.version == 0 {
            self.version = CURRENT_CONFIG_VERSION;
        }
    }

    pub fn role(&self, role: &str) -> Option<&RoleConfig> {
        self.roles.get(role)
    }

    /// Preferred model for `role`, else the default model, else `"auto"`.
    pub fn model_for_role(&self, role: &str) -> &str {
        if let Some(rc) = self.roles.get(role) {
            if !rc.model.is_empty() {
                return &rc.model;
            }
        }
        match &self.defaults {
            Some(d) if !d.model.is_empty() => &d.model,
            _ => AUTO_MODEL,
        }
    }

    /// Ordered fallback models for `role`, else the default chain.
    pub fn fallback_chain(&self, role: &str) -> &[String] {
        if let Some(rc) = self.roles.get(role) {
            if !rc.fallback.is_empty() {
                return &rc.fallback;
            }
        }
        match &self.defaults {
            Some(d) => &d.fallback,
            None => &[],
        }
    }

    pub fn rationale(&self, role: &str) -> &str {
        self.roles
            .get(role)
            .map(|rc| rc.rationale.as_str())
            .unwrap_or("")
    }

    /// True only when the role enables complexity routing *and* has tiers.
    pub fn supports_complexity_routing(&self, role: &str) -> bool {
        self.roles
            .get(role)
            .map(|rc| rc.complexity_routing && rc.complexity.is_some())
            .unwrap_or(false)
    }

    /// Tier model for `role`, falling back to the flat role model.
    pub fn model_for_complexity(&self, role: &str, level: ComplexityLevel) -> &str {
        let tiered = self
            .roles
            .get(role)
            .filter(|rc| rc.complexity_routing)
            .and_then(|rc| rc.complexity.as_ref())
            .and_then(|c| c.model_for(level));
        match tiered {
            Some(model) => model,
            None => self.model_for_role(role),
        }
    }

    /// Explicit provider override for `role`'s primary model, if configured.
    pub fn provider_override(&self, role: &str) -> Option<&str> {
        match self.roles.get(role) {
            Some(rc) => rc.provider.as_deref(),
            None => self.defaults.as_ref().and_then(|d| d.provider.as_deref()),
        }
    }

    /// Enabled providers ordered by descending priority, ties by name.
    pub fn providers_by_priority(&self) -> Vec<(&str, &ProviderConfig)> {
        let mut providers: Vec<(&str, &ProviderConfig)> = self
            .providers
            .iter()
            .filter(|(_, pc)| pc.enabled)
            .map(|(name, pc)| (name.as_str(), pc))
            .collect();
        providers.sort_by(|a, b| b.1.priority.cmp(&a.1.priority).then_with(|| a.0.cmp(b.0)));
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_ordering() {
        assert!(ComplexityLevel::Low < ComplexityLevel::Medium);
        assert!(ComplexityLevel::Medium < ComplexityLevel::High);
    }

    #[test]
    fn test_complexity_parse() {
        assert_eq!(ComplexityLevel::parse("high"), ComplexityLevel::High);
        assert_eq!(ComplexityLevel::parse("LOW"), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::parse("extreme"), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::High.to_string(), "high");
    }

    #[test]
    fn test_model_for_role_uses_defaults() {
        let config = RoutingConfig::default();
        assert_eq!(config.model_for_role("coordinator"), "opus-4.5-thinking");
        assert_eq!(config.model_for_role("nobody"), "sonnet-4.5");
        assert_eq!(RoutingConfig::empty().model_for_role("nobody"), AUTO_MODEL);
    }

    #[test]
    fn test_fallback_chain_uses_defaults() {
        let config = RoutingConfig::default();
        assert_eq!(config.fallback_chain("lifecycle"), ["sonnet-4.5".to_string()]);
        assert_eq!(
            config.fallback_chain("interactive"),
            ["gpt-5.2".to_string(), "gemini-3-flash".to_string()]
        );
        assert!(RoutingConfig::empty().fallback_chain("x").is_empty());
    }

    #[test]
    fn test_complexity_routing_requires_tiers() {
        let mut config = RoutingConfig::empty();
        let mut rc = RoleConfig::new("sonnet-4.5");
        rc.complexity_routing = true;
        config.roles.insert("implementer".into(), rc);
        assert!(!config.supports_complexity_routing("implementer"));
        assert_eq!(
            config.model_for_complexity("implementer", ComplexityLevel::High),
            "sonnet-4.5"
        );
    }

    #[test]
    fn test_blank_tier_defers_to_flat_model() {
        let mut config = RoutingConfig::empty();
        config.roles.insert(
            "implementer".into(),
            RoleConfig::new("sonnet-4.5").with_complexity("opus-4.5", "", "gemini-3-flash"),
        );
        assert_eq!(
            config.model_for_complexity("implementer", ComplexityLevel::Medium),
            "sonnet-4.5"
        );
        assert_eq!(
            config.model_for_complexity("implementer", ComplexityLevel::High),
            "opus-4.5"
        );
    }

    #[test]
    fn test_providers_by_priority() {
        let mut config = RoutingConfig::default();
        config.providers.insert("xai".into(), ProviderConfig::enabled(90, &["grok"]));
        config.providers.get_mut("google").unwrap().enabled = false;
        let names: Vec<&str> = config
            .providers_by_priority()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["anthropic", "openai", "xai"]);
    }
}
