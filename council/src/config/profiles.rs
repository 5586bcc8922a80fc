//! Shareable routing profiles.
//!
//! A profile wraps a [`RoutingConfig`] with discovery metadata so it can be
//! exported to a JSON file, passed around, and applied to another workspace.
//! Six built-in profiles cover the common cost/quality/single-provider setups.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::loader::{save_config, write_atomic, ConfigError, ConfigPaths};
use super::{DefaultConfig, ProviderConfig, RoleConfig, RoutingConfig, CURRENT_CONFIG_VERSION};

/// Timeout for fetching a profile over HTTP.
pub const PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

const BUILTIN_AUTHOR: &str = "council";
const BUILTIN_VERSION: &str = "1.0.0";

/// A named, shareable routing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Discovery tags, matched by [`search_profiles`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub use_case: String,
    pub config: Option<RoutingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ProfileMetrics>,
}

/// Observed performance of a profile, as reported by whoever shared it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetrics {
    pub total_tasks: u64,
    pub success_rate: f64,
    pub avg_cost_per_task: f64,
    #[serde(rename = "cost_savings_percent")]
    pub cost_savings: f64,
    pub reported_issues: u64,
    pub community_rating: f64,
}

// ============================================================================
// Built-in profiles
// ============================================================================

struct RoleSet {
    coordinator: RoleConfig,
    implementer: RoleConfig,
    reviewer: RoleConfig,
    monitor: RoleConfig,
}

fn builtin(
    name: &str,
    description: &str,
    tags: &[&str],
    use_case: &str,
    roles: RoleSet,
    defaults: (&str, &[&str]),
    providers: &[(&str, bool)],
) -> Profile {
    let mut role_map = BTreeMap::new();
    role_map.insert("coordinator".to_string(), roles.coordinator);
    role_map.insert("implementer".to_string(), roles.implementer);
    role_map.insert("reviewer".to_string(), roles.reviewer);
    role_map.insert("monitor".to_string(), roles.monitor);

    let provider_map = providers
        .iter()
        .map(|(name, enabled)| {
            let pc = if *enabled {
                ProviderConfig {
                    enabled: true,
                    priority: 100,
                    ..Default::default()
                }
            } else {
                ProviderConfig::disabled()
            };
            (name.to_string(), pc)
        })
        .collect();

    Profile {
        name: name.to_string(),
        description: description.to_string(),
        author: BUILTIN_AUTHOR.to_string(),
        version: BUILTIN_VERSION.to_string(),
        created_at: None,
        updated_at: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        use_case: use_case.to_string(),
        config: Some(RoutingConfig {
            version: CURRENT_CONFIG_VERSION,
            roles: role_map,
            defaults: Some(DefaultConfig {
                model: defaults.0.to_string(),
                provider: None,
                fallback: defaults.1.iter().map(|m| m.to_string()).collect(),
            }),
            providers: provider_map,
        }),
        metrics: None,
    }
}

fn role(model: &str, fallback: &[&str], rationale: &str) -> RoleConfig {
    RoleConfig::new(model)
        .with_fallback(fallback.iter().copied())
        .with_rationale(rationale)
}

/// All built-in profiles, keyed by name.
pub fn predefined_profiles() -> BTreeMap<String, Profile> {
    let single = |only: &str| -> Vec<(&'static str, bool)> {
        ["anthropic", "openai", "google"]
            .into_iter()
            .map(|p| (p, p == only))
            .collect()
    };

    let profiles = vec![
        builtin(
            "cost-optimized",
            "Minimize costs by using cheaper models where possible",
            &["cost", "budget", "efficient"],
            "Teams on a budget who want to maximize output per dollar",
            RoleSet {
                coordinator: role(
                    "sonnet-4.5",
                    &["gpt-5.2", "gemini-3-flash"],
                    "Sonnet coordinates well at lower cost than Opus",
                ),
                implementer: role(
                    "gemini-3-flash",
                    &["gpt-5.2", "sonnet-4.5"],
                    "Flash handles routine coding tasks effectively",
                )
                .with_complexity("sonnet-4.5", "gpt-5.2", "gemini-3-flash"),
                reviewer: role("gpt-5.2", &["sonnet-4.5"], "Solid code review at moderate cost"),
                monitor: role("gemini-3-flash", &["gpt-5.2"], "Very cheap monitoring"),
            },
            ("gemini-3-flash", &["gpt-5.2", "sonnet-4.5"]),
            &[],
        ),
        builtin(
            "quality-focused",
            "Maximize output quality using flagship models",
            &["quality", "enterprise", "flagship"],
            "Critical projects where quality matters more than cost",
            RoleSet {
                coordinator: role(
                    "opus-4.5-thinking",
                    &["gpt-5.2-high", "sonnet-4.5"],
                    "Extended thinking for complex strategic decisions",
                ),
                implementer: role(
                    "sonnet-4.5",
                    &["opus-4.5", "gpt-5.2-high"],
                    "Strong coding with flagship fallbacks",
                )
                .with_complexity("opus-4.5-thinking", "sonnet-4.5", "sonnet-4.5"),
                reviewer: role(
                    "opus-4.5",
                    &["gpt-5.2-high", "sonnet-4.5"],
                    "Flagship model for thorough code review",
                ),
                monitor: role("sonnet-4.5", &["gpt-5.2"], "More capable monitoring"),
            },
            ("sonnet-4.5", &["opus-4.5", "gpt-5.2-high"]),
            &[],
        ),
        builtin(
            "balanced",
            "Balance between cost and quality (recommended default)",
            &["balanced", "default", "recommended"],
            "General purpose configuration suitable for most teams",
            RoleSet {
                coordinator: role(
                    "opus-4.5-thinking",
                    &["sonnet-4.5", "gpt-5.2-high"],
                    "Strategic coordination warrants extended thinking",
                ),
                implementer: role(
                    "sonnet-4.5",
                    &["gpt-5.2", "gemini-3-flash"],
                    "Best coding model for primary work",
                )
                .with_complexity("opus-4.5", "sonnet-4.5", "gemini-3-flash"),
                reviewer: role(
                    "gpt-5.2-high",
                    &["opus-4.5", "sonnet-4.5"],
                    "Different model family for a second perspective",
                ),
                monitor: role("gemini-3-flash", &["sonnet-4.5"], "Cheap monitoring, capable fallback"),
            },
            ("sonnet-4.5", &["gpt-5.2", "gemini-3-flash"]),
            &[],
        ),
        builtin(
            "anthropic-only",
            "Use only Anthropic models (single-provider setup)",
            &["anthropic", "single-provider", "claude"],
            "Teams with Anthropic API access only",
            RoleSet {
                coordinator: role(
                    "opus-4.5-thinking",
                    &["sonnet-4.5", "haiku-3.5"],
                    "Flagship Claude for coordination",
                ),
                implementer: role("sonnet-4.5", &["opus-4.5", "haiku-3.5"], "Sonnet for coding")
                    .with_complexity("opus-4.5", "sonnet-4.5", "haiku-3.5"),
                reviewer: role("opus-4.5", &["sonnet-4.5"], "Opus for thorough review"),
                monitor: role("haiku-3.5", &["sonnet-4.5"], "Haiku is fast and cheap"),
            },
            ("sonnet-4.5", &["opus-4.5", "haiku-3.5"]),
            &single("anthropic"),
        ),
        builtin(
            "openai-only",
            "Use only OpenAI models (single-provider setup)",
            &["openai", "single-provider", "gpt"],
            "Teams with OpenAI API access only",
            RoleSet {
                coordinator: role(
                    "gpt-5.2-high",
                    &["gpt-5.2", "gpt-4.1"],
                    "High-capacity GPT for coordination",
                ),
                implementer: role("gpt-5.2", &["gpt-5.2-high", "gpt-4.1"], "GPT-5.2 for coding")
                    .with_complexity("gpt-5.2-high", "gpt-5.2", "gpt-4.1"),
                reviewer: role("gpt-5.2-high", &["gpt-5.2"], "High-capacity review"),
                monitor: role("gpt-4.1", &["gpt-5.2"], "Efficient monitoring"),
            },
            ("gpt-5.2", &["gpt-5.2-high", "gpt-4.1"]),
            &single("openai"),
        ),
        builtin(
            "google-only",
            "Use only Google models (single-provider setup)",
            &["google", "single-provider", "gemini"],
            "Teams with Google AI access only",
            RoleSet {
                coordinator: role(
                    "gemini-3-ultra",
                    &["gemini-3-pro", "gemini-3-flash"],
                    "Ultra for strategic coordination",
                ),
                implementer: role(
                    "gemini-3-pro",
                    &["gemini-3-ultra", "gemini-3-flash"],
                    "Pro balances capability and cost",
                )
                .with_complexity("gemini-3-ultra", "gemini-3-pro", "gemini-3-flash"),
                reviewer: role("gemini-3-pro", &["gemini-3-ultra"], "Pro for code review"),
                monitor: role("gemini-3-flash", &["gemini-3-pro"], "Flash is fast and cheap"),
            },
            ("gemini-3-flash", &["gemini-3-pro", "gemini-3-ultra"]),
            &single("google"),
        ),
    ];

    profiles.into_iter().map(|p| (p.name.clone(), p)).collect()
}

/// Look up a built-in profile by name.
pub fn get_profile(name: &str) -> Option<Profile> {
    predefined_profiles().remove(name)
}

/// Names of all built-in profiles, sorted.
pub fn list_profiles() -> Vec<String> {
    predefined_profiles().into_keys().collect()
}

/// Built-in profiles with a tag containing `tag` (case-insensitive).
pub fn search_profiles(tag: &str) -> Vec<Profile> {
    let needle = tag.to_lowercase();
    predefined_profiles()
        .into_values()
        .filter(|p| p.tags.iter().any(|t| t.to_lowercase().contains(&needle)))
        .collect()
}

/// Problems that would make `profile` unusable. Empty means valid.
pub fn validate_profile(profile: &Profile) -> Vec<String> {
    let mut issues = Vec::new();

    if profile.name.is_empty() {
        issues.push("profile name is required".to_string());
    }

    let Some(config) = &profile.config else {
        issues.push("profile configuration is required".to_string());
        return issues;
    };

    for (role, rc) in &config.roles {
        if rc.model.is_empty() {
            issues.push(format!("role {:?} has no model specified", role));
        }
    }

    match &config.defaults {
        None => issues.push("profile should have default configuration".to_string()),
        Some(d) if d.model.is_empty() => issues.push("default model is required".to_string()),
        Some(_) => {}
    }

    issues
}

/// Wrap `config` as a new profile stamped with the current time.
pub fn export_profile(config: RoutingConfig, name: &str, description: &str, author: &str) -> Profile {
    let now = Utc::now();
    Profile {
        name: name.to_string(),
        description: description.to_string(),
        author: author.to_string(),
        version: BUILTIN_VERSION.to_string(),
        created_at: Some(now),
        updated_at: Some(now),
        tags: Vec::new(),
        use_case: String::new(),
        config: Some(config),
        metrics: None,
    }
}

/// Write `profile` as pretty JSON, creating parent directories.
pub fn export_profile_to_file(profile: &Profile, path: &Path) -> Result<(), ConfigError> {
    let body =
        serde_json::to_vec_pretty(profile).map_err(|e| ConfigError::Serialize(e.to_string()))?;
    write_atomic(path, &body).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a profile from a JSON file.
pub fn import_profile_from_file(path: &Path) -> Result<Profile, ConfigError> {
    let data = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| ConfigError::ParseJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Download a JSON profile from `url`.
pub async fn fetch_profile(url: &str) -> Result<Profile, ConfigError> {
    let client = reqwest::Client::builder()
        .timeout(PROFILE_FETCH_TIMEOUT)
        .build()
        .map_err(|e| ConfigError::ProfileFetch(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ConfigError::ProfileFetch(e.to_string()))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(ConfigError::ProfileFetch(format!("{}: {}", url, status)));
    }

    response
        .json::<Profile>()
        .await
        .map_err(|e| ConfigError::ProfileFetch(e.to_string()))
}

/// Import from an `http(s)://` URL or a local path.
pub async fn import_profile(source: &str) -> Result<Profile, ConfigError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        fetch_profile(source).await
    } else {
        import_profile_from_file(Path::new(source))
    }
}

/// Save the profile's configuration as the workspace's primary routing config.
pub fn apply_profile(profile: &Profile, paths: &ConfigPaths) -> Result<(), ConfigError> {
    let config = profile.config.as_ref().ok_or(ConfigError::ProfileWithoutConfig)?;
    let target = paths.primary();
    save_config(&target, config)?;
    info!(profile = %profile.name, path = %target.display(), "applied routing profile");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ComplexityLevel;

    #[test]
    fn test_builtin_profiles_are_valid() {
        let profiles = predefined_profiles();
        assert_eq!(profiles.len(), 6);
        for (name, profile) in &profiles {
            assert!(validate_profile(profile).is_empty(), "{} has issues", name);
        }
    }

    #[test]
    fn test_list_profiles_sorted() {
        assert_eq!(
            list_profiles(),
            vec![
                "anthropic-only",
                "balanced",
                "cost-optimized",
                "google-only",
                "openai-only",
                "quality-focused",
            ]
        );
    }

    #[test]
    fn test_search_profiles_case_insensitive() {
        let names: Vec<String> = search_profiles("SINGLE").into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["anthropic-only", "google-only", "openai-only"]);
        assert!(search_profiles("nonexistent-tag").is_empty());
    }

    #[test]
    fn test_single_provider_profile_disables_others() {
        let profile = get_profile("google-only").unwrap();
        let config = profile.config.unwrap();
        let enabled: Vec<&str> = config
            .providers_by_priority()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(enabled, vec!["google"]);
        assert_eq!(
            config.model_for_complexity("implementer", ComplexityLevel::High),
            "gemini-3-ultra"
        );
    }

    #[test]
    fn test_validate_reports_issues() {
        let mut profile = export_profile(RoutingConfig::empty(), "", "", "");
        profile
            .config
            .as_mut()
            .unwrap()
            .roles
            .insert("reviewer".into(), RoleConfig::default());
        let issues = validate_profile(&profile);
        assert!(issues.contains(&"profile name is required".to_string()));
        assert!(issues.contains(&"role \"reviewer\" has no model specified".to_string()));
        assert!(issues.contains(&"profile should have default configuration".to_string()));

        profile.config = None;
        assert_eq!(
            validate_profile(&profile),
            vec!["profile name is required", "profile configuration is required"]
        );
    }

    #[test]
    fn test_export_import_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared").join("team.json");
        let profile = export_profile(RoutingConfig::default(), "team", "our setup", "ops");
        export_profile_to_file(&profile, &path).unwrap();

        let loaded = import_profile_from_file(&path).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_apply_profile_writes_primary() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths::new(dir.path());
        let profile = get_profile("anthropic-only").unwrap();
        apply_profile(&profile, &paths).unwrap();

        let loaded = crate::config::load_config(&paths.primary()).unwrap();
        assert_eq!(loaded.model_for_role("monitor"), "haiku-3.5");
    }

    #[test]
    fn test_apply_profile_without_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut profile = get_profile("balanced").unwrap();
        profile.config = None;
        assert!(matches!(
            apply_profile(&profile, &ConfigPaths::new(dir.path())),
            Err(ConfigError::ProfileWithoutConfig)
        ));
    }

    #[tokio::test]
    async fn test_import_profile_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        export_profile_to_file(&get_profile("balanced").unwrap(), &path).unwrap();
        let profile = import_profile(path.to_str().unwrap()).await.unwrap();
        assert_eq!(profile.name, "balanced");
    }
}
