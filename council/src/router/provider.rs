//! Model name → provider family inference.

/// Provider name returned when no prefix matches.
pub const UNKNOWN_PROVIDER: &str = "unknown";

const PREFIXES: &[(&str, &[&str])] = &[
    ("anthropic", &["opus-", "sonnet-", "haiku-", "claude-"]),
    ("openai", &["gpt-", "o1-", "o3-", "o4-"]),
    ("google", &["gemini-"]),
    ("xai", &["grok-"]),
];

/// Infer the provider family for `model` by name prefix.
pub fn provider_for_model(model: &str) -> &'static str {
    if model == "grok" {
        return "xai";
    }
    PREFIXES
        .iter()
        .find(|(_, prefixes)| prefixes.iter().any(|p| model.starts_with(p)))
        .map(|(provider, _)| *provider)
        .unwrap_or(UNKNOWN_PROVIDER)
}
