//! Ready-made chains and ensembles.

use std::time::Duration;

use super::chain::{ChainConfig, ChainStep};
use super::ensemble::EnsembleConfig;
use super::voting::VotingStrategy;

pub const CHAIN_PRESETS: &[&str] = &["architecture", "bug-fix", "code-review"];
pub const ENSEMBLE_PRESETS: &[&str] = &["critical-decision", "fast-consensus", "quality"];

/// A predefined chain by name.
pub fn get_chain(name: &str) -> Option<ChainConfig> {
    let config = match name {
        "code-review" => ChainConfig {
            pass_context: true,
            stop_on_error: false,
            steps: vec![
                ChainStep::new("initial-review", "sonnet-4.5")
                    .with_role("reviewer")
                    .with_prompt("Review this code for issues:\n\n{{input}}"),
                ChainStep::new("deep-analysis", "opus-4.5-thinking")
                    .with_role("reviewer")
                    .with_prompt(
                        "Based on this initial review, provide a detailed analysis:\n\n{{input}}",
                    ),
                ChainStep::new("final-summary", "gpt-5.2")
                    .with_role("reviewer")
                    .with_prompt("Summarize the code review findings concisely:\n\n{{input}}"),
            ],
        },
        "architecture" => ChainConfig {
            pass_context: true,
            stop_on_error: true,
            steps: vec![
                ChainStep::new("gather-requirements", "gemini-3-flash")
                    .with_prompt("Extract the key requirements from:\n\n{{input}}"),
                ChainStep::new("design-options", "opus-4.5-thinking").with_prompt(
                    "Based on these requirements, propose 3 architecture options:\n\n{{input}}",
                ),
                ChainStep::new("evaluate-tradeoffs", "sonnet-4.5")
                    .with_prompt("Evaluate the tradeoffs of each architecture option:\n\n{{input}}"),
                ChainStep::new("recommend", "gpt-5.2").with_prompt(
                    "Based on the analysis, recommend the best architecture:\n\n{{input}}",
                ),
            ],
        },
        "bug-fix" => ChainConfig {
            pass_context: true,
            stop_on_error: false,
            steps: vec![
                ChainStep::new("diagnose", "sonnet-4.5")
                    .with_role("implementer")
                    .with_prompt("Diagnose the root cause of this bug:\n\n{{input}}"),
                ChainStep::new("propose-fix", "gpt-5.2")
                    .with_role("implementer")
                    .with_prompt("Based on this diagnosis, propose a fix:\n\n{{input}}")
                    .with_transform("extract_code"),
                ChainStep::new("verify-fix", "gemini-3-flash")
                    .with_role("monitor")
                    .with_prompt("Verify this proposed fix addresses the bug:\n\n{{input}}"),
            ],
        },
        _ => return None,
    };
    Some(config)
}

/// A predefined ensemble by name.
pub fn get_ensemble(name: &str) -> Option<EnsembleConfig> {
    let config = match name {
        "critical-decision" => EnsembleConfig::new(
            &["opus-4.5-thinking", "gpt-5.2", "sonnet-4.5"],
            VotingStrategy::Consensus,
        )
        .with_threshold(0.66)
        .with_timeout(Duration::from_secs(120))
        .with_min_responses(2),
        "fast-consensus" => EnsembleConfig::new(
            &["sonnet-4.5", "gpt-5.2", "gemini-3-flash"],
            VotingStrategy::Majority,
        )
        .with_threshold(0.5)
        .with_timeout(Duration::from_secs(30))
        .with_min_responses(2),
        "quality" => EnsembleConfig::new(&["opus-4.5-thinking", "gpt-5.2"], VotingStrategy::Best)
            .with_timeout(Duration::from_secs(90))
            .with_min_responses(1),
        _ => return None,
    };
    Some(config)
}

/// Names of the predefined chains, sorted.
pub fn list_chains() -> Vec<&'static str> {
    CHAIN_PRESETS.to_vec()
}

/// Names of the predefined ensembles, sorted.
pub fn list_ensembles() -> Vec<&'static str> {
    ENSEMBLE_PRESETS.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_preset_resolves() {
        for name in list_chains() {
            let chain = get_chain(name).unwrap();
            assert!(!chain.steps.is_empty(), "{name}");
            assert!(chain.steps.iter().all(|s| s.prompt.contains("{{input}}")));
        }
        for name in list_ensembles() {
            let ensemble = get_ensemble(name).unwrap();
            assert!(ensemble.min_responses.unwrap() <= ensemble.models.len(), "{name}");
        }
        assert!(get_chain("nope").is_none());
        assert!(get_ensemble("nope").is_none());
    }

    #[test]
    fn test_preset_policies() {
        assert!(get_chain("architecture").unwrap().stop_on_error);
        assert!(!get_chain("code-review").unwrap().stop_on_error);

        let bug_fix = get_chain("bug-fix").unwrap();
        assert_eq!(bug_fix.steps[1].transform.as_deref(), Some("extract_code"));
        assert_eq!(bug_fix.steps[2].role, "monitor");

        let critical = get_ensemble("critical-decision").unwrap();
        assert_eq!(critical.voting_strategy, VotingStrategy::Consensus);
        assert_eq!(critical.threshold, 0.66);
        assert_eq!(critical.effective_timeout(), Duration::from_secs(120));

        let quality = get_ensemble("quality").unwrap();
        assert_eq!(quality.threshold, 0.0);
        assert_eq!(quality.required_responses(), 1);
    }
}
