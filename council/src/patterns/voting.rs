//! Voting over ensemble responses.
//!
//! Responses are compared by their normalized output. Only successful
//! responses vote. Group ties go to the lexicographically smallest normalized
//! output and a group is represented by its member with the smallest model
//! name, so results do not depend on arrival order.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::executor::ModelResponse;

/// Confidence assumed for responses that do not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const FILLER_PREFIXES: &[&str] = &[
    "here is",
    "here's",
    "the answer is",
    "i think",
    "based on",
    "let me",
    "sure,",
    "certainly,",
];

const STRUCTURE_MARKERS: &[&str] = &["# ", "## ", "- ", "* ", "```", "1. "];

/// How an ensemble picks its winner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingStrategy {
    /// Largest group of equivalent outputs.
    #[default]
    Majority,
    /// Unanimous agreement scores 1.0; otherwise majority.
    Consensus,
    /// Groups weighted by summed confidence.
    Weighted,
    /// Highest heuristic quality score.
    Best,
}

impl std::fmt::Display for VotingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Majority => write!(f, "majority"),
            Self::Consensus => write!(f, "consensus"),
            Self::Weighted => write!(f, "weighted"),
            Self::Best => write!(f, "best"),
        }
    }
}

/// Winner index into the voted slice plus the agreement level in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteOutcome {
    pub winner: usize,
    pub agreement: f64,
}

/// Lower-case, collapse whitespace, and strip leading filler phrases.
pub fn normalize_output(output: &str) -> String {
    let mut s = output
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    for prefix in FILLER_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
        }
    }
    s.trim().to_string()
}

/// Whether the output uses headers, lists, or code fences.
pub fn has_structured_output(output: &str) -> bool {
    STRUCTURE_MARKERS.iter().any(|m| output.contains(m))
}

/// Heuristic quality score used by [`VotingStrategy::Best`].
pub fn score_response(response: &ModelResponse) -> f64 {
    let mut score = 0.0;

    if let Some(confidence) = response.confidence.filter(|c| *c > 0.0) {
        score += confidence * 0.3;
    }

    let length = response.output.chars().count();
    if length > 100 && length < 5000 {
        score += 0.2;
    } else if (50..=10_000).contains(&length) {
        score += 0.1;
    }

    let duration = response.duration;
    if !duration.is_zero() && duration < Duration::from_secs(5) {
        score += 0.2;
    } else if duration < Duration::from_secs(15) {
        score += 0.1;
    }

    if response.cost > 0.0 && response.cost < 0.01 {
        score += 0.2;
    } else if response.cost < 0.05 {
        score += 0.1;
    }

    if has_structured_output(&response.output) {
        score += 0.1;
    }

    score
}

/// Successful responses grouped by normalized output.
pub fn group_outputs(responses: &[ModelResponse]) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, r) in responses.iter().enumerate().filter(|(_, r)| r.success) {
        groups.entry(normalize_output(&r.output)).or_default().push(i);
    }
    groups
}

/// Vote counts per normalized output.
pub fn tally(responses: &[ModelResponse]) -> BTreeMap<String, usize> {
    group_outputs(responses)
        .into_iter()
        .map(|(key, members)| (key, members.len()))
        .collect()
}

/// Pick a winner among the successful `responses`. `None` when none succeeded.
pub fn vote(strategy: VotingStrategy, responses: &[ModelResponse]) -> Option<VoteOutcome> {
    match strategy {
        VotingStrategy::Majority => vote_majority(responses),
        VotingStrategy::Consensus => vote_consensus(responses),
        VotingStrategy::Weighted => vote_weighted(responses),
        VotingStrategy::Best => vote_best(responses),
    }
}

fn representative(responses: &[ModelResponse], members: &[usize]) -> usize {
    members
        .iter()
        .copied()
        .min_by(|a, b| responses[*a].model.cmp(&responses[*b].model).then(a.cmp(b)))
        .unwrap_or(0)
}

fn vote_majority(responses: &[ModelResponse]) -> Option<VoteOutcome> {
    let groups = group_outputs(responses);
    let successes: usize = groups.values().map(Vec::len).sum();

    let mut best: Option<&Vec<usize>> = None;
    for members in groups.values() {
        if best.map_or(true, |b| members.len() > b.len()) {
            best = Some(members);
        }
    }

    best.map(|members| VoteOutcome {
        winner: representative(responses, members),
        agreement: members.len() as f64 / successes as f64,
    })
}

fn vote_consensus(responses: &[ModelResponse]) -> Option<VoteOutcome> {
    let groups = group_outputs(responses);
    if groups.len() == 1 {
        let members = groups.values().next()?;
        return Some(VoteOutcome {
            winner: representative(responses, members),
            agreement: 1.0,
        });
    }
    vote_majority(responses)
}

fn vote_weighted(responses: &[ModelResponse]) -> Option<VoteOutcome> {
    let groups = group_outputs(responses);
    let weight_of = |i: &usize| {
        responses[*i]
            .confidence
            .filter(|c| *c > 0.0)
            .unwrap_or(DEFAULT_CONFIDENCE)
    };

    let mut total = 0.0;
    let mut best: Option<(&Vec<usize>, f64)> = None;
    for members in groups.values() {
        let weight: f64 = members.iter().map(weight_of).sum();
        total += weight;
        if best.map_or(true, |(_, w)| weight > w) {
            best = Some((members, weight));
        }
    }

    best.map(|(members, weight)| VoteOutcome {
        winner: representative(responses, members),
        agreement: if total > 0.0 { weight / total } else { 0.0 },
    })
}

fn vote_best(responses: &[ModelResponse]) -> Option<VoteOutcome> {
    let mut scored: Vec<(usize, f64)> = responses
        .iter()
        .enumerate()
        .filter(|(_, r)| r.success)
        .map(|(i, r)| (i, score_response(r)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| responses[a.0].model.cmp(&responses[b.0].model))
            .then(a.0.cmp(&b.0))
    });

    let (winner, top) = *scored.first()?;
    let agreement = match scored.get(1) {
        Some((_, runner_up)) => (0.5 + (top - runner_up) * 0.5).min(1.0),
        None => 1.0,
    };
    Some(VoteOutcome { winner, agreement })
}
