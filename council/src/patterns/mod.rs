//! Multi-Model Execution Patterns
//!
//! ```text
//! Chain:     input ─▶ step 1 ─▶ step 2 ─▶ … ─▶ final_output
//! Ensemble:  prompt ─┬▶ model A ─┐
//!                    ├▶ model B ─┼▶ vote ─▶ winner
//!                    └▶ model C ─┘
//! ```
//!
//! Patterns never call providers directly; they go through a
//! [`ModelExecutor`] supplied by the caller.

pub mod chain;
pub mod ensemble;
pub mod executor;
pub mod presets;
pub mod transform;
pub mod voting;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use chain::{ChainConfig, ChainExecutor, ChainResult, ChainStep, StepResult};
pub use ensemble::{EnsembleConfig, EnsembleExecutor, EnsembleResult};
pub use executor::{
    ExecutionObserver, ModelExecutor, ModelResponse, SharedExecutor, SharedObserver,
};
pub use transform::Transform;
pub use voting::{vote, VoteOutcome, VotingStrategy};

/// Orchestration pattern for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// One routed model.
    #[default]
    Single,
    /// Output flows through a sequence of models.
    Chain,
    /// Models run in parallel and vote.
    Ensemble,
    /// Models are tried in order until one succeeds.
    Fallback,
    /// Routed to a model specialized for the task type.
    Specialist,
}

impl Pattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Chain => "chain",
            Self::Ensemble => "ensemble",
            Self::Fallback => "fallback",
            Self::Specialist => "specialist",
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "chain" => Ok(Self::Chain),
            "ensemble" => Ok(Self::Ensemble),
            "fallback" => Ok(Self::Fallback),
            "specialist" => Ok(Self::Specialist),
            other => Err(format!("unknown pattern: {}", other)),
        }
    }
}
