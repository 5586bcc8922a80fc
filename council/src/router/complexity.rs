//! Task complexity assessment.
//!
//! An additive score over the task signal, bucketed into a [`ComplexityLevel`]:
//!
//! ```text
//! files affected   >=2 +1   >=5 +2   >=10 +3
//! lines changed   >=50 +1 >=200 +2  >=500 +3
//! architectural            +3
//! has tests                +1
//!
//! score >= 6 → high, >= 3 → medium, else low
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ComplexityLevel;

/// What the caller knows about a task before it runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignal {
    pub files_affected: u32,
    pub lines_changed: u32,
    pub is_architectural: bool,
    pub has_tests: bool,
    #[serde(default)]
    pub description: String,
}

impl TaskSignal {
    /// A representative signal that assesses to `level`.
    pub fn preset(level: ComplexityLevel) -> Self {
        match level {
            ComplexityLevel::High => Self {
                files_affected: 10,
                lines_changed: 600,
                is_architectural: true,
                has_tests: true,
                ..Default::default()
            },
            ComplexityLevel::Medium => Self {
                files_affected: 5,
                lines_changed: 200,
                has_tests: true,
                ..Default::default()
            },
            ComplexityLevel::Low => Self {
                files_affected: 1,
                lines_changed: 10,
                ..Default::default()
            },
        }
    }

    /// Raw additive score.
    pub fn score(&self) -> u32 {
        let mut score = match self.files_affected {
            n if n >= 10 => 3,
            n if n >= 5 => 2,
            n if n >= 2 => 1,
            _ => 0,
        };
        score += match self.lines_changed {
            n if n >= 500 => 3,
            n if n >= 200 => 2,
            n if n >= 50 => 1,
            _ => 0,
        };
        if self.is_architectural {
            score += 3;
        }
        if self.has_tests {
            score += 1;
        }
        score
    }
}

/// Complexity tier for an optional task signal. No signal is medium.
pub fn assess(task: Option<&TaskSignal>) -> ComplexityLevel {
    let Some(task) = task else {
        return ComplexityLevel::Medium;
    };
    match task.score() {
        s if s >= 6 => ComplexityLevel::High,
        s if s >= 3 => ComplexityLevel::Medium,
        _ => ComplexityLevel::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_signal_is_medium() {
        assert_eq!(assess(None), ComplexityLevel::Medium);
    }

    #[test]
    fn test_empty_signal_is_low() {
        assert_eq!(assess(Some(&TaskSignal::default())), ComplexityLevel::Low);
    }

    #[test]
    fn test_thresholds() {
        let medium = TaskSignal {
            files_affected: 2,
            lines_changed: 50,
            has_tests: true,
            ..Default::default()
        };
        assert_eq!(medium.score(), 3);
        assert_eq!(assess(Some(&medium)), ComplexityLevel::Medium);

        let high = TaskSignal {
            is_architectural: true,
            lines_changed: 500,
            ..Default::default()
        };
        assert_eq!(high.score(), 6);
        assert_eq!(assess(Some(&high)), ComplexityLevel::High);
    }

    #[test]
    fn test_presets_assess_to_their_level() {
        for level in [ComplexityLevel::Low, ComplexityLevel::Medium, ComplexityLevel::High] {
            assert_eq!(assess(Some(&TaskSignal::preset(level))), level);
        }
    }
}
