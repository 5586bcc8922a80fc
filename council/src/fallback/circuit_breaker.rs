//! Per-provider circuit breaker.
//!
//! ```text
//!            threshold failures / rate-limit burst
//!   Closed ─────────────────────────────────────▶ Open
//!     ▲                                            │
//!     │ success                  reset_timeout     │
//!     │                          elapsed           ▼
//!     └──────────────────────────────────────── HalfOpen
//!                     failure → Open (opened_at reset)
//! ```
//!
//! Every method that depends on time takes `now` explicitly; callers in
//! [`super::manager`] pass `Utc::now()`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit breaker state for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Healthy. Requests flow.
    Closed,
    /// Tripped. The provider is excluded from routing.
    Open,
    /// Cooldown elapsed. Trial traffic allowed; next outcome decides.
    HalfOpen,
}

impl CircuitState {
    /// Whether requests may be sent to a provider in this state.
    pub fn allows_traffic(self) -> bool {
        !matches!(self, Self::Open)
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Consecutive-failure breaker for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<DateTime<Utc>>,
    last_success: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    /// Consecutive failures before the circuit opens.
    pub threshold: u32,
    /// Time spent Open before a trial is allowed.
    pub reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_success: None,
            opened_at: None,
            threshold: threshold.max(1),
            reset_timeout,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.last_failure
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Record a success. Returns the new state if it changed.
    pub fn record_success_at(&mut self, now: DateTime<Utc>) -> Option<CircuitState> {
        self.last_success = Some(now);
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.failure_count = 0;
                self.opened_at = None;
                self.state = CircuitState::Closed;
                Some(CircuitState::Closed)
            }
            CircuitState::Open => None,
        }
    }

    /// Record a failure. Returns the new state if it changed.
    pub fn record_failure_at(&mut self, now: DateTime<Utc>) -> Option<CircuitState> {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(now);
        match self.state {
            CircuitState::Closed if self.failure_count >= self.threshold => {
                self.open_at(now);
                Some(CircuitState::Open)
            }
            CircuitState::HalfOpen => {
                self.open_at(now);
                Some(CircuitState::Open)
            }
            _ => None,
        }
    }

    /// Force the circuit open from Closed or HalfOpen. Returns the new state
    /// if it changed.
    pub fn trip_at(&mut self, now: DateTime<Utc>) -> Option<CircuitState> {
        if self.state == CircuitState::Open {
            return None;
        }
        self.open_at(now);
        Some(CircuitState::Open)
    }

    /// True when Open and `reset_timeout` has elapsed since opening.
    pub fn reset_timeout_elapsed(&self, now: DateTime<Utc>) -> bool {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened)) => {
                let open_for = now.signed_duration_since(opened).to_std().unwrap_or_default();
                open_for >= self.reset_timeout
            }
            _ => false,
        }
    }

    /// Move Open → HalfOpen if the reset timeout has elapsed.
    pub fn try_half_open(&mut self, now: DateTime<Utc>) -> Option<CircuitState> {
        if self.reset_timeout_elapsed(now) {
            self.state = CircuitState::HalfOpen;
            Some(CircuitState::HalfOpen)
        } else {
            None
        }
    }

    /// Back to Closed with a clean count.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.opened_at = None;
    }

    fn open_at(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}
