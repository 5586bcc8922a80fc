//! Provider Fallback Module
//!
//! Tracks live provider health with one circuit breaker per provider and
//! keeps the router's availability flags in sync:
//!
//! ```text
//! live outcome / probe ──▶ CircuitBreaker ──▶ Router::set_provider_status
//!                              ▲
//!          RecoveryTask ───────┘  (Open → HalfOpen → probe)
//! ```

pub mod circuit_breaker;
pub mod health;
pub mod manager;
pub mod recovery;

use std::time::Duration;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use health::{
    classify_status, default_endpoints, HealthError, HealthProbe, HttpHealthProbe, ProbeOutcome,
    ProbeStatus, ProviderHealth,
};
pub use manager::{is_rate_limit_error, FallbackManager, SharedFallbackManager};
pub use recovery::{RecoveryHandle, RecoveryTask};

/// Runtime settings for breakers, probes, and the recovery sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackSettings {
    /// Consecutive failures before a circuit opens.
    pub failure_threshold: u32,
    /// Time a circuit stays open before a trial.
    pub reset_timeout: Duration,
    /// Period of the background recovery sweep.
    pub health_check_interval: Duration,
    /// Timeout for a single health probe.
    pub probe_timeout: Duration,
    /// Rate-limit hits inside `rate_limit_window` that open a circuit.
    pub rate_limit_threshold: u32,
    pub rate_limit_window: Duration,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(5 * 60),
            probe_timeout: Duration::from_secs(10),
            rate_limit_threshold: 5,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

impl FallbackSettings {
    /// Defaults overlaid with `COUNCIL_*` environment variables.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(val) = std::env::var("COUNCIL_BREAKER_THRESHOLD") {
            if let Ok(n) = val.parse() {
                settings.failure_threshold = n;
            }
        }
        if let Some(d) = env_secs("COUNCIL_BREAKER_RESET_SECS") {
            settings.reset_timeout = d;
        }
        if let Some(d) = env_secs("COUNCIL_HEALTH_CHECK_INTERVAL_SECS") {
            settings.health_check_interval = d;
        }
        if let Some(d) = env_secs("COUNCIL_PROBE_TIMEOUT_SECS") {
            settings.probe_timeout = d;
        }

        settings
    }

    pub(crate) fn new_breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(self.failure_threshold, self.reset_timeout)
    }
}

fn env_secs(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
