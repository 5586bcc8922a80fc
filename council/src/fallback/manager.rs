//! Fallback manager: live provider health on top of the router.
//!
//! One [`CircuitBreaker`] per configured provider, plus a trailing window of
//! rate-limit hits. Breaker transitions are mirrored into the router's
//! provider status so plain `Router::route` calls see them too.
//!
//! Lock order is always manager → router; the router never calls back.
//! No lock is held across a health probe.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, warn, Instrument};

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use super::health::{HealthError, HealthProbe, HttpHealthProbe, ProbeStatus, ProviderHealth};
use super::FallbackSettings;
use crate::config::RoutingConfig;
use crate::otel;
use crate::router::{RouteError, RouteRequest, RouteResult, SharedRouter};

static RATE_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)rate[\s_-]?limit|\b429\b|too many requests")
        .expect("RATE_LIMIT_RE regex should compile")
});

/// Whether an error message indicates rate limiting rather than an outage.
pub fn is_rate_limit_error(message: &str) -> bool {
    RATE_LIMIT_RE.is_match(message)
}

#[derive(Default)]
struct ManagerState {
    breakers: BTreeMap<String, CircuitBreaker>,
    last_checked: HashMap<String, DateTime<Utc>>,
    rate_windows: HashMap<String, VecDeque<DateTime<Utc>>>,
    rate_limit_hits: HashMap<String, u32>,
}

/// Shared reference to a [`FallbackManager`].
pub type SharedFallbackManager = Arc<FallbackManager>;

/// Circuit-breaking wrapper around a shared [`Router`](crate::router::Router).
pub struct FallbackManager {
    router: SharedRouter,
    probe: Arc<dyn HealthProbe>,
    settings: FallbackSettings,
    state: RwLock<ManagerState>,
}

impl FallbackManager {
    /// Create a manager with a closed breaker for every configured provider.
    pub fn new(router: SharedRouter, probe: Arc<dyn HealthProbe>, settings: FallbackSettings) -> Self {
        let mut state = ManagerState::default();
        for provider in router.config().providers.keys() {
            state
                .breakers
                .insert(provider.clone(), settings.new_breaker());
        }
        Self {
            router,
            probe,
            settings,
            state: RwLock::new(state),
        }
    }

    /// Create a manager that probes providers over HTTP.
    pub fn with_http_probe(router: SharedRouter, settings: FallbackSettings) -> Result<Self, HealthError> {
        let probe = HttpHealthProbe::new(settings.probe_timeout)?;
        Ok(Self::new(router, Arc::new(probe), settings))
    }

    pub fn shared(self) -> SharedFallbackManager {
        Arc::new(self)
    }

    pub fn router(&self) -> &SharedRouter {
        &self.router
    }

    pub fn settings(&self) -> &FallbackSettings {
        &self.settings
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Route with every open-circuit provider excluded.
    ///
    /// Breakers whose reset timeout has passed are promoted to half-open
    /// first, so trial traffic does not have to wait for the next sweep.
    pub fn route_with_fallback(&self, request: &RouteRequest) -> Result<RouteResult, RouteError> {
        let span = otel::route_span(&request.role);
        let _enter = span.enter();
        self.promote_expired_at(Utc::now());

        let mut request = request.clone();
        {
            let state = self.read();
            for (provider, cb) in &state.breakers {
                if cb.state() == CircuitState::Open && !request.exclude_providers.contains(provider) {
                    request.exclude_providers.push(provider.clone());
                }
            }
        }
        let result = self.router.route(&request);
        if let Ok(route) = &result {
            otel::record_route_result(&span, &route.model, &route.provider, route.fallback);
        }
        result
    }

    /// Providers whose circuit is Closed or HalfOpen, sorted by name.
    pub fn available_providers(&self) -> Vec<String> {
        self.read()
            .breakers
            .iter()
            .filter(|(_, cb)| cb.state().allows_traffic())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Snapshot of the breaker for `provider`.
    pub fn breaker(&self, provider: &str) -> Option<CircuitBreaker> {
        self.read().breakers.get(provider).cloned()
    }

    // ========================================================================
    // Outcome recording
    // ========================================================================

    /// Feed a live request outcome into the breaker for `provider`.
    pub fn record_request_outcome(&self, provider: &str, success: bool, error: Option<&str>) {
        if success {
            self.record_success(provider);
        } else if error.is_some_and(is_rate_limit_error) {
            self.record_rate_limit(provider);
        } else {
            self.record_failure(provider);
        }
    }

    pub fn record_success(&self, provider: &str) {
        self.record_success_at(provider, Utc::now());
    }

    pub fn record_failure(&self, provider: &str) {
        self.record_failure_at(provider, Utc::now());
    }

    pub fn record_rate_limit(&self, provider: &str) {
        self.record_rate_limit_at(provider, Utc::now());
    }

    pub fn record_success_at(&self, provider: &str, now: DateTime<Utc>) {
        let mut state = self.write();
        let Some(cb) = state.breakers.get_mut(provider) else {
            debug!(provider, "success for untracked provider ignored");
            return;
        };
        if let Some(next) = cb.record_success_at(now) {
            self.apply_transition(provider, next);
        }
    }

    pub fn record_failure_at(&self, provider: &str, now: DateTime<Utc>) {
        let mut state = self.write();
        let Some(cb) = state.breakers.get_mut(provider) else {
            debug!(provider, "failure for untracked provider ignored");
            return;
        };
        if let Some(next) = cb.record_failure_at(now) {
            self.apply_transition(provider, next);
        }
    }

    /// Count a rate-limit hit. A burst inside the trailing window opens a
    /// closed circuit; any hit re-opens a half-open one.
    pub fn record_rate_limit_at(&self, provider: &str, now: DateTime<Utc>) {
        let mut guard = self.write();
        let state = &mut *guard;

        *state.rate_limit_hits.entry(provider.to_string()).or_default() += 1;

        let window = state.rate_windows.entry(provider.to_string()).or_default();
        window.push_back(now);
        let window_len = chrono::Duration::from_std(self.settings.rate_limit_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let cutoff = now - window_len;
        while window.front().is_some_and(|t| *t <= cutoff) {
            window.pop_front();
        }
        let hits = window.len();
        let burst = hits >= self.settings.rate_limit_threshold as usize;

        let Some(cb) = state.breakers.get_mut(provider) else {
            return;
        };
        let next = match cb.state() {
            CircuitState::HalfOpen => cb.trip_at(now),
            CircuitState::Closed if burst => cb.trip_at(now),
            _ => None,
        };
        if let Some(next) = next {
            warn!(provider, hits, "rate limit burst");
            self.apply_transition(provider, next);
        }
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Promote every Open breaker whose reset timeout has elapsed to HalfOpen.
    /// Returns the promoted providers.
    pub fn promote_expired(&self) -> Vec<String> {
        self.promote_expired_at(Utc::now())
    }

    pub fn promote_expired_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut state = self.write();
        let mut promoted = Vec::new();
        for (provider, cb) in state.breakers.iter_mut() {
            if let Some(next) = cb.try_half_open(now) {
                self.apply_transition(provider, next);
                promoted.push(provider.clone());
            }
        }
        promoted
    }

    /// Promote expired breakers, then probe every half-open one, including
    /// those already promoted by routing. A healthy probe closes the circuit;
    /// anything else, a probe error included, re-opens it.
    pub async fn maybe_recover(&self) -> Vec<String> {
        self.promote_expired();
        let to_test: Vec<String> = self
            .read()
            .breakers
            .iter()
            .filter(|(_, cb)| cb.state() == CircuitState::HalfOpen)
            .map(|(name, _)| name.clone())
            .collect();

        for provider in &to_test {
            match self.check_health(provider).await {
                Ok(health) => debug!(
                    provider = %provider,
                    available = health.available,
                    state = %health.circuit_state,
                    "recovery probe"
                ),
                Err(e) => {
                    warn!("Recovery probe for {} failed: {}", provider, e);
                    self.record_failure(provider);
                }
            }
        }
        to_test
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Probe `provider` and fold the outcome into its breaker.
    pub async fn check_health(&self, provider: &str) -> Result<ProviderHealth, HealthError> {
        let span = otel::health_probe_span(provider);
        let outcome = self.probe.probe(provider).instrument(span.clone()).await?;
        otel::record_health_probe_result(
            &span,
            outcome.status == ProbeStatus::Available,
            outcome.response_time.as_millis() as u64,
        );
        let now = Utc::now();

        match outcome.status {
            ProbeStatus::Available => self.record_success_at(provider, now),
            ProbeStatus::RateLimited => self.record_rate_limit_at(provider, now),
            ProbeStatus::Unavailable => self.record_failure_at(provider, now),
        }

        let mut state = self.write();
        state.last_checked.insert(provider.to_string(), now);
        let (circuit_state, failure_count) = state
            .breakers
            .get(provider)
            .map(|cb| (cb.state(), cb.failure_count()))
            .unwrap_or((CircuitState::Closed, 0));

        Ok(ProviderHealth {
            provider: provider.to_string(),
            available: outcome.status == ProbeStatus::Available,
            last_checked: now,
            response_time_ms: outcome.response_time.as_millis() as u64,
            failure_count,
            circuit_state,
            rate_limit_hits: state.rate_limit_hits.get(provider).copied().unwrap_or(0),
        })
    }

    /// Probe every configured provider. Probe errors yield an unavailable
    /// snapshot instead of failing the whole sweep.
    pub async fn all_health(&self) -> BTreeMap<String, ProviderHealth> {
        let providers: Vec<String> = self.read().breakers.keys().cloned().collect();
        let mut result = BTreeMap::new();
        for provider in providers {
            let health = match self.check_health(&provider).await {
                Ok(health) => health,
                Err(e) => {
                    debug!(provider = %provider, error = %e, "health check skipped");
                    self.unavailable_snapshot(&provider)
                }
            };
            result.insert(provider, health);
        }
        result
    }

    fn unavailable_snapshot(&self, provider: &str) -> ProviderHealth {
        let state = self.read();
        let cb = state.breakers.get(provider);
        ProviderHealth {
            provider: provider.to_string(),
            available: false,
            last_checked: Utc::now(),
            response_time_ms: 0,
            failure_count: cb.map(|cb| cb.failure_count()).unwrap_or(0),
            circuit_state: cb.map(|cb| cb.state()).unwrap_or(CircuitState::Closed),
            rate_limit_hits: state.rate_limit_hits.get(provider).copied().unwrap_or(0),
        }
    }

    /// When `provider` was last probed.
    pub fn last_checked(&self, provider: &str) -> Option<DateTime<Utc>> {
        self.read().last_checked.get(provider).copied()
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Close every breaker and clear rate-limit windows.
    pub fn reset(&self) {
        let mut state = self.write();
        for (provider, cb) in state.breakers.iter_mut() {
            cb.reset();
            self.router.set_provider_status(provider, true);
        }
        state.rate_windows.clear();
        state.rate_limit_hits.clear();
        info!("all circuit breakers reset");
    }

    /// Reload the router config and start tracking any new providers.
    pub fn reload_config(&self, config: RoutingConfig) {
        let mut state = self.write();
        for provider in config.providers.keys() {
            state
                .breakers
                .entry(provider.clone())
                .or_insert_with(|| self.settings.new_breaker());
        }
        self.router.reload_config(config);
    }

    fn apply_transition(&self, provider: &str, next: CircuitState) {
        match next {
            CircuitState::Open => warn!(provider, "circuit opened"),
            CircuitState::HalfOpen => info!(provider, "circuit half-open, allowing trial traffic"),
            CircuitState::Closed => info!(provider, "circuit closed"),
        }
        self.router
            .set_provider_status(provider, next.allows_traffic());
    }

    fn read(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::health::ProbeOutcome;
    use crate::router::Router;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedProbe(Mutex<ProbeStatus>);

    #[async_trait]
    impl HealthProbe for FixedProbe {
        async fn probe(&self, _provider: &str) -> Result<ProbeOutcome, HealthError> {
            Ok(ProbeOutcome {
                status: *self.0.lock().unwrap(),
                response_time: Duration::from_millis(5),
            })
        }
    }

    fn manager(status: ProbeStatus) -> FallbackManager {
        let router = Router::default().shared();
        let settings = FallbackSettings {
            failure_threshold: 2,
            ..Default::default()
        };
        FallbackManager::new(router, Arc::new(FixedProbe(Mutex::new(status))), settings)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_rate_limit_classification() {
        assert!(is_rate_limit_error("Rate limit exceeded"));
        assert!(is_rate_limit_error("HTTP 429"));
        assert!(is_rate_limit_error("Too Many Requests"));
        assert!(is_rate_limit_error("rate_limit_error"));
        assert!(!is_rate_limit_error("connection reset"));
    }

    #[test]
    fn test_breakers_seeded_from_config() {
        let fm = manager(ProbeStatus::Available);
        assert_eq!(fm.available_providers(), vec!["anthropic", "google", "openai"]);
        assert_eq!(fm.breaker("openai").unwrap().state(), CircuitState::Closed);
        assert!(fm.breaker("xai").is_none());
    }

    #[test]
    fn test_open_circuit_excluded_from_routing() {
        let fm = manager(ProbeStatus::Available);
        fm.record_failure_at("anthropic", Utc::now());
        fm.record_failure_at("anthropic", Utc::now());
        assert_eq!(fm.breaker("anthropic").unwrap().state(), CircuitState::Open);
        assert!(!fm.router().provider_status("anthropic"));

        let result = fm
            .route_with_fallback(&RouteRequest::new("coordinator"))
            .unwrap();
        assert_eq!(result.provider, "openai");
        assert!(result.fallback);
    }

    #[test]
    fn test_rate_limit_burst_opens_circuit() {
        let fm = manager(ProbeStatus::Available);
        for i in 0..4 {
            fm.record_rate_limit_at("openai", t0() + chrono::Duration::seconds(i));
        }
        assert_eq!(fm.breaker("openai").unwrap().state(), CircuitState::Closed);
        fm.record_rate_limit_at("openai", t0() + chrono::Duration::seconds(10));
        assert_eq!(fm.breaker("openai").unwrap().state(), CircuitState::Open);
    }

    #[test]
    fn test_rate_limits_outside_window_do_not_open() {
        let fm = manager(ProbeStatus::Available);
        for i in 0..5 {
            fm.record_rate_limit_at("google", t0() + chrono::Duration::seconds(i * 30));
        }
        assert_eq!(fm.breaker("google").unwrap().state(), CircuitState::Closed);
    }

    #[test]
    fn test_outcome_routing() {
        let fm = manager(ProbeStatus::Available);
        fm.record_request_outcome("google", false, Some("429 Too Many Requests"));
        assert_eq!(fm.breaker("google").unwrap().failure_count(), 0);
        fm.record_request_outcome("google", false, Some("boom"));
        assert_eq!(fm.breaker("google").unwrap().failure_count(), 1);
        fm.record_request_outcome("google", true, None);
        assert_eq!(fm.breaker("google").unwrap().failure_count(), 0);
    }

    #[test]
    fn test_promote_expired_sets_half_open() {
        let fm = manager(ProbeStatus::Available);
        fm.record_failure_at("openai", t0());
        fm.record_failure_at("openai", t0());
        assert!(fm.promote_expired_at(t0() + chrono::Duration::seconds(10)).is_empty());
        let promoted = fm.promote_expired_at(t0() + chrono::Duration::seconds(30));
        assert_eq!(promoted, vec!["openai"]);
        assert_eq!(fm.breaker("openai").unwrap().state(), CircuitState::HalfOpen);
        assert!(fm.router().provider_status("openai"));
    }

    #[tokio::test]
    async fn test_check_health_closes_half_open() {
        let fm = manager(ProbeStatus::Available);
        fm.record_failure_at("openai", t0());
        fm.record_failure_at("openai", t0());
        fm.promote_expired_at(t0() + chrono::Duration::seconds(31));

        let health = fm.check_health("openai").await.unwrap();
        assert!(health.available);
        assert_eq!(health.circuit_state, CircuitState::Closed);
        assert_eq!(health.response_time_ms, 5);
        assert!(fm.last_checked("openai").is_some());
    }

    #[tokio::test]
    async fn test_failed_recovery_probe_reopens() {
        let fm = manager(ProbeStatus::Unavailable);
        let long_ago = Utc::now() - chrono::Duration::minutes(5);
        fm.record_failure_at("google", long_ago);
        fm.record_failure_at("google", long_ago);

        let tested = fm.maybe_recover().await;
        assert_eq!(tested, vec!["google"]);
        let cb = fm.breaker("google").unwrap();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.opened_at().unwrap() > long_ago);
        assert!(!fm.router().provider_status("google"));
    }

    #[tokio::test]
    async fn test_rate_limited_probe_counts_hit() {
        let fm = manager(ProbeStatus::RateLimited);
        let health = fm.check_health("anthropic").await.unwrap();
        assert!(!health.available);
        assert_eq!(health.rate_limit_hits, 1);
        assert_eq!(health.circuit_state, CircuitState::Closed);
    }

    #[test]
    fn test_reset_closes_everything() {
        let fm = manager(ProbeStatus::Available);
        fm.record_failure("google");
        fm.record_failure("google");
        fm.record_rate_limit("openai");
        fm.reset();
        assert_eq!(fm.available_providers().len(), 3);
        assert!(fm.router().provider_status("google"));
        assert_eq!(fm.breaker("google").unwrap().failure_count(), 0);
    }

    #[test]
    fn test_reset_keeps_disabled_provider_out_of_routing() {
        let mut config = RoutingConfig::default();
        config.providers.get_mut("google").unwrap().enabled = false;
        let router = Router::new(config).shared();
        let fm = FallbackManager::new(
            router,
            Arc::new(FixedProbe(Mutex::new(ProbeStatus::Available))),
            FallbackSettings::default(),
        );

        let before = fm.route_with_fallback(&RouteRequest::new("monitor")).unwrap();
        assert_ne!(before.provider, "google");
        fm.reset();
        let after = fm.route_with_fallback(&RouteRequest::new("monitor")).unwrap();
        assert_ne!(after.provider, "google");
        assert!(!fm.router().provider_status("google"));
    }

    #[tokio::test]
    async fn test_recovery_probes_breakers_promoted_by_routing() {
        let fm = manager(ProbeStatus::Available);
        let long_ago = Utc::now() - chrono::Duration::minutes(5);
        fm.record_failure_at("anthropic", long_ago);
        fm.record_failure_at("anthropic", long_ago);

        fm.route_with_fallback(&RouteRequest::new("coordinator")).unwrap();
        assert_eq!(fm.breaker("anthropic").unwrap().state(), CircuitState::HalfOpen);

        assert_eq!(fm.maybe_recover().await, vec!["anthropic"]);
        assert_eq!(fm.breaker("anthropic").unwrap().state(), CircuitState::Closed);
    }

    /// Has no endpoint for any provider.
    struct NoEndpoints;

    #[async_trait]
    impl HealthProbe for NoEndpoints {
        async fn probe(&self, provider: &str) -> Result<ProbeOutcome, HealthError> {
            Err(HealthError::UnknownProvider(provider.to_string()))
        }
    }

    #[tokio::test]
    async fn test_probe_error_reopens_half_open_breaker() {
        let router = Router::default().shared();
        let settings = FallbackSettings {
            failure_threshold: 1,
            ..Default::default()
        };
        let fm = FallbackManager::new(router, Arc::new(NoEndpoints), settings);
        let long_ago = Utc::now() - chrono::Duration::minutes(5);
        fm.record_failure_at("openai", long_ago);

        assert_eq!(fm.maybe_recover().await, vec!["openai"]);
        let cb = fm.breaker("openai").unwrap();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.opened_at().unwrap() > long_ago);
        assert!(!fm.router().provider_status("openai"));
    }

    #[test]
    fn test_reload_adds_breakers() {
        let fm = manager(ProbeStatus::Available);
        let mut config = RoutingConfig::default();
        config
            .providers
            .insert("xai".into(), crate::config::ProviderConfig::enabled(10, &["grok"]));
        fm.reload_config(config);
        assert_eq!(fm.breaker("xai").unwrap().state(), CircuitState::Closed);
        assert!(fm.router().config().providers.contains_key("xai"));
    }
}
