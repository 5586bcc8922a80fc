//! Tracing span helpers and subscriber setup.
//!
//! Span and field names use OpenTelemetry-style dot notation so they export
//! cleanly through any OTel-aware `tracing` layer.
//!
//! # Span Hierarchy
//!
//! ```text
//! council.route              (one routing decision)
//! council.chain              (whole chain run)
//!   └─ council.chain.step    (one step)
//! council.ensemble           (fan-out + vote)
//! council.health_probe       (one provider probe)
//! ```

use tracing::Span;

// ── Span Name Constants ──────────────────────────────────────────────

pub const SPAN_ROUTE: &str = "council.route";
pub const SPAN_CHAIN: &str = "council.chain";
pub const SPAN_CHAIN_STEP: &str = "council.chain.step";
pub const SPAN_ENSEMBLE: &str = "council.ensemble";
pub const SPAN_HEALTH_PROBE: &str = "council.health_probe";

// ── Field Name Constants ─────────────────────────────────────────────

pub const FIELD_ROLE: &str = "council.role";
pub const FIELD_MODEL: &str = "council.model";
pub const FIELD_PROVIDER: &str = "council.provider";
pub const FIELD_FALLBACK: &str = "council.fallback";
pub const FIELD_STEP_NAME: &str = "council.step.name";
pub const FIELD_STEP_COUNT: &str = "council.step_count";
pub const FIELD_MODEL_COUNT: &str = "council.model_count";
pub const FIELD_VOTE_STRATEGY: &str = "council.vote.strategy";
pub const FIELD_AGREEMENT: &str = "council.vote.agreement";
pub const FIELD_SUCCESS: &str = "council.success";
pub const FIELD_DURATION_MS: &str = "council.duration_ms";
pub const FIELD_COST: &str = "council.cost";

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "council=info";

// ── Span Builders ────────────────────────────────────────────────────

/// Span for one routing decision. Fill with [`record_route_result`].
pub fn route_span(role: &str) -> Span {
    tracing::debug_span!(
        "council.route",
        "council.role" = %role,
        "council.model" = tracing::field::Empty,
        "council.provider" = tracing::field::Empty,
        "council.fallback" = tracing::field::Empty,
    )
}

pub fn record_route_result(span: &Span, model: &str, provider: &str, fallback: bool) {
    span.record("council.model", model);
    span.record("council.provider", provider);
    span.record("council.fallback", fallback);
}

/// Span for a whole chain run. Fill with [`record_chain_result`].
pub fn chain_span(step_count: usize) -> Span {
    tracing::info_span!(
        "council.chain",
        "council.step_count" = step_count as u64,
        "council.success" = tracing::field::Empty,
        "council.duration_ms" = tracing::field::Empty,
        "council.cost" = tracing::field::Empty,
    )
}

pub fn record_chain_result(span: &Span, success: bool, duration_ms: u64, cost: f64) {
    span.record("council.success", success);
    span.record("council.duration_ms", duration_ms);
    span.record("council.cost", cost);
}

/// Span for one chain step.
pub fn chain_step_span(name: &str, model: &str) -> Span {
    tracing::debug_span!(
        "council.chain.step",
        "council.step.name" = %name,
        "council.model" = %model,
    )
}

/// Span for an ensemble run. Fill with [`record_ensemble_result`].
pub fn ensemble_span(strategy: &str, model_count: usize) -> Span {
    tracing::info_span!(
        "council.ensemble",
        "council.vote.strategy" = %strategy,
        "council.model_count" = model_count as u64,
        "council.vote.agreement" = tracing::field::Empty,
        "council.success" = tracing::field::Empty,
        "council.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_ensemble_result(span: &Span, success: bool, agreement: f64, duration_ms: u64) {
    span.record("council.vote.agreement", agreement);
    span.record("council.success", success);
    span.record("council.duration_ms", duration_ms);
}

/// Span for a single provider health probe.
pub fn health_probe_span(provider: &str) -> Span {
    tracing::debug_span!(
        "council.health_probe",
        "council.provider" = %provider,
        "council.success" = tracing::field::Empty,
        "council.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_health_probe_result(span: &Span, available: bool, duration_ms: u64) {
    span.record("council.success", available);
    span.record("council.duration_ms", duration_ms);
}

// ── Subscriber ───────────────────────────────────────────────────────

/// Install a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_DIRECTIVE`]. Returns false if a subscriber was already set.
pub fn init_tracing() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
