//! Model Router Module
//!
//! Picks a model for a role:
//!
//! ```text
//! preferred model (if not "auto" and its provider is up)
//!   → complexity tier / flat role model
//!   → role (or default) fallback chain
//!   → emergency: first model of the highest-priority enabled provider
//!   → NoModelAvailable
//! ```
//!
//! Provider availability is a per-provider flag owned by the router and
//! flipped by [`crate::fallback::FallbackManager`] as circuits trip.

pub mod complexity;
pub mod provider;
pub mod routing;

pub use complexity::{assess, TaskSignal};
pub use provider::{provider_for_model, UNKNOWN_PROVIDER};
pub use routing::{
    quick_route, route_with_complexity, RouteError, RouteRequest, RouteResult, Router,
    SharedRouter,
};
