//! Model routing: catalog of provider+model profiles, per-candidate circuit
//! breaker, and the planner that turns availability + preferences +
//! constraints + scores into an ordered candidate list.

pub mod breaker;
pub mod catalog;
pub mod router;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
pub use catalog::{ModelCapabilities, ModelCatalog, ModelClass, ModelProfile};
pub use router::{ModelRouter, RouteCandidate, RouteConstraints, RoutePlan, RoutePreference};
