//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client fixed window)
//!     → headers.rs (security headers on the way out)
//!     → cors.rs (preflight + allow-origin)
//!     → limits.rs (body caps)
//!     → static files, sanitizer, routing
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod cors;
pub mod headers;
pub mod limits;
pub mod rate_limit;

pub use cors::cors_layer;
pub use headers::{security_headers_middleware, SecurityHeaders};
pub use rate_limit::{rate_limit_middleware, RateLimiterState};
