//! Payload sanitization subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → payload.rs (body / query / path segments → IncomingPayload)
//!     → markup.rs (strip markup from every string leaf, write back)
//!     → operator.rs (reject `$` / `.` keys, 400 on hit)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Markup pass fails open, operator pass fails closed
//! - Markup runs first and never alters keys
//! - Bracket-notation query and form keys are expanded before either pass

pub mod form;
pub mod markup;
pub mod middleware;
pub mod operator;
pub mod payload;

pub use markup::MarkupSanitizer;
pub use middleware::{reject_operator_keys, sanitize_markup, SanitizeState};
pub use operator::InjectionDetected;
pub use payload::{IncomingPayload, PayloadBody};
