//! Static file serving.

pub mod resolver;

pub use resolver::{serve_static, StaticResolver};
