//! Host runtimes that feed the collectors.

pub mod shadow;

pub use shadow::{current_context, ScopeGuard, ShadowStack};
