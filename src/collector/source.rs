//! Event sources supplied by the host runtime.
//!
//! The collectors never talk to a runtime directly. A host hands call and
//! return events to a registered [`TraceHook`], and exposes the current
//! leaf frame of every live execution context through [`SamplingSource`].

use crate::frame::{ContextId, Frame};
use crate::utils::error::CollectorError;
use std::sync::Arc;

/// Receiver of call/return events
///
/// Events of one context arrive strictly ordered and properly nested.
/// Implementations must be fast and must never panic.
pub trait TraceHook: Send + Sync {
    fn on_call(&self, context: ContextId, frame: &Frame);
    fn on_return(&self, context: ContextId, frame: &Frame);
}

/// Host capability delivering call/return events
pub trait TracingSource: Send + Sync {
    /// Register `hook`
    ///
    /// Fails with [`CollectorError::SourceBusy`] when another hook is
    /// already attached. No events are delivered before this returns Ok.
    fn attach(&self, hook: Arc<dyn TraceHook>) -> Result<(), CollectorError>;

    /// Stop delivering events to the attached hook, if any
    fn detach(&self);
}

/// Host capability exposing live stacks to a periodic sampler
pub trait SamplingSource: Send + Sync {
    /// Claim the source for one sampler
    fn register_sampler(&self) -> Result<(), CollectorError>;

    fn unregister_sampler(&self);

    /// Contexts that are currently executing
    fn active_contexts(&self) -> Vec<ContextId>;

    /// Current leaf frame of `context`, or `None` if it has gone away
    fn current_frame(&self, context: ContextId) -> Option<Arc<Frame>>;
}
