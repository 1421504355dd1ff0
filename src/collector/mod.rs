//! Statistics collectors.
//!
//! Two strategies share one statistics tree:
//! - Tracing: exact, driven by call/return events from the host
//! - Sampling: approximate, driven by a periodic timer
//!
//! A collector only manages its registration with the host. The profiler
//! decides when the shared recording accepts data.

pub mod clock;
pub mod sampling;
pub mod source;
pub mod tracing;

use crate::stats::Mode;
use crate::utils::error::CollectorError;

// Re-export main types
pub use clock::{Clock, ClockKind, ManualClock, MonotonicClock, ProcessCpuClock, ThreadCpuClock};
pub use sampling::{Sampler, SamplingCollector};
pub use source::{SamplingSource, TraceHook, TracingSource};
pub use tracing::{TraceRecorder, TracingCollector};

/// Registration with a host event source
pub trait Collector: Send {
    /// What the collected values mean
    fn mode(&self) -> Mode;

    /// Start receiving events. A no-op when already attached.
    fn attach(&mut self) -> Result<(), CollectorError>;

    /// Stop receiving events. A no-op when not attached.
    ///
    /// Work in flight is kept, so a later `attach` picks up where this
    /// left off.
    fn detach(&mut self);

    /// Stop receiving events for good, dropping work in flight
    fn finish(&mut self) {
        self.detach();
    }
}
