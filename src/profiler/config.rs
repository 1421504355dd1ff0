//! Profiler session configuration.

use crate::collector::clock::{Clock, ClockKind, ProcessCpuClock};
use crate::frame::BoundarySpec;
use crate::utils::config::{DEFAULT_SAMPLING_INTERVAL, MAX_REASONABLE_ELAPSED};
use std::sync::Arc;
use std::time::Duration;

/// Settings of one profiling session
///
/// Boundary rules may differ between sessions; a session keeps the set it
/// was built with until it stops.
#[derive(Clone)]
pub struct ProfilerConfig {
    /// Where stack resolution stops and what it skips
    pub boundary: BoundarySpec,

    /// Clock timing calls under tracing
    pub timer: Arc<dyn Clock>,

    /// Clock measuring the session's CPU time
    pub cpu_clock: Arc<dyn Clock>,

    /// Time between two samples
    pub sampling_interval: Duration,

    /// Elapsed call times above this are treated as clock errors
    pub max_elapsed: Duration,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            boundary: BoundarySpec::new(),
            timer: ClockKind::default().build(),
            cpu_clock: Arc::new(ProcessCpuClock),
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            max_elapsed: MAX_REASONABLE_ELAPSED,
        }
    }
}

impl ProfilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boundary(mut self, boundary: BoundarySpec) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_timer(mut self, kind: ClockKind) -> Self {
        self.timer = kind.build();
        self
    }

    /// Time calls with a caller-supplied clock
    pub fn with_timer_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.timer = clock;
        self
    }

    pub fn with_cpu_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cpu_clock = clock;
        self
    }

    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }
}

impl std::fmt::Debug for ProfilerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilerConfig")
            .field("boundary", &self.boundary)
            .field("sampling_interval", &self.sampling_interval)
            .field("max_elapsed", &self.max_elapsed)
            .finish_non_exhaustive()
    }
}
