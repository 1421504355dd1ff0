//! Clocks the collectors time calls with.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source
///
/// Readings are only ever subtracted from one another, so the epoch is
/// arbitrary.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock time since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// CPU time consumed by the whole process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessCpuClock;

impl Clock for ProcessCpuClock {
    fn now(&self) -> Duration {
        #[cfg(unix)]
        {
            cpu_clock(libc::CLOCK_PROCESS_CPUTIME_ID)
        }
        #[cfg(not(unix))]
        {
            fallback_now()
        }
    }
}

/// CPU time consumed by the calling thread
///
/// Only meaningful when every reading that gets subtracted is taken on the
/// same thread, which holds for tracing call/return pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadCpuClock;

impl Clock for ThreadCpuClock {
    fn now(&self) -> Duration {
        #[cfg(unix)]
        {
            cpu_clock(libc::CLOCK_THREAD_CPUTIME_ID)
        }
        #[cfg(not(unix))]
        {
            fallback_now()
        }
    }
}

#[cfg(unix)]
fn cpu_clock(clock_id: libc::clockid_t) -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { libc::clock_gettime(clock_id, &mut ts) };
    if rc != 0 {
        return Duration::ZERO;
    }
    Duration::new(ts.tv_sec.max(0) as u64, ts.tv_nsec.clamp(0, 999_999_999) as u32)
}

#[cfg(not(unix))]
fn fallback_now() -> Duration {
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed()
}

/// Hand-driven clock for deterministic tests and synthetic replays
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(by, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        let to = u64::try_from(to.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.store(to, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Clock selectable from configuration and the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockKind {
    #[default]
    Monotonic,
    ProcessCpu,
    ThreadCpu,
}

impl ClockKind {
    pub fn build(self) -> std::sync::Arc<dyn Clock> {
        match self {
            ClockKind::Monotonic => std::sync::Arc::new(MonotonicClock::new()),
            ClockKind::ProcessCpu => std::sync::Arc::new(ProcessCpuClock),
            ClockKind::ThreadCpu => std::sync::Arc::new(ThreadCpuClock),
        }
    }
}
