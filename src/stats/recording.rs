//! The lock-guarded statistics of one profiling session.
//!
//! Collectors write through [`RecordingHandle::record`]; the publisher and
//! dump consumers only ever read a [`Snapshot`] copied under the same lock,
//! so nobody observes a tree in the middle of a mutation.

use super::snapshot::{Mode, Snapshot};
use super::tree::StatsTree;
use crate::collector::clock::Clock;
use crate::frame::CallSite;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Recording {
    tree: StatsTree,
    accepting: bool,
    wall_time: Duration,
    cpu_time: Duration,
    /// Wall and clock readings when the current running span began
    running_since: Option<(Instant, Duration)>,
}

/// Cloneable handle to a session's statistics
#[derive(Clone)]
pub struct RecordingHandle {
    mode: Mode,
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Recording>>,
}

impl RecordingHandle {
    pub fn new(mode: Mode, clock: Arc<dyn Clock>) -> Self {
        Self {
            mode,
            clock,
            inner: Arc::new(Mutex::new(Recording {
                tree: StatsTree::new(),
                accepting: false,
                wall_time: Duration::ZERO,
                cpu_time: Duration::ZERO,
                running_since: None,
            })),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        // A panic elsewhere must not take the profiled program down with it.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record `weight` at the end of `path`
    ///
    /// Returns false when the session is not accepting samples (paused or
    /// stopped); the tree is left untouched in that case.
    pub fn record<'a, I>(&self, path: I, weight: u64) -> bool
    where
        I: IntoIterator<Item = &'a CallSite>,
    {
        let mut recording = self.lock();
        if !recording.accepting {
            return false;
        }
        recording.tree.record(path, weight);
        true
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    /// Open a running span
    pub fn mark_running(&self) {
        let now = self.clock.now();
        let mut recording = self.lock();
        if recording.running_since.is_none() {
            recording.running_since = Some((Instant::now(), now));
        }
        recording.accepting = true;
    }

    /// Close the running span and refuse further records
    ///
    /// Once this returns no collector can mutate the tree until
    /// [`mark_running`](Self::mark_running) is called again.
    pub fn mark_halted(&self) {
        let now = self.clock.now();
        let mut recording = self.lock();
        recording.accepting = false;
        if let Some((wall_start, cpu_start)) = recording.running_since.take() {
            recording.wall_time += wall_start.elapsed();
            recording.cpu_time += now.saturating_sub(cpu_start);
        }
    }

    /// Copy the statistics, optionally draining them
    ///
    /// **Public** - the only read path for publishers and dumps
    ///
    /// With `reset` the tree and the accumulated times start over, so the
    /// next snapshot covers only what happened after this one.
    pub fn snapshot(&self, reset: bool) -> Snapshot {
        let now = self.clock.now();
        let mut recording = self.lock();

        let (mut wall_time, mut cpu_time) = (recording.wall_time, recording.cpu_time);
        if let Some((wall_start, cpu_start)) = recording.running_since {
            wall_time += wall_start.elapsed();
            cpu_time += now.saturating_sub(cpu_start);
        }
        let snapshot = Snapshot::of_tree(self.mode, &recording.tree, wall_time, cpu_time);

        if reset {
            debug!("Draining statistics ({} calls)", snapshot.total_calls());
            recording.tree.clear();
            recording.wall_time = Duration::ZERO;
            recording.cpu_time = Duration::ZERO;
            if recording.running_since.is_some() {
                recording.running_since = Some((Instant::now(), now));
            }
        }
        snapshot
    }

    /// Run `f` against the live tree while holding the lock
    pub fn with_tree<R>(&self, f: impl FnOnce(&StatsTree) -> R) -> R {
        f(&self.lock().tree)
    }

    /// Forget every statistic and accumulated time
    pub fn clear(&self) {
        let now = self.clock.now();
        let mut recording = self.lock();
        recording.tree.clear();
        recording.wall_time = Duration::ZERO;
        recording.cpu_time = Duration::ZERO;
        if recording.running_since.is_some() {
            recording.running_since = Some((Instant::now(), now));
        }
    }
}
