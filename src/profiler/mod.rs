//! Profiler lifecycle.
//!
//! A [`Profiler`] owns one statistics recording and exactly one collector.
//! Its state machine:
//!
//! ```text
//! Idle --start--> Running --pause--> Paused --resume--> Running
//!   \                 \                 \
//!    `----------------`--------stop------`--> Stopped (terminal)
//! ```
//!
//! Transitions into the current state are no-ops. Readers only ever see
//! snapshots copied under the recording lock.

pub mod config;

pub use config::ProfilerConfig;

use crate::collector::{
    Collector, SamplingCollector, SamplingSource, Sampler, TraceRecorder, TracingCollector,
    TracingSource,
};
use crate::stats::{Mode, RecordingHandle, Snapshot};
use crate::utils::error::ProfilerError;
use log::{debug, info};
use std::fmt;
use std::sync::Arc;

/// Where a profiler is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilerState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for ProfilerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfilerState::Idle => "idle",
            ProfilerState::Running => "running",
            ProfilerState::Paused => "paused",
            ProfilerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// One profiling session
pub struct Profiler {
    state: ProfilerState,
    collector: Box<dyn Collector>,
    recording: RecordingHandle,
}

impl Profiler {
    /// Deterministic profiler fed by `source`'s call/return events
    pub fn tracing(source: Arc<dyn TracingSource>, config: ProfilerConfig) -> Self {
        let recording = RecordingHandle::new(Mode::Tracing, config.cpu_clock);
        let recorder = TraceRecorder::new(
            recording.clone(),
            Arc::new(config.boundary),
            config.timer,
        )
        .with_max_elapsed(config.max_elapsed);
        let collector = TracingCollector::new(source, recorder);
        Self::with_collector(Box::new(collector), recording)
    }

    /// Statistical profiler sampling `source` every configured interval
    pub fn sampling(source: Arc<dyn SamplingSource>, config: ProfilerConfig) -> Self {
        let mode = Mode::sampling(config.sampling_interval);
        let recording = RecordingHandle::new(mode, config.cpu_clock);
        let sampler = Sampler::new(recording.clone(), Arc::new(config.boundary), source);
        let collector = SamplingCollector::new(sampler, config.sampling_interval);
        Self::with_collector(Box::new(collector), recording)
    }

    /// Profiler around an already built collector writing to `recording`
    pub fn with_collector(collector: Box<dyn Collector>, recording: RecordingHandle) -> Self {
        Self {
            state: ProfilerState::Idle,
            collector,
            recording,
        }
    }

    pub fn state(&self) -> ProfilerState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.collector.mode()
    }

    pub fn is_running(&self) -> bool {
        self.state == ProfilerState::Running
    }

    /// Shared handle to the session's statistics
    pub fn recording(&self) -> &RecordingHandle {
        &self.recording
    }

    /// Begin collecting
    ///
    /// **Public** - fails before anything is instrumented when the event
    /// source is already taken. Starting a paused profiler resumes it.
    pub fn start(&mut self) -> Result<(), ProfilerError> {
        match self.state {
            ProfilerState::Running => Ok(()),
            ProfilerState::Stopped => Err(ProfilerError::Finished),
            ProfilerState::Idle | ProfilerState::Paused => {
                self.collector.attach()?;
                self.recording.mark_running();
                info!("Profiler {} ({})", self.verb(), self.mode());
                self.state = ProfilerState::Running;
                Ok(())
            }
        }
    }

    fn verb(&self) -> &'static str {
        if self.state == ProfilerState::Paused {
            "resumed"
        } else {
            "started"
        }
    }

    /// Suspend collection, keeping the statistics
    pub fn pause(&mut self) -> Result<(), ProfilerError> {
        match self.state {
            ProfilerState::Paused => Ok(()),
            ProfilerState::Idle => Err(ProfilerError::NotRunning),
            ProfilerState::Stopped => Err(ProfilerError::Finished),
            ProfilerState::Running => {
                self.halt();
                self.state = ProfilerState::Paused;
                info!("Profiler paused");
                Ok(())
            }
        }
    }

    /// Continue a paused session
    pub fn resume(&mut self) -> Result<(), ProfilerError> {
        match self.state {
            ProfilerState::Running => Ok(()),
            ProfilerState::Idle => Err(ProfilerError::NotRunning),
            ProfilerState::Stopped => Err(ProfilerError::Finished),
            ProfilerState::Paused => self.start(),
        }
    }

    /// End the session
    ///
    /// Once this returns, no collector mutates the statistics again.
    pub fn stop(&mut self) {
        match self.state {
            ProfilerState::Stopped => {}
            ProfilerState::Idle => {
                self.state = ProfilerState::Stopped;
                debug!("Profiler stopped without running");
            }
            ProfilerState::Paused => {
                self.collector.finish();
                self.state = ProfilerState::Stopped;
                info!("Profiler stopped while paused");
            }
            ProfilerState::Running => {
                self.halt();
                self.collector.finish();
                self.state = ProfilerState::Stopped;
                info!("Profiler stopped");
            }
        }
    }

    fn halt(&mut self) {
        // Refuse records first, so in-flight hook calls cannot land after
        // the collector reports itself detached.
        self.recording.mark_halted();
        self.collector.detach();
    }

    /// Consistent copy of the statistics so far
    pub fn snapshot(&self) -> Snapshot {
        self.recording.snapshot(false)
    }

    /// Copy the statistics and start over from an empty tree
    pub fn snapshot_and_reset(&self) -> Snapshot {
        self.recording.snapshot(true)
    }

    /// Stop the session and return its final statistics
    pub fn result(&mut self) -> Snapshot {
        self.stop();
        self.snapshot()
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::clock::ManualClock;
    use crate::frame::{BoundarySpec, CallSite};
    use crate::host::ShadowStack;
    use crate::utils::error::CollectorError;
    use std::thread;
    use std::time::Duration;

    fn manual_config(clock: &Arc<ManualClock>) -> ProfilerConfig {
        ProfilerConfig::new()
            .with_timer_clock(clock.clone())
            .with_cpu_clock(clock.clone())
    }

    fn site(name: &str) -> CallSite {
        CallSite::named(name)
    }

    #[test]
    fn test_tracing_session_records_host_calls() {
        let host = ShadowStack::new();
        let clock = Arc::new(ManualClock::new());
        let mut profiler = Profiler::tracing(host.clone(), manual_config(&clock));

        profiler.start().unwrap();
        {
            let _main = host.enter(site("main"));
            clock.advance(Duration::from_micros(10));
            {
                let _work = host.enter(site("work"));
                clock.advance(Duration::from_micros(30));
            }
        }
        let snapshot = profiler.result();

        assert_eq!(profiler.state(), ProfilerState::Stopped);
        let main = snapshot.find(&[site("main")]).unwrap();
        assert_eq!(main.call_count, 1);
        assert_eq!(main.own_value, 10_000);
        assert_eq!(main.deep_value(), 40_000);
        assert_eq!(snapshot.find(&[site("main"), site("work")]).unwrap().own_value, 30_000);
    }

    #[test]
    fn test_transitions_into_current_state_are_noops() {
        let host = ShadowStack::new();
        let mut profiler = Profiler::tracing(host, ProfilerConfig::new());

        assert!(matches!(profiler.pause(), Err(ProfilerError::NotRunning)));
        profiler.start().unwrap();
        profiler.start().unwrap();
        assert_eq!(profiler.state(), ProfilerState::Running);
        profiler.pause().unwrap();
        profiler.pause().unwrap();
        assert_eq!(profiler.state(), ProfilerState::Paused);
        profiler.resume().unwrap();
        profiler.resume().unwrap();
        assert!(profiler.is_running());
        profiler.stop();
        profiler.stop();
        assert!(matches!(profiler.start(), Err(ProfilerError::Finished)));
    }

    #[test]
    fn test_paused_profiler_keeps_stats_and_ignores_calls() {
        let host = ShadowStack::new();
        let clock = Arc::new(ManualClock::new());
        let mut profiler = Profiler::tracing(host.clone(), manual_config(&clock));

        profiler.start().unwrap();
        host.scope(site("before"), || clock.advance(Duration::from_micros(1)));
        profiler.pause().unwrap();
        host.scope(site("during"), || clock.advance(Duration::from_micros(1)));
        profiler.resume().unwrap();
        host.scope(site("after"), || clock.advance(Duration::from_micros(1)));

        let snapshot = profiler.snapshot();
        assert!(snapshot.find(&[site("before")]).is_some());
        assert!(snapshot.find(&[site("during")]).is_none());
        assert!(snapshot.find(&[site("after")]).is_some());
        assert_eq!(snapshot.cpu_time(), Duration::from_micros(2));
    }

    #[test]
    fn test_pause_keeps_time_of_open_calls() {
        let host = ShadowStack::new();
        let clock = Arc::new(ManualClock::new());
        let mut profiler = Profiler::tracing(host.clone(), manual_config(&clock));

        profiler.start().unwrap();
        {
            let _main = host.enter(site("main"));
            clock.advance(Duration::from_millis(5));
            profiler.pause().unwrap();
            clock.advance(Duration::from_millis(100));
            profiler.resume().unwrap();
            clock.advance(Duration::from_millis(7));
        }
        let snapshot = profiler.result();

        let main = snapshot.find(&[site("main")]).unwrap();
        assert_eq!(main.call_count, 1);
        assert_eq!(main.own_value, 12_000_000);
        assert_eq!(snapshot.cpu_time(), Duration::from_millis(12));
    }

    #[test]
    fn test_conflicting_profiler_fails_at_start() {
        let host = ShadowStack::new();
        let mut first = Profiler::tracing(host.clone(), ProfilerConfig::new());
        let mut second = Profiler::tracing(host.clone(), ProfilerConfig::new());

        first.start().unwrap();
        let err = second.start().unwrap_err();
        assert!(matches!(err, ProfilerError::Collector(CollectorError::SourceBusy(_))));
        assert_eq!(second.state(), ProfilerState::Idle);

        first.stop();
        second.start().unwrap();
    }

    #[test]
    fn test_drop_releases_source() {
        let host = ShadowStack::new();
        {
            let mut profiler = Profiler::tracing(host.clone(), ProfilerConfig::new());
            profiler.start().unwrap();
        }
        let mut next = Profiler::tracing(host, ProfilerConfig::new());
        assert!(next.start().is_ok());
    }

    #[test]
    fn test_profiler_frames_excluded_by_upper_boundary() {
        let host = ShadowStack::new();
        let clock = Arc::new(ManualClock::new());
        let boundary = BoundarySpec::new().upper_code(site("profiler"));
        let mut profiler =
            Profiler::tracing(host.clone(), manual_config(&clock).with_boundary(boundary));

        profiler.start().unwrap();
        host.scope(site("profiler"), || {
            host.scope(site("user"), || clock.advance(Duration::from_micros(5)));
        });
        let snapshot = profiler.result();

        assert_eq!(snapshot.stats.len(), 1);
        assert_eq!(snapshot.find(&[site("user")]).unwrap().own_value, 5_000);
    }

    #[test]
    fn test_snapshot_and_reset_drains_between_cycles() {
        let host = ShadowStack::new();
        let clock = Arc::new(ManualClock::new());
        let mut profiler = Profiler::tracing(host.clone(), manual_config(&clock));
        profiler.start().unwrap();

        host.scope(site("first"), || clock.advance(Duration::from_micros(1)));
        let cycle_one = profiler.snapshot_and_reset();
        host.scope(site("second"), || clock.advance(Duration::from_micros(1)));
        let cycle_two = profiler.snapshot_and_reset();

        assert!(cycle_one.find(&[site("first")]).is_some());
        assert!(cycle_two.find(&[site("first")]).is_none());
        assert!(cycle_two.find(&[site("second")]).is_some());
    }

    #[test]
    fn test_sampling_session_counts_samples() {
        let host = ShadowStack::new();
        let config = ProfilerConfig::new().with_sampling_interval(Duration::from_millis(1));
        let mut profiler = Profiler::sampling(host.clone(), config);
        assert_eq!(profiler.mode(), Mode::Sampling { interval_us: 1000 });

        profiler.start().unwrap();
        host.scope(site("busy"), || thread::sleep(Duration::from_millis(50)));
        let snapshot = profiler.result();

        let busy = snapshot.find(&[site("busy")]).unwrap();
        assert!(busy.own_value > 0);
        assert_eq!(busy.own_value, snapshot.deep_value());
    }
}
