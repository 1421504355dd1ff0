//! Deterministic collector driven by call/return events.
//!
//! Every call pushes a timer for the new activation on its context's stack.
//! Every return pops it and records the activation's *own* time: elapsed
//! time minus whatever was already recorded for its direct children.
//! Frames that resolve to nothing (ignored, or outside the boundary) are
//! not recorded; their time stays with the caller's own time.

use super::clock::Clock;
use super::source::{TraceHook, TracingSource};
use super::Collector;
use crate::frame::{resolve, BoundarySpec, ContextId, Frame, FrameToken, StackFrame};
use crate::stats::{Mode, RecordingHandle};
use crate::utils::config::MAX_REASONABLE_ELAPSED;
use crate::utils::error::CollectorError;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Timer of one activation that has not returned yet
#[derive(Debug, Clone, Copy)]
struct ActiveCall {
    token: FrameToken,
    started: Duration,
    /// Elapsed time already attributed to recorded descendants
    recorded_below: Duration,
}

/// Open activations of every context
#[derive(Default)]
struct OpenCalls {
    stacks: HashMap<ContextId, Vec<ActiveCall>>,
    /// Clock reading when events stopped, while paused
    paused_at: Option<Duration>,
}

/// The hook registered with a [`TracingSource`]
pub struct TraceRecorder {
    recording: RecordingHandle,
    boundary: Arc<BoundarySpec>,
    clock: Arc<dyn Clock>,
    max_elapsed: Duration,
    enabled: AtomicBool,
    open: Mutex<OpenCalls>,
}

impl TraceRecorder {
    pub fn new(
        recording: RecordingHandle,
        boundary: Arc<BoundarySpec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            recording,
            boundary,
            clock,
            max_elapsed: MAX_REASONABLE_ELAPSED,
            enabled: AtomicBool::new(false),
            open: Mutex::new(OpenCalls::default()),
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    fn open(&self) -> MutexGuard<'_, OpenCalls> {
        match self.open.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start taking events, moving open timers past any paused span
    fn enable(&self) {
        let now = self.clock.now();
        let mut open = self.open();
        if let Some(paused_at) = open.paused_at.take() {
            let paused = now.saturating_sub(paused_at);
            open.stacks
                .values_mut()
                .flatten()
                .for_each(|call| call.started += paused);
            debug!("Shifted open calls past {:?} paused", paused);
        }
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Stop taking events, keeping the timers of open calls
    fn suspend(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        let now = self.clock.now();
        let mut open = self.open();
        if open.paused_at.is_none() {
            open.paused_at = Some(now);
        }
    }

    /// Forget every open call
    fn discard(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        let mut open = self.open();
        open.stacks.clear();
        open.paused_at = None;
    }

    /// Calls still waiting for their return on `context`
    pub fn open_calls(&self, context: ContextId) -> usize {
        self.open().stacks.get(&context).map_or(0, Vec::len)
    }

    /// Elapsed time between call and return, with clock errors clamped
    fn elapsed_since(&self, started: Duration, now: Duration, frame: &Frame) -> Duration {
        let Some(elapsed) = now.checked_sub(started) else {
            warn!("Clock went backwards while in {}, clamping to zero", frame.site());
            return Duration::ZERO;
        };
        if elapsed > self.max_elapsed {
            warn!(
                "Implausible elapsed time {:?} in {}, clamping to zero",
                elapsed,
                frame.site()
            );
            return Duration::ZERO;
        }
        elapsed
    }
}

impl TraceHook for TraceRecorder {
    fn on_call(&self, context: ContextId, frame: &Frame) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        let started = self.clock.now();
        self.open().stacks.entry(context).or_default().push(ActiveCall {
            token: frame.token(),
            started,
            recorded_below: Duration::ZERO,
        });
    }

    fn on_return(&self, context: ContextId, frame: &Frame) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        let now = self.clock.now();
        let mut open = self.open();
        let stack = open.stacks.entry(context).or_default();

        let matching = stack
            .iter()
            .rposition(|call| call.token == frame.token())
            .and_then(|position| {
                let missed = stack.len() - position - 1;
                if missed > 0 {
                    debug!("{} calls above {} never returned", missed, frame.site());
                }
                stack.truncate(position + 1);
                stack.pop()
            });
        let (elapsed, recorded_below) = match matching {
            Some(call) => (self.elapsed_since(call.started, now, frame), call.recorded_below),
            None => {
                warn!("Return from {} without a matching call", frame.site());
                (Duration::ZERO, Duration::ZERO)
            }
        };

        let frames = resolve(Some(frame), &self.boundary);
        let is_leaf = frames.last().is_some_and(|leaf| leaf.token() == frame.token());

        let recorded = is_leaf && {
            let own = elapsed.saturating_sub(recorded_below);
            let own_ns = u64::try_from(own.as_nanos()).unwrap_or(u64::MAX);
            self.recording
                .record(frames.iter().map(|f| f.site()), own_ns)
        };

        if let Some(parent) = stack.last_mut() {
            parent.recorded_below += if recorded { elapsed } else { recorded_below };
        }
        if stack.is_empty() {
            open.stacks.remove(&context);
        }
    }
}

/// Collector registering a [`TraceRecorder`] with a tracing source
pub struct TracingCollector {
    source: Arc<dyn TracingSource>,
    recorder: Arc<TraceRecorder>,
    attached: bool,
}

impl TracingCollector {
    pub fn new(source: Arc<dyn TracingSource>, recorder: TraceRecorder) -> Self {
        Self {
            source,
            recorder: Arc::new(recorder),
            attached: false,
        }
    }

    /// The hook as registered with the source
    pub fn recorder(&self) -> &Arc<TraceRecorder> {
        &self.recorder
    }
}

impl Collector for TracingCollector {
    fn mode(&self) -> Mode {
        Mode::Tracing
    }

    fn attach(&mut self) -> Result<(), CollectorError> {
        if self.attached {
            return Ok(());
        }
        let hook: Arc<dyn TraceHook> = self.recorder.clone();
        self.source.attach(hook)?;
        self.recorder.enable();
        self.attached = true;
        info!("Tracing collector attached");
        Ok(())
    }

    fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.source.detach();
        self.recorder.suspend();
        self.attached = false;
        info!("Tracing collector detached");
    }

    fn finish(&mut self) {
        self.detach();
        self.recorder.discard();
    }
}

impl Drop for TracingCollector {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::clock::ManualClock;
    use crate::frame::CallSite;
    use std::sync::RwLock;

    /// Source that forwards whatever the test feeds it
    #[derive(Default)]
    struct ScriptedSource {
        hook: RwLock<Option<Arc<dyn TraceHook>>>,
    }

    impl TracingSource for ScriptedSource {
        fn attach(&self, hook: Arc<dyn TraceHook>) -> Result<(), CollectorError> {
            let mut slot = self.hook.write().unwrap();
            if slot.is_some() {
                return Err(CollectorError::SourceBusy("scripted".to_string()));
            }
            *slot = Some(hook);
            Ok(())
        }

        fn detach(&self) {
            self.hook.write().unwrap().take();
        }
    }

    impl ScriptedSource {
        fn call(&self, frame: &Frame) {
            if let Some(hook) = self.hook.read().unwrap().as_ref() {
                hook.on_call(ContextId(1), frame);
            }
        }

        fn ret(&self, frame: &Frame) {
            if let Some(hook) = self.hook.read().unwrap().as_ref() {
                hook.on_return(ContextId(1), frame);
            }
        }
    }

    struct Fixture {
        source: Arc<ScriptedSource>,
        clock: Arc<ManualClock>,
        recording: RecordingHandle,
        collector: TracingCollector,
    }

    fn fixture(boundary: BoundarySpec) -> Fixture {
        limited_fixture(boundary, MAX_REASONABLE_ELAPSED)
    }

    fn limited_fixture(boundary: BoundarySpec, max_elapsed: Duration) -> Fixture {
        let source = Arc::new(ScriptedSource::default());
        let clock = Arc::new(ManualClock::new());
        let recording = RecordingHandle::new(Mode::Tracing, clock.clone());
        let recorder = TraceRecorder::new(recording.clone(), Arc::new(boundary), clock.clone())
            .with_max_elapsed(max_elapsed);
        let mut collector = TracingCollector::new(source.clone(), recorder);
        collector.attach().unwrap();
        recording.mark_running();
        Fixture {
            source,
            clock,
            recording,
            collector,
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn path(names: &[&str]) -> Vec<CallSite> {
        names.iter().map(|n| CallSite::named(*n)).collect()
    }

    #[test]
    fn test_own_time_excludes_children() {
        let f = fixture(BoundarySpec::new());
        let main = Frame::root(CallSite::named("main"));
        let work = Frame::called_from(&main, CallSite::named("work"));

        f.source.call(&main);
        f.clock.advance(ms(2));
        f.source.call(&work);
        f.clock.advance(ms(5));
        f.source.ret(&work);
        f.clock.advance(ms(3));
        f.source.ret(&main);

        let snapshot = f.recording.snapshot(false);
        let main_stat = snapshot.find(&path(&["main"])).unwrap();
        assert_eq!(main_stat.own_value, ms(5).as_nanos() as u64);
        assert_eq!(main_stat.call_count, 1);
        assert_eq!(main_stat.deep_value(), ms(10).as_nanos() as u64);
        let work_stat = snapshot.find(&path(&["main", "work"])).unwrap();
        assert_eq!(work_stat.own_value, ms(5).as_nanos() as u64);
        assert!(snapshot.deep_value() <= snapshot.cpu_time_ns);
    }

    #[test]
    fn test_recursion_records_three_nodes() {
        let f = fixture(BoundarySpec::new());
        let f1 = Frame::root(CallSite::named("F"));
        let f2 = Frame::called_from(&f1, CallSite::named("F"));
        let f3 = Frame::called_from(&f2, CallSite::named("F"));

        for frame in [&f1, &f2, &f3] {
            f.source.call(frame);
            f.clock.advance(ms(1));
        }
        for frame in [&f3, &f2, &f1] {
            f.source.ret(frame);
            f.clock.advance(ms(1));
        }

        let snapshot = f.recording.snapshot(false);
        for depth in 1..=3 {
            let node = snapshot.find(&path(&vec!["F"; depth])).unwrap();
            assert_eq!(node.call_count, 1);
        }
        // f1: 1ms before f2 + 1ms after f2 returned; f3: 1ms
        assert_eq!(snapshot.find(&path(&["F"])).unwrap().own_value, ms(2).as_nanos() as u64);
        assert_eq!(
            snapshot.find(&path(&["F", "F", "F"])).unwrap().own_value,
            ms(1).as_nanos() as u64
        );
        assert_eq!(snapshot.total_calls(), 3);
    }

    #[test]
    fn test_unmatched_return_is_clamped() {
        let f = fixture(BoundarySpec::new());
        let orphan = Frame::root(CallSite::named("orphan"));
        f.clock.advance(ms(7));
        f.source.ret(&orphan);

        let stat = f.recording.snapshot(false);
        let orphan_stat = stat.find(&path(&["orphan"])).unwrap();
        assert_eq!(orphan_stat.own_value, 0);
        assert_eq!(orphan_stat.call_count, 1);
    }

    #[test]
    fn test_backwards_clock_is_clamped() {
        let f = fixture(BoundarySpec::new());
        let frame = Frame::root(CallSite::named("f"));
        f.clock.set(ms(10));
        f.source.call(&frame);
        f.clock.set(ms(4));
        f.source.ret(&frame);
        assert_eq!(f.recording.snapshot(false).deep_value(), 0);
    }

    #[test]
    fn test_implausible_elapsed_is_clamped() {
        let f = limited_fixture(BoundarySpec::new(), ms(10));
        let stuck = Frame::root(CallSite::named("stuck"));
        let quick = Frame::root(CallSite::named("quick"));

        f.source.call(&stuck);
        f.clock.advance(ms(20));
        f.source.ret(&stuck);
        f.source.call(&quick);
        f.clock.advance(ms(5));
        f.source.ret(&quick);

        let snapshot = f.recording.snapshot(false);
        let stuck_stat = snapshot.find(&path(&["stuck"])).unwrap();
        assert_eq!(stuck_stat.own_value, 0);
        assert_eq!(stuck_stat.call_count, 1);
        assert_eq!(
            snapshot.find(&path(&["quick"])).unwrap().own_value,
            ms(5).as_nanos() as u64
        );
    }

    #[test]
    fn test_detached_span_is_not_charged_to_open_calls() {
        let mut f = fixture(BoundarySpec::new());
        let main = Frame::root(CallSite::named("main"));
        let work = Frame::called_from(&main, CallSite::named("work"));

        f.source.call(&main);
        f.clock.advance(ms(2));
        f.source.call(&work);
        f.clock.advance(ms(3));
        f.collector.detach();
        f.clock.advance(ms(100));
        f.collector.attach().unwrap();
        assert_eq!(f.collector.recorder().open_calls(ContextId(1)), 2);
        f.clock.advance(ms(4));
        f.source.ret(&work);
        f.clock.advance(ms(1));
        f.source.ret(&main);

        let snapshot = f.recording.snapshot(false);
        let main_stat = snapshot.find(&path(&["main"])).unwrap();
        assert_eq!(main_stat.call_count, 1);
        assert_eq!(main_stat.own_value, ms(3).as_nanos() as u64);
        assert_eq!(
            snapshot.find(&path(&["main", "work"])).unwrap().own_value,
            ms(7).as_nanos() as u64
        );
        assert_eq!(snapshot.deep_value(), ms(10).as_nanos() as u64);
    }

    #[test]
    fn test_finish_forgets_open_calls() {
        let mut f = fixture(BoundarySpec::new());
        let main = Frame::root(CallSite::named("main"));
        f.source.call(&main);
        assert_eq!(f.collector.recorder().open_calls(ContextId(1)), 1);

        f.collector.finish();
        assert_eq!(f.collector.recorder().open_calls(ContextId(1)), 0);
    }

    #[test]
    fn test_missed_returns_are_discarded() {
        let f = fixture(BoundarySpec::new());
        let outer = Frame::root(CallSite::named("outer"));
        let lost = Frame::called_from(&outer, CallSite::named("lost"));
        f.source.call(&outer);
        f.source.call(&lost);
        f.clock.advance(ms(3));
        f.source.ret(&outer);

        assert_eq!(f.collector.recorder().open_calls(ContextId(1)), 0);
        let snapshot = f.recording.snapshot(false);
        assert_eq!(snapshot.find(&path(&["outer"])).unwrap().own_value, ms(3).as_nanos() as u64);
        assert!(snapshot.find(&path(&["outer", "lost"])).is_none());
    }

    #[test]
    fn test_ignored_frame_time_stays_with_caller() {
        let f = fixture(BoundarySpec::new().ignore_code(CallSite::named("helper")));
        let main = Frame::root(CallSite::named("main"));
        let helper = Frame::called_from(&main, CallSite::named("helper"));
        let leaf = Frame::called_from(&helper, CallSite::named("leaf"));

        f.source.call(&main);
        f.source.call(&helper);
        f.clock.advance(ms(1));
        f.source.call(&leaf);
        f.clock.advance(ms(4));
        f.source.ret(&leaf);
        f.clock.advance(ms(1));
        f.source.ret(&helper);
        f.source.ret(&main);

        let snapshot = f.recording.snapshot(false);
        // leaf is recorded under main directly; helper's own 2ms goes to main
        assert_eq!(
            snapshot.find(&path(&["main", "leaf"])).unwrap().own_value,
            ms(4).as_nanos() as u64
        );
        assert_eq!(snapshot.find(&path(&["main"])).unwrap().own_value, ms(2).as_nanos() as u64);
        assert_eq!(snapshot.deep_value(), ms(6).as_nanos() as u64);
    }

    #[test]
    fn test_upper_boundary_excludes_profiler_frame() {
        let host = CallSite::named("profiler");
        let f = fixture(BoundarySpec::new().upper_code(host.clone()));
        let outer = Frame::root(host);
        let user = Frame::called_from(&outer, CallSite::named("user"));

        f.source.call(&outer);
        f.source.call(&user);
        f.clock.advance(ms(2));
        f.source.ret(&user);
        f.source.ret(&outer);

        let snapshot = f.recording.snapshot(false);
        assert_eq!(snapshot.stats.len(), 1);
        assert_eq!(&*snapshot.stats[0].site.name, "user");
    }

    #[test]
    fn test_detach_stops_recording() {
        let mut f = fixture(BoundarySpec::new());
        let frame = Frame::root(CallSite::named("f"));
        f.collector.detach();
        f.source.call(&frame);
        f.source.ret(&frame);
        assert!(f.recording.snapshot(false).is_empty());

        // a second collector may attach once the first is gone
        let other = TraceRecorder::new(
            f.recording.clone(),
            Arc::new(BoundarySpec::new()),
            f.clock.clone(),
        );
        let mut second = TracingCollector::new(f.source.clone(), other);
        assert!(second.attach().is_ok());
    }

    #[test]
    fn test_busy_source_fails_attach() {
        let f = fixture(BoundarySpec::new());
        let other = TraceRecorder::new(
            f.recording.clone(),
            Arc::new(BoundarySpec::new()),
            f.clock.clone(),
        );
        let mut second = TracingCollector::new(f.source.clone(), other);
        assert!(matches!(second.attach(), Err(CollectorError::SourceBusy(_))));
    }
}
