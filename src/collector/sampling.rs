//! Statistical collector driven by a periodic timer.
//!
//! On every tick the current leaf frame of each active context is resolved
//! and recorded as one sample. Cost is O(active contexts) per tick and does
//! not depend on how many calls the program makes.

use super::source::SamplingSource;
use super::Collector;
use crate::frame::{resolve, BoundarySpec, StackFrame};
use crate::stats::{Mode, RecordingHandle};
use crate::utils::error::CollectorError;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Takes one sample of every active context
pub struct Sampler {
    recording: RecordingHandle,
    boundary: Arc<BoundarySpec>,
    source: Arc<dyn SamplingSource>,
}

impl Sampler {
    pub fn new(
        recording: RecordingHandle,
        boundary: Arc<BoundarySpec>,
        source: Arc<dyn SamplingSource>,
    ) -> Self {
        Self {
            recording,
            boundary,
            source,
        }
    }

    /// Sample every active context once
    ///
    /// Returns how many samples were recorded. Contexts that exited between
    /// listing and sampling are skipped.
    pub fn tick(&self) -> usize {
        let mut taken = 0;
        for context in self.source.active_contexts() {
            let Some(leaf) = self.source.current_frame(context) else {
                continue;
            };
            let frames = resolve(Some(&*leaf), &self.boundary);
            if frames.is_empty() {
                continue;
            }
            if self.recording.record(frames.iter().map(|f| f.call_site()), 1) {
                taken += 1;
            }
        }
        taken
    }
}

struct Ticker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Collector ticking a [`Sampler`] on a background thread
pub struct SamplingCollector {
    sampler: Arc<Sampler>,
    source: Arc<dyn SamplingSource>,
    interval: Duration,
    ticker: Option<Ticker>,
}

impl SamplingCollector {
    pub fn new(sampler: Sampler, interval: Duration) -> Self {
        let source = Arc::clone(&sampler.source);
        Self {
            sampler: Arc::new(sampler),
            source,
            interval,
            ticker: None,
        }
    }

    /// Time between two ticks
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Take one sample now, outside the timer
    pub fn tick(&self) -> usize {
        self.sampler.tick()
    }

    fn spawn_ticker(&self) -> Result<Ticker, CollectorError> {
        let (stop, stopped) = bounded::<()>(1);
        let sampler = Arc::clone(&self.sampler);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("callscope-sampler".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        sampler.tick();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| CollectorError::SpawnFailed(e.to_string()))?;

        Ok(Ticker { stop, handle })
    }
}

impl Collector for SamplingCollector {
    fn mode(&self) -> Mode {
        Mode::sampling(self.interval)
    }

    fn attach(&mut self) -> Result<(), CollectorError> {
        if self.ticker.is_some() {
            return Ok(());
        }
        self.source.register_sampler()?;
        match self.spawn_ticker() {
            Ok(ticker) => {
                self.ticker = Some(ticker);
                info!("Sampling every {:?}", self.interval);
                Ok(())
            }
            Err(e) => {
                self.source.unregister_sampler();
                Err(e)
            }
        }
    }

    fn detach(&mut self) {
        let Some(ticker) = self.ticker.take() else {
            return;
        };
        // The ticker may already be gone if it panicked; either way, join.
        let _ = ticker.stop.send(());
        if ticker.handle.join().is_err() {
            warn!("Sampler thread panicked");
        }
        self.source.unregister_sampler();
        debug!("Sampler stopped");
    }
}

impl Drop for SamplingCollector {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::clock::ManualClock;
    use crate::frame::{CallSite, ContextId, Frame};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fixed set of stacks, one per context
    #[derive(Default)]
    struct FixedStacks {
        stacks: Mutex<HashMap<ContextId, Arc<Frame>>>,
        ghosts: Vec<ContextId>,
        registered: Mutex<bool>,
    }

    impl SamplingSource for FixedStacks {
        fn register_sampler(&self) -> Result<(), CollectorError> {
            let mut registered = self.registered.lock().unwrap();
            if *registered {
                return Err(CollectorError::SourceBusy("fixed".to_string()));
            }
            *registered = true;
            Ok(())
        }

        fn unregister_sampler(&self) {
            *self.registered.lock().unwrap() = false;
        }

        fn active_contexts(&self) -> Vec<ContextId> {
            let mut contexts: Vec<ContextId> = self.stacks.lock().unwrap().keys().copied().collect();
            contexts.extend(self.ghosts.iter().copied());
            contexts
        }

        fn current_frame(&self, context: ContextId) -> Option<Arc<Frame>> {
            self.stacks.lock().unwrap().get(&context).cloned()
        }
    }

    fn names(list: &[&str]) -> Vec<CallSite> {
        list.iter().map(|n| CallSite::named(*n)).collect()
    }

    fn collector(source: Arc<FixedStacks>, boundary: BoundarySpec) -> (SamplingCollector, RecordingHandle) {
        let interval = Duration::from_millis(10);
        let recording = RecordingHandle::new(Mode::sampling(interval), Arc::new(ManualClock::new()));
        recording.mark_running();
        let sampler = Sampler::new(recording.clone(), Arc::new(boundary), source);
        (SamplingCollector::new(sampler, interval), recording)
    }

    #[test]
    fn test_hundred_ticks_hundred_samples() {
        let source = Arc::new(FixedStacks::default());
        source.stacks.lock().unwrap().insert(
            ContextId(1),
            Frame::stack(names(&["main", "loop", "work"])).unwrap(),
        );
        let (collector, recording) = collector(source, BoundarySpec::new());

        for _ in 0..100 {
            assert_eq!(collector.tick(), 1);
        }

        let snapshot = recording.snapshot(false);
        let leaf = snapshot.find(&names(&["main", "loop", "work"])).unwrap();
        assert_eq!(leaf.own_value, 100);
        assert_eq!(snapshot.deep_value(), 100);
        assert_eq!(collector.interval(), Duration::from_millis(10));
        assert_eq!(
            snapshot.mode.value_as_duration(leaf.own_value),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_vanished_context_is_skipped() {
        let source = Arc::new(FixedStacks {
            ghosts: vec![ContextId(9)],
            ..FixedStacks::default()
        });
        source
            .stacks
            .lock()
            .unwrap()
            .insert(ContextId(1), Frame::stack(names(&["a"])).unwrap());
        let (collector, recording) = collector(source, BoundarySpec::new());

        assert_eq!(collector.tick(), 1);
        assert_eq!(recording.snapshot(false).deep_value(), 1);
    }

    #[test]
    fn test_ignored_leaf_sample_goes_to_caller() {
        let source = Arc::new(FixedStacks::default());
        source
            .stacks
            .lock()
            .unwrap()
            .insert(ContextId(1), Frame::stack(names(&["main", "memcpy"])).unwrap());
        let boundary = BoundarySpec::new().ignore_code(CallSite::named("memcpy"));
        let (collector, recording) = collector(source, boundary);

        collector.tick();
        let snapshot = recording.snapshot(false);
        assert_eq!(snapshot.find(&names(&["main"])).unwrap().own_value, 1);
    }

    #[test]
    fn test_background_ticker_samples_and_stops() {
        let source = Arc::new(FixedStacks::default());
        source
            .stacks
            .lock()
            .unwrap()
            .insert(ContextId(1), Frame::stack(names(&["spin"])).unwrap());
        let (mut collector, recording) = collector(source.clone(), BoundarySpec::new());

        collector.attach().unwrap();
        assert!(source.register_sampler().is_err());
        thread::sleep(Duration::from_millis(80));
        collector.detach();

        let taken = recording.snapshot(false).deep_value();
        assert!(taken > 0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(recording.snapshot(false).deep_value(), taken);
        assert!(source.register_sampler().is_ok());
    }
}
