//! Fan-out of statistics snapshots to connected viewers.
//!
//! Each viewer owns a bounded queue. Publishing never blocks: when a
//! viewer's queue is full its oldest pending update is dropped and the
//! viewer gets a full snapshot on the next cycle. A viewer whose receiving
//! end is gone is forgotten on the next publish.

use super::protocol::ServerMessage;
use crate::stats::{RecordingHandle, Snapshot};
use crate::utils::config::{DEFAULT_PUBLISH_INTERVAL, VIEWER_QUEUE_CAPACITY};
use crate::utils::error::CollectorError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Publisher settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Time between two publish cycles
    pub interval: Duration,

    /// Drain the statistics after every cycle (live profiling)
    pub reset_each_cycle: bool,

    /// Pending updates kept per viewer
    pub queue_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PUBLISH_INTERVAL,
            reset_each_cycle: false,
            queue_capacity: VIEWER_QUEUE_CAPACITY,
        }
    }
}

impl PublisherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_reset_each_cycle(mut self, reset: bool) -> Self {
        self.reset_each_cycle = reset;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Outcome of one publish cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub seq: u64,
    pub delivered: usize,
    /// Viewers that lost an older update to make room
    pub overflowed: usize,
    pub disconnected: usize,
}

struct ViewerSlot {
    id: u64,
    label: String,
    sender: Sender<ServerMessage>,
    /// Publisher-side handle on the same queue, used to drop the oldest entry
    drain: Receiver<ServerMessage>,
    /// Dead once the viewer's link is dropped
    alive: Weak<()>,
    needs_full: bool,
}

enum Delivery {
    Delivered,
    Overflowed,
    Disconnected,
}

impl ViewerSlot {
    fn offer(&mut self, message: ServerMessage) -> Delivery {
        if self.alive.strong_count() == 0 {
            return Delivery::Disconnected;
        }
        let message = match self.sender.try_send(message) {
            Ok(()) => return Delivery::Delivered,
            Err(TrySendError::Disconnected(_)) => return Delivery::Disconnected,
            Err(TrySendError::Full(message)) => message,
        };

        match self.drain.try_recv() {
            Ok(_) | Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Delivery::Disconnected,
        }
        if !matches!(message, ServerMessage::Full { .. }) {
            self.needs_full = true;
        }
        match self.sender.try_send(message) {
            Ok(()) | Err(TrySendError::Full(_)) => Delivery::Overflowed,
            Err(TrySendError::Disconnected(_)) => Delivery::Disconnected,
        }
    }
}

#[derive(Default)]
struct PublisherState {
    seq: u64,
    last: Option<Snapshot>,
    viewers: Vec<ViewerSlot>,
    next_id: u64,
    closed: bool,
}

/// Receiving end of one viewer's queue
///
/// Dropping it disconnects the viewer.
pub struct ViewerLink {
    id: u64,
    label: String,
    updates: Receiver<ServerMessage>,
    _alive: Arc<()>,
}

impl ViewerLink {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn updates(&self) -> &Receiver<ServerMessage> {
        &self.updates
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ServerMessage, RecvTimeoutError> {
        self.updates.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<ServerMessage, TryRecvError> {
        self.updates.try_recv()
    }
}

/// Delivers snapshots to every connected viewer
pub struct Publisher {
    config: PublisherConfig,
    state: Mutex<PublisherState>,
}

impl Publisher {
    pub fn new(config: PublisherConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(PublisherState::default()),
        })
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a new viewer
    ///
    /// The viewer's first update is the latest full snapshot, when one has
    /// been published already.
    pub fn connect(&self, label: impl Into<String>) -> ViewerLink {
        let label = label.into();
        let (sender, updates) = bounded(self.config.queue_capacity);
        let alive = Arc::new(());
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;

        if state.closed {
            debug!("Publisher closed, refusing viewer {}", label);
            return ViewerLink {
                id,
                label,
                updates,
                _alive: alive,
            };
        }

        let mut slot = ViewerSlot {
            id,
            label: label.clone(),
            sender,
            drain: updates.clone(),
            alive: Arc::downgrade(&alive),
            needs_full: true,
        };
        if let Some(last) = &state.last {
            let full = ServerMessage::Full {
                seq: state.seq,
                snapshot: last.clone(),
            };
            if matches!(slot.offer(full), Delivery::Delivered) {
                slot.needs_full = false;
            }
        }
        state.viewers.push(slot);
        info!("Viewer {} connected ({} total)", label, state.viewers.len());

        ViewerLink {
            id,
            label,
            updates,
            _alive: alive,
        }
    }

    /// Queue a full snapshot for one viewer, outside the publish cycle
    pub fn resync(&self, viewer: u64) {
        let mut state = self.lock();
        let PublisherState {
            seq, last, viewers, ..
        } = &mut *state;
        let Some(slot) = viewers.iter_mut().find(|slot| slot.id == viewer) else {
            return;
        };
        match last {
            Some(last) => {
                let full = ServerMessage::Full {
                    seq: *seq,
                    snapshot: last.clone(),
                };
                if matches!(slot.offer(full), Delivery::Delivered) {
                    slot.needs_full = false;
                }
                debug!("Resynchronized viewer {}", slot.label);
            }
            None => slot.needs_full = true,
        }
    }

    /// Deliver `snapshot` to every viewer
    ///
    /// **Public** - one publish cycle
    ///
    /// Cumulative sessions send each viewer the delta since the previous
    /// cycle; sessions that reset every cycle, and viewers that need to
    /// resynchronize, get the full snapshot.
    pub fn publish(&self, snapshot: Snapshot) -> PublishReport {
        let mut state = self.lock();
        if state.closed {
            return PublishReport::default();
        }
        state.seq += 1;
        let seq = state.seq;

        let delta = match (&state.last, self.config.reset_each_cycle) {
            (Some(previous), false) => match snapshot.delta_since(previous) {
                Ok(delta) => Some(delta),
                Err(e) => {
                    warn!("Cannot diff against previous cycle, sending full snapshots: {}", e);
                    None
                }
            },
            _ => None,
        };

        let mut report = PublishReport {
            seq,
            ..PublishReport::default()
        };
        state.viewers.retain_mut(|slot| {
            let message = match (&delta, slot.needs_full) {
                (Some(delta), false) => ServerMessage::Delta {
                    seq,
                    base_seq: seq - 1,
                    delta: delta.clone(),
                },
                _ => ServerMessage::Full {
                    seq,
                    snapshot: snapshot.clone(),
                },
            };
            let was_full = matches!(message, ServerMessage::Full { .. });
            match slot.offer(message) {
                Delivery::Delivered => {
                    if was_full {
                        slot.needs_full = false;
                    }
                    report.delivered += 1;
                    true
                }
                Delivery::Overflowed => {
                    if was_full {
                        slot.needs_full = false;
                    }
                    debug!("Viewer {} is falling behind", slot.label);
                    report.overflowed += 1;
                    true
                }
                Delivery::Disconnected => {
                    info!("Viewer {} disconnected", slot.label);
                    report.disconnected += 1;
                    false
                }
            }
        });

        state.last = Some(snapshot);
        report
    }

    pub fn viewer_count(&self) -> usize {
        self.lock().viewers.len()
    }

    /// Sequence number of the last publish cycle
    pub fn seq(&self) -> u64 {
        self.lock().seq
    }

    /// Last published snapshot
    pub fn latest(&self) -> Option<Snapshot> {
        self.lock().last.clone()
    }

    /// Disconnect every viewer and refuse new ones
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        let dropped = state.viewers.len();
        state.viewers.clear();
        debug!("Publisher closed, {} viewers dropped", dropped);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Background thread publishing a recording on a fixed interval
pub struct PublishLoop {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl PublishLoop {
    /// Start publishing `recording` through `publisher`
    pub fn spawn(
        recording: RecordingHandle,
        publisher: Arc<Publisher>,
    ) -> Result<Self, CollectorError> {
        let (stop, stopped) = bounded::<()>(1);
        let interval = publisher.config().interval;
        let reset = publisher.config().reset_each_cycle;

        let handle = thread::Builder::new()
            .name("callscope-publisher".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let report = publisher.publish(recording.snapshot(reset));
                        debug!(
                            "Published cycle {} to {} viewers",
                            report.seq, report.delivered
                        );
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| CollectorError::SpawnFailed(e.to_string()))?;

        Ok(Self { stop, handle })
    }

    /// Stop the loop and wait for it
    pub fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("Publisher thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CallSite;
    use crate::stats::{Mode, StatsTree};
    use pretty_assertions::assert_eq;

    fn cumulative(entries: &[(&str, u64)]) -> Snapshot {
        let mut tree = StatsTree::new();
        for (name, weight) in entries {
            tree.record(&[CallSite::named(*name)], *weight);
        }
        Snapshot::of_tree(Mode::Tracing, &tree, Duration::ZERO, Duration::ZERO)
    }

    fn seq_of(message: &ServerMessage) -> u64 {
        message.seq().unwrap()
    }

    #[test]
    fn test_first_update_is_full_then_deltas() {
        let publisher = Publisher::new(PublisherConfig::new());
        let viewer = publisher.connect("v1");

        publisher.publish(cumulative(&[("a", 1)]));
        publisher.publish(cumulative(&[("a", 1), ("b", 2)]));

        assert!(matches!(viewer.try_recv().unwrap(), ServerMessage::Full { seq: 1, .. }));
        match viewer.try_recv().unwrap() {
            ServerMessage::Delta {
                seq,
                base_seq,
                delta,
            } => {
                assert_eq!((seq, base_seq), (2, 1));
                assert_eq!(delta.stats.len(), 1);
                assert_eq!(&*delta.stats[0].site.name, "b");
            }
            other => panic!("expected delta, got {:?}", other),
        }
    }

    #[test]
    fn test_late_viewer_gets_latest_full_snapshot() {
        let publisher = Publisher::new(PublisherConfig::new());
        publisher.publish(cumulative(&[("a", 1)]));
        publisher.publish(cumulative(&[("a", 3)]));

        let late = publisher.connect("late");
        match late.try_recv().unwrap() {
            ServerMessage::Full { seq, snapshot } => {
                assert_eq!(seq, 2);
                assert_eq!(snapshot.deep_value(), 3);
            }
            other => panic!("expected full, got {:?}", other),
        }

        publisher.publish(cumulative(&[("a", 4)]));
        assert!(matches!(late.try_recv().unwrap(), ServerMessage::Delta { seq: 3, .. }));
    }

    #[test]
    fn test_reset_each_cycle_always_sends_full() {
        let publisher = Publisher::new(PublisherConfig::new().with_reset_each_cycle(true));
        let viewer = publisher.connect("live");
        publisher.publish(cumulative(&[("a", 1)]));
        publisher.publish(cumulative(&[("b", 1)]));

        for _ in 0..2 {
            assert!(matches!(viewer.try_recv().unwrap(), ServerMessage::Full { .. }));
        }
    }

    #[test]
    fn test_slow_viewer_drops_oldest_and_resyncs() {
        let publisher = Publisher::new(PublisherConfig::new().with_queue_capacity(2));
        let slow = publisher.connect("slow");
        let fast = publisher.connect("fast");

        let mut fast_seen = 0;
        for i in 1..=4u64 {
            let report = publisher.publish(cumulative(&[("f", i)]));
            fast_seen += fast.updates().try_iter().count();
            assert_eq!(report.overflowed, usize::from(i > 2));
        }
        assert_eq!(fast_seen, 4);

        // Cycle 1 was dropped to fit cycle 3, so cycle 4 went out full.
        let pending: Vec<ServerMessage> = slow.updates().try_iter().collect();
        assert_eq!(pending.iter().map(seq_of).collect::<Vec<_>>(), vec![3, 4]);
        assert!(matches!(pending[0], ServerMessage::Delta { seq: 3, .. }));
        assert!(matches!(pending[1], ServerMessage::Full { seq: 4, .. }));

        publisher.publish(cumulative(&[("f", 5)]));
        assert!(matches!(
            slow.try_recv().unwrap(),
            ServerMessage::Delta { seq: 5, base_seq: 4, .. }
        ));
        assert!(matches!(fast.try_recv().unwrap(), ServerMessage::Delta { seq: 5, .. }));
    }

    #[test]
    fn test_disconnected_viewer_is_dropped() {
        let publisher = Publisher::new(PublisherConfig::new());
        let kept = publisher.connect("kept");
        let gone = publisher.connect("gone");
        assert_eq!(publisher.viewer_count(), 2);
        drop(gone);

        let report = publisher.publish(cumulative(&[("a", 1)]));
        assert_eq!(report.disconnected, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(publisher.viewer_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn test_resync_sends_latest_full() {
        let publisher = Publisher::new(PublisherConfig::new());
        let viewer = publisher.connect("v");
        publisher.publish(cumulative(&[("a", 1)]));
        publisher.publish(cumulative(&[("a", 2)]));
        let _ = viewer.updates().try_iter().count();

        publisher.resync(viewer.id());
        assert!(matches!(viewer.try_recv().unwrap(), ServerMessage::Full { seq: 2, .. }));
    }

    #[test]
    fn test_close_disconnects_viewers() {
        let publisher = Publisher::new(PublisherConfig::new());
        let viewer = publisher.connect("v");
        publisher.close();
        assert!(publisher.is_closed());
        assert!(matches!(viewer.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(publisher.publish(cumulative(&[("a", 1)])), PublishReport::default());
    }
}
