//! Viewer-side reconstruction of a streamed profile.

use super::protocol::ServerMessage;
use crate::stats::{Mode, Snapshot};
use crate::utils::error::StatsError;
use log::debug;
use std::time::Duration;

/// What applying one message did to a [`ViewState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Welcomed,
    /// A full snapshot replaced the view
    Replaced { seq: u64 },
    /// A delta was folded into the view
    Merged { seq: u64 },
    /// A delta did not continue the view and was discarded
    ///
    /// `first` is set only for the gap that started the wait for a full
    /// snapshot; later deltas in the same wait report it unset.
    Gap {
        have: Option<u64>,
        base: u64,
        first: bool,
    },
}

/// The statistics a viewer currently shows
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    mode: Option<Mode>,
    publish_interval: Option<Duration>,
    seq: Option<u64>,
    snapshot: Option<Snapshot>,
    resync_pending: bool,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one server message into the view
    ///
    /// Deltas are only applied on top of the exact sequence number they
    /// were computed against. Anything else is reported as a gap and the
    /// view waits for a full snapshot.
    pub fn apply(&mut self, message: ServerMessage) -> Result<Applied, StatsError> {
        match message {
            ServerMessage::Welcome {
                mode,
                publish_interval_ms,
                ..
            } => {
                self.mode = Some(mode);
                self.publish_interval = Some(Duration::from_millis(publish_interval_ms));
                Ok(Applied::Welcomed)
            }
            ServerMessage::Full { seq, snapshot } => {
                self.mode = Some(snapshot.mode);
                self.snapshot = Some(snapshot);
                self.seq = Some(seq);
                self.resync_pending = false;
                Ok(Applied::Replaced { seq })
            }
            ServerMessage::Delta {
                seq,
                base_seq,
                delta,
            } => match (&self.snapshot, self.seq) {
                (Some(current), Some(have)) if have == base_seq && !self.resync_pending => {
                    let merged = current.merge(&delta)?;
                    self.snapshot = Some(merged);
                    self.seq = Some(seq);
                    Ok(Applied::Merged { seq })
                }
                _ => {
                    debug!("Sequence gap: have {:?}, delta based on {}", self.seq, base_seq);
                    let first = !self.resync_pending;
                    self.resync_pending = true;
                    Ok(Applied::Gap {
                        have: self.seq,
                        base: base_seq,
                        first,
                    })
                }
            },
        }
    }

    /// Whether the view is waiting for a full snapshot
    pub fn needs_resync(&self) -> bool {
        self.resync_pending
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn publish_interval(&self) -> Option<Duration> {
        self.publish_interval
    }

    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        self.snapshot
    }
}
