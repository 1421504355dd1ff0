//! Statistics collected by a profiling session.
//!
//! This module holds:
//! - The contextual call tree both collectors write into
//! - Frozen snapshots used for streaming, dumps and views
//! - The lock-guarded handle shared by collectors and readers
//! - Flat per-call-site totals and listing sort orders

pub mod flat;
pub mod recording;
pub mod snapshot;
pub mod sort;
pub mod tree;

// Re-export main types
pub use flat::{flatten, FlatStat};
pub use recording::RecordingHandle;
pub use snapshot::{Mode, Snapshot, StatRecord};
pub use sort::SortKey;
pub use tree::{StatNode, StatsTree};
