//! Point-in-time, serializable copies of the statistics tree.
//!
//! A [`Snapshot`] is what the publisher streams, what dumps persist and what
//! viewers render. Children are kept sorted by call site so two snapshots of
//! the same tree compare and serialize identically.

use super::tree::StatsTree;
use crate::frame::CallSite;
use crate::utils::error::StatsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Collection strategy that produced a set of statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mode {
    /// Own values are nanoseconds
    Tracing,
    /// Own values are sample counts taken every `interval_us`
    Sampling { interval_us: u64 },
}

impl Mode {
    pub fn sampling(interval: Duration) -> Self {
        Mode::Sampling {
            interval_us: u64::try_from(interval.as_micros()).unwrap_or(u64::MAX),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Tracing => "tracing",
            Mode::Sampling { .. } => "sampling",
        }
    }

    /// Unit of own/deep values
    pub fn unit(&self) -> &'static str {
        match self {
            Mode::Tracing => "ns",
            Mode::Sampling { .. } => "samples",
        }
    }

    /// Estimated time represented by `value`
    pub fn value_as_duration(&self, value: u64) -> Duration {
        match self {
            Mode::Tracing => Duration::from_nanos(value),
            Mode::Sampling { interval_us } => {
                Duration::from_micros(interval_us.saturating_mul(value))
            }
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Tracing => f.write_str("tracing"),
            Mode::Sampling { interval_us } => write!(f, "sampling every {}us", interval_us),
        }
    }
}

/// Frozen statistics for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Call site identity
    pub site: CallSite,

    /// Times this node was the leaf of a recorded path
    pub call_count: u64,

    /// Own time (ns) or own samples
    pub own_value: u64,

    /// Child records, sorted by call site
    #[serde(default)]
    pub children: Vec<StatRecord>,
}

impl StatRecord {
    pub fn deep_value(&self) -> u64 {
        self.own_value
            + self
                .children
                .iter()
                .map(StatRecord::deep_value)
                .sum::<u64>()
    }

    pub fn deep_count(&self) -> u64 {
        self.call_count
            + self
                .children
                .iter()
                .map(StatRecord::deep_count)
                .sum::<u64>()
    }

    pub fn own_per_call(&self) -> f64 {
        per_call(self.own_value, self.call_count)
    }

    pub fn deep_per_call(&self) -> f64 {
        per_call(self.deep_value(), self.deep_count())
    }

    pub fn child(&self, site: &CallSite) -> Option<&StatRecord> {
        self.children
            .binary_search_by(|r| r.site.cmp(site))
            .ok()
            .map(|i| &self.children[i])
    }
}

fn per_call(value: u64, calls: u64) -> f64 {
    if calls == 0 {
        0.0
    } else {
        value as f64 / calls as f64
    }
}

/// Consistent, point-in-time copy of a statistics tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Collection mode
    pub mode: Mode,

    /// Wall-clock time the collector was running
    pub wall_time_ns: u64,

    /// CPU time the collector was running, as measured by its clock
    pub cpu_time_ns: u64,

    /// Root-level records
    pub stats: Vec<StatRecord>,
}

impl Snapshot {
    /// Empty snapshot
    pub fn empty(mode: Mode) -> Self {
        Self {
            mode,
            wall_time_ns: 0,
            cpu_time_ns: 0,
            stats: Vec::new(),
        }
    }

    /// Freeze a live tree
    pub fn of_tree(mode: Mode, tree: &StatsTree, wall_time: Duration, cpu_time: Duration) -> Self {
        Self {
            mode,
            wall_time_ns: duration_ns(wall_time),
            cpu_time_ns: duration_ns(cpu_time),
            stats: tree.freeze(),
        }
    }

    /// Thaw back into a mutable tree
    pub fn to_tree(&self) -> StatsTree {
        StatsTree::from_records(&self.stats)
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn wall_time(&self) -> Duration {
        Duration::from_nanos(self.wall_time_ns)
    }

    pub fn cpu_time(&self) -> Duration {
        Duration::from_nanos(self.cpu_time_ns)
    }

    /// CPU time over wall time
    pub fn cpu_usage(&self) -> f64 {
        if self.wall_time_ns == 0 {
            0.0
        } else {
            self.cpu_time_ns as f64 / self.wall_time_ns as f64
        }
    }

    /// Sum of deep values over root-level records
    pub fn deep_value(&self) -> u64 {
        self.stats.iter().map(StatRecord::deep_value).sum()
    }

    pub fn total_calls(&self) -> u64 {
        self.stats.iter().map(StatRecord::deep_count).sum()
    }

    /// Record at the end of a root-first path
    pub fn find<'a, I>(&self, path: I) -> Option<&StatRecord>
    where
        I: IntoIterator<Item = &'a CallSite>,
    {
        let mut path = path.into_iter();
        let first = path.next()?;
        let root = self
            .stats
            .binary_search_by(|r| r.site.cmp(first))
            .ok()
            .map(|i| &self.stats[i])?;
        path.try_fold(root, |record, site| record.child(site))
    }

    /// Node-wise sum of two snapshots
    ///
    /// **Public** - used by viewers to fold deltas into their state
    ///
    /// Associative and commutative; nodes present on one side only are
    /// copied as they are.
    pub fn merge(&self, other: &Snapshot) -> Result<Snapshot, StatsError> {
        self.check_mode(other)?;
        let mut tree = self.to_tree();
        tree.merge_from(&other.to_tree());
        Ok(Snapshot {
            mode: self.mode,
            wall_time_ns: self.wall_time_ns.saturating_add(other.wall_time_ns),
            cpu_time_ns: self.cpu_time_ns.saturating_add(other.cpu_time_ns),
            stats: tree.freeze(),
        })
    }

    /// What was added on top of `previous` to reach `self`
    ///
    /// For cumulative snapshots of one session `previous.merge(&delta)`
    /// reproduces `self`. Nodes that did not change are left out.
    pub fn delta_since(&self, previous: &Snapshot) -> Result<Snapshot, StatsError> {
        self.check_mode(previous)?;
        Ok(Snapshot {
            mode: self.mode,
            wall_time_ns: self.wall_time_ns.saturating_sub(previous.wall_time_ns),
            cpu_time_ns: self.cpu_time_ns.saturating_sub(previous.cpu_time_ns),
            stats: diff_records(&self.stats, &previous.stats),
        })
    }

    fn check_mode(&self, other: &Snapshot) -> Result<(), StatsError> {
        if self.mode == other.mode {
            Ok(())
        } else {
            Err(StatsError::ModeMismatch {
                left: self.mode.to_string(),
                right: other.mode.to_string(),
            })
        }
    }
}

fn diff_records(current: &[StatRecord], previous: &[StatRecord]) -> Vec<StatRecord> {
    current
        .iter()
        .filter_map(|record| {
            let before = previous
                .binary_search_by(|r| r.site.cmp(&record.site))
                .ok()
                .map(|i| &previous[i]);
            let delta = match before {
                None => record.clone(),
                Some(before) => StatRecord {
                    site: record.site.clone(),
                    call_count: record.call_count.saturating_sub(before.call_count),
                    own_value: record.own_value.saturating_sub(before.own_value),
                    children: diff_records(&record.children, &before.children),
                },
            };
            let unchanged =
                delta.call_count == 0 && delta.own_value == 0 && delta.children.is_empty();
            (!unchanged).then_some(delta)
        })
        .collect()
}

fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(names: &[&str]) -> Vec<CallSite> {
        names.iter().map(|n| CallSite::named(*n)).collect()
    }

    fn snapshot(entries: &[(&str, u64)]) -> Snapshot {
        let mut tree = StatsTree::new();
        for (stack, weight) in entries {
            let names: Vec<&str> = stack.split(';').collect();
            tree.record(&path(&names), *weight);
        }
        Snapshot::of_tree(Mode::Tracing, &tree, Duration::from_nanos(100), Duration::ZERO)
    }

    #[test]
    fn test_find_follows_path() {
        let snap = snapshot(&[("a;b", 3), ("c", 1)]);
        assert_eq!(snap.find(&path(&["a", "b"])).unwrap().own_value, 3);
        assert!(snap.find(&path(&["b"])).is_none());
        assert!(snap.find(&[]).is_none());
    }

    #[test]
    fn test_merge_is_commutative_and_associative() {
        let a = snapshot(&[("main;x", 3), ("main", 1)]);
        let b = snapshot(&[("main;y", 5), ("other", 2)]);
        let c = snapshot(&[("main;x", 4), ("main;x;z", 6)]);

        assert_eq!(a.merge(&b).unwrap(), b.merge(&a).unwrap());
        assert_eq!(
            a.merge(&b).unwrap().merge(&c).unwrap(),
            a.merge(&b.merge(&c).unwrap()).unwrap()
        );

        let all = a.merge(&b).unwrap().merge(&c).unwrap();
        assert_eq!(all.find(&path(&["main", "x"])).unwrap().own_value, 7);
        assert_eq!(all.find(&path(&["main", "x"])).unwrap().call_count, 2);
        assert_eq!(all.wall_time_ns, 300);
        assert_eq!(all.deep_value(), 21);
    }

    #[test]
    fn test_merge_rejects_mixed_modes() {
        let tracing = Snapshot::empty(Mode::Tracing);
        let sampling = Snapshot::empty(Mode::Sampling { interval_us: 1000 });
        assert!(matches!(
            tracing.merge(&sampling),
            Err(StatsError::ModeMismatch { .. })
        ));
    }

    #[test]
    fn test_delta_reconstructs_current() {
        let mut tree = StatsTree::new();
        tree.record(&path(&["a", "b"]), 3);
        tree.record(&path(&["c"]), 1);
        let before = Snapshot::of_tree(Mode::Tracing, &tree, Duration::from_nanos(10), Duration::ZERO);

        tree.record(&path(&["a", "b"]), 2);
        tree.record(&path(&["a", "d"]), 4);
        let after = Snapshot::of_tree(Mode::Tracing, &tree, Duration::from_nanos(25), Duration::ZERO);

        let delta = after.delta_since(&before).unwrap();
        // "c" did not change and is left out
        assert!(delta.find(&path(&["c"])).is_none());
        assert_eq!(delta.find(&path(&["a", "b"])).unwrap().own_value, 2);
        assert_eq!(delta.wall_time_ns, 15);

        assert_eq!(before.merge(&delta).unwrap(), after);
    }

    #[test]
    fn test_serde_round_trip() {
        let snap = snapshot(&[("a;b", 3), ("a", 2)]);
        let json = serde_json::to_string(&snap).unwrap();
        let loaded: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, snap);
        assert_eq!(serde_json::to_string(&loaded).unwrap(), json);
    }

    #[test]
    fn test_sampling_values_convert_with_interval() {
        let mode = Mode::sampling(Duration::from_millis(10));
        assert_eq!(mode, Mode::Sampling { interval_us: 10_000 });
        assert_eq!(mode.value_as_duration(100), Duration::from_secs(1));
    }
}
