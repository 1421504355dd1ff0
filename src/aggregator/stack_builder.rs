//! Build collapsed stack format from a statistics snapshot.
//!
//! Collapsed stacks are the input format for flamegraph generation.
//! Format: "parent;child;grandchild weight"
//!
//! Example: "app:main;app::jobs:run;app::io:read 1000"
//! This means: main called run which called read, spending 1000 units in
//! read itself.

use crate::frame::CallSite;
use crate::stats::{Snapshot, StatRecord};
use log::debug;

/// A single collapsed stack entry
///
/// **Public** - used by flamegraph generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedStack {
    /// Stack trace as semicolon-separated string
    pub stack: String,

    /// Own value of the last frame on this stack
    pub weight: u64,
}

impl CollapsedStack {
    pub fn new(stack: String, weight: u64) -> Self {
        Self { stack, weight }
    }

    /// One line of folded-stack text
    pub fn to_line(&self) -> String {
        format!("{} {}", self.stack, self.weight)
    }

    /// Name of the innermost frame
    pub fn leaf(&self) -> &str {
        self.stack.rsplit(';').next().unwrap_or(&self.stack)
    }
}

/// Frame label safe to embed in a folded stack
fn frame_label(site: &CallSite) -> String {
    site.regular_name().replace(';', ",")
}

/// Build collapsed stacks from a snapshot
///
/// **Public** - main entry point for stack building
///
/// # Returns
/// One entry per node with a non-zero own value, heaviest first
pub fn build_collapsed_stacks(snapshot: &Snapshot) -> Vec<CollapsedStack> {
    let mut stacks = Vec::new();
    let mut path = Vec::new();
    collect(&snapshot.stats, &mut path, &mut stacks);

    stacks.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.stack.cmp(&b.stack)));
    debug!("Built {} collapsed stacks", stacks.len());
    stacks
}

fn collect(records: &[StatRecord], path: &mut Vec<String>, out: &mut Vec<CollapsedStack>) {
    for record in records {
        path.push(frame_label(&record.site));
        if record.own_value > 0 {
            out.push(CollapsedStack::new(path.join(";"), record.own_value));
        }
        collect(&record.children, path, out);
        path.pop();
    }
}

/// Fold stacks lighter than `min_weight` into one `[other]` entry
///
/// **Public** - keeps flamegraphs of huge profiles readable
pub fn merge_small_stacks(stacks: Vec<CollapsedStack>, min_weight: u64) -> Vec<CollapsedStack> {
    let (mut kept, small): (Vec<_>, Vec<_>) =
        stacks.into_iter().partition(|s| s.weight >= min_weight);

    let other: u64 = small.iter().map(|s| s.weight).sum();
    if other > 0 {
        debug!("Merged {} small stacks into [other]", small.len());
        kept.push(CollapsedStack::new("[other]".to_string(), other));
    }
    kept
}
