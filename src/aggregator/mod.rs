//! Aggregation of snapshots into collapsed stacks and metrics.
//!
//! This module turns a statistics snapshot into:
//! - Collapsed stack format (for flamegraph generation)
//! - Hot path analysis (heaviest call paths)
//! - Weight distribution statistics

pub mod metrics;
pub mod stack_builder;

// Re-export main types and functions
pub use metrics::{calculate_distribution, calculate_hot_paths, HotPath, WeightDistribution};
pub use stack_builder::{build_collapsed_stacks, merge_small_stacks, CollapsedStack};
