//! Hot paths and weight distribution of a profile.
//!
//! Hot paths are the call paths with the largest own values. These are the
//! primary targets for optimization.

use super::stack_builder::CollapsedStack;
use log::debug;
use serde::{Deserialize, Serialize};

/// One of the heaviest call paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotPath {
    /// Semicolon-separated call path
    pub stack: String,

    /// Own value at the end of the path
    pub value: u64,

    /// Share of the profile total
    pub percentage: f64,
}

/// Calculate hot paths from collapsed stacks
///
/// **Public** - main entry point for metrics calculation
///
/// # Arguments
/// * `stacks` - Collapsed stacks, heaviest first
/// * `total` - Total value of the profile
/// * `top_n` - Number of top paths to return (e.g., 10)
pub fn calculate_hot_paths(stacks: &[CollapsedStack], total: u64, top_n: usize) -> Vec<HotPath> {
    debug!(
        "Calculating top {} hot paths from {} stacks",
        top_n,
        stacks.len()
    );

    stacks
        .iter()
        .take(top_n)
        .map(|stack| HotPath {
            stack: stack.stack.clone(),
            value: stack.weight,
            percentage: percentage(stack.weight, total),
        })
        .collect()
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Summary statistics of how weight spreads over call paths
///
/// **Public** - returned from calculate_distribution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightDistribution {
    /// Total weight across all stacks
    pub total: u64,

    /// Number of distinct stacks
    pub stack_count: usize,

    pub mean_per_stack: u64,

    pub median_per_stack: u64,

    /// Weight of the heaviest 10% of stacks
    pub top_10_percent: u64,

    /// Share of the total in the heaviest 10%
    pub top_10_percent_percentage: f64,
}

/// Calculate weight distribution statistics
///
/// **Public** - provides summary statistics
///
/// `stacks` must be sorted heaviest first, as `build_collapsed_stacks`
/// returns them.
pub fn calculate_distribution(stacks: &[CollapsedStack]) -> WeightDistribution {
    if stacks.is_empty() {
        return WeightDistribution::default();
    }

    let total: u64 = stacks.iter().map(|s| s.weight).sum();
    let count = stacks.len();

    let mut weights: Vec<u64> = stacks.iter().map(|s| s.weight).collect();
    weights.sort_unstable();
    let median = weights[weights.len() / 2];

    let top_count = (count as f64 * 0.1).ceil() as usize;
    let top: u64 = stacks.iter().take(top_count).map(|s| s.weight).sum();

    WeightDistribution {
        total,
        stack_count: count,
        mean_per_stack: total / count as u64,
        median_per_stack: median,
        top_10_percent: top,
        top_10_percent_percentage: percentage(top, total),
    }
}

impl WeightDistribution {
    /// True when the heaviest 10% of stacks hold more than 80% of the weight
    pub fn is_highly_concentrated(&self) -> bool {
        self.top_10_percent_percentage > 80.0
    }

    /// Human-readable summary, values in `unit`
    pub fn summary(&self, unit: &str) -> String {
        format!(
            "Total: {} {} | Stacks: {} | Mean: {} | Median: {} | Top 10%: {:.1}%",
            self.total,
            unit,
            self.stack_count,
            self.mean_per_stack,
            self.median_per_stack,
            self.top_10_percent_percentage
        )
    }
}
