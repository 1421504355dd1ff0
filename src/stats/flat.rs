//! Flat, per-call-site statistics.
//!
//! Collapses the contextual tree by call site. Deep values of a recursive
//! call site are summed per occurrence, so they can exceed the session
//! total; own values and call counts never double count.

use super::snapshot::{Snapshot, StatRecord};
use crate::frame::CallSite;
use std::collections::HashMap;

/// Totals for one call site across every call path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatStat {
    pub site: CallSite,
    pub call_count: u64,
    pub own_value: u64,
    pub deep_value: u64,
}

/// Flatten a snapshot by call site
///
/// **Public** - used by the flat view and hot-spot listings
///
/// Returned in descending own-value order.
pub fn flatten(snapshot: &Snapshot) -> Vec<FlatStat> {
    let mut registry: HashMap<CallSite, FlatStat> = HashMap::new();
    collect(&snapshot.stats, &mut registry);

    let mut stats: Vec<FlatStat> = registry.into_values().collect();
    stats.sort_by(|a, b| {
        b.own_value
            .cmp(&a.own_value)
            .then_with(|| a.site.cmp(&b.site))
    });
    stats
}

fn collect(records: &[StatRecord], registry: &mut HashMap<CallSite, FlatStat>) {
    for record in records {
        let flat = registry
            .entry(record.site.clone())
            .or_insert_with(|| FlatStat {
                site: record.site.clone(),
                call_count: 0,
                own_value: 0,
                deep_value: 0,
            });
        flat.call_count += record.call_count;
        flat.own_value += record.own_value;
        flat.deep_value += record.deep_value();
        collect(&record.children, registry);
    }
}
