//! The contextual statistics tree.
//!
//! Every node is scoped to one path from the synthetic root, so the same
//! call site reached along two different paths (including recursion) owns
//! two different nodes. Nodes store their *own* value; deep values are
//! derived on demand so `deep == own + Σ children.deep` holds exactly.

use super::snapshot::StatRecord;
use crate::frame::CallSite;
use std::collections::HashMap;

/// One call site along one call path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatNode {
    call_count: u64,
    own_value: u64,
    children: HashMap<CallSite, StatNode>,
}

impl StatNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Times this node was recorded as the leaf
    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    /// Weight recorded directly at this node
    pub fn own_value(&self) -> u64 {
        self.own_value
    }

    /// Own value plus the deep value of every child
    pub fn deep_value(&self) -> u64 {
        self.own_value
            + self
                .children
                .values()
                .map(StatNode::deep_value)
                .sum::<u64>()
    }

    /// Call count of this node and all descendants
    pub fn deep_count(&self) -> u64 {
        self.call_count
            + self
                .children
                .values()
                .map(StatNode::deep_count)
                .sum::<u64>()
    }

    pub fn child(&self, site: &CallSite) -> Option<&StatNode> {
        self.children.get(site)
    }

    pub fn children(&self) -> impl Iterator<Item = (&CallSite, &StatNode)> {
        self.children.iter()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Follow a path of call sites below this node
    pub fn descend<'a, I>(&self, path: I) -> Option<&StatNode>
    where
        I: IntoIterator<Item = &'a CallSite>,
    {
        path.into_iter()
            .try_fold(self, |node, site| node.children.get(site))
    }

    fn ensure_child(&mut self, site: &CallSite) -> &mut StatNode {
        // Avoid cloning the key when the child already exists.
        if !self.children.contains_key(site) {
            self.children.insert(site.clone(), StatNode::new());
        }
        self.children
            .get_mut(site)
            .unwrap_or_else(|| unreachable!("child inserted above"))
    }

    /// Add every value of `other` into this node, recursively
    pub fn absorb(&mut self, other: &StatNode) {
        self.call_count += other.call_count;
        self.own_value += other.own_value;
        for (site, child) in &other.children {
            self.ensure_child(site).absorb(child);
        }
    }

    /// Frozen, deterministically ordered copy of the children
    pub fn freeze_children(&self) -> Vec<StatRecord> {
        let mut records: Vec<StatRecord> = self
            .children
            .iter()
            .map(|(site, child)| StatRecord {
                site: site.clone(),
                call_count: child.call_count,
                own_value: child.own_value,
                children: child.freeze_children(),
            })
            .collect();
        records.sort_by(|a, b| a.site.cmp(&b.site));
        records
    }

    fn thaw_into(&mut self, records: &[StatRecord]) {
        for record in records {
            let child = self.ensure_child(&record.site);
            child.call_count += record.call_count;
            child.own_value += record.own_value;
            child.thaw_into(&record.children);
        }
    }
}

/// Forest of [`StatNode`]s under one synthetic root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsTree {
    root: StatNode,
}

impl StatsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a tree from frozen records
    pub fn from_records(records: &[StatRecord]) -> Self {
        let mut tree = Self::new();
        tree.root.thaw_into(records);
        tree
    }

    /// Record `weight` at the end of a root-first call-site path
    ///
    /// **Public** - single mutation entry point for both collectors
    ///
    /// Intermediate nodes are created if missing but receive nothing; the
    /// last node gets one call and the whole weight. An empty path is a
    /// no-op.
    pub fn record<'a, I>(&mut self, path: I, weight: u64)
    where
        I: IntoIterator<Item = &'a CallSite>,
    {
        let mut node = &mut self.root;
        let mut walked = false;
        for site in path {
            node = node.ensure_child(site);
            walked = true;
        }
        if walked {
            node.call_count += 1;
            node.own_value += weight;
        }
    }

    /// Sum `other` into this tree
    pub fn merge_from(&mut self, other: &StatsTree) {
        self.root.absorb(&other.root);
    }

    /// Node at the end of a root-first path
    pub fn node<'a, I>(&self, path: I) -> Option<&StatNode>
    where
        I: IntoIterator<Item = &'a CallSite>,
    {
        self.root.descend(path)
    }

    /// Root-level nodes
    pub fn roots(&self) -> impl Iterator<Item = (&CallSite, &StatNode)> {
        self.root.children()
    }

    /// Sum of the deep values of every root-level node
    pub fn deep_value(&self) -> u64 {
        self.root.deep_value()
    }

    pub fn total_calls(&self) -> u64 {
        self.root.deep_count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn clear(&mut self) {
        self.root = StatNode::new();
    }

    /// Frozen copy of the root-level nodes
    pub fn freeze(&self) -> Vec<StatRecord> {
        self.root.freeze_children()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(names: &[&str]) -> Vec<CallSite> {
        names.iter().map(|n| CallSite::named(*n)).collect()
    }

    fn assert_consistent(node: &StatNode) {
        let children: u64 = node.children().map(|(_, c)| c.deep_value()).sum();
        assert_eq!(node.deep_value(), node.own_value() + children);
        assert!(node.deep_value() >= node.own_value());
        for (_, child) in node.children() {
            assert_consistent(child);
        }
    }

    #[test]
    fn test_record_only_touches_leaf() {
        let mut tree = StatsTree::new();
        tree.record(&path(&["main", "run", "work"]), 30);

        let main = tree.node(&path(&["main"])).unwrap();
        assert_eq!(main.call_count(), 0);
        assert_eq!(main.own_value(), 0);
        assert_eq!(main.deep_value(), 30);

        let work = tree.node(&path(&["main", "run", "work"])).unwrap();
        assert_eq!(work.call_count(), 1);
        assert_eq!(work.own_value(), 30);
    }

    #[test]
    fn test_empty_path_is_noop() {
        let mut tree = StatsTree::new();
        tree.record(&[], 10);
        assert!(tree.is_empty());
        assert_eq!(tree.deep_value(), 0);
    }

    #[test]
    fn test_same_site_on_different_paths_is_contextual() {
        let mut tree = StatsTree::new();
        tree.record(&path(&["a", "log"]), 5);
        tree.record(&path(&["b", "log"]), 7);

        assert_eq!(tree.node(&path(&["a", "log"])).unwrap().own_value(), 5);
        assert_eq!(tree.node(&path(&["b", "log"])).unwrap().own_value(), 7);
        assert!(tree.node(&path(&["log"])).is_none());
    }

    #[test]
    fn test_recursion_produces_distinct_nodes() {
        let mut tree = StatsTree::new();
        // Three returns of F -> F -> F, innermost first
        tree.record(&path(&["F", "F", "F"]), 1);
        tree.record(&path(&["F", "F"]), 2);
        tree.record(&path(&["F"]), 3);

        for (depth, own) in [(1, 3), (2, 2), (3, 1)] {
            let node = tree.node(&path(&vec!["F"; depth])).unwrap();
            assert_eq!(node.call_count(), 1);
            assert_eq!(node.own_value(), own);
        }
        assert_eq!(tree.deep_value(), 6);
        assert_eq!(tree.total_calls(), 3);
    }

    #[test]
    fn test_deep_value_invariant() {
        let mut tree = StatsTree::new();
        tree.record(&path(&["a"]), 4);
        tree.record(&path(&["a", "b"]), 6);
        tree.record(&path(&["a", "b", "c"]), 1);
        tree.record(&path(&["a", "d"]), 9);
        tree.record(&path(&["e"]), 2);
        for (_, node) in tree.roots() {
            assert_consistent(node);
        }
        assert_eq!(tree.deep_value(), 22);
    }

    #[test]
    fn test_merge_sums_matching_nodes() {
        let mut left = StatsTree::new();
        left.record(&path(&["a", "b"]), 3);
        let mut right = StatsTree::new();
        right.record(&path(&["a", "b"]), 4);
        right.record(&path(&["a", "c"]), 1);

        left.merge_from(&right);
        let b = left.node(&path(&["a", "b"])).unwrap();
        assert_eq!(b.own_value(), 7);
        assert_eq!(b.call_count(), 2);
        assert_eq!(left.node(&path(&["a", "c"])).unwrap().own_value(), 1);
    }

    #[test]
    fn test_freeze_thaw_round_trip() {
        let mut tree = StatsTree::new();
        tree.record(&path(&["z", "y"]), 3);
        tree.record(&path(&["a"]), 1);
        let records = tree.freeze();
        assert_eq!(&*records[0].site.name, "a");
        assert_eq!(StatsTree::from_records(&records), tree);
    }
}
