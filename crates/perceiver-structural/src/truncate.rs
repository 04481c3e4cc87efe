//! Node-ceiling admission for oversized pages.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use crate::model::{NodePath, RawNode};
use crate::observation::TruncationWarning;
use crate::policy::IndexerConfig;

/// Which raw nodes the indexer may visit.
#[derive(Debug)]
pub(crate) enum Admission {
    All,
    /// Always ancestor-closed: a node is only present if its parent is.
    Only(HashSet<NodePath>),
}

impl Admission {
    pub(crate) fn admits(&self, path: &NodePath) -> bool {
        match self {
            Admission::All => true,
            Admission::Only(set) => set.contains(path),
        }
    }
}

struct Candidate<'a> {
    depth: u32,
    distance: f64,
    seq: u64,
    path: NodePath,
    node: &'a RawNode,
}

impl Candidate<'_> {
    fn key(&self) -> (u32, f64, u64) {
        (self.depth, self.distance, self.seq)
    }
}

impl PartialEq for Candidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate<'_> {}

impl PartialOrd for Candidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let (d1, y1, s1) = self.key();
        let (d2, y2, s2) = other.key();
        d1.cmp(&d2)
            .then_with(|| y1.total_cmp(&y2))
            .then_with(|| s1.cmp(&s2))
    }
}

fn distance_from_viewport_top(node: &RawNode, scroll_y: f64) -> f64 {
    node.bounds
        .map(|b| (b.y - scroll_y).abs())
        .unwrap_or(f64::INFINITY)
}

/// Decide which nodes survive the ceiling.
///
/// Shallower nodes are admitted first; within a level, nodes closer to the
/// top of the viewport win, then document order. The outcome depends only
/// on the tree, so the same page truncates the same way every time.
pub(crate) fn plan(
    root: &RawNode,
    scroll_y: f64,
    config: &IndexerConfig,
) -> (Admission, Option<TruncationWarning>) {
    let total = root.node_count();
    if total <= config.max_nodes && root.max_depth() <= config.max_depth {
        return (Admission::All, None);
    }

    let mut admitted = HashSet::with_capacity(config.max_nodes.min(total));
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;
    heap.push(Reverse(Candidate {
        depth: 0,
        distance: distance_from_viewport_top(root, scroll_y),
        seq,
        path: NodePath::root(),
        node: root,
    }));

    while let Some(Reverse(candidate)) = heap.pop() {
        if admitted.len() >= config.max_nodes {
            break;
        }
        if candidate.depth > config.max_depth {
            continue;
        }
        for (position, child) in candidate.node.child_nodes().enumerate() {
            seq += 1;
            heap.push(Reverse(Candidate {
                depth: candidate.depth + 1,
                distance: distance_from_viewport_top(child, scroll_y),
                seq,
                path: candidate.path.join(position as u32),
                node: child,
            }));
        }
        admitted.insert(candidate.path);
    }

    let warning = TruncationWarning {
        node_limit: config.max_nodes,
        total_nodes: total,
        dropped_nodes: total - admitted.len(),
    };
    (Admission::Only(admitted), Some(warning))
}
