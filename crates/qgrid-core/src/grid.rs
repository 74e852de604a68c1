//! Q-grids: nested ratio trees that event proxies are fitted onto
//!
//! A grid models one beat as a rhythm tree over 0..=1, plus a separate
//! "next downbeat" leaf at offset 1 that catches events falling at the very
//! end of the beat. Nodes live in an arena and refer to each other by index;
//! subdividing a leaf swaps a container into the leaf's own slot, so parent
//! child lists never need rewriting.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use num_rational::Ratio;
use num_traits::{One, Signed, Zero};

use crate::error::{QuantizeError, Result};
use crate::event::QEvent;
use crate::offset::{Duration, RationalOffset};
use crate::proxy::QEventProxy;

/// Arena index of a grid node
pub type NodeId = usize;

static NEXT_GRID_ID: AtomicU64 = AtomicU64::new(0);

fn next_grid_id() -> u64 {
    NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct QGridLeaf {
    /// Relative weight among siblings, not an absolute duration
    pub preprolated_duration: Duration,
    pub is_divisible: bool,
    pub q_event_proxies: Vec<QEventProxy>,
    parent: Option<NodeId>,
}

impl QGridLeaf {
    pub fn new(preprolated_duration: Duration) -> Self {
        Self {
            preprolated_duration,
            is_divisible: true,
            q_event_proxies: Vec::new(),
            parent: None,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QGridContainer {
    pub preprolated_duration: Duration,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl QGridContainer {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QGridNode {
    Leaf(QGridLeaf),
    Container(QGridContainer),
}

impl QGridNode {
    pub fn preprolated_duration(&self) -> Duration {
        match self {
            Self::Leaf(leaf) => leaf.preprolated_duration,
            Self::Container(container) => container.preprolated_duration,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Self::Leaf(leaf) => leaf.parent,
            Self::Container(container) => container.parent,
        }
    }
}

/// One leaf's position in the laid-out tree
#[derive(Debug, Clone, Copy, PartialEq)]
struct LeafSlot {
    id: NodeId,
    start: RationalOffset,
    span: RationalOffset,
}

/// Per-leaf view of a chosen grid, ready for notation
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedLeaf {
    /// Written duration in whole notes
    pub duration: Duration,
    /// Fitted events sorted by sequence index; `None` when nothing attacks here
    pub q_events: Option<Vec<Arc<QEvent>>>,
    /// Enclosing container, used to keep regrouping inside a tuplet
    pub group: Option<NodeId>,
}

// ============================================================================
// QGrid
// ============================================================================

/// Rhythm-tree model of one beat.
///
/// Equality is identity: every grid, including every clone, carries a fresh
/// id, so two grids compare equal only when they are the same grid value.
#[derive(Debug)]
pub struct QGrid {
    nodes: Vec<QGridNode>,
    root: NodeId,
    next_downbeat: QGridLeaf,
    id: u64,
}

impl QGrid {
    /// Single undivided leaf plus the next downbeat
    pub fn new() -> Self {
        Self {
            nodes: vec![QGridNode::Leaf(QGridLeaf::new(Duration::one()))],
            root: 0,
            next_downbeat: QGridLeaf::new(Duration::one()),
            id: next_grid_id(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn root(&self) -> &QGridNode {
        &self.nodes[self.root]
    }

    pub fn node(&self, id: NodeId) -> Option<&QGridNode> {
        self.nodes.get(id)
    }

    pub fn next_downbeat(&self) -> &QGridLeaf {
        &self.next_downbeat
    }

    pub fn next_downbeat_mut(&mut self) -> &mut QGridLeaf {
        &mut self.next_downbeat
    }

    fn layout(&self) -> Vec<LeafSlot> {
        let mut slots = Vec::new();
        self.layout_node(self.root, RationalOffset::zero(), RationalOffset::one(), &mut slots);
        slots
    }

    fn layout_node(&self, id: NodeId, start: RationalOffset, span: RationalOffset, slots: &mut Vec<LeafSlot>) {
        match &self.nodes[id] {
            QGridNode::Leaf(_) => slots.push(LeafSlot { id, start, span }),
            QGridNode::Container(container) => {
                let total: Duration = container
                    .children
                    .iter()
                    .map(|&child| self.nodes[child].preprolated_duration())
                    .sum();
                let mut cursor = start;
                for &child in &container.children {
                    let child_span = span * self.nodes[child].preprolated_duration() / total;
                    self.layout_node(child, cursor, child_span, slots);
                    cursor += child_span;
                }
            }
        }
    }

    /// Number of leaves in the tree, not counting the next downbeat
    pub fn leaf_count(&self) -> usize {
        self.layout().len()
    }

    /// Tree leaves in depth-first order followed by the next downbeat
    pub fn leaves(&self) -> Vec<&QGridLeaf> {
        let mut leaves: Vec<&QGridLeaf> = self
            .layout()
            .into_iter()
            .filter_map(|slot| match &self.nodes[slot.id] {
                QGridNode::Leaf(leaf) => Some(leaf),
                QGridNode::Container(_) => None,
            })
            .collect();
        leaves.push(&self.next_downbeat);
        leaves
    }

    /// Start offset of every leaf, ending with 1 for the next downbeat
    pub fn offsets(&self) -> Vec<RationalOffset> {
        let mut offsets: Vec<RationalOffset> = self.layout().iter().map(|slot| slot.start).collect();
        offsets.push(RationalOffset::one());
        offsets
    }

    /// Mutable leaf by flattened index; the last index is the next downbeat
    pub fn leaf_mut(&mut self, leaf_index: usize) -> Option<&mut QGridLeaf> {
        let ids: Vec<NodeId> = self.layout().iter().map(|slot| slot.id).collect();
        self.leaf_at_mut(&ids, leaf_index)
    }

    fn leaf_at_mut(&mut self, ids: &[NodeId], leaf_index: usize) -> Option<&mut QGridLeaf> {
        match ids.get(leaf_index) {
            Some(&id) => match self.nodes.get_mut(id) {
                Some(QGridNode::Leaf(leaf)) => Some(leaf),
                _ => None,
            },
            None if leaf_index == ids.len() => Some(&mut self.next_downbeat),
            None => None,
        }
    }

    /// Attach each proxy to the leaf whose start offset is nearest.
    ///
    /// An exact hit wins; otherwise the right neighbour wins only when it
    /// is strictly closer, so equidistant proxies fall to the left.
    pub fn fit_q_events(&mut self, q_event_proxies: impl IntoIterator<Item = QEventProxy>) {
        let ids: Vec<NodeId> = self.layout().iter().map(|slot| slot.id).collect();
        let offsets = self.offsets();
        let last = offsets.len() - 1;
        for proxy in q_event_proxies {
            let offset = proxy.offset();
            let idx = offsets.partition_point(|o| *o < offset);
            let target = if idx > last {
                last
            } else if offsets[idx] == offset || idx == 0 {
                idx
            } else {
                let left_diff = (offsets[idx - 1] - offset).abs();
                let right_diff = (offsets[idx] - offset).abs();
                if right_diff < left_diff { idx } else { idx - 1 }
            };
            if let Some(leaf) = self.leaf_at_mut(&ids, target) {
                leaf.q_event_proxies.push(proxy);
            }
        }
    }

    /// Stable-sort every leaf's proxies by their event's sequence index
    pub fn sort_q_events_by_index(&mut self) {
        for node in &mut self.nodes {
            if let QGridNode::Leaf(leaf) = node {
                leaf.q_event_proxies.sort_by_key(QEventProxy::index);
            }
        }
        self.next_downbeat.q_event_proxies.sort_by_key(QEventProxy::index);
    }

    fn check_ratios(ratios: &[u32]) -> Result<()> {
        if ratios.is_empty() || ratios.contains(&0) {
            return Err(QuantizeError::InvalidRatios(ratios.to_vec()));
        }
        Ok(())
    }

    /// Replace tree leaf `leaf_index` with a container of leaves weighted by
    /// `ratios`, keeping the leaf's own weight. Returns the proxies the leaf
    /// held; the caller refits them.
    pub fn subdivide_leaf(&mut self, leaf_index: usize, ratios: &[u32]) -> Result<Vec<QEventProxy>> {
        Self::check_ratios(ratios)?;
        let ids: Vec<NodeId> = self.layout().iter().map(|slot| slot.id).collect();
        let id = *ids
            .get(leaf_index)
            .ok_or(QuantizeError::LeafIndexOutOfRange { index: leaf_index, count: ids.len() })?;
        self.subdivide_node(id, ratios)
    }

    fn subdivide_node(&mut self, id: NodeId, ratios: &[u32]) -> Result<Vec<QEventProxy>> {
        let QGridNode::Leaf(leaf) = &mut self.nodes[id] else {
            return Err(QuantizeError::NotALeaf(id));
        };
        let proxies = std::mem::take(&mut leaf.q_event_proxies);
        let preprolated_duration = leaf.preprolated_duration;
        let parent = leaf.parent;

        let first_child = self.nodes.len();
        for &ratio in ratios {
            let mut child = QGridLeaf::new(Ratio::from_integer(i64::from(ratio)));
            child.parent = Some(id);
            self.nodes.push(QGridNode::Leaf(child));
        }
        self.nodes[id] = QGridNode::Container(QGridContainer {
            preprolated_duration,
            children: (first_child..first_child + ratios.len()).collect(),
            parent,
        });
        Ok(proxies)
    }

    /// Subdivide several leaves at once, keyed by flattened leaf index.
    ///
    /// Duplicate indices keep the last ratios given. Besides the proxies of
    /// each subdivided leaf, proxies sitting on the following leaf but lying
    /// before that leaf's start are reclaimed too, since they may now fit the
    /// finer structure. Returns every displaced proxy, in order.
    pub fn subdivide_leaves(&mut self, pairs: &[(usize, Vec<u32>)]) -> Result<Vec<QEventProxy>> {
        let pairs: BTreeMap<usize, &[u32]> = pairs.iter().map(|(index, ratios)| (*index, ratios.as_slice())).collect();
        let slots = self.layout();
        let ids: Vec<NodeId> = slots.iter().map(|slot| slot.id).collect();
        for (&index, ratios) in &pairs {
            if index >= ids.len() {
                return Err(QuantizeError::LeafIndexOutOfRange { index, count: ids.len() });
            }
            Self::check_ratios(ratios)?;
        }

        let mut displaced = Vec::new();
        for (index, ratios) in pairs {
            let next_start = slots.get(index + 1).map_or_else(RationalOffset::one, |slot| slot.start);
            displaced.extend(self.subdivide_node(ids[index], ratios)?);
            if let Some(next_leaf) = self.leaf_at_mut(&ids, index + 1) {
                let (spilled, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut next_leaf.q_event_proxies)
                    .into_iter()
                    .partition(|proxy| proxy.offset() < next_start);
                next_leaf.q_event_proxies = kept;
                displaced.extend(spilled);
            }
        }
        Ok(displaced)
    }

    /// Mean distance from each fitted proxy to its leaf's start offset.
    /// `None` when nothing is fitted.
    pub fn distance(&self) -> Option<RationalOffset> {
        let mut total = RationalOffset::zero();
        let mut count: i64 = 0;
        for (leaf, offset) in self.leaves().into_iter().zip(self.offsets()) {
            for proxy in &leaf.q_event_proxies {
                total += (proxy.offset() - offset).abs();
                count += 1;
            }
        }
        (count > 0).then(|| total / count)
    }

    /// Ancestor divisors of a tree leaf, root first: for every container
    /// above the leaf, the sum of its children's weights. Its length is the
    /// leaf's depth.
    pub fn parentage(&self, leaf_index: usize) -> Option<Vec<Duration>> {
        let id = self.layout().get(leaf_index)?.id;
        let mut divisors = Vec::new();
        let mut parent = self.nodes[id].parent();
        while let Some(parent_id) = parent {
            if let QGridNode::Container(container) = &self.nodes[parent_id] {
                divisors.push(
                    container
                        .children
                        .iter()
                        .map(|&child| self.nodes[child].preprolated_duration())
                        .sum::<Duration>(),
                );
            }
            parent = self.nodes[parent_id].parent();
        }
        divisors.reverse();
        Some(divisors)
    }

    /// Proxies on a leaf that lie before the leaf's own start
    pub fn preceding_q_event_proxies(&self, leaf_index: usize) -> Vec<&QEventProxy> {
        let (leaves, offsets) = (self.leaves(), self.offsets());
        match (leaves.get(leaf_index), offsets.get(leaf_index)) {
            (Some(leaf), Some(&start)) => leaf.q_event_proxies.iter().filter(|p| p.offset() < start).collect(),
            _ => Vec::new(),
        }
    }

    /// Proxies on a leaf that lie at or after the leaf's own start
    pub fn succeeding_q_event_proxies(&self, leaf_index: usize) -> Vec<&QEventProxy> {
        let (leaves, offsets) = (self.leaves(), self.offsets());
        match (leaves.get(leaf_index), offsets.get(leaf_index)) {
            (Some(leaf), Some(&start)) => leaf.q_event_proxies.iter().filter(|p| p.offset() >= start).collect(),
            _ => Vec::new(),
        }
    }

    /// Mark a tree leaf as (in)eligible for further subdivision
    pub fn set_divisible(&mut self, leaf_index: usize, is_divisible: bool) -> Result<()> {
        let count = self.leaf_count();
        match self.leaf_mut(leaf_index) {
            Some(leaf) if leaf_index < count => {
                leaf.is_divisible = is_divisible;
                Ok(())
            }
            _ => Err(QuantizeError::LeafIndexOutOfRange { index: leaf_index, count }),
        }
    }

    /// Written duration and fitted events of every tree leaf, for a beat of
    /// length `beatspan`
    pub fn annotate(&self, beatspan: Duration) -> Vec<AnnotatedLeaf> {
        self.layout()
            .into_iter()
            .filter_map(|slot| match &self.nodes[slot.id] {
                QGridNode::Leaf(leaf) => {
                    let q_events = (!leaf.q_event_proxies.is_empty()).then(|| {
                        let mut events: Vec<Arc<QEvent>> =
                            leaf.q_event_proxies.iter().filter_map(|p| p.q_event().cloned()).collect();
                        events.sort_by_key(|e| e.index().unwrap_or(0));
                        events
                    });
                    Some(AnnotatedLeaf { duration: beatspan * slot.span, q_events, group: leaf.parent })
                }
                QGridNode::Container(_) => None,
            })
            .collect()
    }

    /// Parenthesized ratio-tree rendering, e.g. `(1 ((1 (1 1)) 1))`
    pub fn rtm_format(&self) -> String {
        self.node_rtm(self.root)
    }

    fn node_rtm(&self, id: NodeId) -> String {
        match &self.nodes[id] {
            QGridNode::Leaf(leaf) => leaf.preprolated_duration.to_string(),
            QGridNode::Container(container) => {
                let children: Vec<String> = container.children.iter().map(|&child| self.node_rtm(child)).collect();
                format!("({} ({}))", container.preprolated_duration, children.join(" "))
            }
        }
    }
}

impl Default for QGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for QGrid {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            root: self.root,
            next_downbeat: self.next_downbeat.clone(),
            id: next_grid_id(),
        }
    }
}

impl PartialEq for QGrid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for QGrid {}
