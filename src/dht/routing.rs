use std::collections::{HashSet, VecDeque};

use super::node::{Node, NodeId};

/// A bounded FIFO of discovered nodes.
///
/// New nodes are appended at the tail and the walk consumes from the head,
/// so every known node gets probed once before any is probed twice. When
/// the table is full the oldest entry is evicted to make room.
#[derive(Debug)]
pub struct RoutingTable {
    our_id: NodeId,
    capacity: usize,
    nodes: VecDeque<Node>,
    ids: HashSet<NodeId>,
}

impl RoutingTable {
    pub fn new(our_id: NodeId, capacity: usize) -> Self {
        Self {
            our_id,
            capacity,
            nodes: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    pub fn our_id(&self) -> &NodeId {
        &self.our_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `node`, evicting the head if the table is full.
    ///
    /// Returns `false` without touching the table for port 0, our own id, or
    /// an id that is already queued.
    pub fn add(&mut self, node: Node) -> bool {
        if self.capacity == 0
            || node.addr.port() == 0
            || node.id == self.our_id
            || self.ids.contains(&node.id)
        {
            return false;
        }

        if self.nodes.len() >= self.capacity {
            self.take_oldest();
        }

        self.ids.insert(node.id);
        self.nodes.push_back(node);
        true
    }

    pub fn take_oldest(&mut self) -> Option<Node> {
        let node = self.nodes.pop_front()?;
        self.ids.remove(&node.id);
        Some(node)
    }

    /// Up to `count` nodes, closest to `target` first.
    pub fn sample(&self, target: &NodeId, count: usize) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.iter().copied().collect();
        nodes.sort_unstable_by_key(|n| n.id.distance(target));
        nodes.truncate(count);
        nodes
    }

    pub fn snapshot(&self) -> Vec<Node> {
        self.nodes.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
