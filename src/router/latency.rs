//! Latency aggregation over the routing graph.
//!
//! Every node adds its own processing latency to the latest signal that
//! reaches it:
//!
//! ```text
//! accumulated(n) = own(n) + max(accumulated(p) for audio predecessors p)
//! compensation(n) = max_latency - accumulated(n)
//! ```
//!
//! Where several paths meet, the earlier arrivals are held back by
//! `input_delay` so that the sum lines up.

use hashbrown::HashMap;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction::Incoming;

use crate::node::NodeId;
use crate::router::EdgeCount;

#[derive(Debug, Default)]
pub(crate) struct LatencyTable {
    own: HashMap<NodeId, u32>,
    accumulated: HashMap<NodeId, u32>,
    max: u32,
    dirty: bool,
}

impl LatencyTable {
    /// Returns `true` when the value changed.
    pub fn set_own(&mut self, node: NodeId, samples: u32) -> bool {
        let previous = self.own.insert(node, samples);
        let changed = previous != Some(samples);
        self.dirty |= changed;
        changed
    }

    pub fn own(&self, node: NodeId) -> u32 {
        self.own.get(&node).copied().unwrap_or(0)
    }

    pub fn forget(&mut self, node: NodeId) {
        self.own.remove(&node);
        self.accumulated.remove(&node);
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.own.clear();
        self.accumulated.clear();
        self.max = 0;
        self.dirty = false;
    }

    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Recompute from a topological `order`.
    pub fn refresh(&mut self, order: &[NodeId], graph: &DiGraphMap<NodeId, EdgeCount>) {
        self.accumulated.clear();
        self.max = 0;

        for &node in order {
            let upstream = graph
                .neighbors_directed(node, Incoming)
                .filter(|&pred| graph.edge_weight(pred, node).map_or(false, |e| e.audio > 0))
                .map(|pred| self.accumulated.get(&pred).copied().unwrap_or(0))
                .max()
                .unwrap_or(0);

            let total = upstream.saturating_add(self.own(node));
            self.accumulated.insert(node, total);
            self.max = self.max.max(total);
        }

        self.dirty = false;
    }

    pub fn accumulated(&self, node: NodeId) -> u32 {
        self.accumulated.get(&node).copied().unwrap_or(0)
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn compensation(&self, node: NodeId) -> u32 {
        self.max.saturating_sub(self.accumulated(node))
    }

    /// Delay for the signal from `source` so it arrives at `dest` together
    /// with the slowest of `dest`'s audio inputs.
    pub fn input_delay(
        &self,
        source: NodeId,
        dest: NodeId,
        graph: &DiGraphMap<NodeId, EdgeCount>,
    ) -> u32 {
        let latest = graph
            .neighbors_directed(dest, Incoming)
            .filter(|&pred| graph.edge_weight(pred, dest).map_or(false, |e| e.audio > 0))
            .map(|pred| self.accumulated(pred))
            .max()
            .unwrap_or(0);

        latest.saturating_sub(self.accumulated(source))
    }
}
