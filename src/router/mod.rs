//! Logical routing graph (control thread).
//!
//! The [`Router`] is the single source of truth for topology: which nodes
//! exist, which ports are connected, and in what order nodes must be
//! processed. It never touches audio. Every mutation is validated up front
//! and either applies completely or not at all, so the graph is a DAG at all
//! times.

mod latency;

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use hashbrown::HashMap;
use itertools::Itertools;
use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::unionfind::UnionFind;
use petgraph::Direction::{Incoming, Outgoing};
use tracing::debug;

use crate::error::{ConnectError, Error, Result};
use crate::node::{Connection, Direction, Node, NodeId, PortRef, SignalType};

use latency::LatencyTable;

/// Number of port-level connections between an ordered pair of nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct EdgeCount {
    pub audio: u32,
    pub midi: u32,
}

impl EdgeCount {
    fn bump(&mut self, signal: SignalType, up: bool) {
        let count = match signal {
            SignalType::Audio => &mut self.audio,
            SignalType::Midi => &mut self.midi,
        };
        if up {
            *count += 1;
        } else {
            *count = count.saturating_sub(1);
        }
    }

    fn is_empty(&self) -> bool {
        self.audio == 0 && self.midi == 0
    }
}

/// Summary of the routing graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouterStats {
    pub nodes: usize,
    pub connections: usize,
    pub audio_connections: usize,
    pub midi_connections: usize,
    /// Nodes whose audio goes straight to the master output
    pub sinks: usize,
    /// Weakly connected components
    pub components: usize,
    pub max_latency: u32,
}

#[derive(Debug, Default)]
pub struct Router {
    nodes: HashMap<NodeId, Node>,
    graph: DiGraphMap<NodeId, EdgeCount>,
    connections: Vec<Connection>,
    latency: LatencyTable,
    /// Bumped by every change to topology or latency
    revision: u64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node with no connections. Returns `false` if the id is taken.
    pub fn add_node(&mut self, node: Node) -> bool {
        if self.nodes.contains_key(&node.id) {
            return false;
        }
        self.graph.add_node(node.id);
        self.latency.invalidate();
        self.revision += 1;
        debug!(node = %node.id, kind = ?node.kind, "router: node added");
        self.nodes.insert(node.id, node);
        true
    }

    /// Remove a node and every connection touching it.
    ///
    /// Unknown ids are ignored, so removing twice is harmless.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if self.nodes.remove(&id).is_none() {
            return false;
        }
        self.connections
            .retain(|c| c.source.node != id && c.dest.node != id);
        self.graph.remove_node(id);
        self.latency.forget(id);
        self.revision += 1;
        debug!(node = %id, "router: node removed");
        true
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.graph.clear();
        self.connections.clear();
        self.latency.clear();
        self.revision += 1;
    }

    /// Changes whenever nodes, connections or reported latencies change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Connections where `id` is either end.
    pub fn connections_of(&self, id: NodeId) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.source.node == id || c.dest.node == id)
    }

    pub fn has_connection(&self, source: PortRef, dest: PortRef) -> bool {
        self.connections
            .iter()
            .any(|c| c.source == source && c.dest == dest)
    }

    /// Connect an output port to an input port.
    ///
    /// Nothing changes when an error is returned.
    pub fn try_connect(
        &mut self,
        source: PortRef,
        dest: PortRef,
    ) -> core::result::Result<Connection, ConnectError> {
        let connection = self.validate_connection(source, dest)?;

        match self.graph.edge_weight_mut(source.node, dest.node) {
            Some(count) => count.bump(connection.signal, true),
            None => {
                let mut count = EdgeCount::default();
                count.bump(connection.signal, true);
                self.graph.add_edge(source.node, dest.node, count);
            }
        }
        self.connections.push(connection);
        self.latency.invalidate();
        self.revision += 1;

        debug!(%source, %dest, signal = ?connection.signal, "router: connected");
        Ok(connection)
    }

    /// Boolean form of [`try_connect`](Self::try_connect).
    pub fn connect(&mut self, source: PortRef, dest: PortRef) -> bool {
        match self.try_connect(source, dest) {
            Ok(_) => true,
            Err(reason) => {
                debug!(%source, %dest, %reason, "router: connection rejected");
                false
            }
        }
    }

    fn validate_connection(
        &self,
        source: PortRef,
        dest: PortRef,
    ) -> core::result::Result<Connection, ConnectError> {
        let src_node = self
            .nodes
            .get(&source.node)
            .ok_or(ConnectError::UnknownNode(source.node))?;
        let dst_node = self
            .nodes
            .get(&dest.node)
            .ok_or(ConnectError::UnknownNode(dest.node))?;

        let src = src_node
            .port(source.port)
            .ok_or(ConnectError::UnknownPort(source))?;
        let dst = dst_node
            .port(dest.port)
            .ok_or(ConnectError::UnknownPort(dest))?;

        if src.signal != dst.signal {
            return Err(ConnectError::SignalMismatch);
        }
        if src.direction != Direction::Output {
            return Err(ConnectError::SourceNotOutput(source));
        }
        if dst.direction != Direction::Input {
            return Err(ConnectError::DestNotInput(dest));
        }
        if source.node == dest.node {
            return Err(ConnectError::SelfConnection);
        }
        if dst.channels < src.channels {
            return Err(ConnectError::ChannelMismatch {
                needed: src.channels,
                available: dst.channels,
            });
        }
        if self.has_connection(source, dest) {
            return Err(ConnectError::Duplicate);
        }
        // the new edge closes a loop iff source is already reachable from dest
        if has_path_connecting(&self.graph, dest.node, source.node, None) {
            return Err(ConnectError::WouldCycle);
        }

        Ok(Connection {
            source,
            dest,
            signal: src.signal,
        })
    }

    /// Remove one port-level connection. Returns `false` if it did not exist.
    pub fn disconnect(&mut self, source: PortRef, dest: PortRef) -> bool {
        let Some(index) = self
            .connections
            .iter()
            .position(|c| c.source == source && c.dest == dest)
        else {
            return false;
        };
        let connection = self.connections.remove(index);

        let now_empty = match self.graph.edge_weight_mut(source.node, dest.node) {
            Some(count) => {
                count.bump(connection.signal, false);
                count.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.graph.remove_edge(source.node, dest.node);
        }
        self.latency.invalidate();
        self.revision += 1;

        debug!(%source, %dest, "router: disconnected");
        true
    }

    /// Nodes in dependency order: every node after all of its inputs.
    pub fn processing_order(&mut self) -> Result<Vec<NodeId>> {
        let order = toposort(&self.graph, None).map_err(|cycle| Error::CycleDetected(cycle.node_id()))?;
        if self.latency.is_dirty() {
            self.latency.refresh(&order, &self.graph);
        }
        Ok(order)
    }

    /// Nodes grouped by depth. Nodes in the same group do not depend on each
    /// other and could be processed in parallel.
    pub fn parallel_groups(&mut self) -> Result<Vec<Vec<NodeId>>> {
        let order = self.processing_order()?;
        let mut level: HashMap<NodeId, usize> = HashMap::with_capacity(order.len());
        let mut groups: Vec<Vec<NodeId>> = Vec::new();

        for node in order {
            let depth = self
                .graph
                .neighbors_directed(node, Incoming)
                .filter_map(|pred| level.get(&pred).map(|l| l + 1))
                .max()
                .unwrap_or(0);
            level.insert(node, depth);

            if groups.len() <= depth {
                groups.resize_with(depth + 1, Vec::new);
            }
            groups[depth].push(node);
        }

        Ok(groups)
    }

    fn ensure_latency(&mut self) {
        if self.latency.is_dirty() {
            // toposort only fails on a cycle, which connect never lets in
            if let Ok(order) = toposort(&self.graph, None) {
                self.latency.refresh(&order, &self.graph);
            }
        }
    }

    /// Record the processing latency a node adds, in samples.
    pub fn report_latency(&mut self, node: NodeId, samples: u32) -> bool {
        if !self.nodes.contains_key(&node) {
            return false;
        }
        if self.latency.set_own(node, samples) {
            self.revision += 1;
        }
        true
    }

    pub fn own_latency(&self, node: NodeId) -> u32 {
        self.latency.own(node)
    }

    /// Latency of the latest signal leaving `node`.
    pub fn accumulated_latency(&mut self, node: NodeId) -> u32 {
        self.ensure_latency();
        self.latency.accumulated(node)
    }

    /// Delay that aligns `node` with the slowest path in the graph.
    pub fn compensation(&mut self, node: NodeId) -> u32 {
        self.ensure_latency();
        self.latency.compensation(node)
    }

    pub fn max_latency(&mut self) -> u32 {
        self.ensure_latency();
        self.latency.max()
    }

    /// Delay for the `source` -> `dest` audio path at `dest`'s summing input.
    pub fn input_delay(&mut self, source: NodeId, dest: NodeId) -> u32 {
        self.ensure_latency();
        self.latency.input_delay(source, dest, &self.graph)
    }

    /// A sink has no outgoing audio connection; its output feeds the master.
    pub fn is_sink(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
            && !self
                .graph
                .neighbors_directed(id, Outgoing)
                .any(|succ| self.graph.edge_weight(id, succ).map_or(false, |c| c.audio > 0))
    }

    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.neighbors_directed(id, Incoming)
    }

    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.neighbors_directed(id, Outgoing)
    }

    /// Shortest chain of nodes leading from `from` to `to`, both included.
    pub fn find_path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }

        let mut came_from: HashMap<NodeId, NodeId> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);
        came_from.insert(from, from);

        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![to];
                let mut cursor = to;
                while cursor != from {
                    match came_from.get(&cursor) {
                        Some(&prev) => cursor = prev,
                        None => return None,
                    }
                    path.push(cursor);
                }
                path.reverse();
                return Some(path);
            }
            for next in self.graph.neighbors_directed(node, Outgoing) {
                if !came_from.contains_key(&next) {
                    came_from.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        None
    }

    pub fn statistics(&mut self) -> RouterStats {
        let audio_connections = self
            .connections
            .iter()
            .filter(|c| c.signal == SignalType::Audio)
            .count();

        RouterStats {
            nodes: self.nodes.len(),
            connections: self.connections.len(),
            audio_connections,
            midi_connections: self.connections.len() - audio_connections,
            sinks: self.nodes.keys().filter(|&&id| self.is_sink(id)).count(),
            components: self.component_count(),
            max_latency: self.max_latency(),
        }
    }

    fn component_count(&self) -> usize {
        let index: HashMap<NodeId, usize> = self
            .graph
            .nodes()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        let mut sets = UnionFind::new(index.len());
        for (a, b, _) in self.graph.all_edges() {
            if let (Some(&a), Some(&b)) = (index.get(&a), index.get(&b)) {
                sets.union(a, b);
            }
        }
        sets.into_labeling().into_iter().unique().count()
    }

    /// Render the graph in Graphviz DOT format.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph router {\n");

        for id in self.graph.nodes() {
            if let Some(node) = self.nodes.get(&id) {
                let _ = writeln!(
                    out,
                    "    \"{}\" [label=\"{} {:?} ({} smp)\"];",
                    id,
                    id,
                    node.kind,
                    self.latency.own(id)
                );
            }
        }

        let edges = self
            .connections
            .iter()
            .map(|c| {
                let style = match c.signal {
                    SignalType::Audio => "solid",
                    SignalType::Midi => "dashed",
                };
                format!(
                    "    \"{}\" -> \"{}\" [label=\"{}->{}\", style={}];",
                    c.source.node, c.dest.node, c.source.port.0, c.dest.port.0, style
                )
            })
            .join("\n");
        if !edges.is_empty() {
            out.push_str(&edges);
            out.push('\n');
        }

        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Port, PortId};

    fn stereo_track(id: u64) -> Node {
        Node::audio_track(NodeId::new(id), 2)
    }

    fn router_with(ids: &[u64]) -> Router {
        let mut router = Router::new();
        for &id in ids {
            assert!(router.add_node(stereo_track(id)));
        }
        router
    }

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut router = router_with(&[1]);
        assert!(!router.add_node(stereo_track(1)));
        assert_eq!(router.node_count(), 1);
    }

    #[test]
    fn test_revision_tracks_structural_changes() {
        let mut router = router_with(&[1, 2]);
        let start = router.revision();

        assert!(router.connect(n(1).audio_out(), n(2).audio_in()));
        let connected = router.revision();
        assert!(connected > start);

        // rejected edits and repeated latency reports change nothing
        assert!(!router.connect(n(1).audio_out(), n(2).audio_in()));
        router.report_latency(n(1), 64);
        let reported = router.revision();
        router.report_latency(n(1), 64);
        assert_eq!(router.revision(), reported);
        assert!(reported > connected);

        router.remove_node(n(2));
        assert!(router.revision() > reported);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut router = router_with(&[1, 2]);
        assert!(router.connect(n(1).audio_out(), n(2).audio_in()));

        assert!(router.remove_node(n(1)));
        assert!(!router.remove_node(n(1)));
        assert_eq!(router.connection_count(), 0);
        assert!(router.is_sink(n(2)));
    }

    #[test]
    fn test_validation_order() {
        let mut router = router_with(&[1, 2]);
        let midi = Node::instrument_track(n(3), 2);
        router.add_node(midi);
        router.add_node(Node::audio_track(n(4), 1));

        assert_eq!(
            router.try_connect(n(9).audio_out(), n(2).audio_in()),
            Err(ConnectError::UnknownNode(n(9)))
        );
        assert_eq!(
            router.try_connect(n(1).port(PortId(42)), n(2).audio_in()),
            Err(ConnectError::UnknownPort(n(1).port(PortId(42))))
        );
        assert_eq!(
            router.try_connect(n(3).midi_out(), n(2).audio_in()),
            Err(ConnectError::SignalMismatch)
        );
        assert_eq!(
            router.try_connect(n(1).audio_in(), n(2).audio_in()),
            Err(ConnectError::SourceNotOutput(n(1).audio_in()))
        );
        assert_eq!(
            router.try_connect(n(1).audio_out(), n(2).audio_out()),
            Err(ConnectError::DestNotInput(n(2).audio_out()))
        );
        assert_eq!(
            router.try_connect(n(1).audio_out(), n(1).audio_in()),
            Err(ConnectError::SelfConnection)
        );
        assert_eq!(
            router.try_connect(n(1).audio_out(), n(4).audio_in()),
            Err(ConnectError::ChannelMismatch { needed: 2, available: 1 })
        );

        assert!(router.connect(n(1).audio_out(), n(2).audio_in()));
        assert_eq!(
            router.try_connect(n(1).audio_out(), n(2).audio_in()),
            Err(ConnectError::Duplicate)
        );
        assert_eq!(router.connection_count(), 1);
    }

    #[test]
    fn test_mono_into_stereo_allowed() {
        let mut router = router_with(&[2]);
        router.add_node(Node::audio_track(n(1), 1));
        assert!(router.connect(n(1).audio_out(), n(2).audio_in()));
    }

    #[test]
    fn test_cycle_rejected_without_side_effects() {
        let mut router = router_with(&[1, 2, 3]);
        assert!(router.connect(n(1).audio_out(), n(2).audio_in()));
        assert!(router.connect(n(2).audio_out(), n(3).audio_in()));
        let before = router.processing_order().unwrap();

        assert_eq!(
            router.try_connect(n(3).audio_out(), n(1).audio_in()),
            Err(ConnectError::WouldCycle)
        );
        assert_eq!(router.connection_count(), 2);
        assert_eq!(router.processing_order().unwrap(), before);
    }

    #[test]
    fn test_midi_edge_counts_for_cycles() {
        let mut router = Router::new();
        router.add_node(Node::instrument_track(n(1), 2));
        router.add_node(Node::instrument_track(n(2), 2));
        assert!(router.connect(n(1).midi_out(), n(2).midi_in()));
        assert!(!router.connect(n(2).audio_out(), n(1).audio_in()));
        // a second, parallel connection between the same pair is fine
        assert!(router.connect(n(1).audio_out(), n(2).audio_in()));

        assert!(router.disconnect(n(1).midi_out(), n(2).midi_in()));
        assert_eq!(router.successors(n(1)).collect::<Vec<_>>(), vec![n(2)]);
        assert!(router.disconnect(n(1).audio_out(), n(2).audio_in()));
        assert_eq!(router.successors(n(1)).count(), 0);
        assert!(!router.disconnect(n(1).audio_out(), n(2).audio_in()));
    }

    #[test]
    fn test_processing_order_respects_edges() {
        let mut router = router_with(&[5, 4, 3, 2, 1]);
        let edges = [(1, 3), (2, 3), (3, 5), (4, 5)];
        for &(a, b) in &edges {
            assert!(router.connect(n(a).audio_out(), n(b).audio_in()));
        }

        let order = router.processing_order().unwrap();
        let pos = |id: u64| order.iter().position(|&x| x == n(id)).unwrap();
        for &(a, b) in &edges {
            assert!(pos(a) < pos(b));
        }
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn test_latency_compensation() {
        // 1 (100) --> 3
        // 2 (0)   --> 3 (10)
        let mut router = router_with(&[1, 2, 3, 4]);
        router.connect(n(1).audio_out(), n(3).audio_in());
        router.connect(n(2).audio_out(), n(3).audio_in());
        router.report_latency(n(1), 100);
        router.report_latency(n(3), 10);

        assert_eq!(router.accumulated_latency(n(3)), 110);
        assert_eq!(router.max_latency(), 110);
        assert_eq!(router.input_delay(n(2), n(3)), 100);
        assert_eq!(router.input_delay(n(1), n(3)), 0);
        // 4 is a sink with no latency, so it waits for the slowest path
        assert_eq!(router.compensation(n(4)), 110);
        assert_eq!(router.compensation(n(3)), 0);

        assert!(router.disconnect(n(1).audio_out(), n(3).audio_in()));
        assert_eq!(router.max_latency(), 100);
        assert_eq!(router.accumulated_latency(n(3)), 10);
    }

    #[test]
    fn test_report_latency_unknown_node() {
        let mut router = Router::new();
        assert!(!router.report_latency(n(1), 64));
    }

    #[test]
    fn test_parallel_groups_and_paths() {
        let mut router = router_with(&[1, 2, 3, 4]);
        router.connect(n(1).audio_out(), n(3).audio_in());
        router.connect(n(2).audio_out(), n(3).audio_in());
        router.connect(n(3).audio_out(), n(4).audio_in());

        let groups = router.parallel_groups().unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[2], vec![n(4)]);

        assert_eq!(router.find_path(n(1), n(4)), Some(vec![n(1), n(3), n(4)]));
        assert_eq!(router.find_path(n(4), n(1)), None);
    }

    #[test]
    fn test_statistics_and_dot() {
        let mut router = router_with(&[1, 2, 3]);
        router.add_node(Node::instrument_track(n(4), 2).with_port(Port::midi_output(PortId::MIDI_OUT)));
        router.add_node(Node::instrument_track(n(5), 2));
        router.connect(n(1).audio_out(), n(2).audio_in());
        router.connect(n(4).midi_out(), n(5).midi_in());

        let stats = router.statistics();
        assert_eq!(stats.nodes, 5);
        assert_eq!(stats.audio_connections, 1);
        assert_eq!(stats.midi_connections, 1);
        assert_eq!(stats.components, 3);
        assert_eq!(stats.sinks, 4);

        let dot = router.to_dot();
        assert!(dot.starts_with("digraph router {"));
        assert!(dot.contains("\"#1\" -> \"#2\""));
        assert!(dot.contains("style=dashed"));
    }
}
