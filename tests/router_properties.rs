use std::collections::HashMap;

use mischpult::{ConnectError, Node, NodeId, Router};
use proptest::prelude::*;

const NODES: u64 = 8;

fn router_with_nodes() -> Router {
    let mut router = Router::new();
    for i in 0..NODES {
        assert!(router.add_node(Node::bus(NodeId::new(i), 2)));
    }
    router
}

fn edges() -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((0..NODES, 0..NODES), 0..40)
}

proptest! {
    #[test]
    fn graph_stays_acyclic(edges in edges()) {
        let mut router = router_with_nodes();

        for (a, b) in edges {
            let (a, b) = (NodeId::new(a), NodeId::new(b));
            match router.try_connect(a.audio_out(), b.audio_in()) {
                Ok(_) => {}
                Err(ConnectError::WouldCycle) => {
                    // rejected exactly when dest already reaches source
                    prop_assert!(router.find_path(b, a).is_some());
                }
                Err(ConnectError::SelfConnection) => prop_assert_eq!(a, b),
                Err(ConnectError::Duplicate) => {
                    prop_assert!(router.has_connection(a.audio_out(), b.audio_in()));
                }
                Err(other) => prop_assert!(false, "unexpected rejection: {}", other),
            }
            prop_assert!(router.processing_order().is_ok());
        }
    }

    #[test]
    fn order_respects_every_connection(edges in edges()) {
        let mut router = router_with_nodes();
        for (a, b) in edges {
            router.connect(NodeId::new(a).audio_out(), NodeId::new(b).audio_in());
        }

        let order = router.processing_order().unwrap();
        prop_assert_eq!(order.len(), NODES as usize);
        let position: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        for c in router.connections() {
            prop_assert!(position[&c.source.node] < position[&c.dest.node]);
        }
    }

    #[test]
    fn compensation_aligns_every_path(
        edges in edges(),
        latencies in prop::collection::vec(0u32..512, NODES as usize),
    ) {
        let mut router = router_with_nodes();
        for (a, b) in edges {
            router.connect(NodeId::new(a).audio_out(), NodeId::new(b).audio_in());
        }
        for (i, samples) in latencies.iter().enumerate() {
            router.report_latency(NodeId::new(i as u64), *samples);
        }

        let max = router.max_latency();
        for i in 0..NODES {
            let node = NodeId::new(i);
            let accumulated = router.accumulated_latency(node);
            prop_assert_eq!(accumulated + router.compensation(node), max);

            let preds: Vec<NodeId> = router.predecessors(node).collect();
            let latest = preds.iter().map(|p| router.accumulated_latency(*p)).max().unwrap_or(0);
            prop_assert_eq!(accumulated, latencies[i as usize] + latest);
            for p in preds {
                let aligned = router.accumulated_latency(p) + router.input_delay(p, node);
                prop_assert_eq!(aligned, latest);
            }
        }
    }

    #[test]
    fn removing_nodes_keeps_connections_consistent(
        edges in edges(),
        removed in prop::collection::vec(0..NODES, 0..4),
    ) {
        let mut router = router_with_nodes();
        for (a, b) in edges {
            router.connect(NodeId::new(a).audio_out(), NodeId::new(b).audio_in());
        }
        for id in &removed {
            router.remove_node(NodeId::new(*id));
            // idempotent
            prop_assert!(!router.remove_node(NodeId::new(*id)));
        }

        for c in router.connections() {
            prop_assert!(router.contains(c.source.node));
            prop_assert!(router.contains(c.dest.node));
        }
        prop_assert_eq!(router.processing_order().unwrap().len(), router.node_count());
    }
}
