//! Property-based tests for graph compilation.
//!
//! Random topologies check that render order respects dependencies, that
//! compilation is deterministic and never fails on cycles, and that summing
//! and latency compensation hold for any number of parallel paths.

mod common;

use common::{BLOCK_SIZE, Capture, Dc, Impulse, Latent, SAMPLE_RATE, Through, peak};
use patchwork_core::{AudioBuffer, Graph, MidiBuffer, NodeId, PortType};
use proptest::prelude::*;

/// Adds `n` mono pass-through nodes in `insertion` order and returns their
/// ids indexed by rank.
fn add_ranked_nodes(graph: &mut Graph, insertion: &[usize]) -> Vec<NodeId> {
    let mut ids = vec![NodeId::UNASSIGNED; insertion.len()];
    for &rank in insertion {
        ids[rank] = graph.add_node(Through::new(1));
    }
    ids
}

fn permutation(max: usize) -> impl Strategy<Value = Vec<usize>> {
    (2..max).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// For any acyclic topology and any insertion order, every node renders
    /// after every node feeding it.
    #[test]
    fn order_respects_dependencies(
        insertion in permutation(12),
        edges in prop::collection::vec((0usize..12, 0usize..12), 0..30),
    ) {
        let n = insertion.len();
        let mut graph = Graph::new();
        let ids = add_ranked_nodes(&mut graph, &insertion);
        let mut arcs = Vec::new();
        for (a, b) in edges {
            let (a, b) = (a % n, b % n);
            if a == b {
                continue;
            }
            let (from, to) = (a.min(b), a.max(b));
            if graph.connect_channels(ids[from], 0, ids[to], 0, PortType::Audio).is_ok() {
                arcs.push((ids[from], ids[to]));
            }
        }

        let order = graph.ordered_nodes();
        prop_assert_eq!(order.len(), n);
        let position = |id: NodeId| order.iter().position(|&o| o == id).unwrap();
        for (from, to) in arcs {
            prop_assert!(
                position(from) < position(to),
                "{} must render before {} in {:?}", from, to, order
            );
        }
    }

    /// Arbitrary topologies, cycles included, compile to the same sequence
    /// every time and render finite output.
    #[test]
    fn compile_is_deterministic_with_cycles(
        insertion in permutation(8),
        edges in prop::collection::vec((0usize..8, 0usize..8), 0..20),
    ) {
        let n = insertion.len();
        let mut graph = Graph::new();
        let ids = add_ranked_nodes(&mut graph, &insertion);
        let dc = graph.add_node(Dc::new(1, 0.5));
        graph.connect_channels(dc, 0, ids[0], 0, PortType::Audio).unwrap();
        for (a, b) in edges {
            let (a, b) = (a % n, b % n);
            if a != b {
                let _ = graph.connect_channels(ids[a], 0, ids[b], 0, PortType::Audio);
            }
        }
        let (sink, captured) = Capture::new(1);
        let sink = graph.add_node(sink);
        graph.connect_channels(ids[n - 1], 0, sink, 0, PortType::Audio).unwrap();
        graph.prepare(SAMPLE_RATE, BLOCK_SIZE);

        let first = graph.compile();
        let second = graph.compile();
        prop_assert_eq!(first.len(), second.len());
        prop_assert_eq!(first.buffer_counts(), second.buffer_counts());
        prop_assert_eq!(first.stats(), second.stats());
        prop_assert_eq!(first.order(), second.order());

        let mut audio = AudioBuffer::new(2, BLOCK_SIZE);
        let mut midi = MidiBuffer::new();
        for _ in 0..3 {
            graph.render(&mut audio, &mut midi);
            prop_assert!(captured.lock()[0].iter().all(|s| s.is_finite()));
        }
    }

    /// An input with any number of sources receives their sum.
    #[test]
    fn fan_in_sums_every_source(values in prop::collection::vec(-1.0f32..1.0, 1..8)) {
        let mut graph = Graph::new();
        let (sink, captured) = Capture::new(1);
        let sink = graph.add_node(sink);
        for &value in &values {
            let dc = graph.add_node(Dc::new(1, value));
            graph.connect_channels(dc, 0, sink, 0, PortType::Audio).unwrap();
        }
        graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
        let mut audio = AudioBuffer::new(2, BLOCK_SIZE);
        let mut midi = MidiBuffer::new();
        graph.render(&mut audio, &mut midi);

        let expected: f32 = values.iter().sum();
        let block = captured.lock()[0].clone();
        prop_assert_eq!(block.len(), BLOCK_SIZE);
        for sample in block {
            prop_assert!((sample - expected).abs() < 1e-4, "{} != {}", sample, expected);
        }
    }

    /// Parallel paths of arbitrary latency line up at the node they merge
    /// into.
    #[test]
    fn parallel_paths_are_latency_aligned(delays in prop::collection::vec(0usize..64, 1..6)) {
        let mut graph = Graph::new();
        let impulse = graph.add_node(Impulse::new());
        let (sink, captured) = Capture::new(1);
        let sink = graph.add_node(sink);
        for &delay in &delays {
            let path = graph.add_node(Latent::new(delay));
            graph.connect_channels(impulse, 0, path, 0, PortType::Audio).unwrap();
            graph.connect_channels(path, 0, sink, 0, PortType::Audio).unwrap();
        }
        graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
        let mut audio = AudioBuffer::new(2, BLOCK_SIZE);
        let mut midi = MidiBuffer::new();
        graph.render(&mut audio, &mut midi);

        let max_delay = delays.iter().copied().max().unwrap_or(0);
        let block = captured.lock()[0].clone();
        prop_assert!((block[max_delay] - delays.len() as f32).abs() < 1e-5);
        prop_assert!((peak(&captured, 0) - delays.len() as f32).abs() < 1e-5);
    }
}
