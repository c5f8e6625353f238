//! Integration tests for graph routing.
//!
//! Builds small graphs from the nodes in `common`, renders them and checks
//! signal-level results: fan-in sums, fan-out copies, isolation between
//! parallel chains, latency compensation and feedback handling.

mod common;

use common::{
    BLOCK_SIZE, Capture, Dc, Impulse, Latent, MidiCounter, MidiSource, SAMPLE_RATE, Through, count,
    peak,
};
use patchwork_core::{AudioBuffer, Graph, GraphError, IoNode, MidiBuffer, NodeId, PortType};

fn render(graph: &mut Graph) -> (AudioBuffer, MidiBuffer) {
    let mut audio = AudioBuffer::new(2, BLOCK_SIZE);
    let mut midi = MidiBuffer::new();
    graph.render(&mut audio, &mut midi);
    (audio, midi)
}

// ============================================================================
// 1. Fan-in and fan-out
// ============================================================================

#[test]
fn fan_in_sums_audio() {
    let mut graph = Graph::new();
    let (sink, captured) = Capture::new(1);
    let sink = graph.add_node(sink);
    for value in [0.2, 0.3, 0.25] {
        let dc = graph.add_node(Dc::new(1, value));
        graph.connect_channels(dc, 0, sink, 0, PortType::Audio).unwrap();
    }
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render(&mut graph);

    assert!((peak(&captured, 0) - 0.75).abs() < 1e-5, "peak {}", peak(&captured, 0));
}

#[test]
fn fan_out_duplicates_audio() {
    let mut graph = Graph::new();
    let dc = graph.add_node(Dc::new(1, 0.5));
    let mut sinks = Vec::new();
    for _ in 0..3 {
        let (sink, captured) = Capture::new(1);
        let sink = graph.add_node(sink);
        graph.connect_channels(dc, 0, sink, 0, PortType::Audio).unwrap();
        sinks.push(captured);
    }
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render(&mut graph);

    for captured in &sinks {
        assert_eq!(captured.lock()[0], vec![0.5; BLOCK_SIZE]);
    }
}

#[test]
fn fan_out_duplicates_midi() {
    let mut graph = Graph::new();
    let source = graph.add_node(MidiSource::new());
    let (a, count_a) = MidiCounter::new();
    let (b, count_b) = MidiCounter::new();
    let a = graph.add_node(a);
    let b = graph.add_node(b);
    graph.add_connection(source, 0, a, 0).unwrap();
    graph.add_connection(source, 0, b, 0).unwrap();
    graph.prepare(SAMPLE_RATE, 512);

    let mut audio = AudioBuffer::new(2, 512);
    let mut midi = MidiBuffer::new();
    graph.render(&mut audio, &mut midi);

    assert_eq!(count(&count_a), 2);
    assert_eq!(count(&count_b), 2);
}

// ============================================================================
// 2. Isolation and silence
// ============================================================================

#[test]
fn parallel_chains_do_not_mix() {
    let mut graph = Graph::new();
    let (sink_a, captured_a) = Capture::new(1);
    let (sink_b, captured_b) = Capture::new(1);
    let dc_a = graph.add_node(Dc::new(1, 0.2));
    let dc_b = graph.add_node(Dc::new(1, 0.7));
    let thru_a = graph.add_node(Through::new(1));
    let sink_a = graph.add_node(sink_a);
    let sink_b = graph.add_node(sink_b);
    graph.connect_channels(dc_a, 0, thru_a, 0, PortType::Audio).unwrap();
    graph.connect_channels(thru_a, 0, sink_a, 0, PortType::Audio).unwrap();
    graph.connect_channels(dc_b, 0, sink_b, 0, PortType::Audio).unwrap();
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render(&mut graph);

    assert!((peak(&captured_a, 0) - 0.2).abs() < 1e-6);
    assert!((peak(&captured_b, 0) - 0.7).abs() < 1e-6);
}

#[test]
fn disconnected_inputs_are_silent() {
    let mut graph = Graph::new();
    graph.add_node(Dc::new(2, 1.0));
    let (sink, captured) = Capture::new(2);
    graph.add_node(sink);
    let (counter, events) = MidiCounter::new();
    graph.add_node(counter);
    graph.add_node(MidiSource::new());
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render(&mut graph);

    assert_eq!(peak(&captured, 0), 0.0);
    assert_eq!(peak(&captured, 1), 0.0);
    assert_eq!(count(&events), 0);
}

#[test]
fn io_endpoints_pass_audio_through() {
    let mut graph = Graph::new();
    let input = graph.add_node(Box::new(IoNode::audio_input()));
    let thru = graph.add_node(Through::new(2));
    let output = graph.add_node(Box::new(IoNode::audio_output()));
    for ch in 0..2 {
        graph.connect_channels(input, ch, thru, ch, PortType::Audio).unwrap();
        graph.connect_channels(thru, ch, output, ch, PortType::Audio).unwrap();
    }
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);

    let mut audio = AudioBuffer::new(2, BLOCK_SIZE);
    audio.channel_mut(0).fill(0.25);
    audio.channel_mut(1).fill(-0.5);
    let mut midi = MidiBuffer::new();
    graph.render(&mut audio, &mut midi);

    assert!(audio.channel(0).iter().all(|s| (*s - 0.25).abs() < 1e-6));
    assert!(audio.channel(1).iter().all(|s| (*s + 0.5).abs() < 1e-6));
}

// ============================================================================
// 3. Latency compensation
// ============================================================================

#[test]
fn paths_of_different_latency_arrive_aligned() {
    let mut graph = Graph::new();
    let impulse = graph.add_node(Impulse::new());
    let slow = graph.add_node(Latent::new(10));
    let (sink, captured) = Capture::new(1);
    let sink = graph.add_node(sink);
    graph.connect_channels(impulse, 0, slow, 0, PortType::Audio).unwrap();
    graph.connect_channels(slow, 0, sink, 0, PortType::Audio).unwrap();
    graph.connect_channels(impulse, 0, sink, 0, PortType::Audio).unwrap();
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render(&mut graph);

    let block = captured.lock()[0].clone();
    assert!((block[10] - 2.0).abs() < 1e-6, "aligned impulses sum to 2, got {}", block[10]);
    let stray: f32 = block
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 10)
        .map(|(_, s)| s.abs())
        .sum();
    assert_eq!(stray, 0.0);
}

#[test]
fn graph_latency_is_reported_at_output() {
    let mut graph = Graph::new();
    let input = graph.add_node(Box::new(IoNode::audio_input()));
    let slow = graph.add_node(Latent::new(32));
    let output = graph.add_node(Box::new(IoNode::audio_output()));
    graph.connect_channels(input, 0, slow, 0, PortType::Audio).unwrap();
    graph.connect_channels(slow, 0, output, 0, PortType::Audio).unwrap();
    graph.connect_channels(input, 1, output, 1, PortType::Audio).unwrap();
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);

    assert_eq!(graph.sequence().latency_samples(), 32);
}

#[test]
fn delay_compensation_adds_to_latency() {
    let mut graph = Graph::new();
    let input = graph.add_node(Box::new(IoNode::audio_input()));
    let thru = graph.add_node(Through::new(1));
    let output = graph.add_node(Box::new(IoNode::audio_output()));
    graph.connect_channels(input, 0, thru, 0, PortType::Audio).unwrap();
    graph.connect_channels(thru, 0, output, 0, PortType::Audio).unwrap();
    graph.controls(thru).unwrap().set_delay_compensation_ms(1.0);
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);

    assert_eq!(graph.sequence().latency_samples(), 48);
}

// ============================================================================
// 4. Feedback and structural edits
// ============================================================================

#[test]
fn self_connection_is_rejected() {
    let mut graph = Graph::new();
    let thru = graph.add_node(Through::new(1));
    assert_eq!(
        graph.add_connection(thru, 1, thru, 0),
        Err(GraphError::SelfConnection(thru))
    );
}

#[test]
fn indirect_cycle_renders() {
    let mut graph = Graph::new();
    let dc = graph.add_node(Dc::new(1, 0.5));
    let a = graph.add_node(Through::new(1));
    let b = graph.add_node(Through::new(1));
    let (sink, captured) = Capture::new(1);
    let sink = graph.add_node(sink);
    graph.connect_channels(dc, 0, a, 0, PortType::Audio).unwrap();
    graph.connect_channels(a, 0, b, 0, PortType::Audio).unwrap();
    graph.connect_channels(b, 0, a, 0, PortType::Audio).unwrap();
    graph.connect_channels(b, 0, sink, 0, PortType::Audio).unwrap();
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);

    assert!(graph.sequence().stats().feedback_breaks >= 1);
    for _ in 0..4 {
        render(&mut graph);
        assert!(captured.lock()[0].iter().all(|s| s.is_finite()));
    }
}

#[test]
fn rebuild_is_idempotent() {
    let mut graph = Graph::new();
    let input = graph.add_node(Box::new(IoNode::audio_input()));
    let slow = graph.add_node(Latent::new(7));
    let thru = graph.add_node(Through::new(1));
    let output = graph.add_node(Box::new(IoNode::audio_output()));
    graph.connect_channels(input, 0, slow, 0, PortType::Audio).unwrap();
    graph.connect_channels(input, 0, thru, 0, PortType::Audio).unwrap();
    graph.connect_channels(slow, 0, output, 0, PortType::Audio).unwrap();
    graph.connect_channels(thru, 0, output, 0, PortType::Audio).unwrap();
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);

    let first = graph.compile();
    let second = graph.compile();
    assert_eq!(first.len(), second.len());
    assert_eq!(first.buffer_counts(), second.buffer_counts());
    assert_eq!(first.order(), second.order());
}

#[test]
fn remove_and_re_add_keeps_other_arcs_legal() {
    let mut graph = Graph::new();
    let dc = graph.add_node(Dc::new(1, 0.5));
    let a = graph.add_node(Through::new(1));
    let b = graph.add_node(Through::new(1));
    graph.connect_channels(dc, 0, a, 0, PortType::Audio).unwrap();
    graph.connect_channels(a, 0, b, 0, PortType::Audio).unwrap();
    graph.connect_channels(dc, 0, b, 0, PortType::Audio).unwrap();

    let removed = graph.remove_node(a).unwrap();
    assert_eq!(graph.connections().len(), 1);
    assert_eq!(graph.add_node_with_id(removed, a), Ok(a));

    assert_eq!(graph.remove_illegal_connections(), 0);
    assert_eq!(graph.connections().len(), 1);
    assert!(graph.can_connect(dc, 0, a, 0));
    assert!(graph.can_connect(a, 1, b, 0));
    assert!(!graph.can_connect(dc, 0, b, 0));
}

#[test]
fn fresh_ids_skip_explicit_ones() {
    let mut graph = Graph::new();
    let explicit = graph
        .add_node_with_id(Through::new(1), NodeId::new(40))
        .unwrap();
    let next = graph.add_node(Through::new(1));
    assert_eq!(explicit, NodeId::new(40));
    assert_eq!(next, NodeId::new(41));
}
