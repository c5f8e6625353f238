//! Integration tests: registry-built nodes wired into graphs.

use patchwork_core::{AudioBuffer, Graph, MidiBuffer, NodeId, PortType};
use patchwork_nodes::{CaptureReport, CvReport, MidiCaptureReport, NodeParams, NodeRegistry};
use proptest::prelude::*;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZE: usize = 256;

fn add(graph: &mut Graph, registry: &NodeRegistry, id: &str, params: &[(&str, f64)]) -> NodeId {
    let params: NodeParams = params.iter().copied().collect();
    graph.add_node(registry.create(id, &params).unwrap())
}

fn render_blocks(graph: &mut Graph, blocks: usize) {
    let mut audio = AudioBuffer::new(2, BLOCK_SIZE);
    let mut midi = MidiBuffer::new();
    for _ in 0..blocks {
        audio.clear();
        midi.clear();
        graph.render(&mut audio, &mut midi);
    }
}

fn capture_report(graph: &Graph, id: NodeId) -> CaptureReport {
    CaptureReport::from_state(&graph.node(id).unwrap().state()).unwrap()
}

#[test]
fn midi_generator_fans_out_to_two_captures() {
    let registry = NodeRegistry::new();
    let mut graph = Graph::new();
    let generator = add(&mut graph, &registry, "midi.generator", &[("interval_ms", 10.0)]);
    let a = add(&mut graph, &registry, "midi.capture", &[]);
    let b = add(&mut graph, &registry, "midi.capture", &[]);
    graph.add_connection(generator, 0, a, 0).unwrap();
    graph.add_connection(generator, 0, b, 0).unwrap();
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render_blocks(&mut graph, 1);

    for capture in [a, b] {
        let report = MidiCaptureReport::from_state(&graph.node(capture).unwrap().state()).unwrap();
        assert_eq!(report.events, 2);
        assert_eq!(report.note_ons, 1);
    }
}

#[test]
fn stereo_ramp_reaches_both_channels() {
    let registry = NodeRegistry::new();
    let mut graph = Graph::new();
    let ramp = add(&mut graph, &registry, "gen.ramp", &[("frequency", 100.0)]);
    let capture = add(&mut graph, &registry, "audio.capture", &[("channels", 2.0)]);
    for ch in 0..2 {
        graph
            .connect_channels(ramp, ch, capture, ch, PortType::Audio)
            .unwrap();
    }
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render_blocks(&mut graph, 4);

    let report = capture_report(&graph, capture);
    assert!(report.peaks[0] > 0.9, "left peak {}", report.peaks[0]);
    assert!(report.peaks[1] > 0.9, "right peak {}", report.peaks[1]);
    let ratio = report.peaks[0] / report.peaks[1];
    assert!((ratio - 1.0).abs() < 0.01);
    assert_eq!(report.blocks, 4);
}

#[test]
fn control_value_drives_gain() {
    let registry = NodeRegistry::new();
    let mut graph = Graph::new();
    let dc = add(&mut graph, &registry, "gen.dc", &[("value", 1.0)]);
    let value = add(&mut graph, &registry, "control.value", &[("value", 0.25)]);
    let gain = add(&mut graph, &registry, "audio.gain", &[("channels", 1.0)]);
    let capture = add(&mut graph, &registry, "audio.capture", &[("channels", 1.0)]);
    graph.add_connection(dc, 0, gain, 0).unwrap();
    // Gain ports: audio in 0, audio out 1, control in 2.
    graph.add_connection(value, 0, gain, 2).unwrap();
    graph.add_connection(gain, 1, capture, 0).unwrap();
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render_blocks(&mut graph, 4);

    let report = capture_report(&graph, capture);
    assert!((report.last_rms[0] - 0.25).abs() < 1e-4, "rms {}", report.last_rms[0]);
    assert_eq!(graph.node(gain).unwrap().parameter(2), Some(0.25));
}

#[test]
fn control_value_feeds_cv_input() {
    let registry = NodeRegistry::new();
    let mut graph = Graph::new();
    let value = add(&mut graph, &registry, "control.value", &[("value", 0.5)]);
    let cv = add(&mut graph, &registry, "cv.capture", &[]);
    graph.add_connection(value, 0, cv, 0).unwrap();
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render_blocks(&mut graph, 2);

    let report = CvReport::from_state(&graph.node(cv).unwrap().state()).unwrap();
    assert_eq!(report.last, 0.5);
    assert_eq!(report.min, 0.5);
    assert_eq!(report.max, 0.5);
}

#[test]
fn delay_latency_is_reported_by_graph() {
    let registry = NodeRegistry::new();
    let mut graph = Graph::new();
    let input = add(&mut graph, &registry, "io.audio_in", &[]);
    let delay = add(&mut graph, &registry, "audio.delay", &[("samples", 64.0)]);
    let output = add(&mut graph, &registry, "io.audio_out", &[]);
    for ch in 0..2 {
        graph
            .connect_channels(input, ch, delay, ch, PortType::Audio)
            .unwrap();
        graph
            .connect_channels(delay, ch, output, ch, PortType::Audio)
            .unwrap();
    }
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    assert_eq!(graph.sequence().latency_samples(), 64);

    let mut audio = AudioBuffer::new(2, BLOCK_SIZE);
    audio.channel_mut(0)[0] = 1.0;
    let mut midi = MidiBuffer::new();
    graph.render(&mut audio, &mut midi);
    assert_eq!(audio.channel(0)[64], 1.0);
    assert_eq!(audio.channel(0)[0], 0.0);
}

#[test]
fn mixer_sums_two_sources() {
    let registry = NodeRegistry::new();
    let mut graph = Graph::new();
    let a = add(&mut graph, &registry, "gen.dc", &[("value", 0.1)]);
    let b = add(&mut graph, &registry, "gen.dc", &[("value", 0.3)]);
    let mixer = add(
        &mut graph,
        &registry,
        "audio.mixer",
        &[("channels", 1.0), ("inputs", 2.0)],
    );
    let capture = add(&mut graph, &registry, "audio.capture", &[("channels", 1.0)]);
    graph.connect_channels(a, 0, mixer, 0, PortType::Audio).unwrap();
    graph.connect_channels(b, 0, mixer, 1, PortType::Audio).unwrap();
    graph
        .connect_channels(mixer, 0, capture, 0, PortType::Audio)
        .unwrap();
    graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
    render_blocks(&mut graph, 1);

    let report = capture_report(&graph, capture);
    assert!((report.peaks[0] - 0.4).abs() < 1e-6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any number of DC sources behind delays of any length sum to the exact
    /// total once latency compensation has lined them up.
    #[test]
    fn delayed_sources_sum_at_fan_in(
        sources in prop::collection::vec((-1.0f64..1.0, 0usize..64), 1..8),
    ) {
        let registry = NodeRegistry::new();
        let mut graph = Graph::new();
        let capture = add(&mut graph, &registry, "audio.capture", &[("channels", 1.0)]);
        for &(value, samples) in &sources {
            let dc = add(&mut graph, &registry, "gen.dc", &[("value", value)]);
            let delay = add(
                &mut graph,
                &registry,
                "audio.delay",
                &[("channels", 1.0), ("samples", samples as f64)],
            );
            graph.connect_channels(dc, 0, delay, 0, PortType::Audio).unwrap();
            graph.connect_channels(delay, 0, capture, 0, PortType::Audio).unwrap();
        }
        graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
        render_blocks(&mut graph, 2);

        let expected = sources.iter().map(|&(value, _)| value).sum::<f64>().abs() as f32;
        let report = capture_report(&graph, capture);
        prop_assert!((report.peaks[0] - expected).abs() < 1e-4, "peak {} vs {}", report.peaks[0], expected);
        prop_assert!((report.last_rms[0] - expected).abs() < 1e-4, "rms {} vs {}", report.last_rms[0], expected);
    }
}
