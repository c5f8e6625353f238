//! Criterion benchmarks for graph compilation and rendering.
//!
//! Measures graph overhead independently of DSP cost using a trivial `Gain`
//! node. Two axes:
//!
//! - **Compile** - ordering, buffer assignment and latency compensation
//! - **Render** - `Graph::render()` throughput at varying block sizes
//!
//! Run with: `cargo bench -p patchwork-core -- graph/`
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use patchwork_core::{
    AudioBuffer, Graph, IoNode, MidiBuffer, Node, NodeId, PortCount, PortList, PortType,
    RenderContext,
};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZE: usize = 256;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

// ---------------------------------------------------------------------------
// Trivial stereo gain node
// ---------------------------------------------------------------------------

struct Gain {
    ports: PortList,
    gain: f32,
    latency: usize,
}

impl Gain {
    fn boxed(gain: f32, latency: usize) -> Box<dyn Node> {
        Box::new(Self {
            ports: PortCount::new().with(PortType::Audio, 2, 2).to_port_list(),
            gain,
            latency,
        })
    }
}

impl Node for Gain {
    fn name(&self) -> &str {
        "Gain"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn latency_samples(&self) -> usize {
        self.latency
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        for ch in 0..2 {
            for sample in ctx.audio.channel_mut(ch).iter_mut() {
                *sample *= self.gain;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Graph constructors
// ---------------------------------------------------------------------------

fn connect_stereo(graph: &mut Graph, source: NodeId, dest: NodeId) {
    for ch in 0..2 {
        graph
            .connect_channels(source, ch, dest, ch, PortType::Audio)
            .unwrap();
    }
}

fn make_linear(n: usize) -> Graph {
    let mut graph = Graph::new();
    let input = graph.add_node(Box::new(IoNode::audio_input()));
    let mut prev = input;
    for _ in 0..n {
        let node = graph.add_node(Gain::boxed(0.9, 0));
        connect_stereo(&mut graph, prev, node);
        prev = node;
    }
    let output = graph.add_node(Box::new(IoNode::audio_output()));
    connect_stereo(&mut graph, prev, output);
    graph
}

/// Two parallel paths of different latency merging at the output.
fn make_diamond() -> Graph {
    let mut graph = Graph::new();
    let input = graph.add_node(Box::new(IoNode::audio_input()));
    let a = graph.add_node(Gain::boxed(0.8, 64));
    let b = graph.add_node(Gain::boxed(0.7, 0));
    let output = graph.add_node(Box::new(IoNode::audio_output()));
    connect_stereo(&mut graph, input, a);
    connect_stereo(&mut graph, input, b);
    connect_stereo(&mut graph, a, output);
    connect_stereo(&mut graph, b, output);
    graph
}

// ---------------------------------------------------------------------------
// Compile benchmarks
// ---------------------------------------------------------------------------

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/compile");

    for n in [5, 20] {
        let graph = make_linear(n);
        group.bench_function(format!("linear_{n}"), |b| {
            b.iter(|| black_box(graph.compile()));
        });
    }

    let graph = make_diamond();
    group.bench_function("diamond", |b| {
        b.iter(|| black_box(graph.compile()));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Render benchmarks - fixed block size 256
// ---------------------------------------------------------------------------

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/render");

    let mut audio = AudioBuffer::new(2, BLOCK_SIZE);
    let mut midi = MidiBuffer::new();

    for (label, mut graph) in [
        ("linear_5_block256", make_linear(5)),
        ("linear_20_block256", make_linear(20)),
        ("diamond_block256", make_diamond()),
    ] {
        graph.prepare(SAMPLE_RATE, BLOCK_SIZE);
        group.bench_function(label, |b| {
            b.iter(|| {
                audio.channel_mut(0).fill(0.5);
                audio.channel_mut(1).fill(0.5);
                graph.render(black_box(&mut audio), &mut midi);
                black_box(&audio);
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Block size sweep - 5-node chain across all standard block sizes
// ---------------------------------------------------------------------------

fn bench_block_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/block_sweep");

    for &block_size in BLOCK_SIZES {
        let mut graph = make_linear(5);
        graph.prepare(SAMPLE_RATE, block_size);
        let mut audio = AudioBuffer::new(2, block_size);
        let mut midi = MidiBuffer::new();

        group.bench_with_input(
            BenchmarkId::new("linear_5", block_size),
            &block_size,
            |b, _| {
                b.iter(|| {
                    graph.render(black_box(&mut audio), &mut midi);
                    black_box(&audio);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_render, bench_block_sweep);
criterion_main!(benches);
