//! Compiled render sequence inspection command.

#![allow(clippy::print_literal)]

use clap::Args;
use patchwork_core::{Node, RootGraph};
use patchwork_nodes::NodeRegistry;

use super::common::{check_graph_index, load_session};

#[derive(Args)]
pub struct InspectArgs {
    /// Session file or name
    #[arg(value_name = "SESSION")]
    session: String,

    /// Only inspect this graph
    #[arg(short, long)]
    graph: Option<usize>,

    /// Hide the op listing
    #[arg(long)]
    summary: bool,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let session = load_session(&args.session)?;
    check_graph_index(&session, args.graph)?;

    let registry = NodeRegistry::new();
    let engine = session.build(&registry)?;

    println!("Session: {}", session.name);
    println!(
        "Engine:  {} Hz, block {}, {} in / {} out, latency {} samples",
        session.engine.sample_rate,
        session.engine.block_size,
        session.engine.inputs,
        session.engine.outputs,
        engine.latency_samples()
    );

    for (index, root) in engine.graphs().iter().enumerate() {
        if args.graph.is_some_and(|g| g != index) {
            continue;
        }
        println!();
        print_graph(index, root, args.summary);
    }
    Ok(())
}

fn print_graph(index: usize, root: &RootGraph, summary: bool) {
    let graph = root.graph();
    let sequence = graph.sequence();
    let title = format!("[{}] {}", index, graph.name());
    println!("{title}");
    println!("{}", "=".repeat(title.chars().count()));

    let program = root
        .midi_program()
        .map_or_else(|| "-".to_string(), |p| p.to_string());
    println!("  {:16} {}", "Mode:", root.mode().slug());
    println!("  {:16} {}", "MIDI program:", program);
    println!(
        "  {:16} {} node(s), {} connection(s)",
        "Size:",
        graph.node_ids().count(),
        graph.connections().len()
    );

    println!();
    println!("  Order:");
    for (position, id) in sequence.order().iter().enumerate() {
        let name = graph.node(*id).map_or("?", |node| node.name());
        println!("    {:3}. #{:<5} {}", position + 1, id, name);
    }

    if !summary {
        println!();
        println!("  Ops ({}):", sequence.len());
        for (position, op) in sequence.ops().iter().enumerate() {
            println!("    {:4}  {}", position, op);
        }
    }

    let counts = sequence.buffer_counts();
    let stats = sequence.stats();
    println!();
    println!(
        "  {:16} audio {}, midi {}, control {}, atom {}",
        "Buffers:", counts.audio, counts.midi, counts.control, counts.atom
    );
    println!("  {:16} {} samples", "Latency:", sequence.latency_samples());
    println!(
        "  {:16} {} feedback break(s), {} table miss(es), {} skipped node(s)",
        "Build:", stats.feedback_breaks, stats.table_misses, stats.skipped_nodes
    );
}
