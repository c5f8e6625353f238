//! Node type listing command.

use clap::Args;
use patchwork_core::PortType;
use patchwork_nodes::{NodeCategory, NodeParams, NodeRegistry};

#[derive(Args)]
pub struct NodesArgs {
    /// Show details for a specific node type
    #[arg(value_name = "NODE")]
    node: Option<String>,
}

const CATEGORIES: [NodeCategory; 5] = [
    NodeCategory::Io,
    NodeCategory::Generator,
    NodeCategory::Audio,
    NodeCategory::Midi,
    NodeCategory::Control,
];

pub fn run(args: NodesArgs) -> anyhow::Result<()> {
    let registry = NodeRegistry::new();

    let Some(id) = &args.node else {
        println!("Available Nodes");
        println!("===============");
        for category in CATEGORIES {
            println!();
            println!("{}:", category.name());
            for descriptor in registry.nodes_in_category(category) {
                println!("  {:16} - {}", descriptor.id, descriptor.description);
            }
        }
        println!();
        println!("Use 'patchwork nodes <id>' for ports and parameters.");
        return Ok(());
    };

    let descriptor = registry
        .get(id)
        .ok_or_else(|| anyhow::anyhow!("Unknown node type: {}", id))?;
    let node = registry.create(id, &NodeParams::new())?;

    println!("{} ({})", descriptor.name, descriptor.id);
    println!("{}", "=".repeat(descriptor.name.len() + descriptor.id.len() + 3));
    println!();
    println!("{}", descriptor.description);
    println!();

    println!("Default ports:");
    let ports = node.ports();
    for port_type in PortType::ALL {
        let inputs = ports.count(port_type, true);
        let outputs = ports.count(port_type, false);
        if inputs + outputs > 0 {
            println!("  {:8} {} in, {} out", port_type, inputs, outputs);
        }
    }
    println!();

    if descriptor.params.is_empty() {
        println!("No parameters.");
    } else {
        println!("Parameters: {}", descriptor.params.join(", "));
    }
    Ok(())
}
