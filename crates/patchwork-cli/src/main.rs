//! Patchwork CLI - render and inspect node-graph sessions.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchwork")]
#[command(author, version, about = "Patchwork node-graph engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a session offline to a WAV file
    Render(commands::render::RenderArgs),

    /// Show the compiled render sequence of a session's graphs
    Inspect(commands::inspect::InspectArgs),

    /// List available node types and their parameters
    Nodes(commands::nodes::NodesArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Nodes(args) => commands::nodes::run(args),
    }
}
