//! Mixgraph CLI
//!
//! Command-line interface for bouncing and inspecting Mixgraph sessions.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mixgraph::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Mixgraph v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Bounce {
            session,
            output,
            start,
            duration,
            bit_depth,
        } => commands::bounce_session(&session, &output, start, duration, bit_depth).await,
        Commands::Graph { session } => commands::print_graph(&session).await,
        Commands::Inspect { file } => commands::inspect_file(&file),
    }
}
