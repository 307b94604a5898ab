//! authtoken CLI
//!
//! Negotiating client and protected echo server

use anyhow::Context;
use clap::Parser;
use authtoken::cli::{Cli, Commands, Runner};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = match &cli.command {
        Commands::Serve { .. } => "serve",
        Commands::Get { .. } => "get",
        Commands::Post { .. } => "post",
    };
    Runner::new(cli)
        .run()
        .await
        .with_context(|| format!("{command} failed"))
}
