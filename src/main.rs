mod cli;
mod server;

use auditbox::config::Config;
use auditbox::observability::init_tracing;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_with_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.telemetry);

    match cli.command {
        Commands::Serve(args) => server::serve(config, args.address, args.no_workers).await?,
        Commands::Worker => server::work(config).await?,
    }

    Ok(())
}
