use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "auditbox")]
#[command(about = "AuditBox audit log pipeline", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to AUDITBOX_CONFIG or config/auditbox.toml)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API together with the queue workers
    Serve(ServeArgs),
    /// Run the queue workers only
    Worker,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Override `server.bind_addr`
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Do not start the queue workers in this process
    #[arg(long)]
    pub no_workers: bool,
}
