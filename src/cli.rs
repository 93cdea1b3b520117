use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "compliance-engine")]
#[command(about = "Asynchronous shop-policy compliance analysis engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file. Overrides COMPLIANCE_ENGINE_CONFIG.
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API (accepts submissions, streams progress, serves status).
    Api(ApiArgs),

    /// Run the pipeline worker (dequeues jobs and executes the stage pipeline).
    Worker,
}

#[derive(clap::Args, Debug)]
pub struct ApiArgs {
    /// Address to bind the API server to. Overrides server.bind_addr.
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
