mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use compliance_engine::config::Config;
use compliance_engine::{api, bootstrap, worker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Api(args) => {
            let mut config = config;
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            let addr = config.server.bind_addr;
            api::run(addr, config).await?;
        }
        Commands::Worker => {
            let components = bootstrap::build(config).await?;
            let handles = worker::spawn_workers(components.supervisor, components.worker_receivers);
            tracing::info!(workers = handles.len(), "compliance engine worker pool started");
            for handle in handles {
                handle.await?;
            }
        }
    }

    Ok(())
}
