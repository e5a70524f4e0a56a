use clap::Parser;
use tracing_subscriber::EnvFilter;

mod backend;
mod cli;
mod commands {
    pub mod health;
    pub mod serve;
}

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("folio=info")),
                )
                .init();
            commands::serve::run(&args).await
        }
        Commands::Health(args) => commands::health::run(&args).await,
    }
}
