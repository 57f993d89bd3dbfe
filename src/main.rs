use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use koa::{cli, config, server};

#[derive(Parser)]
#[command(name = "koa", version, about = "Koa companion chat backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server and the reseed scheduler
    Serve,
    /// Replace the official knowledge and daily posts now
    Seed,
    /// Rank knowledge snippets against a query
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = koa::knowledge::search::MAX_RESULTS)]
        limit: usize,
    },
    /// List active clients and usage statistics
    Clients,
    /// Run database diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::KoaConfig::load()?;

    // Log to stderr so command output on stdout stays clean.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Seed => cli::seed::seed(&config)?,
        Command::Search { query, limit } => cli::search::search(&config, &query, limit)?,
        Command::Clients => cli::clients::clients(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
