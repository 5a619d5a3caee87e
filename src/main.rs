mod config;
mod db;
mod error;
mod logging;
mod lookup;
mod search;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::{debug, warn};

use config::{Config, Overrides};
use db::Client;

#[derive(Parser, Debug)]
#[command(
    name = "crtsh-subdomains",
    version,
    about = "Fetch and process common names from crt.sh for a domain suffix"
)]
struct Cli {
    /// Domain suffix to search for (e.g. example.com)
    domain: String,

    /// PostgreSQL database host [default: crt.sh]
    #[arg(long, value_name = "HOST")]
    db_host: Option<String>,

    /// PostgreSQL database port [default: 5432]
    #[arg(long, value_name = "PORT")]
    db_port: Option<u16>,

    /// Query deadline in seconds [default: 2]
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Read settings from this file instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity, can be repeated
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Checked before connecting: an empty domain succeeds even with no reachable database.
    if cli.domain.is_empty() {
        debug!("empty domain, nothing to do");
        return Ok(());
    }

    let config = config::load(&Overrides {
        config: cli.config,
        db_host: cli.db_host,
        db_port: cli.db_port,
        query_timeout_secs: cli.timeout,
    })
    .context("failed to load configuration")?;
    if let Some(path) = &config.config_path {
        debug!(path = %path.display(), "using configuration file");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let names = runtime.block_on(run(&config, &cli.domain))?;

    lookup::write_names(io::stdout().lock(), &names)
}

async fn run(config: &Config, domain: &str) -> Result<Vec<String>> {
    let mut client = Client::connect(&config.database)
        .await
        .context("failed to initialize database client")?;

    let result = lookup::lookup(&mut client, domain, config.query_timeout).await;

    if let Err(err) = client.close().await {
        warn!(error = %err, "failed to close database connection");
    }

    result.context("failed to fetch names")
}
