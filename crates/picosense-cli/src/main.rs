mod cli;
mod commands;
mod config;
mod format;
mod style;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use config::Config;

/// Build the log filter: `--quiet`, then `--verbose`, then `RUST_LOG`, then
/// the config file, then `info`.
fn log_filter(cli: &Cli, config: &Config) -> EnvFilter {
    if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            config
                .log_level
                .as_deref()
                .and_then(|level| EnvFilter::try_new(level).ok())
                .unwrap_or_else(|| EnvFilter::new("info"))
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&cli, &config))
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("Config file: {}", Config::path().display());

    match cli.command {
        Commands::Scan { timeout, format } => {
            commands::cmd_scan(timeout, config.resolve_format(format), cli.quiet).await
        }
        Commands::Watch { format } => {
            let session = config.session_config(cli.relay_count)?;
            commands::cmd_watch(session, config.resolve_format(format), cli.quiet).await
        }
        Commands::Relay {
            index,
            state,
            timeout,
        } => {
            let session = config.session_config(cli.relay_count)?;
            commands::cmd_relay(session, index, state.is_on(), timeout, cli.quiet).await
        }
        Commands::Config { action } => commands::cmd_config(action, &config, cli.relay_count),
    }
}
