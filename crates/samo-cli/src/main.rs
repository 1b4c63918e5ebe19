//! samo CLI
//!
//! Command-line interface for samo servers - watch, write and inspect keys.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use samo_core::Config;

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "samo")]
#[command(about = "samo - live mirrors of remote state")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use wss:// and https://
    #[arg(long, global = true)]
    tls: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a live mirror of a key
    Watch {
        /// host[:port]/<mode>/<key> or host[:port]/time
        #[arg(short, long)]
        address: Option<String>,
        /// Exit after the first update
        #[arg(long)]
        once: bool,
    },
    /// Write an entry over the socket
    Set {
        /// Entry data (JSON, or a plain string)
        data: String,
        /// Entry index
        #[arg(short, long)]
        index: Option<String>,
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Delete an entry over the socket
    #[command(alias = "rm")]
    Del {
        /// Entry index
        index: String,
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Show the keys held by the server
    Stats {
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Read a key once over HTTP
    Get {
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Write an entry over HTTP
    Publish {
        /// Entry data (JSON, or a plain string)
        data: String,
        /// Entry index
        #[arg(short, long)]
        index: Option<String>,
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Delete a key over HTTP
    Unpublish {
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (address, tls, protocols, reconnect_interval_ms,
        /// open_timeout_ms, resume_poll_ms, log_level)
        key: String,
        /// Configuration value
        value: String,
    },
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work on the file itself
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config =
        Config::load_with_cli_override(cli.config.as_ref()).context("Failed to load configuration")?;
    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Commands::Watch { address, once } => {
            let config = commands::target(&config, address, cli.tls)?;
            commands::watch::watch(&config, once, &output).await
        }
        Commands::Set {
            data,
            index,
            address,
        } => {
            let config = commands::target(&config, address, cli.tls)?;
            commands::socket::set(&config, data, index, &output).await
        }
        Commands::Del { index, address } => {
            let config = commands::target(&config, address, cli.tls)?;
            commands::socket::del(&config, index, &output).await
        }
        Commands::Stats { address } => {
            let config = commands::target(&config, address, cli.tls)?;
            commands::http::stats(&config, &output).await
        }
        Commands::Get { address } => {
            let config = commands::target(&config, address, cli.tls)?;
            commands::http::get(&config, &output).await
        }
        Commands::Publish {
            data,
            index,
            address,
        } => {
            let config = commands::target(&config, address, cli.tls)?;
            commands::http::publish(&config, data, index, &output).await
        }
        Commands::Unpublish { address } => {
            let config = commands::target(&config, address, cli.tls)?;
            commands::http::unpublish(&config, &output).await
        }
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
        Some(ConfigCommands::Path) => commands::config::path(config_path, output),
    }
}

/// Log to stderr; RUST_LOG takes precedence over the configured level
fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("samo_core={},samo_cli={}", log_level, log_level))
    });

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
