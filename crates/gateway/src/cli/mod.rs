pub mod config;
pub mod probe;
pub mod tools;

use clap::{Parser, Subcommand};

/// taskgate: a session-aware JSON-RPC gateway in front of a task CLI and
/// stdio tool providers.
#[derive(Debug, Parser)]
#[command(name = "taskgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the CLI tool catalog with its input schemas.
    Tools {
        /// Print the raw JSON definitions instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Start one configured bridge, print its tools, then shut it down.
    Probe {
        /// Bridge id from `[[bridges]]`.
        bridge_id: String,
    },
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `TG_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the
/// path that was used.
///
/// [`Config`]: tg_domain::config::Config
pub fn load_config() -> anyhow::Result<(tg_domain::config::Config, String)> {
    let config_path = std::env::var("TG_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = tg_domain::config::Config::load(std::path::Path::new(&config_path))?;
    Ok((config, config_path))
}
