//! Command-line interface.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "keymeter", version, about = "Per-key usage reporting service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the server (default when no subcommand is given)
    Run(RunArgs),
    /// Validate a config file and print a summary
    CheckConfig(CheckArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to config file
    #[arg(short, long, default_value = "config.yaml", env = "KEYMETER_CONFIG")]
    pub config: String,

    /// Listen host
    #[arg(long, env = "KEYMETER_HOST")]
    pub host: Option<String>,

    /// Listen port
    #[arg(long, env = "KEYMETER_PORT")]
    pub port: Option<u16>,

    /// Log level
    #[arg(long, default_value = "info", env = "KEYMETER_LOG_LEVEL")]
    pub log_level: String,

    /// Graceful shutdown timeout in seconds (overrides config)
    #[arg(long)]
    pub shutdown_timeout: Option<u64>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: "config.yaml".to_string(),
            host: None,
            port: None,
            log_level: "info".to_string(),
            shutdown_timeout: None,
        }
    }
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Path to config file
    #[arg(short, long, default_value = "config.yaml", env = "KEYMETER_CONFIG")]
    pub config: String,
}
