//! CLI argument definitions for logward-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Logward log analysis daemon.
///
/// Hosts the hybrid analysis pipeline (rule engine + LLM orchestrator),
/// the recovery scheduler, and the persistence layer behind the HTTP
/// routing collaborator.
#[derive(Parser, Debug)]
#[command(name = "logward-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the logward.toml configuration file.
    #[arg(short, long, default_value = "/etc/logward/logward.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the uploads content directory.
    #[arg(long)]
    pub uploads_dir: Option<String>,

    /// Validate configuration and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}
