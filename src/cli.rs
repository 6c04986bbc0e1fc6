// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `execbridge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "execbridge",
    version,
    about = "Bridge exec requests to host processes and report their exit status.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Execbridge.toml` in the current working directory. The
    /// default path is allowed to be missing; an explicitly given one is not.
    #[arg(long, value_name = "PATH", default_value = "Execbridge.toml")]
    pub config: String,

    /// Run a single command through a full exec session wired to this
    /// terminal, then exit with the command's exit status.
    #[arg(long, value_name = "COMMAND")]
    pub exec: Option<String>,

    /// Load and validate the config, print a summary, and exit.
    #[arg(long)]
    pub check: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EXECBRIDGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
