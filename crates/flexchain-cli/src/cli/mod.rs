//! CLI command definitions for the `flexchain` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run and inspect flexchain chain definitions.
#[derive(Parser)]
#[command(name = "flexchain", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text; logs become JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors and the result.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config.toml (defaults to $FLEXCHAIN_CONFIG, then ~/.flexchain/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a chain definition file.
    Run {
        /// Path to the chain YAML or JSON file.
        file: PathBuf,

        /// Initial memory entry as key=value (value parsed as JSON, else string).
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Initial memory as a JSON object; `-p` entries override its keys.
        #[arg(long = "params", value_name = "JSON")]
        params_json: Option<String>,
    },

    /// Validate a chain definition file without running it.
    Validate {
        /// Path to the chain YAML or JSON file.
        file: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
