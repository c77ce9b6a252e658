//! flexchain command-line entry point.
//!
//! Binary name: `flexchain`
//!
//! Parses CLI arguments, installs the tracing subscriber, loads configuration
//! and dispatches to the command handler.

mod cli;
mod config;

use clap::Parser;
use clap_complete::generate;
use flexchain_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "flexchain", &mut std::io::stdout());
        return Ok(());
    }

    // --json also switches log lines on stderr to JSON
    let log_format = if cli.json { LogFormat::Json } else { LogFormat::Text };
    let tracing_options = TracingOptions::from_verbosity(cli.verbose, cli.quiet)
        .with_format(log_format)
        .with_otel(cli.otel);
    init_tracing(&tracing_options).map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    let config_path = config::resolve_config_path(cli.config.as_deref());
    let config = config::load_config(&config_path).await;

    let outcome = match cli.command {
        Commands::Run {
            file,
            params,
            params_json,
        } => {
            cli::run::handle_run(
                &file,
                &params,
                params_json.as_deref(),
                &config,
                cli.json,
                cli.quiet,
            )
            .await
        }
        Commands::Validate { file } => cli::validate::handle_validate(&file, cli.json),
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    shutdown_tracing();
    outcome
}
