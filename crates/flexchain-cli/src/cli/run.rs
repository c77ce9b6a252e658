//! `flexchain run`: load a chain file, run it, print the result and trace.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use flexchain_core::chain::RunReport;
use flexchain_core::definition::{DefinitionError, build_chain, load_chain_file};
use flexchain_core::event::EventRecorder;
use flexchain_observe::TracingListener;
use flexchain_types::config::FlexchainConfig;
use flexchain_types::event::ChainEvent;
use flexchain_types::status::ChainStatus;

/// Handle `flexchain run`.
pub async fn handle_run(
    file: &Path,
    params: &[String],
    params_json: Option<&str>,
    config: &FlexchainConfig,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let def = load_chain_file(file).map_err(|e| describe_load_error(file, e))?;
    let chain = build_chain(&def, &config.engine)
        .map_err(|e| anyhow::anyhow!("Failed to build chain '{}': {e}", def.name))?;
    let input = parse_params(params_json, params)?;

    let recorder = Arc::new(EventRecorder::new());
    chain.register_event_listener(recorder.clone());
    chain.register_event_listener(Arc::new(TracingListener::new()));

    // Ctrl+C stops the run normally at the next node boundary
    let token = CancellationToken::new();
    let interrupt = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let outcome = chain
        .run_with_token(Value::Object(input.into_iter().collect()), token)
        .await;
    watcher.abort();

    let events = recorder.events();
    match outcome {
        Ok(report) => {
            if json {
                let out = serde_json::json!({
                    "chain_id": &report.chain_id,
                    "run_id": &report.run_id,
                    "status": report.status,
                    "message": &report.message,
                    "result": report.result.to_value(),
                    "duration_ms": report.duration_ms(),
                    "exec_counts": exec_counts(&chain.node_ids().collect::<Vec<_>>(), &report),
                    "events": events,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print_report(&report, &chain.node_ids().collect::<Vec<_>>(), &events, quiet)?;
            }
            Ok(())
        }
        Err(err) => {
            let node = err.origin_node().map(str::to_string);
            if json {
                let out = serde_json::json!({
                    "chain_id": chain.id(),
                    "status": ChainStatus::StoppedError,
                    "error": err.to_string(),
                    "node": node,
                    "events": events,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if !quiet {
                println!();
                print_trace(&events);
            }
            match node {
                Some(node) => bail!("Chain '{}' failed at node '{node}': {err}", chain.id()),
                None => bail!("Chain '{}' failed: {err}", chain.id()),
            }
        }
    }
}

fn describe_load_error(file: &Path, err: DefinitionError) -> anyhow::Error {
    match err {
        DefinitionError::ParseError(msg) => {
            anyhow::anyhow!("Failed to parse {}: {msg}", file.display())
        }
        DefinitionError::ValidationError(msg) => {
            anyhow::anyhow!("Chain validation failed: {msg}")
        }
        DefinitionError::Graph(e) => anyhow::anyhow!("Chain validation failed: {e}"),
        DefinitionError::IoError(e) => {
            anyhow::anyhow!("Failed to read {}: {e}", file.display())
        }
    }
}

/// Build the initial memory from `--params` and `-p key=value` pairs.
///
/// Pair values are parsed as JSON when possible (`n=3`, `flag=true`,
/// `tags=["a"]`) and kept as strings otherwise. Pairs override `--params`.
pub(crate) fn parse_params(
    params_json: Option<&str>,
    pairs: &[String],
) -> Result<HashMap<String, Value>> {
    let mut params = HashMap::new();

    if let Some(raw) = params_json {
        let value: Value = serde_json::from_str(raw).with_context(|| "Invalid JSON in --params")?;
        let Value::Object(map) = value else {
            bail!("--params must be a JSON object");
        };
        params.extend(map);
    }

    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Invalid parameter '{pair}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid parameter '{pair}': empty key");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        params.insert(key.to_string(), value);
    }

    Ok(params)
}

fn exec_counts(node_ids: &[&str], report: &RunReport) -> Map<String, Value> {
    node_ids
        .iter()
        .map(|id| (id.to_string(), Value::from(report.exec_count(id))))
        .collect()
}

// ---------------------------------------------------------------------------
// Styled output
// ---------------------------------------------------------------------------

fn print_report(
    report: &RunReport,
    node_ids: &[&str],
    events: &[ChainEvent],
    quiet: bool,
) -> Result<()> {
    let result = serde_json::to_string_pretty(&report.result.to_value())?;
    if quiet {
        println!("{result}");
        return Ok(());
    }

    println!();
    println!(
        "  {} Chain '{}' {}",
        style("*").green().bold(),
        style(&report.chain_id).cyan(),
        status_label(report.status)
    );
    println!("  Run ID: {}", report.run_id);
    if let Some(message) = &report.message {
        println!("  Message: {message}");
    }
    println!("  Duration: {}ms", report.duration_ms());
    println!();
    println!("  {}", style("Result:").bold());
    for line in result.lines() {
        println!("    {line}");
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Node").fg(Color::Cyan), Cell::new("Executions")]);
    for id in node_ids {
        table.add_row(vec![Cell::new(id), Cell::new(report.exec_count(id))]);
    }
    println!("{table}");
    println!();

    print_trace(events);
    Ok(())
}

fn print_trace(events: &[ChainEvent]) {
    if events.is_empty() {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Event").fg(Color::Cyan),
            Cell::new("Node"),
            Cell::new("Detail"),
        ]);

    for (i, event) in events.iter().enumerate() {
        let event_cell = match event {
            ChainEvent::Error { .. } => Cell::new(event.name()).fg(Color::Red),
            _ => Cell::new(event.name()),
        };
        table.add_row(vec![
            Cell::new(i + 1),
            event_cell,
            Cell::new(event.node_id().unwrap_or("-")),
            Cell::new(event_detail(event)),
        ]);
    }

    println!("{table}");
    println!();
}

fn event_detail(event: &ChainEvent) -> String {
    match event {
        ChainEvent::InvokeAfter { result, .. } => truncate(&result.to_string(), 60),
        ChainEvent::NodeFinished { exec_count, .. } => format!("count {exec_count}"),
        ChainEvent::Error { error, .. } => error.clone(),
        ChainEvent::ChainFinished {
            status, message, ..
        } => match message {
            Some(message) => format!("{status}: {message}"),
            None => status.to_string(),
        },
        _ => String::new(),
    }
}

fn status_label(status: ChainStatus) -> console::StyledObject<String> {
    match status {
        ChainStatus::StoppedError => style(status.to_string()).red(),
        ChainStatus::StoppedNormal => style(status.to_string()).green(),
        _ => style(status.to_string()).yellow(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}
