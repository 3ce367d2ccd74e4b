use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use settle_automation::Network;
use settle_config::NetworkDef;
use settle_store::NodeReport;

/// Settle - a simulated settlement propagation network
#[derive(Parser)]
#[command(name = "settle")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the network definition (default: ~/.settle/network.json)
  #[arg(long, global = true)]
  network: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a cascade once with the payload from stdin
  Trigger {
    /// Name of the cascade
    cascade: String,
  },

  /// Dispatch an automation trigger with the payload from stdin
  Dispatch {
    /// Trigger name, e.g. purchase_processed
    trigger: String,
  },

  /// Move charge between two nodes
  Transfer {
    source: String,
    target: String,
    amount: u64,
  },

  /// Run the periodic automation timers until interrupted
  Run,

  /// Print graph, store, and engine figures
  Status,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
      EnvFilter::new(
        "warn,settle=info,settle_graph=info,settle_store=info,settle_cascade=info,settle_automation=info",
      )
    }))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let Some(command) = cli.command else {
    println!("settle - use --help to see available commands");
    return Ok(());
  };

  let def = match cli.network {
    Some(path) => load_network(&path)?,
    None => {
      let default_file = dirs::home_dir().map(|home| home.join(".settle").join("network.json"));
      match default_file.filter(|p| p.exists()) {
        Some(path) => load_network(&path)?,
        None => {
          eprintln!("No network file found, using built-in defaults");
          NetworkDef::default()
        }
      }
    }
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_command(command, def).await })
}

async fn run_command(command: Commands, def: NetworkDef) -> Result<()> {
  let network = Network::from_def(def).context("failed to assemble network")?;

  match command {
    Commands::Trigger { cascade } => {
      let payload = read_payload_from_stdin()?;
      let chain = network
        .engine()
        .trigger(&cascade, payload)
        .await
        .with_context(|| format!("failed to trigger cascade '{}'", cascade))?;

      eprintln!(
        "Chain {} finished: {:?} ({} step records)",
        chain.chain_id,
        chain.status,
        chain.steps.len()
      );
      println!("{}", serde_json::to_string_pretty(&chain)?);
    }
    Commands::Dispatch { trigger } => {
      let payload = read_payload_from_stdin()?;
      let result = network.scheduler().dispatch(&trigger, payload).await;

      eprintln!(
        "Dispatched {}: {} succeeded, {} failed",
        trigger,
        result.succeeded(),
        result.failed()
      );
      println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Commands::Transfer {
      source,
      target,
      amount,
    } => {
      network
        .store()
        .transfer(&source, &target, amount)
        .await
        .with_context(|| format!("failed to transfer {} from '{}' to '{}'", amount, source, target))?;

      let reports = [network.store().node_report(&source)?, network.store().node_report(&target)?];
      println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Commands::Run => {
      let cancel = CancellationToken::new();
      let shutdown = cancel.clone();
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          info!("shutdown requested");
        }
        shutdown.cancel();
      });

      eprintln!("Running automation timers, press ctrl-c to stop");
      network.run_timers(cancel).await;
    }
    Commands::Status => {
      let nodes: Vec<NodeReport> = network.store().nodes().iter().map(NodeReport::from).collect();
      let status = serde_json::json!({
        "cascades": network.engine().cascade_names(),
        "collective_strength": network.graph().collective_strength(),
        "graph": network.graph().stats(),
        "store": network.store().stats(),
        "engine": network.engine().stats(),
        "nodes": nodes,
      });
      println!("{}", serde_json::to_string_pretty(&status)?);
    }
  }

  Ok(())
}

fn load_network(path: &Path) -> Result<NetworkDef> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read network file: {}", path.display()))?;
  let def: NetworkDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse network file: {}", path.display()))?;

  eprintln!(
    "Loaded network: {} nodes, {} bonds",
    def.nodes.len(),
    def.bonds.len()
  );
  Ok(def)
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    Ok(serde_json::json!({}))
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read payload from stdin")?;

    if input.trim().is_empty() {
      Ok(serde_json::json!({}))
    } else {
      serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
    }
  }
}
