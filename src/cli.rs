use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use floodwarden::classifier::HttpClassifier;
use floodwarden::config::Config;
use floodwarden::core::PacketEvent;
use floodwarden::escalation::EscalationEngine;
use floodwarden::ledger::{spawn_ledger_writer, HttpLedgerClient, LedgerClient};
use floodwarden::monitor::Monitor;

#[derive(Parser)]
#[command(name = "floodwarden")]
#[command(author, version, about = "Flow-based DoS detection with ML classification and a blockchain incident ledger")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the detection pipeline, reading JSON-lines packet events on stdin
    Run,

    /// List confirmed incidents from the ledger
    Incidents,

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Load config from the CLI path or the default search locations
fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

pub async fn run_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run => {
            let config = load_config(&cli)?;
            run_monitor(config).await
        }

        Commands::Incidents => {
            let config = load_config(&cli)?;
            let ledger = HttpLedgerClient::new(config.ledger)?;
            let incidents = ledger.fetch_all().await?;
            if incidents.is_empty() {
                println!("No incidents recorded");
            }
            for incident in incidents {
                println!(
                    "{}  {}  {}  {}",
                    incident.timestamp, incident.source, incident.attack_type, incident.tx_ref
                );
            }
            Ok(())
        }

        Commands::GenConfig { output } => {
            let config = Config::default();
            match output {
                Some(path) => {
                    config.save(&path)?;
                    println!("Configuration written to {}", path.display());
                }
                None => print!("{}", toml::to_string_pretty(&config)?),
            }
            Ok(())
        }
    }
}

/// Wire the pipeline together and drive it from stdin.
///
/// The capture collaborator is external: it delivers one JSON packet event
/// per line. Lines that fail to parse are dropped silently, mirroring how
/// non-IP frames never reach the tracker.
async fn run_monitor(config: Config) -> Result<()> {
    let classifier = Arc::new(HttpClassifier::new(config.classifier.clone())?);

    let (incident_tx, incident_rx) = mpsc::channel(config.ledger.queue_size);
    let ledger = Arc::new(HttpLedgerClient::new(config.ledger.clone())?);
    let writer = spawn_ledger_writer(ledger, incident_rx);

    let escalation = Arc::new(
        EscalationEngine::new(config.escalation.clone()).with_ledger(incident_tx),
    );
    let mut monitor = Monitor::new(
        config.monitor.clone(),
        config.flow.clone(),
        escalation.clone(),
        classifier,
    );

    let shutdown = monitor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping");
            shutdown.shutdown().await;
        }
    });

    let (packet_tx, packet_rx) = mpsc::channel::<PacketEvent>(4096);
    let reader = tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PacketEvent>(&line) {
                Ok(pkt) => {
                    if packet_tx.send(pkt).await.is_err() {
                        break;
                    }
                }
                // Malformed events are dropped, not errors.
                Err(e) => warn!("skipping malformed packet event: {}", e),
            }
        }
    });

    let report = monitor.run(packet_rx).await?;
    reader.abort();

    let blocked: Vec<String> = escalation
        .snapshot()
        .into_iter()
        .filter(|(_, r)| r.blocked)
        .map(|(ip, _)| ip.to_string())
        .collect();
    info!(
        packets = report.packets_seen,
        windows = report.windows_emitted,
        blocked = blocked.len(),
        "run finished"
    );
    if !blocked.is_empty() {
        println!("Blocked sources: {}", blocked.join(", "));
    }

    // Give queued ledger writes a chance to drain before exit. The writer
    // ends once every incident sender is gone.
    drop(monitor);
    drop(escalation);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), writer).await;

    Ok(())
}
