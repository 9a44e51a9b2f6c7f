//! Capture-loop orchestration
//!
//! Pulls packet events off the capture channel, feeds the flow tracker, and
//! for every closed window runs classification and escalation on a spawned
//! task so a slow classifier call never holds up ingestion of the next
//! packet. The idle watchdog stops the loop on a quiet wire.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::classifier::Classifier;
use crate::core::PacketEvent;
use crate::escalation::{EscalationEngine, Verdict};
use crate::features::FeatureVector;
use crate::flow::{FlowConfig, SharedFlowTracker};
use crate::watchdog::IdleWatchdog;

/// Watchdog poll interval
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds without a packet before the loop stops
    pub idle_timeout_secs: u64,
    /// Only classify windows whose dominant port matches; None classifies all
    pub classify_port: Option<u16>,
    /// Sources exempt from classification (e.g. the monitored host itself)
    pub ignore_sources: Vec<IpAddr>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 5,
            classify_port: None,
            ignore_sources: Vec::new(),
        }
    }
}

/// Why the monitor loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Idle timeout elapsed (normal termination)
    IdleTimeout,
    /// The capture channel closed
    SourceClosed,
    /// External shutdown request
    Shutdown,
}

/// Summary of one monitor run
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub packets_seen: u64,
    pub windows_emitted: u64,
    pub windows_classified: u64,
    pub windows_skipped: u64,
    pub classifier_failures: u64,
    pub stop_reason: StopReason,
}

/// Handle for requesting a monitor stop from outside the loop
#[derive(Clone)]
pub struct ShutdownHandle(mpsc::Sender<()>);

impl ShutdownHandle {
    pub async fn shutdown(&self) {
        let _ = self.0.send(()).await;
    }
}

/// Detection pipeline driver
pub struct Monitor {
    config: MonitorConfig,
    tracker: SharedFlowTracker,
    escalation: Arc<EscalationEngine>,
    classifier: Arc<dyn Classifier>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: Option<mpsc::Receiver<()>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        flow_config: FlowConfig,
        escalation: Arc<EscalationEngine>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            config,
            tracker: SharedFlowTracker::new(flow_config),
            escalation,
            classifier,
            shutdown_tx,
            shutdown_rx: Some(shutdown_rx),
        }
    }

    /// Handle for stopping the loop from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    /// Escalation engine shared with this monitor
    pub fn escalation(&self) -> Arc<EscalationEngine> {
        self.escalation.clone()
    }

    /// Run the loop until the capture channel closes, the wire goes idle,
    /// or a shutdown is requested. Idle expiry clears all open accumulators
    /// and returns normally.
    pub async fn run(&mut self, mut packets: mpsc::Receiver<PacketEvent>) -> Result<MonitorReport> {
        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("monitor already ran"))?;

        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);
        let mut watchdog = IdleWatchdog::new(idle_timeout);
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let ignore: Arc<HashSet<IpAddr>> =
            Arc::new(self.config.ignore_sources.iter().copied().collect());
        let packets_seen = Arc::new(AtomicU64::new(0));
        let windows_emitted = Arc::new(AtomicU64::new(0));
        let windows_classified = Arc::new(AtomicU64::new(0));
        let windows_skipped = Arc::new(AtomicU64::new(0));
        let classifier_failures = Arc::new(AtomicU64::new(0));

        let mut tasks: JoinSet<()> = JoinSet::new();

        info!(
            idle_timeout_secs = self.config.idle_timeout_secs,
            "monitor started"
        );

        let stop_reason = loop {
            tokio::select! {
                maybe_pkt = packets.recv() => {
                    let Some(pkt) = maybe_pkt else {
                        break StopReason::SourceClosed;
                    };

                    watchdog.touch();
                    packets_seen.fetch_add(1, Ordering::Relaxed);

                    if let Some((src, vector)) = self.tracker.ingest(&pkt).await {
                        windows_emitted.fetch_add(1, Ordering::Relaxed);
                        tasks.spawn(process_window(
                            src,
                            vector,
                            self.classifier.clone(),
                            self.escalation.clone(),
                            self.config.classify_port,
                            ignore.clone(),
                            windows_classified.clone(),
                            windows_skipped.clone(),
                            classifier_failures.clone(),
                        ));
                    }

                    if watchdog.expired() {
                        break StopReason::IdleTimeout;
                    }
                }

                _ = tick.tick() => {
                    if watchdog.expired() {
                        break StopReason::IdleTimeout;
                    }
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}

                _ = shutdown_rx.recv() => {
                    break StopReason::Shutdown;
                }
            }
        };

        // Let in-flight classifications finish before reporting.
        while tasks.join_next().await.is_some() {}

        if stop_reason == StopReason::IdleTimeout {
            info!(
                "no packet for {}s, stopping capture loop",
                self.config.idle_timeout_secs
            );
        }
        self.tracker.clear().await;

        let report = MonitorReport {
            packets_seen: packets_seen.load(Ordering::Relaxed),
            windows_emitted: windows_emitted.load(Ordering::Relaxed),
            windows_classified: windows_classified.load(Ordering::Relaxed),
            windows_skipped: windows_skipped.load(Ordering::Relaxed),
            classifier_failures: classifier_failures.load(Ordering::Relaxed),
            stop_reason,
        };
        info!(
            packets = report.packets_seen,
            windows = report.windows_emitted,
            classified = report.windows_classified,
            failures = report.classifier_failures,
            "monitor stopped"
        );
        Ok(report)
    }

    /// Sources with an open accumulator (exposed for status queries)
    pub async fn active_sources(&self) -> usize {
        self.tracker.active_sources().await
    }
}

/// Classify one closed window and feed the verdict to escalation.
///
/// A classifier failure is fatal for this window only: it is logged and the
/// window is dropped without a label.
#[allow(clippy::too_many_arguments)]
async fn process_window(
    src: IpAddr,
    vector: FeatureVector,
    classifier: Arc<dyn Classifier>,
    escalation: Arc<EscalationEngine>,
    classify_port: Option<u16>,
    ignore: Arc<HashSet<IpAddr>>,
    classified: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
) {
    if ignore.contains(&src) || escalation.is_blocked(&src) {
        skipped.fetch_add(1, Ordering::Relaxed);
        return;
    }

    if let Some(port) = classify_port {
        if vector.destination_port != port as f64 {
            skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
    }

    match classifier.classify(&vector).await {
        Ok(label) => {
            classified.fetch_add(1, Ordering::Relaxed);
            match escalation.record(src, label) {
                Verdict::Clean => {
                    debug!(source = %src, label = %label, "window benign")
                }
                Verdict::Warned(n) => {
                    info!(source = %src, label = %label, warnings = n, "window flagged")
                }
                Verdict::Blocked { promoted } => {
                    if promoted {
                        info!(source = %src, label = %label, "offender blocked");
                    }
                }
            }
        }
        Err(e) => {
            failures.fetch_add(1, Ordering::Relaxed);
            error!(source = %src, "classification failed: {}", e);
        }
    }
}
