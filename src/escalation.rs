//! Warning/block escalation state machine
//!
//! Each source id moves through CLEAN -> WARNED(n) -> BLOCKED as non-benign
//! windows accumulate. The block is sticky: only an explicit reset clears
//! it. Promotion into BLOCKED queues exactly one ledger incident, and the
//! block takes effect whether or not that write ever lands.

use std::collections::HashMap;
use std::net::IpAddr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::classifier::TrafficLabel;
use crate::ledger::Incident;

/// What a benign window does to an offender's warning counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenignPolicy {
    /// Clear the counter back to zero
    Reset,
    /// Take one warning back
    Decrement,
}

/// Escalation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Warnings required before a source is blocked
    pub max_warnings: u32,
    /// Benign-window policy for warned sources
    pub benign_policy: BenignPolicy,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_warnings: 3,
            benign_policy: BenignPolicy::Reset,
        }
    }
}

/// Warning/block state for one source id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffenderRecord {
    pub warnings: u32,
    pub blocked: bool,
}

/// Outcome of recording one classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No warnings outstanding
    Clean,
    /// Warned, not yet blocked
    Warned(u32),
    /// Blocked; `promoted` is true only on the transition into BLOCKED
    Blocked { promoted: bool },
}

/// Escalation engine: owns the offender table, internally synchronized.
///
/// Shared between the packet-processing path and external status queries;
/// all mutation happens under the table's write lock, and the ledger send
/// runs after the lock is released.
pub struct EscalationEngine {
    config: EscalationConfig,
    table: RwLock<HashMap<IpAddr, OffenderRecord>>,
    incident_tx: Option<mpsc::Sender<Incident>>,
}

impl EscalationEngine {
    /// Create an engine with no ledger attached (state machine only)
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            config,
            table: RwLock::new(HashMap::new()),
            incident_tx: None,
        }
    }

    /// Attach the ledger incident queue
    pub fn with_ledger(mut self, tx: mpsc::Sender<Incident>) -> Self {
        self.incident_tx = Some(tx);
        self
    }

    /// Record one window's classification for a source.
    ///
    /// The transition is decided atomically under the write lock; exactly
    /// one incident is queued per promotion into BLOCKED.
    pub fn record(&self, source: IpAddr, label: TrafficLabel) -> Verdict {
        let (verdict, incident) = {
            let mut table = self.table.write();

            if label.is_benign() {
                // Records are created lazily on the first non-benign window;
                // a benign window for an unseen id is a no-op.
                let Some(entry) = table.get_mut(&source) else {
                    return Verdict::Clean;
                };

                if entry.blocked {
                    // Sticky: a benign window never unblocks
                    (Verdict::Blocked { promoted: false }, None)
                } else {
                    match self.config.benign_policy {
                        BenignPolicy::Reset => entry.warnings = 0,
                        BenignPolicy::Decrement => {
                            entry.warnings = entry.warnings.saturating_sub(1)
                        }
                    }
                    if entry.warnings == 0 {
                        (Verdict::Clean, None)
                    } else {
                        (Verdict::Warned(entry.warnings), None)
                    }
                }
            } else {
                let entry = table.entry(source).or_default();
                entry.warnings += 1;
                if entry.blocked {
                    // Already blocked: count the warning, no new incident
                    (Verdict::Blocked { promoted: false }, None)
                } else if entry.warnings >= self.config.max_warnings {
                    entry.blocked = true;
                    (
                        Verdict::Blocked { promoted: true },
                        Some(Incident::new(source.to_string(), label.to_string())),
                    )
                } else {
                    (Verdict::Warned(entry.warnings), None)
                }
            }
        };

        match verdict {
            Verdict::Warned(n) => {
                debug!(source = %source, label = %label, warnings = n, "warning recorded")
            }
            Verdict::Blocked { promoted: true } => {
                info!(source = %source, label = %label, "source blocked")
            }
            _ => {}
        }

        if let Some(incident) = incident {
            self.send_incident(incident);
        }

        verdict
    }

    fn send_incident(&self, incident: Incident) {
        let Some(tx) = &self.incident_tx else { return };
        if let Err(e) = tx.try_send(incident) {
            // Block already took effect; a dropped ledger entry is
            // reconciled by the external refresh path.
            warn!("incident queue send failed: {}", e);
        }
    }

    /// Whether a source is currently blocked (unseen ids are not)
    pub fn is_blocked(&self, source: &IpAddr) -> bool {
        self.table.read().get(source).map(|r| r.blocked).unwrap_or(false)
    }

    /// Outstanding warnings for a source (0 for unseen ids)
    pub fn warning_count(&self, source: &IpAddr) -> u32 {
        self.table.read().get(source).map(|r| r.warnings).unwrap_or(0)
    }

    /// Explicit external reset: clears warnings and the block
    pub fn reset(&self, source: &IpAddr) {
        let removed = self.table.write().remove(source);
        if removed.is_some() {
            info!(source = %source, "escalation state reset");
        }
    }

    /// Snapshot of the offender table for external exposure. Copies the
    /// entries so no lock is held across a boundary call.
    pub fn snapshot(&self) -> Vec<(IpAddr, OffenderRecord)> {
        self.table
            .read()
            .iter()
            .map(|(ip, record)| (*ip, *record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::sync::mpsc;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))
    }

    fn engine() -> EscalationEngine {
        EscalationEngine::new(EscalationConfig::default())
    }

    #[test]
    fn test_clean_to_blocked_path() {
        let engine = engine();

        assert_eq!(engine.record(ip(), TrafficLabel::Hulk), Verdict::Warned(1));
        assert_eq!(engine.record(ip(), TrafficLabel::Hulk), Verdict::Warned(2));
        assert_eq!(
            engine.record(ip(), TrafficLabel::Hulk),
            Verdict::Blocked { promoted: true }
        );
        assert!(engine.is_blocked(&ip()));
        assert_eq!(engine.warning_count(&ip()), 3);
    }

    #[test]
    fn test_promotion_emits_exactly_one_incident() {
        let (tx, mut rx) = mpsc::channel(8);
        let engine = EscalationEngine::new(EscalationConfig::default()).with_ledger(tx);

        for _ in 0..3 {
            engine.record(ip(), TrafficLabel::SynFlood);
        }
        // Fourth non-benign window on a blocked id: no second incident
        assert_eq!(
            engine.record(ip(), TrafficLabel::SynFlood),
            Verdict::Blocked { promoted: false }
        );

        let incident = rx.try_recv().expect("one incident on promotion");
        assert_eq!(incident.source, ip().to_string());
        assert_eq!(incident.attack_type, "SYNFLOOD");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_benign_resets_warnings() {
        let engine = engine();
        engine.record(ip(), TrafficLabel::UdpFlood);
        engine.record(ip(), TrafficLabel::UdpFlood);
        assert_eq!(engine.warning_count(&ip()), 2);

        assert_eq!(engine.record(ip(), TrafficLabel::Benign), Verdict::Clean);
        assert_eq!(engine.warning_count(&ip()), 0);
    }

    #[test]
    fn test_benign_decrement_policy() {
        let engine = EscalationEngine::new(EscalationConfig {
            max_warnings: 3,
            benign_policy: BenignPolicy::Decrement,
        });
        engine.record(ip(), TrafficLabel::PostFlood);
        engine.record(ip(), TrafficLabel::PostFlood);

        assert_eq!(engine.record(ip(), TrafficLabel::Benign), Verdict::Warned(1));
        assert_eq!(engine.record(ip(), TrafficLabel::Benign), Verdict::Clean);
        // Saturates at zero
        assert_eq!(engine.record(ip(), TrafficLabel::Benign), Verdict::Clean);
    }

    #[test]
    fn test_block_is_sticky_through_benign() {
        let engine = engine();
        for _ in 0..3 {
            engine.record(ip(), TrafficLabel::Hulk);
        }
        assert_eq!(
            engine.record(ip(), TrafficLabel::Benign),
            Verdict::Blocked { promoted: false }
        );
        assert!(engine.is_blocked(&ip()));
    }

    #[test]
    fn test_unknown_label_is_non_benign() {
        let engine = engine();
        assert_eq!(engine.record(ip(), TrafficLabel::Unknown), Verdict::Warned(1));
    }

    #[test]
    fn test_unseen_id_defaults() {
        let engine = engine();
        assert!(!engine.is_blocked(&ip()));
        assert_eq!(engine.warning_count(&ip()), 0);
    }

    #[test]
    fn test_explicit_reset_unblocks() {
        let engine = engine();
        for _ in 0..3 {
            engine.record(ip(), TrafficLabel::Hulk);
        }
        assert!(engine.is_blocked(&ip()));

        engine.reset(&ip());
        assert!(!engine.is_blocked(&ip()));
        assert_eq!(engine.warning_count(&ip()), 0);
    }

    #[test]
    fn test_snapshot_copies_state() {
        let engine = engine();
        engine.record(ip(), TrafficLabel::Hulk);

        let snap = engine.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, ip());
        assert_eq!(snap[0].1, OffenderRecord { warnings: 1, blocked: false });
    }

    #[test]
    fn test_blocked_implies_threshold_reached() {
        let engine = engine();
        for _ in 0..5 {
            engine.record(ip(), TrafficLabel::Hulk);
        }
        let snap = engine.snapshot();
        let record = snap[0].1;
        assert!(record.blocked);
        assert!(record.warnings >= 3);
    }
}
