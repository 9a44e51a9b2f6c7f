//! floodwarden - flow-based DoS detection core
//!
//! Segments captured traffic into per-source flow windows, derives a fixed
//! statistical feature vector per window, classifies each window through an
//! external pretrained model, and escalates repeat offenders to a blocked
//! state with confirmed incidents pushed to a tamper-evident ledger.
//!
//! ## Pipeline
//!
//! ```text
//! packet ─→ FlowTracker.ingest ─→ (window close) FeatureVector
//!                                        │
//!                                        ▼
//!                              Classifier.classify
//!                                        │
//!                                        ▼
//!                            EscalationEngine.record ──→ ledger queue
//! ```
//!
//! The capture facility, the trained model, and the ledger service are
//! external collaborators behind injected client interfaces; everything
//! that needs exact statistical and state-machine semantics lives here.

pub mod classifier;
pub mod config;
pub mod core;
pub mod escalation;
pub mod features;
pub mod flow;
pub mod ledger;
pub mod monitor;
pub mod watchdog;

pub use classifier::{Classifier, ClassifierError, HttpClassifier, TrafficLabel};
pub use config::Config;
pub use core::{PacketEvent, TcpFlags, Transport, TransportProtocol};
pub use escalation::{BenignPolicy, EscalationEngine, OffenderRecord, Verdict};
pub use features::{FeatureVector, SafeStats};
pub use flow::{FlowAccumulator, FlowTracker, SharedFlowTracker};
pub use ledger::{HttpLedgerClient, Incident, IncidentRecord, LedgerClient};
pub use monitor::{Monitor, MonitorReport, StopReason};
pub use watchdog::IdleWatchdog;
