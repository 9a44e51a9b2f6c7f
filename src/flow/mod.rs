//! Flow window segmentation
//!
//! Segments the packet stream into per-source windows and hands closed
//! windows to the feature computation.
//!
//! # Example
//!
//! ```ignore
//! use floodwarden::flow::{FlowTracker, FlowConfig};
//!
//! let mut tracker = FlowTracker::new(FlowConfig::default());
//! if let Some((src, vector)) = tracker.ingest(&packet) {
//!     // window closed: classify `vector`
//! }
//! ```

pub mod accumulator;
pub mod tracker;

pub use accumulator::FlowAccumulator;
pub use tracker::{FlowTracker, SharedFlowTracker};

use serde::{Deserialize, Serialize};

/// Configuration for flow window segmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Window span in seconds before a flow emits its feature vector
    pub window_secs: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self { window_secs: 1.0 }
    }
}

/// Flow tracking statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Packets ingested
    pub packets_processed: u64,
    /// Bytes ingested
    pub bytes_processed: u64,
    /// Windows closed and emitted
    pub windows_emitted: u64,
    /// Sources with an open accumulator
    pub active_sources: usize,
}
