//! Flow tracker - per-source window segmentation engine
//!
//! Ingests the sequential packet stream, maintains one open accumulator per
//! source address, and emits a feature vector whenever a window spans the
//! configured duration.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::PacketEvent;
use crate::features::FeatureVector;
use super::accumulator::FlowAccumulator;
use super::{FlowConfig, TrackerStats};

/// Per-source flow window tracker
pub struct FlowTracker {
    /// Configuration
    config: FlowConfig,
    /// Open accumulators, keyed by source address
    flows: HashMap<IpAddr, FlowAccumulator>,
    /// Tracker statistics
    stats: TrackerStats,
}

impl FlowTracker {
    /// Create a new flow tracker
    pub fn new(config: FlowConfig) -> Self {
        info!("Initializing flow tracker (window={}s)", config.window_secs);

        Self {
            config,
            flows: HashMap::new(),
            stats: TrackerStats::default(),
        }
    }

    /// Ingest one packet. Returns the source and its feature vector when the
    /// packet closes that source's window; the accumulator is removed in the
    /// same step, so the next packet from the source starts a fresh window.
    pub fn ingest(&mut self, pkt: &PacketEvent) -> Option<(IpAddr, FeatureVector)> {
        self.stats.packets_processed += 1;
        self.stats.bytes_processed += pkt.raw_len as u64;

        let src = pkt.src_ip;
        let acc = self
            .flows
            .entry(src)
            .or_insert_with(|| FlowAccumulator::new(pkt.timestamp));

        // Forward means the packet source matches the flow key. With
        // per-source keying the live path always resolves forward; backward
        // observations enter through accumulators built elsewhere.
        let forward = pkt.src_ip == src;
        acc.update(pkt, forward);

        if acc.is_complete(self.config.window_secs) {
            let vector = FeatureVector::from_accumulator(acc);
            self.flows.remove(&src);
            self.stats.windows_emitted += 1;
            self.stats.active_sources = self.flows.len();
            debug!(
                source = %src,
                duration = vector.flow_duration,
                packets = vector.flow_packets_per_sec * vector.flow_duration,
                "flow window closed"
            );
            return Some((src, vector));
        }

        self.stats.active_sources = self.flows.len();
        None
    }

    /// Peek at the open accumulator for a source
    pub fn get(&self, src: &IpAddr) -> Option<&FlowAccumulator> {
        self.flows.get(src)
    }

    /// Number of sources with an open window
    pub fn active_sources(&self) -> usize {
        self.flows.len()
    }

    /// Tracker statistics
    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Drop every open accumulator (idle-timeout cleanup path)
    pub fn clear(&mut self) {
        let dropped = self.flows.len();
        self.flows.clear();
        self.stats.active_sources = 0;
        if dropped > 0 {
            info!("Cleared {} open flow accumulators", dropped);
        }
    }
}

/// Thread-safe flow tracker wrapper.
///
/// Ingestion and any window-close processing running on other tasks share
/// the table through this lock.
pub struct SharedFlowTracker {
    inner: Arc<RwLock<FlowTracker>>,
}

impl SharedFlowTracker {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(FlowTracker::new(config))),
        }
    }

    pub async fn ingest(&self, pkt: &PacketEvent) -> Option<(IpAddr, FeatureVector)> {
        let mut tracker = self.inner.write().await;
        tracker.ingest(pkt)
    }

    pub async fn active_sources(&self) -> usize {
        let tracker = self.inner.read().await;
        tracker.active_sources()
    }

    pub async fn stats(&self) -> TrackerStats {
        let tracker = self.inner.read().await;
        tracker.stats().clone()
    }

    pub async fn clear(&self) {
        let mut tracker = self.inner.write().await;
        tracker.clear()
    }
}

impl Clone for SharedFlowTracker {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TcpFlags;
    use std::net::Ipv4Addr;

    fn src() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100))
    }

    fn dst() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    fn syn_packet(ts: f64, dport: u16) -> PacketEvent {
        PacketEvent::new(ts, src(), dst(), 64).with_tcp(
            54321,
            dport,
            TcpFlags { syn: true, ..Default::default() },
        )
    }

    #[test]
    fn test_window_emits_once_and_resets() {
        let mut tracker = FlowTracker::new(FlowConfig::default());

        assert!(tracker.ingest(&syn_packet(0.0, 8080)).is_none());
        assert!(tracker.ingest(&syn_packet(0.5, 8080)).is_none());
        assert_eq!(tracker.active_sources(), 1);

        let (emitted_src, vector) = tracker.ingest(&syn_packet(1.0, 8080)).expect("window closes");
        assert_eq!(emitted_src, src());
        assert_eq!(vector.total_fwd_packets, 3.0);
        assert_eq!(vector.syn_flag_count, 3.0);
        assert_eq!(vector.destination_port, 8080.0);

        // Accumulator gone: no cross-window leakage
        assert_eq!(tracker.active_sources(), 0);
        assert!(tracker.get(&src()).is_none());
        assert_eq!(tracker.stats().windows_emitted, 1);
    }

    #[test]
    fn test_next_packet_starts_fresh_window() {
        let mut tracker = FlowTracker::new(FlowConfig::default());
        tracker.ingest(&syn_packet(0.0, 80));
        tracker.ingest(&syn_packet(1.0, 80)).expect("window closes");

        tracker.ingest(&syn_packet(5.0, 443));
        let acc = tracker.get(&src()).expect("fresh accumulator");
        assert_eq!(acc.start, 5.0);
        assert_eq!(acc.total_packets(), 1);
        assert_eq!(acc.syn_count, 1);
    }

    #[test]
    fn test_sources_tracked_independently() {
        let mut tracker = FlowTracker::new(FlowConfig::default());
        let other = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 101));

        tracker.ingest(&syn_packet(0.0, 80));
        let mut pkt = syn_packet(0.2, 80);
        pkt.src_ip = other;
        tracker.ingest(&pkt);

        assert_eq!(tracker.active_sources(), 2);

        // Closing one source's window leaves the other open
        tracker.ingest(&syn_packet(1.0, 80)).expect("window closes");
        assert_eq!(tracker.active_sources(), 1);
        assert!(tracker.get(&other).is_some());
    }

    #[test]
    fn test_clear_drops_all_state() {
        let mut tracker = FlowTracker::new(FlowConfig::default());
        tracker.ingest(&syn_packet(0.0, 80));
        tracker.clear();
        assert_eq!(tracker.active_sources(), 0);
        assert_eq!(tracker.stats().packets_processed, 1);
    }

    #[tokio::test]
    async fn test_shared_tracker() {
        let tracker = SharedFlowTracker::new(FlowConfig::default());
        assert!(tracker.ingest(&syn_packet(0.0, 80)).await.is_none());
        assert_eq!(tracker.active_sources().await, 1);

        let clone = tracker.clone();
        assert!(clone.ingest(&syn_packet(1.0, 80)).await.is_some());
        assert_eq!(tracker.active_sources().await, 0);
    }
}
