//! Per-source flow accumulator
//!
//! One open window of traffic from a single source address. The tracker
//! feeds packets in timestamp order; the accumulator keeps the raw
//! observations the feature computation needs and nothing else.

use crate::core::PacketEvent;

/// Open flow window for one source address
#[derive(Debug, Clone, Default)]
pub struct FlowAccumulator {
    /// Timestamp of the first packet in the window
    pub start: f64,
    /// Timestamp of the most recent packet
    pub end: f64,

    /// Destination ports in observation order
    pub dest_ports: Vec<u16>,

    // Global TCP flag counters
    pub fin_count: u32,
    pub syn_count: u32,
    pub rst_count: u32,
    pub psh_count: u32,
    pub ack_count: u32,

    // Directional PSH/URG counters
    pub fwd_psh: u32,
    pub bwd_psh: u32,
    pub fwd_urg: u32,
    pub bwd_urg: u32,

    // Per-direction packet lengths
    pub fwd_lengths: Vec<f64>,
    pub bwd_lengths: Vec<f64>,

    // Per-direction packet timestamps
    pub fwd_times: Vec<f64>,
    pub bwd_times: Vec<f64>,

    // Per-direction inter-arrival times
    pub fwd_iats: Vec<f64>,
    pub bwd_iats: Vec<f64>,
}

impl FlowAccumulator {
    /// Start a new window at the first packet's timestamp
    pub fn new(timestamp: f64) -> Self {
        Self {
            start: timestamp,
            end: timestamp,
            ..Default::default()
        }
    }

    /// Window duration in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Total packets observed in the window
    pub fn total_packets(&self) -> usize {
        self.fwd_lengths.len() + self.bwd_lengths.len()
    }

    /// Fold one packet into the window. `forward` is true when the packet
    /// source matches the flow key (the source this accumulator is keyed by).
    pub fn update(&mut self, pkt: &PacketEvent, forward: bool) {
        self.end = pkt.timestamp;
        self.dest_ports.push(pkt.dest_port());

        if let Some(flags) = pkt.tcp_flags() {
            if flags.fin { self.fin_count += 1; }
            if flags.syn { self.syn_count += 1; }
            if flags.rst { self.rst_count += 1; }
            if flags.psh { self.psh_count += 1; }
            if flags.ack { self.ack_count += 1; }

            if forward {
                if flags.psh { self.fwd_psh += 1; }
                if flags.urg { self.fwd_urg += 1; }
            } else {
                if flags.psh { self.bwd_psh += 1; }
                if flags.urg { self.bwd_urg += 1; }
            }
        }

        let len = pkt.raw_len as f64;
        if forward {
            self.fwd_lengths.push(len);
            if let Some(&last) = self.fwd_times.last() {
                self.fwd_iats.push(pkt.timestamp - last);
            }
            self.fwd_times.push(pkt.timestamp);
        } else {
            self.bwd_lengths.push(len);
            if let Some(&last) = self.bwd_times.last() {
                self.bwd_iats.push(pkt.timestamp - last);
            }
            self.bwd_times.push(pkt.timestamp);
        }
    }

    /// Check whether the window spans at least `window_secs`
    pub fn is_complete(&self, window_secs: f64) -> bool {
        self.duration() >= window_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TcpFlags;
    use std::net::{IpAddr, Ipv4Addr};

    fn tcp_pkt(ts: f64, flags: TcpFlags) -> PacketEvent {
        PacketEvent::new(
            ts,
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            64,
        )
        .with_tcp(44000, 8080, flags)
    }

    #[test]
    fn test_flag_counting() {
        let mut acc = FlowAccumulator::new(0.0);
        acc.update(&tcp_pkt(0.0, TcpFlags { syn: true, ..Default::default() }), true);
        acc.update(&tcp_pkt(0.1, TcpFlags { psh: true, ack: true, ..Default::default() }), true);
        acc.update(&tcp_pkt(0.2, TcpFlags { psh: true, urg: true, ..Default::default() }), false);

        assert_eq!(acc.syn_count, 1);
        assert_eq!(acc.psh_count, 2);
        assert_eq!(acc.ack_count, 1);
        assert_eq!(acc.fwd_psh, 1);
        assert_eq!(acc.bwd_psh, 1);
        assert_eq!(acc.bwd_urg, 1);
        assert_eq!(acc.fwd_urg, 0);
    }

    #[test]
    fn test_iat_needs_previous_timestamp() {
        let mut acc = FlowAccumulator::new(1.0);
        acc.update(&tcp_pkt(1.0, TcpFlags::default()), true);
        assert!(acc.fwd_iats.is_empty());

        acc.update(&tcp_pkt(1.5, TcpFlags::default()), true);
        assert_eq!(acc.fwd_iats, vec![0.5]);

        // First backward packet still produces no backward IAT
        acc.update(&tcp_pkt(2.0, TcpFlags::default()), false);
        assert!(acc.bwd_iats.is_empty());
    }

    #[test]
    fn test_window_completion() {
        let mut acc = FlowAccumulator::new(10.0);
        acc.update(&tcp_pkt(10.0, TcpFlags::default()), true);
        assert!(!acc.is_complete(1.0));

        acc.update(&tcp_pkt(10.9, TcpFlags::default()), true);
        assert!(!acc.is_complete(1.0));

        acc.update(&tcp_pkt(11.0, TcpFlags::default()), true);
        assert!(acc.is_complete(1.0));
        assert!((acc.duration() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_transport_still_counted() {
        let mut acc = FlowAccumulator::new(0.0);
        let bare = PacketEvent::new(
            0.0,
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            128,
        );
        acc.update(&bare, true);

        assert_eq!(acc.dest_ports, vec![0]);
        assert_eq!(acc.fwd_lengths, vec![128.0]);
        assert_eq!(acc.syn_count + acc.fin_count + acc.ack_count, 0);
    }
}
