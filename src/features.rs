//! Flow feature derivation
//!
//! Turns a closed [`FlowAccumulator`] into the fixed 46-field vector the
//! traffic classifier was trained on (CICIDS-style column names). Pure
//! computation: same accumulator in, same vector out.
//!
//! Two semantics here are load-bearing and easy to get wrong:
//!
//! - Statistics over an empty list are all zero with count 0. That is the
//!   output contract, not an error path.
//! - The combined flow IAT series is the diff of the *sorted union* of
//!   forward and backward timestamps, not the concatenation of the two
//!   directional IAT lists. The two differ numerically whenever directions
//!   interleave.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flow::FlowAccumulator;

/// Summary statistics over a list of samples.
///
/// Empty input yields zeros across the board; std/var are population
/// statistics (divide by n).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SafeStats {
    pub sum: f64,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    pub std: f64,
    pub var: f64,
    pub count: usize,
}

impl SafeStats {
    pub fn of(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self::default();
        }

        let count = data.len();
        let sum: f64 = data.iter().sum();
        let mean = sum / count as f64;
        let max = data.iter().copied().fold(f64::MIN, f64::max);
        let min = data.iter().copied().fold(f64::MAX, f64::min);
        let var = data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;

        Self {
            sum,
            mean,
            max,
            min,
            std: var.sqrt(),
            var,
            count,
        }
    }
}

/// Most frequently observed port; ties go to the value encountered first.
pub fn dominant_port(ports: &[u16]) -> u16 {
    if ports.is_empty() {
        return 0;
    }

    let mut counts: HashMap<u16, u32> = HashMap::new();
    for &p in ports {
        *counts.entry(p).or_insert(0) += 1;
    }
    let best = counts.values().copied().max().unwrap_or(0);

    // Scan in observation order so ties resolve to the first-seen value.
    ports
        .iter()
        .copied()
        .find(|p| counts[p] == best)
        .unwrap_or(0)
}

/// Fixed, ordered feature vector for one closed flow window.
///
/// Field order and serialized names match the classifier's training schema;
/// `NAMES` and `values()` follow declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "Destination Port")]
    pub destination_port: f64,
    #[serde(rename = "Flow Duration")]
    pub flow_duration: f64,

    #[serde(rename = "Total Fwd Packets")]
    pub total_fwd_packets: f64,
    #[serde(rename = "Total Backward Packets")]
    pub total_bwd_packets: f64,
    #[serde(rename = "Total Length of Fwd Packets")]
    pub total_len_fwd_packets: f64,
    #[serde(rename = "Total Length of Bwd Packets")]
    pub total_len_bwd_packets: f64,

    #[serde(rename = "Fwd Packet Length Max")]
    pub fwd_packet_len_max: f64,
    #[serde(rename = "Fwd Packet Length Min")]
    pub fwd_packet_len_min: f64,
    #[serde(rename = "Fwd Packet Length Mean")]
    pub fwd_packet_len_mean: f64,
    #[serde(rename = "Fwd Packet Length Std")]
    pub fwd_packet_len_std: f64,

    #[serde(rename = "Bwd Packet Length Max")]
    pub bwd_packet_len_max: f64,
    #[serde(rename = "Bwd Packet Length Min")]
    pub bwd_packet_len_min: f64,
    #[serde(rename = "Bwd Packet Length Mean")]
    pub bwd_packet_len_mean: f64,
    #[serde(rename = "Bwd Packet Length Std")]
    pub bwd_packet_len_std: f64,

    #[serde(rename = "Flow Bytes/s")]
    pub flow_bytes_per_sec: f64,
    #[serde(rename = "Flow Packets/s")]
    pub flow_packets_per_sec: f64,
    #[serde(rename = "Fwd Packets/s")]
    pub fwd_packets_per_sec: f64,
    #[serde(rename = "Bwd Packets/s")]
    pub bwd_packets_per_sec: f64,

    #[serde(rename = "Min Packet Length")]
    pub min_packet_len: f64,
    #[serde(rename = "Max Packet Length")]
    pub max_packet_len: f64,
    #[serde(rename = "Packet Length Mean")]
    pub packet_len_mean: f64,
    #[serde(rename = "Packet Length Std")]
    pub packet_len_std: f64,
    #[serde(rename = "Packet Length Variance")]
    pub packet_len_variance: f64,

    #[serde(rename = "Flow IAT Mean")]
    pub flow_iat_mean: f64,
    #[serde(rename = "Flow IAT Std")]
    pub flow_iat_std: f64,
    #[serde(rename = "Flow IAT Max")]
    pub flow_iat_max: f64,
    #[serde(rename = "Flow IAT Min")]
    pub flow_iat_min: f64,

    #[serde(rename = "Fwd IAT Total")]
    pub fwd_iat_total: f64,
    #[serde(rename = "Fwd IAT Mean")]
    pub fwd_iat_mean: f64,
    #[serde(rename = "Fwd IAT Std")]
    pub fwd_iat_std: f64,
    #[serde(rename = "Fwd IAT Max")]
    pub fwd_iat_max: f64,
    #[serde(rename = "Fwd IAT Min")]
    pub fwd_iat_min: f64,

    #[serde(rename = "Bwd IAT Total")]
    pub bwd_iat_total: f64,
    #[serde(rename = "Bwd IAT Mean")]
    pub bwd_iat_mean: f64,
    #[serde(rename = "Bwd IAT Std")]
    pub bwd_iat_std: f64,
    #[serde(rename = "Bwd IAT Max")]
    pub bwd_iat_max: f64,
    #[serde(rename = "Bwd IAT Min")]
    pub bwd_iat_min: f64,

    #[serde(rename = "FIN Flag Count")]
    pub fin_flag_count: f64,
    #[serde(rename = "SYN Flag Count")]
    pub syn_flag_count: f64,
    #[serde(rename = "RST Flag Count")]
    pub rst_flag_count: f64,
    #[serde(rename = "PSH Flag Count")]
    pub psh_flag_count: f64,
    #[serde(rename = "ACK Flag Count")]
    pub ack_flag_count: f64,

    #[serde(rename = "Fwd PSH Flags")]
    pub fwd_psh_flags: f64,
    #[serde(rename = "Bwd PSH Flags")]
    pub bwd_psh_flags: f64,
    #[serde(rename = "Fwd URG Flags")]
    pub fwd_urg_flags: f64,
    #[serde(rename = "Bwd URG Flags")]
    pub bwd_urg_flags: f64,
}

impl FeatureVector {
    /// Number of features in the vector
    pub const LEN: usize = 46;

    /// Feature names in vector order (the classifier's training schema)
    pub const NAMES: [&'static str; Self::LEN] = [
        "Destination Port",
        "Flow Duration",
        "Total Fwd Packets",
        "Total Backward Packets",
        "Total Length of Fwd Packets",
        "Total Length of Bwd Packets",
        "Fwd Packet Length Max",
        "Fwd Packet Length Min",
        "Fwd Packet Length Mean",
        "Fwd Packet Length Std",
        "Bwd Packet Length Max",
        "Bwd Packet Length Min",
        "Bwd Packet Length Mean",
        "Bwd Packet Length Std",
        "Flow Bytes/s",
        "Flow Packets/s",
        "Fwd Packets/s",
        "Bwd Packets/s",
        "Min Packet Length",
        "Max Packet Length",
        "Packet Length Mean",
        "Packet Length Std",
        "Packet Length Variance",
        "Flow IAT Mean",
        "Flow IAT Std",
        "Flow IAT Max",
        "Flow IAT Min",
        "Fwd IAT Total",
        "Fwd IAT Mean",
        "Fwd IAT Std",
        "Fwd IAT Max",
        "Fwd IAT Min",
        "Bwd IAT Total",
        "Bwd IAT Mean",
        "Bwd IAT Std",
        "Bwd IAT Max",
        "Bwd IAT Min",
        "FIN Flag Count",
        "SYN Flag Count",
        "RST Flag Count",
        "PSH Flag Count",
        "ACK Flag Count",
        "Fwd PSH Flags",
        "Bwd PSH Flags",
        "Fwd URG Flags",
        "Bwd URG Flags",
    ];

    /// Feature values in vector order
    pub fn values(&self) -> [f64; Self::LEN] {
        [
            self.destination_port,
            self.flow_duration,
            self.total_fwd_packets,
            self.total_bwd_packets,
            self.total_len_fwd_packets,
            self.total_len_bwd_packets,
            self.fwd_packet_len_max,
            self.fwd_packet_len_min,
            self.fwd_packet_len_mean,
            self.fwd_packet_len_std,
            self.bwd_packet_len_max,
            self.bwd_packet_len_min,
            self.bwd_packet_len_mean,
            self.bwd_packet_len_std,
            self.flow_bytes_per_sec,
            self.flow_packets_per_sec,
            self.fwd_packets_per_sec,
            self.bwd_packets_per_sec,
            self.min_packet_len,
            self.max_packet_len,
            self.packet_len_mean,
            self.packet_len_std,
            self.packet_len_variance,
            self.flow_iat_mean,
            self.flow_iat_std,
            self.flow_iat_max,
            self.flow_iat_min,
            self.fwd_iat_total,
            self.fwd_iat_mean,
            self.fwd_iat_std,
            self.fwd_iat_max,
            self.fwd_iat_min,
            self.bwd_iat_total,
            self.bwd_iat_mean,
            self.bwd_iat_std,
            self.bwd_iat_max,
            self.bwd_iat_min,
            self.fin_flag_count,
            self.syn_flag_count,
            self.rst_flag_count,
            self.psh_flag_count,
            self.ack_flag_count,
            self.fwd_psh_flags,
            self.bwd_psh_flags,
            self.fwd_urg_flags,
            self.bwd_urg_flags,
        ]
    }

    /// Derive the feature vector from a closed flow window
    pub fn from_accumulator(acc: &FlowAccumulator) -> Self {
        let duration = acc.duration();

        let fwd = SafeStats::of(&acc.fwd_lengths);
        let bwd = SafeStats::of(&acc.bwd_lengths);

        let mut all_lengths = acc.fwd_lengths.clone();
        all_lengths.extend_from_slice(&acc.bwd_lengths);
        let all = SafeStats::of(&all_lengths);

        let rate = |count: f64| if duration > 0.0 { count / duration } else { 0.0 };

        // The combined flow IAT series comes from the merged, sorted
        // timestamp union, not from concatenating the directional IATs.
        let mut all_times = acc.fwd_times.clone();
        all_times.extend_from_slice(&acc.bwd_times);
        all_times.sort_by(f64::total_cmp);
        let flow_iats: Vec<f64> = all_times.windows(2).map(|w| w[1] - w[0]).collect();

        let flow_iat = SafeStats::of(&flow_iats);
        let fwd_iat = SafeStats::of(&acc.fwd_iats);
        let bwd_iat = SafeStats::of(&acc.bwd_iats);

        Self {
            destination_port: dominant_port(&acc.dest_ports) as f64,
            flow_duration: duration,
            total_fwd_packets: fwd.count as f64,
            total_bwd_packets: bwd.count as f64,
            total_len_fwd_packets: fwd.sum,
            total_len_bwd_packets: bwd.sum,
            fwd_packet_len_max: fwd.max,
            fwd_packet_len_min: fwd.min,
            fwd_packet_len_mean: fwd.mean,
            fwd_packet_len_std: fwd.std,
            bwd_packet_len_max: bwd.max,
            bwd_packet_len_min: bwd.min,
            bwd_packet_len_mean: bwd.mean,
            bwd_packet_len_std: bwd.std,
            flow_bytes_per_sec: rate(all.sum),
            flow_packets_per_sec: rate(all.count as f64),
            fwd_packets_per_sec: rate(fwd.count as f64),
            bwd_packets_per_sec: rate(bwd.count as f64),
            min_packet_len: all.min,
            max_packet_len: all.max,
            packet_len_mean: all.mean,
            packet_len_std: all.std,
            packet_len_variance: all.var,
            flow_iat_mean: flow_iat.mean,
            flow_iat_std: flow_iat.std,
            flow_iat_max: flow_iat.max,
            flow_iat_min: flow_iat.min,
            fwd_iat_total: fwd_iat.sum,
            fwd_iat_mean: fwd_iat.mean,
            fwd_iat_std: fwd_iat.std,
            fwd_iat_max: fwd_iat.max,
            fwd_iat_min: fwd_iat.min,
            bwd_iat_total: bwd_iat.sum,
            bwd_iat_mean: bwd_iat.mean,
            bwd_iat_std: bwd_iat.std,
            bwd_iat_max: bwd_iat.max,
            bwd_iat_min: bwd_iat.min,
            fin_flag_count: acc.fin_count as f64,
            syn_flag_count: acc.syn_count as f64,
            rst_flag_count: acc.rst_count as f64,
            psh_flag_count: acc.psh_count as f64,
            ack_flag_count: acc.ack_count as f64,
            fwd_psh_flags: acc.fwd_psh as f64,
            bwd_psh_flags: acc.bwd_psh as f64,
            fwd_urg_flags: acc.fwd_urg as f64,
            bwd_urg_flags: acc.bwd_urg as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_safe_stats_empty() {
        let s = SafeStats::of(&[]);
        assert_eq!(s, SafeStats::default());
        assert_eq!(s.count, 0);
        assert_eq!(s.sum, 0.0);
        assert_eq!(s.min, 0.0);
        assert_eq!(s.max, 0.0);
        assert_eq!(s.std, 0.0);
        assert_eq!(s.var, 0.0);
    }

    #[test]
    fn test_safe_stats_population_variance() {
        let s = SafeStats::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!(close(s.mean, 5.0));
        assert!(close(s.var, 4.0));
        assert!(close(s.std, 2.0));
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert_eq!(s.count, 8);
    }

    #[test]
    fn test_dominant_port_by_frequency() {
        assert_eq!(dominant_port(&[80, 80, 443]), 80);
    }

    #[test]
    fn test_dominant_port_tie_breaks_first_seen() {
        assert_eq!(dominant_port(&[8080, 443, 8080, 443]), 8080);
        assert_eq!(dominant_port(&[443, 8080, 8080, 443]), 443);
    }

    #[test]
    fn test_dominant_port_empty() {
        assert_eq!(dominant_port(&[]), 0);
    }

    #[test]
    fn test_combined_iats_merge_sort_diff() {
        // Forward at 0 and 2, backward at 1: the combined series must be
        // [1, 1], not the concatenation of directional IATs ([2]).
        let acc = FlowAccumulator {
            start: 0.0,
            end: 2.0,
            fwd_times: vec![0.0, 2.0],
            bwd_times: vec![1.0],
            fwd_iats: vec![2.0],
            fwd_lengths: vec![64.0, 64.0],
            bwd_lengths: vec![64.0],
            ..Default::default()
        };

        let v = FeatureVector::from_accumulator(&acc);
        assert!(close(v.flow_iat_mean, 1.0));
        assert!(close(v.flow_iat_std, 0.0));
        assert!(close(v.flow_iat_max, 1.0));
        assert!(close(v.flow_iat_min, 1.0));
        // Directional series untouched
        assert!(close(v.fwd_iat_mean, 2.0));
        assert!(close(v.fwd_iat_total, 2.0));
        assert!(close(v.bwd_iat_total, 0.0));
    }

    #[test]
    fn test_empty_direction_all_zero() {
        let acc = FlowAccumulator {
            start: 0.0,
            end: 1.0,
            fwd_times: vec![0.0, 1.0],
            fwd_lengths: vec![100.0, 50.0],
            fwd_iats: vec![1.0],
            ..Default::default()
        };

        let v = FeatureVector::from_accumulator(&acc);
        assert_eq!(v.total_bwd_packets, 0.0);
        assert_eq!(v.total_len_bwd_packets, 0.0);
        assert_eq!(v.bwd_packet_len_max, 0.0);
        assert_eq!(v.bwd_packet_len_min, 0.0);
        assert_eq!(v.bwd_packet_len_mean, 0.0);
        assert_eq!(v.bwd_packet_len_std, 0.0);
        assert_eq!(v.bwd_iat_total, 0.0);
        assert_eq!(v.bwd_packets_per_sec, 0.0);
    }

    #[test]
    fn test_rates_zero_for_zero_duration() {
        let acc = FlowAccumulator {
            start: 5.0,
            end: 5.0,
            fwd_times: vec![5.0],
            fwd_lengths: vec![1500.0],
            ..Default::default()
        };

        let v = FeatureVector::from_accumulator(&acc);
        assert_eq!(v.flow_bytes_per_sec, 0.0);
        assert_eq!(v.flow_packets_per_sec, 0.0);
        assert_eq!(v.fwd_packets_per_sec, 0.0);
        assert_eq!(v.bwd_packets_per_sec, 0.0);
    }

    #[test]
    fn test_rates_over_duration() {
        let acc = FlowAccumulator {
            start: 0.0,
            end: 2.0,
            fwd_times: vec![0.0, 1.0, 2.0],
            fwd_lengths: vec![100.0, 100.0, 100.0],
            fwd_iats: vec![1.0, 1.0],
            ..Default::default()
        };

        let v = FeatureVector::from_accumulator(&acc);
        assert!(close(v.flow_bytes_per_sec, 150.0));
        assert!(close(v.flow_packets_per_sec, 1.5));
        assert!(close(v.fwd_packets_per_sec, 1.5));
    }

    #[test]
    fn test_names_match_values_len() {
        let v = FeatureVector::default();
        assert_eq!(FeatureVector::NAMES.len(), v.values().len());
        assert_eq!(FeatureVector::NAMES.len(), FeatureVector::LEN);
    }

    #[test]
    fn test_serialized_schema_order() {
        let v = FeatureVector::default();
        let json = serde_json::to_value(&v).unwrap();
        let obj = json.as_object().unwrap();
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        assert_eq!(keys, FeatureVector::NAMES.to_vec());
    }
}
