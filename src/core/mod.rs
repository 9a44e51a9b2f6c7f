//! Core types shared across the detection pipeline

pub mod packet;

pub use packet::{PacketEvent, TcpFlags, Transport, TransportProtocol};
