//! Packet event representation
//!
//! A `PacketEvent` is the unit of input delivered by the capture
//! collaborator: one timestamped IP packet with an optional transport
//! header. Non-IP and malformed frames are dropped before they get here.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Transport-layer protocol carried by a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Other(u8),
}

impl From<u8> for TransportProtocol {
    fn from(val: u8) -> Self {
        match val {
            6 => TransportProtocol::Tcp,
            17 => TransportProtocol::Udp,
            other => TransportProtocol::Other(other),
        }
    }
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportProtocol::Tcp => write!(f, "TCP"),
            TransportProtocol::Udp => write!(f, "UDP"),
            TransportProtocol::Other(n) => write!(f, "Proto({})", n),
        }
    }
}

/// TCP control flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
}

impl TcpFlags {
    pub fn from_u8(flags: u8) -> Self {
        Self {
            fin: flags & 0x01 != 0,
            syn: flags & 0x02 != 0,
            rst: flags & 0x04 != 0,
            psh: flags & 0x08 != 0,
            ack: flags & 0x10 != 0,
            urg: flags & 0x20 != 0,
        }
    }

    pub fn to_u8(&self) -> u8 {
        let mut flags = 0u8;
        if self.fin { flags |= 0x01; }
        if self.syn { flags |= 0x02; }
        if self.rst { flags |= 0x04; }
        if self.psh { flags |= 0x08; }
        if self.ack { flags |= 0x10; }
        if self.urg { flags |= 0x20; }
        flags
    }
}

impl std::fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        if self.syn { s.push('S'); }
        if self.ack { s.push('A'); }
        if self.fin { s.push('F'); }
        if self.rst { s.push('R'); }
        if self.psh { s.push('P'); }
        if self.urg { s.push('U'); }
        if s.is_empty() { s.push('.'); }
        write!(f, "{}", s)
    }
}

/// Transport header of a packet event
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Transport {
    pub protocol: TransportProtocol,
    pub src_port: u16,
    pub dst_port: u16,
    /// Raw TCP flag bits (zero for UDP)
    pub flags: u8,
}

/// One captured packet, as delivered by the capture boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketEvent {
    /// Capture timestamp, monotonic fractional seconds
    pub timestamp: f64,
    /// Source address
    pub src_ip: IpAddr,
    /// Destination address
    pub dst_ip: IpAddr,
    /// Transport header, absent for bare IP payloads
    pub transport: Option<Transport>,
    /// Total packet length in bytes, headers included
    pub raw_len: u32,
}

impl PacketEvent {
    /// Create a bare packet event with no transport header
    pub fn new(timestamp: f64, src_ip: IpAddr, dst_ip: IpAddr, raw_len: u32) -> Self {
        Self {
            timestamp,
            src_ip,
            dst_ip,
            transport: None,
            raw_len,
        }
    }

    /// Attach a TCP header
    pub fn with_tcp(mut self, src_port: u16, dst_port: u16, flags: TcpFlags) -> Self {
        self.transport = Some(Transport {
            protocol: TransportProtocol::Tcp,
            src_port,
            dst_port,
            flags: flags.to_u8(),
        });
        self
    }

    /// Attach a UDP header
    pub fn with_udp(mut self, src_port: u16, dst_port: u16) -> Self {
        self.transport = Some(Transport {
            protocol: TransportProtocol::Udp,
            src_port,
            dst_port,
            flags: 0,
        });
        self
    }

    /// Destination port for flow bookkeeping: the transport port when a
    /// TCP/UDP header is present, 0 otherwise.
    pub fn dest_port(&self) -> u16 {
        match self.transport {
            Some(t) if matches!(t.protocol, TransportProtocol::Tcp | TransportProtocol::Udp) => {
                t.dst_port
            }
            _ => 0,
        }
    }

    /// Decoded TCP flags, None for non-TCP packets
    pub fn tcp_flags(&self) -> Option<TcpFlags> {
        match self.transport {
            Some(t) if t.protocol == TransportProtocol::Tcp => Some(TcpFlags::from_u8(t.flags)),
            _ => None,
        }
    }

    /// Check if this is a TCP packet
    pub fn is_tcp(&self) -> bool {
        matches!(
            self.transport,
            Some(Transport { protocol: TransportProtocol::Tcp, .. })
        )
    }
}
