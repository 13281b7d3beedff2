//! Raw packet representation
//!
//! The minimal per-packet view the aggregation pass needs: timestamp,
//! 5-tuple, payload length, and TCP flags. Produced by the pcap reader,
//! consumed by the connection aggregator.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// IP protocol numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other(u8),
}

impl From<u8> for Protocol {
    fn from(val: u8) -> Self {
        match val {
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            1 | 58 => Protocol::Icmp,
            other => Protocol::Other(other),
        }
    }
}

impl Protocol {
    pub fn number(&self) -> u8 {
        match self {
            Protocol::Icmp => 1,
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Other(n) => *n,
        }
    }

    /// KDD protocol_type column value
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::Other(_) => "other",
        }
    }
}

/// TCP flags
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
    pub fn is_syn(&self) -> bool {
        self.syn && !self.ack
    }

    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack
    }
}

/// One parsed packet as seen by the aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    pub timestamp: DateTime<Utc>,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub protocol: Protocol,
    /// Transport payload length in bytes
    pub payload_len: u32,
    /// TCP flags, None for non-TCP packets
    pub flags: Option<TcpFlags>,
    /// Nonzero IP fragment offset or mangled fragmentation flags
    pub bad_fragment: bool,
}

impl PacketRecord {
    /// The packet's 5-tuple in originator order.
    pub fn tuple(&self) -> (IpAddr, u16, IpAddr, u16, u8) {
        (
            self.src_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            self.protocol.number(),
        )
    }
}
