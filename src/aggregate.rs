//! Connection aggregation
//!
//! Groups raw packets into per-5-tuple connections and tracks the counters
//! the feature extractor needs. A connection is emitted when a terminal TCP
//! flag sequence is observed (RST, or FIN from both sides), when it idles
//! past the configured timeout, when it exceeds the maximum duration, or at
//! session end via [`Aggregator::finish`].
//!
//! Emission order is what downstream sliding-window features are computed
//! over: terminal-flag completions emit in packet arrival order; everything
//! still open at session end emits sorted by start timestamp, with ties
//! broken by the 5-tuple's lexicographic ordering so replayed captures are
//! deterministic.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AggregatorConfig;
use crate::packet::{PacketRecord, Protocol};

/// Connection status flag, KDD convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnFlag {
    /// Normal establishment and termination
    Sf,
    /// SYN seen, no reply
    S0,
    /// Established, never properly closed
    S1,
    /// Connection attempt rejected (RST answering SYN)
    Rej,
    /// Reset by originator after establishment
    Rsto,
    /// Reset by responder after establishment
    Rstr,
    /// Originator sent SYN then FIN without a reply
    Sh,
    /// Mid-stream traffic, no handshake observed
    Oth,
}

impl ConnFlag {
    pub fn label(&self) -> &'static str {
        match self {
            ConnFlag::Sf => "SF",
            ConnFlag::S0 => "S0",
            ConnFlag::S1 => "S1",
            ConnFlag::Rej => "REJ",
            ConnFlag::Rsto => "RSTO",
            ConnFlag::Rstr => "RSTR",
            ConnFlag::Sh => "SH",
            ConnFlag::Oth => "OTH",
        }
    }

    /// Handshake never completed normally
    pub fn is_syn_error(&self) -> bool {
        matches!(self, ConnFlag::S0 | ConnFlag::S1 | ConnFlag::Sh)
    }

    /// Connection refused or torn down by reset
    pub fn is_rej_error(&self) -> bool {
        matches!(self, ConnFlag::Rej | ConnFlag::Rsto | ConnFlag::Rstr)
    }
}

/// A finalized connection, ready for feature extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub protocol: Protocol,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Payload bytes from originator
    pub src_bytes: u64,
    /// Payload bytes from responder
    pub dst_bytes: u64,
    pub flag: ConnFlag,
    /// Source and destination endpoint are identical
    pub land: bool,
    /// Packets with bad fragmentation
    pub wrong_fragment: u32,
    /// Packets with the TCP urgent flag set
    pub urgent: u32,
}

impl ConnectionRecord {
    /// Whole seconds between first and last packet, clamped to >= 0.
    pub fn duration_secs(&self) -> u64 {
        (self.end - self.start).num_seconds().max(0) as u64
    }

    /// 5-tuple used for deterministic tie-breaking.
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

/// TCP handshake progress for flag classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    /// First packet was not a bare SYN
    MidStream,
    SynSent,
    SynAckSeen,
    Established,
}

/// In-progress connection state
#[derive(Debug)]
struct Connection {
    src_ip: IpAddr,
    src_port: u16,
    dst_ip: IpAddr,
    dst_port: u16,
    protocol: Protocol,
    start: DateTime<Utc>,
    last: DateTime<Utc>,
    src_bytes: u64,
    dst_bytes: u64,
    handshake: Handshake,
    fin_from_src: bool,
    fin_from_dst: bool,
    /// Some(true) if the originator sent the RST
    rst_by_src: Option<bool>,
    wrong_fragment: u32,
    urgent: u32,
}

impl Connection {
    fn new(pkt: &PacketRecord) -> Self {
        let handshake = match (pkt.protocol, pkt.flags) {
            (Protocol::Tcp, Some(flags)) if flags.is_syn() => Handshake::SynSent,
            (Protocol::Tcp, _) => Handshake::MidStream,
            _ => Handshake::MidStream,
        };

        let mut conn = Self {
            src_ip: pkt.src_ip,
            src_port: pkt.src_port,
            dst_ip: pkt.dst_ip,
            dst_port: pkt.dst_port,
            protocol: pkt.protocol,
            start: pkt.timestamp,
            last: pkt.timestamp,
            src_bytes: 0,
            dst_bytes: 0,
            handshake,
            fin_from_src: false,
            fin_from_dst: false,
            rst_by_src: None,
            wrong_fragment: 0,
            urgent: 0,
        };
        conn.account(pkt, true);
        conn
    }

    fn is_from_originator(&self, pkt: &PacketRecord) -> bool {
        pkt.src_ip == self.src_ip && pkt.src_port == self.src_port
    }

    fn update(&mut self, pkt: &PacketRecord) {
        let from_src = self.is_from_originator(pkt);
        if pkt.timestamp > self.last {
            self.last = pkt.timestamp;
        }
        self.account(pkt, from_src);

        if let Some(flags) = pkt.flags {
            if flags.rst && self.rst_by_src.is_none() {
                self.rst_by_src = Some(from_src);
            }
            if flags.fin {
                if from_src {
                    self.fin_from_src = true;
                } else {
                    self.fin_from_dst = true;
                }
            }
            self.handshake = match self.handshake {
                Handshake::SynSent if flags.is_syn_ack() && !from_src => Handshake::SynAckSeen,
                Handshake::SynAckSeen if flags.ack && !flags.syn && from_src => {
                    Handshake::Established
                }
                other => other,
            };
        }
    }

    fn account(&mut self, pkt: &PacketRecord, from_src: bool) {
        if from_src {
            self.src_bytes += pkt.payload_len as u64;
        } else {
            self.dst_bytes += pkt.payload_len as u64;
        }
        if pkt.bad_fragment {
            self.wrong_fragment += 1;
        }
        if pkt.flags.map(|f| f.urg).unwrap_or(false) {
            self.urgent += 1;
        }
    }

    /// Terminal flag sequence observed
    fn terminated(&self) -> bool {
        self.rst_by_src.is_some() || (self.fin_from_src && self.fin_from_dst)
    }

    fn classify_flag(&self) -> ConnFlag {
        if self.protocol != Protocol::Tcp {
            // No handshake to judge; the KDD convention is SF.
            return ConnFlag::Sf;
        }

        match self.handshake {
            Handshake::MidStream => ConnFlag::Oth,
            Handshake::SynSent => match self.rst_by_src {
                Some(false) => ConnFlag::Rej,
                Some(true) => ConnFlag::Rsto,
                None if self.fin_from_src => ConnFlag::Sh,
                None => ConnFlag::S0,
            },
            Handshake::SynAckSeen | Handshake::Established => match self.rst_by_src {
                Some(true) => ConnFlag::Rsto,
                Some(false) => ConnFlag::Rstr,
                None if self.fin_from_src && self.fin_from_dst => ConnFlag::Sf,
                None => ConnFlag::S1,
            },
        }
    }

    fn finalize(self) -> ConnectionRecord {
        let flag = self.classify_flag();
        ConnectionRecord {
            src_ip: self.src_ip,
            src_port: self.src_port,
            dst_ip: self.dst_ip,
            dst_port: self.dst_port,
            protocol: self.protocol,
            start: self.start,
            end: self.last,
            src_bytes: self.src_bytes,
            dst_bytes: self.dst_bytes,
            flag,
            land: self.src_ip == self.dst_ip && self.src_port == self.dst_port,
            wrong_fragment: self.wrong_fragment,
            urgent: self.urgent,
        }
    }
}

/// Direction-agnostic map key so reply packets find their connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ConnKey {
    low: (IpAddr, u16),
    high: (IpAddr, u16),
    protocol: u8,
}

impl ConnKey {
    fn from_packet(pkt: &PacketRecord) -> Self {
        let a = (pkt.src_ip, pkt.src_port);
        let b = (pkt.dst_ip, pkt.dst_port);
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low,
            high,
            protocol: pkt.protocol.number(),
        }
    }
}

/// Groups packets into connections for one capture session
pub struct Aggregator {
    idle_timeout: Duration,
    max_duration: Duration,
    active: HashMap<ConnKey, Connection>,
    completed: Vec<ConnectionRecord>,
}

impl Aggregator {
    pub fn new(config: &AggregatorConfig) -> Self {
        Self {
            idle_timeout: Duration::seconds(config.idle_timeout_secs as i64),
            max_duration: Duration::seconds(config.max_duration_secs as i64),
            active: HashMap::new(),
            completed: Vec::new(),
        }
    }

    /// Feed one packet, in arrival order.
    pub fn push(&mut self, pkt: &PacketRecord) {
        let key = ConnKey::from_packet(pkt);

        if let Some(conn) = self.active.get_mut(&key) {
            let idle = pkt.timestamp - conn.last;
            let age = pkt.timestamp - conn.start;
            if idle > self.idle_timeout || age > self.max_duration {
                // The previous connection on this tuple is over; this packet
                // starts a fresh one.
                let old = self.active.remove(&key).expect("present");
                self.completed.push(old.finalize());
                self.active.insert(key, Connection::new(pkt));
                return;
            }

            conn.update(pkt);
            if conn.terminated() {
                let done = self.active.remove(&key).expect("present");
                self.completed.push(done.finalize());
            }
        } else {
            self.active.insert(key, Connection::new(pkt));
        }
    }

    /// Number of connections still open.
    pub fn open_count(&self) -> usize {
        self.active.len()
    }

    /// End the capture session: finalize everything still open and return
    /// all records in emission order. Empty input yields an empty vector,
    /// not an error.
    pub fn finish(mut self) -> Vec<ConnectionRecord> {
        let mut remainder: Vec<ConnectionRecord> = self
            .active
            .drain()
            .map(|(_, conn)| conn.finalize())
            .collect();
        remainder.sort_by(|a, b| (a.start, a.tuple()).cmp(&(b.start, b.tuple())));
        self.completed.extend(remainder);
        self.completed
    }
}
