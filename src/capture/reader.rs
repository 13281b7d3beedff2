//! Pcap artifact decoding
//!
//! Reads a finished capture file and lowers each frame to the
//! [`PacketRecord`] view the aggregator consumes. Frames that are not
//! IP-over-Ethernet (ARP, STP, truncated junk) are skipped, not errors.

use std::net::IpAddr;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use etherparse::SlicedPacket;

use crate::error::{PipelineError, Result};
use crate::packet::{PacketRecord, Protocol, TcpFlags};

/// Read every parseable packet from a pcap file, in capture order.
pub fn read_pcap(path: &Path) -> Result<Vec<PacketRecord>> {
    let mut capture = pcap::Capture::from_file(path)
        .map_err(|e| PipelineError::Capture(format!("unable to open {}: {e}", path.display())))?;

    let mut packets = Vec::new();
    loop {
        match capture.next_packet() {
            Ok(frame) => {
                let timestamp = frame_timestamp(frame.header.ts.tv_sec, frame.header.ts.tv_usec);
                if let Some(record) = parse_frame(frame.data, timestamp) {
                    packets.push(record);
                }
            }
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                return Err(PipelineError::Capture(format!(
                    "error reading {}: {e}",
                    path.display()
                )))
            }
        }
    }
    Ok(packets)
}

fn frame_timestamp(tv_sec: i64, tv_usec: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(tv_sec, (tv_usec.max(0) as u32) * 1000)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Lower one Ethernet frame to a [`PacketRecord`]. None for non-IP frames.
pub fn parse_frame(data: &[u8], timestamp: DateTime<Utc>) -> Option<PacketRecord> {
    let sliced = SlicedPacket::from_ethernet(data).ok()?;

    let (src_ip, dst_ip, protocol, bad_fragment): (IpAddr, IpAddr, Protocol, bool) =
        match &sliced.net {
            Some(etherparse::NetSlice::Ipv4(ipv4)) => {
                let header = ipv4.header();
                let protocol = match header.protocol() {
                    etherparse::IpNumber::TCP => Protocol::Tcp,
                    etherparse::IpNumber::UDP => Protocol::Udp,
                    etherparse::IpNumber::ICMP => Protocol::Icmp,
                    other => Protocol::Other(other.0),
                };
                (
                    IpAddr::from(header.source_addr()),
                    IpAddr::from(header.destination_addr()),
                    protocol,
                    header.fragments_offset().value() > 0,
                )
            }
            Some(etherparse::NetSlice::Ipv6(ipv6)) => {
                let header = ipv6.header();
                let protocol = match header.next_header() {
                    etherparse::IpNumber::TCP => Protocol::Tcp,
                    etherparse::IpNumber::UDP => Protocol::Udp,
                    etherparse::IpNumber::IPV6_ICMP => Protocol::Icmp,
                    other => Protocol::Other(other.0),
                };
                (
                    IpAddr::from(header.source_addr()),
                    IpAddr::from(header.destination_addr()),
                    protocol,
                    false,
                )
            }
            _ => return None,
        };

    let (src_port, dst_port, payload_len, flags) = match &sliced.transport {
        Some(etherparse::TransportSlice::Tcp(tcp)) => (
            tcp.source_port(),
            tcp.destination_port(),
            tcp.payload().len() as u32,
            Some(TcpFlags {
                fin: tcp.fin(),
                syn: tcp.syn(),
                rst: tcp.rst(),
                psh: tcp.psh(),
                ack: tcp.ack(),
                urg: tcp.urg(),
            }),
        ),
        Some(etherparse::TransportSlice::Udp(udp)) => (
            udp.source_port(),
            udp.destination_port(),
            udp.payload().len() as u32,
            None,
        ),
        Some(etherparse::TransportSlice::Icmpv4(icmp)) => {
            (0, 0, icmp.payload().len() as u32, None)
        }
        Some(etherparse::TransportSlice::Icmpv6(icmp)) => {
            (0, 0, icmp.payload().len() as u32, None)
        }
        _ => (0, 0, 0, None),
    };

    Some(PacketRecord {
        timestamp,
        src_ip,
        src_port,
        dst_ip,
        dst_port,
        protocol,
        payload_len,
        flags,
        bad_fragment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    #[test]
    fn test_parse_tcp_frame() {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([192, 168, 1, 10], [10, 0, 0, 1], 64)
            .tcp(50000, 80, 1000, 65535)
            .syn();
        let payload = [0u8; 0];
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, &payload).unwrap();

        let record = parse_frame(&frame, Utc::now()).expect("parseable frame");
        assert_eq!(record.src_port, 50000);
        assert_eq!(record.dst_port, 80);
        assert_eq!(record.protocol, Protocol::Tcp);
        let flags = record.flags.unwrap();
        assert!(flags.syn);
        assert!(!flags.ack);
        assert_eq!(record.payload_len, 0);
    }

    #[test]
    fn test_parse_udp_frame_with_payload() {
        let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4([192, 168, 1, 10], [10, 0, 0, 1], 64)
            .udp(40000, 53);
        let payload = [0u8; 24];
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, &payload).unwrap();

        let record = parse_frame(&frame, Utc::now()).expect("parseable frame");
        assert_eq!(record.protocol, Protocol::Udp);
        assert_eq!(record.dst_port, 53);
        assert_eq!(record.payload_len, 24);
        assert!(record.flags.is_none());
    }

    #[test]
    fn test_non_ip_frame_skipped() {
        // An ARP ethertype with no IP layer behind it.
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x06;
        assert!(parse_frame(&frame, Utc::now()).is_none());
    }
}
