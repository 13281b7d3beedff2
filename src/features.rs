//! KDD-schema feature extraction
//!
//! Turns finalized connection records into the fixed 42-column statistical
//! feature format (KDD Cup 99 plus the trailing `other` column the trained
//! models expect).
//!
//! Window semantics: both sliding-window feature families are count-based
//! over previously *emitted* connection records, evaluated at emission time.
//! `count`/`srv_count` and their rates look back `recent_window` records;
//! the `dst_host_*` family looks back `host_window` records. Packet
//! timestamps only influence emission order, which makes re-extraction from
//! a replayed capture deterministic. Rates are 0 whenever the corresponding
//! window count is 0.
//!
//! Content-layer features (hot, num_failed_logins, ...) cannot be observed
//! from headers alone and are always 0 on the capture path.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::aggregate::ConnectionRecord;
use crate::packet::Protocol;
use crate::table::{Table, Value};

/// The fixed wire schema, in model input order.
pub const EXPECTED_COLUMNS: [&str; 42] = [
    "duration",
    "protocol_type",
    "service",
    "flag",
    "src_bytes",
    "dst_bytes",
    "land",
    "wrong_fragment",
    "urgent",
    "hot",
    "num_failed_logins",
    "logged_in",
    "num_compromised",
    "root_shell",
    "su_attempted",
    "num_root",
    "num_file_creations",
    "num_shells",
    "num_access_files",
    "num_outbound_cmds",
    "is_host_login",
    "is_guest_login",
    "count",
    "srv_count",
    "serror_rate",
    "srv_serror_rate",
    "rerror_rate",
    "srv_rerror_rate",
    "same_srv_rate",
    "diff_srv_rate",
    "srv_diff_host_rate",
    "dst_host_count",
    "dst_host_srv_count",
    "dst_host_same_srv_rate",
    "dst_host_diff_srv_rate",
    "dst_host_same_src_port_rate",
    "dst_host_srv_diff_host_rate",
    "dst_host_serror_rate",
    "dst_host_srv_serror_rate",
    "dst_host_rerror_rate",
    "dst_host_srv_rerror_rate",
    "other",
];

/// Categorical columns of the schema.
pub const CATEGORICAL_COLUMNS: [&str; 3] = ["protocol_type", "service", "flag"];

/// Label column dropped at inference time.
pub const LABEL_COLUMN: &str = "class";

/// The single column the adapter may synthesize when absent.
pub const OPTIONAL_COLUMN: &str = "other";

/// KDD service bucket for a destination port. Unknown ports and protocols
/// land in "other".
pub fn service_name(protocol: Protocol, dst_port: u16) -> &'static str {
    match protocol {
        Protocol::Icmp => "eco_i",
        Protocol::Tcp => match dst_port {
            20 => "ftp_data",
            21 => "ftp",
            22 => "ssh",
            23 => "telnet",
            25 => "smtp",
            53 => "domain",
            79 => "finger",
            80 => "http",
            109 => "pop_2",
            110 => "pop_3",
            111 => "sunrpc",
            113 => "auth",
            119 => "nntp",
            143 => "imap4",
            179 => "bgp",
            443 => "http_443",
            513 => "login",
            514 => "shell",
            _ => "other",
        },
        Protocol::Udp => match dst_port {
            53 => "domain_u",
            67 | 68 => "tftp_u",
            123 => "ntp_u",
            _ => "other",
        },
        Protocol::Other(_) => "other",
    }
}

/// One row in the fixed schema, plus the endpoints it came from (reported
/// alongside pcap predictions, never part of the wire columns).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,

    pub duration: u64,
    pub protocol_type: String,
    pub service: String,
    pub flag: String,
    pub src_bytes: u64,
    pub dst_bytes: u64,
    pub land: u8,
    pub wrong_fragment: u32,
    pub urgent: u32,
    pub count: u64,
    pub srv_count: u64,
    pub serror_rate: f64,
    pub srv_serror_rate: f64,
    pub rerror_rate: f64,
    pub srv_rerror_rate: f64,
    pub same_srv_rate: f64,
    pub diff_srv_rate: f64,
    pub srv_diff_host_rate: f64,
    pub dst_host_count: u64,
    pub dst_host_srv_count: u64,
    pub dst_host_same_srv_rate: f64,
    pub dst_host_diff_srv_rate: f64,
    pub dst_host_same_src_port_rate: f64,
    pub dst_host_srv_diff_host_rate: f64,
    pub dst_host_serror_rate: f64,
    pub dst_host_srv_serror_rate: f64,
    pub dst_host_rerror_rate: f64,
    pub dst_host_srv_rerror_rate: f64,
}

impl FeatureRow {
    /// Cell values in [`EXPECTED_COLUMNS`] order. Content-layer columns are
    /// zero; `other` is zero by definition on the capture path.
    pub fn to_values(&self) -> Vec<Value> {
        let mut values = vec![
            Value::Number(self.duration as f64),
            Value::Text(self.protocol_type.clone()),
            Value::Text(self.service.clone()),
            Value::Text(self.flag.clone()),
            Value::Number(self.src_bytes as f64),
            Value::Number(self.dst_bytes as f64),
            Value::Number(self.land as f64),
            Value::Number(self.wrong_fragment as f64),
            Value::Number(self.urgent as f64),
        ];
        // hot .. is_guest_login: thirteen content-layer zeros
        values.extend(std::iter::repeat(Value::Number(0.0)).take(13));
        values.extend([
            Value::Number(self.count as f64),
            Value::Number(self.srv_count as f64),
            Value::Number(self.serror_rate),
            Value::Number(self.srv_serror_rate),
            Value::Number(self.rerror_rate),
            Value::Number(self.srv_rerror_rate),
            Value::Number(self.same_srv_rate),
            Value::Number(self.diff_srv_rate),
            Value::Number(self.srv_diff_host_rate),
            Value::Number(self.dst_host_count as f64),
            Value::Number(self.dst_host_srv_count as f64),
            Value::Number(self.dst_host_same_srv_rate),
            Value::Number(self.dst_host_diff_srv_rate),
            Value::Number(self.dst_host_same_src_port_rate),
            Value::Number(self.dst_host_srv_diff_host_rate),
            Value::Number(self.dst_host_serror_rate),
            Value::Number(self.dst_host_srv_serror_rate),
            Value::Number(self.dst_host_rerror_rate),
            Value::Number(self.dst_host_srv_rerror_rate),
            Value::Number(0.0),
        ]);
        values
    }
}

/// Build a [`Table`] in the wire schema from extracted rows.
pub fn rows_to_table(rows: &[FeatureRow]) -> Table {
    let mut table = Table::new(EXPECTED_COLUMNS.iter().map(|s| s.to_string()).collect());
    for row in rows {
        table
            .push_row(row.to_values())
            .expect("feature rows match the fixed schema");
    }
    table
}

/// Computes feature rows from finalized connections.
///
/// Pure with respect to its input: the only state is the two configured
/// window widths, so identical record sequences always produce identical
/// rows.
pub struct FeatureExtractor {
    recent_window: usize,
    host_window: usize,
}

impl FeatureExtractor {
    pub fn new(recent_window: usize, host_window: usize) -> Self {
        Self {
            recent_window,
            host_window,
        }
    }

    pub fn extract(&self, records: &[ConnectionRecord]) -> Vec<FeatureRow> {
        records
            .iter()
            .enumerate()
            .map(|(i, rec)| self.extract_one(records, i, rec))
            .collect()
    }

    fn extract_one(
        &self,
        records: &[ConnectionRecord],
        index: usize,
        rec: &ConnectionRecord,
    ) -> FeatureRow {
        let service = service_name(rec.protocol, rec.dst_port);

        let recent = window(records, index, self.recent_window);
        let hosts = window(records, index, self.host_window);

        let same_host: Vec<&ConnectionRecord> =
            recent.iter().filter(|r| r.dst_ip == rec.dst_ip).collect();
        let same_srv: Vec<&ConnectionRecord> = recent
            .iter()
            .filter(|r| service_name(r.protocol, r.dst_port) == service)
            .collect();

        let dst_host: Vec<&ConnectionRecord> =
            hosts.iter().filter(|r| r.dst_ip == rec.dst_ip).collect();
        let dst_host_srv: Vec<&ConnectionRecord> = hosts
            .iter()
            .filter(|r| service_name(r.protocol, r.dst_port) == service)
            .collect();

        FeatureRow {
            src_ip: rec.src_ip,
            dst_ip: rec.dst_ip,
            duration: rec.duration_secs(),
            protocol_type: rec.protocol.label().to_string(),
            service: service.to_string(),
            flag: rec.flag.label().to_string(),
            src_bytes: rec.src_bytes,
            dst_bytes: rec.dst_bytes,
            land: rec.land as u8,
            wrong_fragment: rec.wrong_fragment,
            urgent: rec.urgent,
            count: same_host.len() as u64,
            srv_count: same_srv.len() as u64,
            serror_rate: rate(&same_host, |r| r.flag.is_syn_error()),
            srv_serror_rate: rate(&same_srv, |r| r.flag.is_syn_error()),
            rerror_rate: rate(&same_host, |r| r.flag.is_rej_error()),
            srv_rerror_rate: rate(&same_srv, |r| r.flag.is_rej_error()),
            same_srv_rate: rate(&same_host, |r| {
                service_name(r.protocol, r.dst_port) == service
            }),
            diff_srv_rate: rate(&same_host, |r| {
                service_name(r.protocol, r.dst_port) != service
            }),
            srv_diff_host_rate: rate(&same_srv, |r| r.dst_ip != rec.dst_ip),
            dst_host_count: dst_host.len() as u64,
            dst_host_srv_count: dst_host_srv.len() as u64,
            dst_host_same_srv_rate: rate(&dst_host, |r| {
                service_name(r.protocol, r.dst_port) == service
            }),
            dst_host_diff_srv_rate: rate(&dst_host, |r| {
                service_name(r.protocol, r.dst_port) != service
            }),
            dst_host_same_src_port_rate: rate(&dst_host, |r| r.src_port == rec.src_port),
            dst_host_srv_diff_host_rate: rate(&dst_host_srv, |r| r.dst_ip != rec.dst_ip),
            dst_host_serror_rate: rate(&dst_host, |r| r.flag.is_syn_error()),
            dst_host_srv_serror_rate: rate(&dst_host_srv, |r| r.flag.is_syn_error()),
            dst_host_rerror_rate: rate(&dst_host, |r| r.flag.is_rej_error()),
            dst_host_srv_rerror_rate: rate(&dst_host_srv, |r| r.flag.is_rej_error()),
        }
    }
}

/// The most recent `width` records emitted before `index`.
fn window(records: &[ConnectionRecord], index: usize, width: usize) -> &[ConnectionRecord] {
    &records[index.saturating_sub(width)..index]
}

/// Fraction of `subset` matching the predicate; 0 on an empty window.
fn rate<F>(subset: &[&ConnectionRecord], pred: F) -> f64
where
    F: Fn(&ConnectionRecord) -> bool,
{
    if subset.is_empty() {
        return 0.0;
    }
    subset.iter().filter(|r| pred(r)).count() as f64 / subset.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ConnFlag;
    use chrono::{TimeZone, Utc};
    use std::net::Ipv4Addr;

    fn record(dst_last_octet: u8, dst_port: u16, flag: ConnFlag, at: i64) -> ConnectionRecord {
        ConnectionRecord {
            src_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5)),
            src_port: 40000,
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, dst_last_octet)),
            dst_port,
            protocol: Protocol::Tcp,
            start: Utc.timestamp_opt(1_700_000_000 + at, 0).unwrap(),
            end: Utc.timestamp_opt(1_700_000_000 + at + 1, 0).unwrap(),
            src_bytes: 100,
            dst_bytes: 200,
            flag,
            land: false,
            wrong_fragment: 0,
            urgent: 0,
        }
    }

    #[test]
    fn test_first_row_has_zero_window_rates() {
        let extractor = FeatureExtractor::new(10, 100);
        let rows = extractor.extract(&[record(1, 80, ConnFlag::Sf, 0)]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.count, 0);
        assert_eq!(row.serror_rate, 0.0);
        assert_eq!(row.same_srv_rate, 0.0);
        assert_eq!(row.dst_host_serror_rate, 0.0);
    }

    #[test]
    fn test_rates_bounded_and_consistent() {
        let extractor = FeatureExtractor::new(5, 50);
        let records: Vec<ConnectionRecord> = (0..40)
            .map(|i| {
                let flag = if i % 3 == 0 { ConnFlag::S0 } else { ConnFlag::Sf };
                record((i % 4) as u8 + 1, if i % 2 == 0 { 80 } else { 22 }, flag, i)
            })
            .collect();
        let rows = extractor.extract(&records);
        for row in &rows {
            for rate in [
                row.serror_rate,
                row.srv_serror_rate,
                row.rerror_rate,
                row.srv_rerror_rate,
                row.same_srv_rate,
                row.diff_srv_rate,
                row.srv_diff_host_rate,
                row.dst_host_same_srv_rate,
                row.dst_host_diff_srv_rate,
                row.dst_host_same_src_port_rate,
                row.dst_host_srv_diff_host_rate,
                row.dst_host_serror_rate,
                row.dst_host_srv_serror_rate,
                row.dst_host_rerror_rate,
                row.dst_host_srv_rerror_rate,
            ] {
                assert!((0.0..=1.0).contains(&rate), "rate out of range: {rate}");
            }
            // same/diff service rates partition the same-host window
            if row.count > 0 {
                assert!((row.same_srv_rate + row.diff_srv_rate - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_window_counts_syn_errors() {
        let extractor = FeatureExtractor::new(10, 100);
        let records = vec![
            record(1, 80, ConnFlag::S0, 0),
            record(1, 80, ConnFlag::S0, 1),
            record(1, 80, ConnFlag::Sf, 2),
        ];
        let rows = extractor.extract(&records);
        let last = &rows[2];
        assert_eq!(last.count, 2);
        assert_eq!(last.serror_rate, 1.0);
        assert_eq!(last.dst_host_count, 2);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = FeatureExtractor::new(5, 50);
        let records: Vec<ConnectionRecord> = (0..20)
            .map(|i| record((i % 3) as u8, 80, ConnFlag::Sf, i))
            .collect();
        let a = extractor.extract(&records);
        let b = extractor.extract(&records);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.to_values(), y.to_values());
        }
    }

    #[test]
    fn test_table_has_wire_schema() {
        let extractor = FeatureExtractor::new(10, 100);
        let rows = extractor.extract(&[record(1, 80, ConnFlag::Sf, 0)]);
        let table = rows_to_table(&rows);
        assert_eq!(table.n_columns(), 42);
        assert_eq!(table.columns()[0], "duration");
        assert_eq!(table.columns()[41], "other");
        assert_eq!(
            table.get(0, "service"),
            Some(&Value::Text("http".to_string()))
        );
        assert_eq!(table.get(0, "other"), Some(&Value::Number(0.0)));
    }

    #[test]
    fn test_unknown_protocol_maps_to_other_service() {
        assert_eq!(service_name(Protocol::Other(47), 1234), "other");
        assert_eq!(service_name(Protocol::Tcp, 60123), "other");
        assert_eq!(service_name(Protocol::Udp, 53), "domain_u");
    }
}
