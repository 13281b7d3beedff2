//! End-to-end pipeline tests: training data → artifacts → predictions, and
//! pcap file → connections → feature rows.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use tempfile::TempDir;

use netwarden::aggregate::Aggregator;
use netwarden::capture::reader::read_pcap;
use netwarden::config::{AggregatorConfig, Config};
use netwarden::error::{PipelineError, SchemaError};
use netwarden::features::{FeatureExtractor, EXPECTED_COLUMNS};
use netwarden::generate::{generate_samples, GenerateOptions};
use netwarden::model::ArtifactStore;
use netwarden::predict::predict_csv;
use netwarden::table::Table;
use netwarden::train::{run_training, TrainOptions};

/// A small labeled training set in the wire schema: S0 scans to unusual
/// ports are "neptune", everything else "normal".
fn training_csv(rows: usize) -> String {
    let mut out = String::new();
    out.push_str(&EXPECTED_COLUMNS.join(","));
    out.push_str(",class\n");

    for i in 0..rows {
        let attack = i % 3 == 0;
        for (j, &column) in EXPECTED_COLUMNS.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            let cell = match column {
                "protocol_type" => {
                    (if !attack && i % 2 != 0 { "udp" } else { "tcp" }).to_string()
                }
                "service" => (if attack { "other" } else { "http" }).to_string(),
                "flag" => (if attack { "S0" } else { "SF" }).to_string(),
                "duration" => (i % 30).to_string(),
                "src_bytes" => if attack { "0".to_string() } else { (200 + i * 3).to_string() },
                "dst_bytes" => if attack { "0".to_string() } else { (1000 + i * 7).to_string() },
                "count" => ((i % 9) + 1).to_string(),
                "srv_count" => ((i % 5) + 1).to_string(),
                "serror_rate" => if attack { "1.0" } else { "0.0" }.to_string(),
                "srv_serror_rate" => if attack { "1.0" } else { "0.0" }.to_string(),
                "same_srv_rate" => if attack { "0.1" } else { "0.9" }.to_string(),
                _ => "0".to_string(),
            };
            out.push_str(&cell);
        }
        out.push(',');
        out.push_str(if attack { "neptune" } else { "normal" });
        out.push('\n');
    }
    out
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.model.model_dir = dir.join("models");
    config.model.train_data_path = dir.join("train.csv");
    config.model.combined_data_path = dir.join("combined.csv");
    config.model.latent_dim = 16;
    config.training.pretrain_epochs = 5;
    config.training.classifier_epochs = 60;
    config.training.learning_rate = 0.05;
    config.training.batch_size = 16;
    config
}

#[test]
fn training_then_prediction_round_trip() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    std::fs::write(&config.model.train_data_path, training_csv(90)).unwrap();

    // First run: no synthesizer exists yet, so train from original data only.
    let options = TrainOptions {
        num_synthetic_samples: 0,
        use_synthetic_data: false,
        seed: 7,
    };
    let (artifacts, summary) = run_training(&config, &options).unwrap();
    assert_eq!(summary.original_samples, 90);
    assert_eq!(summary.classes, 2);
    assert!(summary.train_accuracy > 0.8, "{}", summary.train_accuracy);

    // The store now has the full artifact set on disk.
    let store = ArtifactStore::new(&config.model.model_dir);
    assert!(store.all_available());
    let loaded = store.load().unwrap();
    assert_eq!(
        loaded.preprocessor.output_dimensions(),
        artifacts.preprocessor.output_dimensions()
    );

    // Scenario from the contract: one row, all columns except `other`,
    // tcp/http → exactly one prediction with row_id 1.
    let columns: Vec<&str> = EXPECTED_COLUMNS
        .iter()
        .copied()
        .filter(|c| *c != "other")
        .collect();
    let mut row = Vec::new();
    for &column in &columns {
        row.push(match column {
            "protocol_type" => "tcp",
            "service" => "http",
            "flag" => "SF",
            _ => "0",
        });
    }
    let csv = format!("{}\n{}\n", columns.join(","), row.join(","));
    let report = predict_csv(&loaded, csv.as_bytes()).unwrap();
    assert_eq!(report.total_rows, 1);
    assert_eq!(report.predictions[0].row_id, 1);
    assert_eq!(
        report.summary.normal + report.summary.attacks,
        report.total_rows
    );

    // Prediction labels come from the trained mapping.
    let label = &report.predictions[0].prediction;
    assert!(label == "normal" || label == "neptune");
}

#[test]
fn prediction_preserves_row_order_for_many_rows() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    std::fs::write(&config.model.train_data_path, training_csv(60)).unwrap();
    let (artifacts, _) = run_training(
        &config,
        &TrainOptions {
            num_synthetic_samples: 0,
            use_synthetic_data: false,
            seed: 1,
        },
    )
    .unwrap();

    // Reuse the training file as inference input; its class column must be
    // dropped automatically.
    let body = std::fs::read(&config.model.train_data_path).unwrap();
    let report = predict_csv(&artifacts, &body).unwrap();
    assert_eq!(report.total_rows, 60);
    for (i, prediction) in report.predictions.iter().enumerate() {
        assert_eq!(prediction.row_id, i + 1);
        assert!(!prediction.features.contains_key("class"));
    }
}

#[test]
fn generation_after_training_yields_schema_rows() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    std::fs::write(&config.model.train_data_path, training_csv(60)).unwrap();
    run_training(
        &config,
        &TrainOptions {
            num_synthetic_samples: 0,
            use_synthetic_data: false,
            seed: 3,
        },
    )
    .unwrap();

    let store = ArtifactStore::new(&config.model.model_dir);
    let synthesizer = store.load_synthesizer().unwrap();
    let reference =
        Table::from_csv_str(&String::from_utf8(std::fs::read(&config.model.train_data_path).unwrap()).unwrap())
            .unwrap();

    let rows = generate_samples(
        &synthesizer,
        &reference,
        GenerateOptions {
            num_samples: 25,
            batch_size: 10,
            latent_dim: config.model.latent_dim,
            seed: 11,
        },
    )
    .unwrap();
    assert_eq!(rows.n_rows(), 25);
    assert!(rows.has_column("class"));
    assert!(rows.has_column("protocol_type"));

    // A second training run can now consume synthetic augmentation.
    let (_, summary) = run_training(
        &config,
        &TrainOptions {
            num_synthetic_samples: 20,
            use_synthetic_data: true,
            seed: 3,
        },
    )
    .unwrap();
    assert_eq!(summary.synthetic_samples_used, 20);
    assert!(summary.total_training_samples >= 80);
}

#[test]
fn schema_error_lists_missing_columns_sorted() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    std::fs::write(&config.model.train_data_path, training_csv(60)).unwrap();
    let (artifacts, _) = run_training(
        &config,
        &TrainOptions {
            num_synthetic_samples: 0,
            use_synthetic_data: false,
            seed: 5,
        },
    )
    .unwrap();

    let columns: Vec<&str> = EXPECTED_COLUMNS
        .iter()
        .copied()
        .filter(|c| *c != "flag" && *c != "land")
        .collect();
    let row = vec!["0"; columns.len()];
    let csv = format!("{}\n{}\n", columns.join(","), row.join(","));
    let err = predict_csv(&artifacts, csv.as_bytes()).unwrap_err();
    match err {
        PipelineError::Schema(SchemaError::MissingColumns(cols)) => {
            assert_eq!(cols, vec!["flag".to_string(), "land".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// Write a pcap file containing a full TCP conversation plus a lone SYN
/// scan, then run it through the reader, aggregator, and extractor.
#[test]
fn pcap_file_to_feature_rows() {
    use etherparse::PacketBuilder;

    let temp = TempDir::new().unwrap();
    let path = temp.path().join("session.pcap");

    let client = Ipv4Addr::new(192, 168, 1, 100);
    let server = Ipv4Addr::new(10, 0, 0, 1);

    let mut frames: Vec<Vec<u8>> = Vec::new();
    let tcp_frame = |src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16, seq: u32, flags: &str, payload: &[u8]| {
        let mut builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
            .ipv4(src.octets(), dst.octets(), 64)
            .tcp(sport, dport, seq, 65535);
        for flag in flags.chars() {
            builder = match flag {
                'S' => builder.syn(),
                'A' => builder.ack(seq),
                'F' => builder.fin(),
                _ => builder,
            };
        }
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    };

    // Handshake, data, close.
    frames.push(tcp_frame(client, server, 50000, 80, 100, "S", &[]));
    frames.push(tcp_frame(server, client, 80, 50000, 300, "SA", &[]));
    frames.push(tcp_frame(client, server, 50000, 80, 101, "A", b"GET / HTTP/1.0\r\n"));
    frames.push(tcp_frame(server, client, 80, 50000, 301, "A", b"HTTP/1.0 200 OK\r\n"));
    frames.push(tcp_frame(client, server, 50000, 80, 117, "FA", &[]));
    frames.push(tcp_frame(server, client, 80, 50000, 318, "FA", &[]));
    // Unanswered scan probe.
    frames.push(tcp_frame(client, server, 50001, 23, 500, "S", &[]));

    write_pcap(&path, &frames);

    let packets = read_pcap(&path).unwrap();
    assert_eq!(packets.len(), 7);

    let mut aggregator = Aggregator::new(&AggregatorConfig::default());
    for packet in &packets {
        aggregator.push(packet);
    }
    let records = aggregator.finish();
    assert_eq!(records.len(), 2);

    let extractor = FeatureExtractor::new(10, 100);
    let rows = extractor.extract(&records);
    assert_eq!(rows.len(), 2);

    let http = rows.iter().find(|r| r.service == "http").expect("http row");
    assert_eq!(http.flag, "SF");
    assert_eq!(http.src_bytes, 16);
    assert_eq!(http.dst_bytes, 17);
    assert_eq!(http.src_ip, IpAddr::V4(client));

    let scan = rows.iter().find(|r| r.service == "telnet").expect("scan row");
    assert_eq!(scan.flag, "S0");
}

fn write_pcap(path: &Path, frames: &[Vec<u8>]) {
    let capture = pcap_dead_handle();
    let mut savefile = capture.savefile(path).unwrap();
    for (i, frame) in frames.iter().enumerate() {
        let header = pcap::PacketHeader {
            ts: libc::timeval {
                tv_sec: 1_700_000_000 + i as i64,
                tv_usec: 0,
            },
            caplen: frame.len() as u32,
            len: frame.len() as u32,
        };
        savefile.write(&pcap::Packet::new(&header, frame));
    }
    savefile.flush().unwrap();
}

fn pcap_dead_handle() -> pcap::Capture<pcap::Dead> {
    pcap::Capture::dead(pcap::Linktype::ETHERNET).unwrap()
}
