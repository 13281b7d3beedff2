//! Packet capture via an external tshark process
//!
//! The capture binary is located through an ordered candidate-path list, the
//! capture itself is attempted on each configured interface in turn, and the
//! subprocess is bounded by a hard timeout slightly above the requested
//! duration. Partial output never survives a failed or timed-out capture.

pub mod reader;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::CaptureConfig;
use crate::error::{PipelineError, Result};

/// Locate the capture binary among the configured candidate paths. Bare
/// names are resolved against PATH.
pub fn find_tshark(config: &CaptureConfig) -> Result<PathBuf> {
    for candidate in &config.tshark_paths {
        let path = Path::new(candidate);
        if path.components().count() > 1 {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
        } else if let Some(resolved) = which(candidate) {
            return Ok(resolved);
        }
    }
    Err(PipelineError::Capture(format!(
        "tshark is not installed or not found in expected locations ({}); \
         install Wireshark to enable packet capture",
        config.tshark_paths.join(", ")
    )))
}

fn which(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}

/// Run a duration-bounded capture, trying each configured interface until
/// one succeeds. Returns the path of the written pcap artifact.
pub async fn run_capture(config: &CaptureConfig, duration_secs: u64) -> Result<PathBuf> {
    let tshark = find_tshark(config)?;
    let output = &config.pcap_path;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let limit = Duration::from_secs(duration_secs + config.grace_secs);
    let mut last_failure = String::new();

    for interface in &config.interfaces {
        info!("Attempting capture on interface {}", interface);

        let mut child = Command::new(&tshark)
            .arg("-i")
            .arg(interface)
            .arg("-a")
            .arg(format!("duration:{}", duration_secs))
            .arg("-w")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Capture(format!("failed to spawn {tshark:?}: {e}")))?;

        let status = match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                // Hard bound exceeded: kill the child and drop its output.
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed-out capture process: {}", e);
                }
                remove_partial(output);
                return Err(PipelineError::CaptureTimeout {
                    limit_secs: limit.as_secs(),
                });
            }
        };

        if status.success() {
            info!("Capture completed on interface {}", interface);
            return Ok(output.clone());
        }

        last_failure = format!("interface {interface} exited with {status}");
        warn!("Capture failed: {}", last_failure);
        remove_partial(output);
    }

    Err(PipelineError::Capture(format!(
        "no interface accepted the capture (tried {}); last failure: {}",
        config.interfaces.join(", "),
        last_failure
    )))
}

/// Best-effort cleanup of a partial capture artifact. Logs, never raises.
fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove partial capture {}: {}", path.display(), e);
        }
    }
}
