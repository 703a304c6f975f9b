//! Per-pass performance reports.
//!
//! A [`PassReport`] pairs the configuration a pass ran under with its
//! finalized [`TransferStatistics`]. It renders either as the human-readable
//! block printed after each pass or as a JSON document.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::config::{Role, TransferConfiguration};
use crate::measurements::{TcpStats, TransferStatistics};
use crate::Result;

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PassOutcome {
    Completed,
    Aborted { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub role: Role,
    pub pass_index: usize,
    pub configuration: TransferConfiguration,
    pub outcome: PassOutcome,
    pub statistics: TransferStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpStats>,
    pub timestamp: String,
    pub host: String,
}

impl PassReport {
    pub fn new(
        role: Role,
        pass_index: usize,
        configuration: TransferConfiguration,
        statistics: TransferStatistics,
    ) -> Self {
        Self {
            role,
            pass_index,
            configuration,
            outcome: PassOutcome::Completed,
            statistics,
            tcp: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            host: host_name(),
        }
    }

    pub fn aborted(mut self, reason: impl Into<String>) -> Self {
        self.outcome = PassOutcome::Aborted {
            reason: reason.into(),
        };
        self
    }

    pub fn with_tcp_stats(mut self, tcp: Option<TcpStats>) -> Self {
        self.tcp = tcp;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == PassOutcome::Completed
    }

    /// Renders the report block shown to the operator after a pass.
    pub fn render_text(&self) -> String {
        let s = &self.statistics;
        let (moved, calls) = match self.role {
            Role::Sender => ("Sent", "Chunks Sent"),
            Role::Receiver => ("Received", "Packets Received"),
        };

        let mut out = String::new();
        let _ = writeln!(out);
        let _ = writeln!(out, "Configuration: {}", self.configuration);
        if let PassOutcome::Aborted { reason } = &self.outcome {
            let _ = writeln!(out, "Pass aborted: {}", reason);
        }
        let _ = writeln!(out, "Total Bytes {}: {} bytes", moved, s.total_bytes);
        let _ = writeln!(out, "Elapsed Time: {} ms", s.elapsed_ms());
        let _ = writeln!(out, "Throughput: {:.2} bytes/sec", s.throughput);
        let _ = writeln!(out, "Max Packet Size: {} bytes", s.max_packet_size);
        let _ = writeln!(out, "{}: {}", calls, s.packet_count);
        let _ = writeln!(out, "Average Packet Size: {:.2} bytes", s.average_packet_size());
        let _ = writeln!(out, "Goodput: {:.2} bytes/sec", s.throughput);
        if let Some(tcp) = &self.tcp {
            let _ = writeln!(
                out,
                "TCP: retransmits={} rtt={}us snd_mss={} rcv_mss={}",
                tcp.retransmits,
                fmt_opt(tcp.rtt_us),
                fmt_opt(tcp.snd_mss),
                fmt_opt(tcp.rcv_mss)
            );
        }
        out
    }

    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn fmt_opt(v: Option<u64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
