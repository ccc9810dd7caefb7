/// Summary output: the aggregated comparison as JSON and as a terminal table.
///
/// The JSON file uses the atomic write pattern: write to a temp file, then rename.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::aggregate::{Dataset, DeltaSeries, LossPoint, ThroughputComparison};
use crate::ingest::BatchSummary;

/// The JSON payload written by `summarize`.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub source_dir: PathBuf,
    pub conversation_tables: usize,
    pub rtp_tables: usize,
    pub rejected: Vec<RejectedTable>,
    pub throughput: Vec<ThroughputComparison>,
    pub deltas: Vec<DeltaSeries>,
    pub loss: Vec<LossPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedTable {
    pub path: PathBuf,
    pub reason: String,
}

impl Summary {
    pub fn new(
        source_dir: &Path,
        data: &Dataset,
        throughput: Vec<ThroughputComparison>,
        deltas: Vec<DeltaSeries>,
        loss: Vec<LossPoint>,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            source_dir: source_dir.to_path_buf(),
            conversation_tables: data.conversation_tables,
            rtp_tables: data.rtp_tables,
            rejected: data
                .rejected
                .iter()
                .map(|(path, reason)| RejectedTable {
                    path: path.clone(),
                    reason: reason.clone(),
                })
                .collect(),
            throughput,
            deltas,
            loss,
            batch: None,
        }
    }

    /// Plain-text rendering for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} conversation tables, {} RTP tables, {} rejected",
            self.conversation_tables,
            self.rtp_tables,
            self.rejected.len()
        );

        for comparison in &self.throughput {
            let _ = writeln!(out, "\nThroughput {} per second", comparison.metric.label());
            let _ = writeln!(out, "{:>10}  {:>14}  {:>14}", "clients", "ebpf", "no-ebpf");
            for p in &comparison.points {
                let _ = writeln!(
                    out,
                    "{:>10}  {:>14}  {:>14}",
                    p.no_clients,
                    fmt_value(p.ebpf),
                    fmt_value(p.no_ebpf)
                );
            }
        }

        for series in &self.deltas {
            let values: Vec<String> = series
                .points
                .iter()
                .map(|p| format!("{}={:.3}", p.ssrc, p.value))
                .collect();
            let _ = writeln!(
                out,
                "\n{} {} clients ({}): {}",
                series.metric.label(),
                series.no_clients,
                series.mode,
                values.join(" ")
            );
        }

        if !self.loss.is_empty() {
            let _ = writeln!(out, "\nRTP loss");
            let _ = writeln!(out, "{:>10}  {:>8}  {:>8}  {:>10}", "clients", "mode", "streams", "lost %");
            for p in &self.loss {
                let _ = writeln!(
                    out,
                    "{:>10}  {:>8}  {:>8}  {:>10}",
                    p.no_clients,
                    p.mode.as_str(),
                    p.streams,
                    fmt_value(p.mean_lost_percent)
                );
            }
        }

        for r in &self.rejected {
            let _ = writeln!(out, "\nrejected {}: {}", r.path.display(), r.reason);
        }
        out
    }
}

fn fmt_value(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.3}"),
        None => "-".to_string(),
    }
}

/// Atomically write the summary as pretty JSON.
///
/// Writes to a temporary file in the same directory, then renames
/// so readers never see a partial write.
pub fn write_summary(path: &Path, summary: &Summary) -> Result<(), SummaryError> {
    let json =
        serde_json::to_string_pretty(summary).map_err(|e| SummaryError::Serialize { source: e })?;

    let dir = path.parent().unwrap_or(Path::new("."));
    let tmp_path = dir.join(format!(".summary.json.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| SummaryError::Write {
        path: tmp_path.clone(),
        source: e,
    })?;

    std::fs::rename(&tmp_path, path).map_err(|e| SummaryError::Rename {
        from: tmp_path,
        to: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

/// Errors from writing the summary file.
#[derive(Debug)]
pub enum SummaryError {
    Serialize {
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for SummaryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryError::Serialize { source } => write!(f, "failed to serialize summary: {source}"),
            SummaryError::Write { path, source } => {
                write!(f, "failed to write {}: {source}", path.display())
            }
            SummaryError::Rename { from, to, source } => {
                write!(
                    f,
                    "failed to rename {} -> {}: {source}",
                    from.display(),
                    to.display()
                )
            }
        }
    }
}

impl std::error::Error for SummaryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SummaryError::Serialize { source } => Some(source),
            SummaryError::Write { source, .. } => Some(source),
            SummaryError::Rename { source, .. } => Some(source),
        }
    }
}
