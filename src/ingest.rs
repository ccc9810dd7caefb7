/// Report ingestion: read a tshark text report, parse it with the parser its
/// name selects, and write the rows as a CSV table next to it.
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::classify::{classify_path, ReportKind};
use crate::config::DigestConfig;
use crate::discover::table_path_for;
use crate::report::{parse_conversation_report, parse_rtp_report, ParseError};
use crate::table::{write_table, TableError};

/// What happened to one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Table written.
    Converted {
        kind: ReportKind,
        table: PathBuf,
        rows: usize,
        skipped_rows: usize,
    },
    /// Name matched neither report kind.
    Unclassified,
    /// The report held no data rows; nothing was written.
    NoData { skipped_rows: usize },
}

/// Convert a single report file.
pub fn ingest_file(path: &Path, config: &DigestConfig) -> Result<IngestOutcome, IngestError> {
    let kind = classify_path(path, &config.input.extension);
    let table = table_path_for(path, &config.output.extension);

    let (rows, skipped_rows) = match kind {
        ReportKind::Unknown => return Ok(IngestOutcome::Unclassified),
        ReportKind::Conversation => {
            let text = read_report(path)?;
            let parsed = parse_conversation_report(text.lines(), &config.conversation_format());
            write_table(&table, &parsed.rows)?;
            (parsed.rows.len(), parsed.skipped.len())
        }
        ReportKind::RtpStream => {
            let text = read_report(path)?;
            match parse_rtp_report(text.lines(), &config.rtp_format()) {
                Ok(parsed) => {
                    write_table(&table, &parsed.rows)?;
                    (parsed.rows.len(), parsed.skipped.len())
                }
                Err(ParseError::NoDataExtracted { skipped }) => {
                    tracing::warn!(
                        file = %path.display(),
                        skipped_rows = skipped,
                        "could not extract RTP stream data, no table written"
                    );
                    return Ok(IngestOutcome::NoData {
                        skipped_rows: skipped,
                    });
                }
                Err(e) => return Err(IngestError::Parse(e)),
            }
        }
    };

    tracing::debug!(
        file = %path.display(),
        %kind,
        rows,
        skipped_rows,
        table = %table.display(),
        "converted report"
    );
    Ok(IngestOutcome::Converted {
        kind,
        table,
        rows,
        skipped_rows,
    })
}

fn read_report(path: &Path) -> Result<String, IngestError> {
    std::fs::read_to_string(path).map_err(|e| IngestError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Counts over a batch of reports.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub converted: usize,
    pub unclassified: usize,
    pub no_data: usize,
    pub failed: usize,
    pub skipped_rows: usize,
}

impl BatchSummary {
    fn record(&mut self, result: &Result<IngestOutcome, IngestError>) {
        match result {
            Ok(IngestOutcome::Converted { skipped_rows, .. }) => {
                self.converted += 1;
                self.skipped_rows += skipped_rows;
            }
            Ok(IngestOutcome::Unclassified) => self.unclassified += 1,
            Ok(IngestOutcome::NoData { skipped_rows }) => {
                self.no_data += 1;
                self.skipped_rows += skipped_rows;
            }
            Err(_) => self.failed += 1,
        }
    }
}

/// Convert many reports in parallel on the blocking pool.
///
/// Each file is independent: a failure is logged and counted, and the rest
/// of the batch carries on. Results are returned in input order.
pub async fn ingest_all(
    paths: Vec<PathBuf>,
    config: Arc<DigestConfig>,
) -> (Vec<(PathBuf, Result<IngestOutcome, IngestError>)>, BatchSummary) {
    let mut set = tokio::task::JoinSet::new();
    for (index, path) in paths.iter().cloned().enumerate() {
        let config = Arc::clone(&config);
        set.spawn_blocking(move || {
            let result = ingest_file(&path, &config);
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<IngestOutcome, IngestError>>> =
        paths.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::error!(error = %e, "ingest task panicked"),
        }
    }

    let mut summary = BatchSummary::default();
    let results: Vec<_> = paths
        .into_iter()
        .zip(slots)
        .map(|(path, slot)| {
            let result = slot.unwrap_or_else(|| Err(IngestError::Aborted));
            if let Err(e) = &result {
                tracing::error!(file = %path.display(), error = %e, "failed to convert report");
            }
            summary.record(&result);
            (path, result)
        })
        .collect();

    (results, summary)
}

#[derive(Debug)]
pub enum IngestError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(ParseError),
    Table(TableError),
    /// The worker thread died before reporting a result.
    Aborted,
}

impl From<TableError> for IngestError {
    fn from(e: TableError) -> Self {
        IngestError::Table(e)
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            IngestError::Parse(e) => write!(f, "parse error: {e}"),
            IngestError::Table(e) => write!(f, "table error: {e}"),
            IngestError::Aborted => write!(f, "ingest task aborted"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Read { source, .. } => Some(source),
            IngestError::Parse(e) => Some(e),
            IngestError::Table(e) => Some(e),
            IngestError::Aborted => None,
        }
    }
}
