//! CSV tables of parsed report rows.
//!
//! Every table starts with its header, even when no rows follow. Fields that
//! contain a comma, quote, or line break are quoted with `""` escaping.

use std::path::{Path, PathBuf};

use crate::report::{ConversationRow, RtpStreamRow};

/// A row with a fixed CSV column layout.
pub trait TabularRow: Sized {
    /// Column names, written as the first line of every table.
    const HEADER: &'static [&'static str];

    /// Field values in `HEADER` order.
    fn to_record(&self) -> Vec<String>;

    /// Rebuild a row from a record already checked to have `HEADER.len()` fields.
    fn from_record(record: &[String]) -> Result<Self, String>;
}

impl TabularRow for ConversationRow {
    const HEADER: &'static [&'static str] = &[
        "Address_A",
        "Address_B",
        "Frames-A_B",
        "Bytes-A_B",
        "Frames-B_A",
        "Bytes-B_A",
        "Total_Frames",
        "Total_Bytes",
        "Start",
        "Duration",
    ];

    fn to_record(&self) -> Vec<String> {
        vec![
            self.address_a.clone(),
            self.address_b.clone(),
            self.frames_a_to_b.to_string(),
            self.bytes_a_to_b.to_string(),
            self.frames_b_to_a.to_string(),
            self.bytes_b_to_a.to_string(),
            self.total_frames.to_string(),
            self.total_bytes.to_string(),
            self.start.to_string(),
            self.duration.to_string(),
        ]
    }

    fn from_record(r: &[String]) -> Result<Self, String> {
        Ok(ConversationRow {
            address_a: r[0].clone(),
            address_b: r[1].clone(),
            frames_a_to_b: column(r, Self::HEADER, 2)?,
            bytes_a_to_b: column(r, Self::HEADER, 3)?,
            frames_b_to_a: column(r, Self::HEADER, 4)?,
            bytes_b_to_a: column(r, Self::HEADER, 5)?,
            total_frames: column(r, Self::HEADER, 6)?,
            total_bytes: column(r, Self::HEADER, 7)?,
            start: column(r, Self::HEADER, 8)?,
            duration: column(r, Self::HEADER, 9)?,
        })
    }
}

impl TabularRow for RtpStreamRow {
    // The capture tool labels both port columns `Port`.
    const HEADER: &'static [&'static str] = &[
        "Start",
        "End",
        "Src_IP",
        "Port",
        "Dest_IP",
        "Port",
        "SSRC",
        "Payload",
        "Pkts",
        "Lost",
        "Lost_Percent",
        "Min_Delta(ms)",
        "Mean_Delta(ms)",
        "Max_Delta(ms)",
        "Min_Jitter(ms)",
        "Mean_Jitter(ms)",
        "Max_Jitter(ms)",
        "Problems",
    ];

    fn to_record(&self) -> Vec<String> {
        vec![
            self.start.to_string(),
            self.end.to_string(),
            self.src_ip.clone(),
            self.src_port.to_string(),
            self.dest_ip.clone(),
            self.dest_port.to_string(),
            self.ssrc.clone(),
            self.payload_type.clone(),
            self.packet_count.to_string(),
            self.lost_count.to_string(),
            self.lost_percent.clone(),
            self.min_delta_ms.to_string(),
            self.mean_delta_ms.to_string(),
            self.max_delta_ms.to_string(),
            self.min_jitter_ms.to_string(),
            self.mean_jitter_ms.to_string(),
            self.max_jitter_ms.to_string(),
            self.problems.clone(),
        ]
    }

    fn from_record(r: &[String]) -> Result<Self, String> {
        Ok(RtpStreamRow {
            start: column(r, Self::HEADER, 0)?,
            end: column(r, Self::HEADER, 1)?,
            src_ip: r[2].clone(),
            src_port: column(r, Self::HEADER, 3)?,
            dest_ip: r[4].clone(),
            dest_port: column(r, Self::HEADER, 5)?,
            ssrc: r[6].clone(),
            payload_type: r[7].clone(),
            packet_count: column(r, Self::HEADER, 8)?,
            lost_count: column(r, Self::HEADER, 9)?,
            lost_percent: r[10].clone(),
            min_delta_ms: column(r, Self::HEADER, 11)?,
            mean_delta_ms: column(r, Self::HEADER, 12)?,
            max_delta_ms: column(r, Self::HEADER, 13)?,
            min_jitter_ms: column(r, Self::HEADER, 14)?,
            mean_jitter_ms: column(r, Self::HEADER, 15)?,
            max_jitter_ms: column(r, Self::HEADER, 16)?,
            problems: r[17].clone(),
        })
    }
}

fn column<T: std::str::FromStr>(record: &[String], header: &[&str], index: usize) -> Result<T, String> {
    record[index]
        .parse()
        .map_err(|_| format!("invalid {} value \"{}\"", header[index], record[index]))
}

/// Render rows as CSV text, header first.
pub fn to_csv<R: TabularRow>(rows: &[R]) -> String {
    let mut out = String::new();
    push_record(&mut out, R::HEADER.iter().copied());
    for row in rows {
        let record = row.to_record();
        push_record(&mut out, record.iter().map(String::as_str));
    }
    out
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, f) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if f.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&f.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(f);
        }
    }
    out.push_str("\r\n");
}

/// Write a table atomically: temp file in the same directory, then rename.
pub fn write_table<R: TabularRow>(path: &Path, rows: &[R]) -> Result<(), TableError> {
    let csv = to_csv(rows);
    let dir = path.parent().unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{name}.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, csv.as_bytes()).map_err(|e| TableError::Write {
        path: tmp_path.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| TableError::Write {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Parse CSV text produced by [`to_csv`] back into rows.
pub fn from_csv<R: TabularRow>(text: &str) -> Result<Vec<R>, TableError> {
    let mut records = split_records(text).map_err(|reason| TableError::Record {
        path: PathBuf::new(),
        record: 0,
        reason,
    })?;
    if records.is_empty() {
        return Err(TableError::Header {
            path: PathBuf::new(),
            found: Vec::new(),
        });
    }

    let header = records.remove(0);
    if header.len() != R::HEADER.len() || header.iter().zip(R::HEADER).any(|(a, b)| a != b) {
        return Err(TableError::Header {
            path: PathBuf::new(),
            found: header,
        });
    }

    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            parse_record(record).map_err(|reason| TableError::Record {
                path: PathBuf::new(),
                record: i + 1,
                reason,
            })
        })
        .collect()
}

fn parse_record<R: TabularRow>(record: &[String]) -> Result<R, String> {
    if record.len() != R::HEADER.len() {
        return Err(format!(
            "expected {} fields, found {}",
            R::HEADER.len(),
            record.len()
        ));
    }
    R::from_record(record)
}

/// Read a table written by [`write_table`].
pub fn read_table<R: TabularRow>(path: &Path) -> Result<Vec<R>, TableError> {
    let text = std::fs::read_to_string(path).map_err(|e| TableError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    from_csv(&text).map_err(|e| e.with_path(path))
}

/// Split CSV text into records, honouring quoted fields.
fn split_records(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[derive(Debug)]
pub enum TableError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Header {
        path: PathBuf,
        found: Vec<String>,
    },
    Record {
        path: PathBuf,
        record: usize,
        reason: String,
    },
}

impl TableError {
    fn with_path(self, p: &Path) -> Self {
        match self {
            TableError::Header { found, .. } => TableError::Header {
                path: p.to_path_buf(),
                found,
            },
            TableError::Record { record, reason, .. } => TableError::Record {
                path: p.to_path_buf(),
                record,
                reason,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            TableError::Write { path, source } => {
                write!(f, "failed to write {}: {source}", path.display())
            }
            TableError::Header { path, found } => write!(
                f,
                "{}: unexpected header [{}]",
                path.display(),
                found.join(",")
            ),
            TableError::Record {
                path,
                record,
                reason,
            } => write!(f, "{}: record {record}: {reason}", path.display()),
        }
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TableError::Read { source, .. } | TableError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}
