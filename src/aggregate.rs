//! Group CSV tables by run configuration and compare modes.
//!
//! Tables are keyed by [`FilenameKey`]. Throughput is compared per client
//! count between `ebpf` and `no-ebpf`; RTP delta statistics are laid out as
//! per-SSRC series for each client count and mode, next to average loss.

use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::classify::{classify_path, ReportKind};
use crate::discover::find_reports;
use crate::key::{key_from_path, FilenameKey, Mode, UnknownMode};
use crate::report::{ConversationRow, RtpStreamRow};
use crate::table::read_table;

/// Every table found under a results directory, keyed by run.
///
/// Tables sharing a key (the same name in two subdirectories, or names that
/// differ only past the fifth segment) are merged into one run.
#[derive(Debug, Default)]
pub struct Dataset {
    pub conversations: BTreeMap<FilenameKey, Vec<ConversationRow>>,
    pub rtp: BTreeMap<FilenameKey, Vec<RtpStreamRow>>,
    /// Table files loaded, counting each merged file.
    pub conversation_tables: usize,
    pub rtp_tables: usize,
    /// Tables that could not be used, with the reason.
    pub rejected: Vec<(PathBuf, String)>,
}

/// Load all conversation and RTP tables under `dir`.
///
/// A file whose name has no valid key, or whose contents do not parse, is
/// logged and listed in `rejected`; it never stops the others from loading.
pub fn load_dataset(dir: &Path, ext: &str) -> Result<Dataset, AggregateError> {
    let paths = find_reports(dir, ext).map_err(AggregateError::Pattern)?;
    let mut data = Dataset::default();

    for path in paths {
        let kind = classify_path(&path, ext);
        let loaded = match kind {
            ReportKind::Unknown => continue,
            ReportKind::Conversation => key_from_path(&path)
                .map_err(|e| e.to_string())
                .and_then(|key| {
                    let rows = read_table(&path).map_err(|e| e.to_string())?;
                    data.conversation_tables += 1;
                    merge_table(&mut data.conversations, key, rows, &path);
                    Ok(())
                }),
            ReportKind::RtpStream => key_from_path(&path)
                .map_err(|e| e.to_string())
                .and_then(|key| {
                    let rows = read_table(&path).map_err(|e| e.to_string())?;
                    data.rtp_tables += 1;
                    merge_table(&mut data.rtp, key, rows, &path);
                    Ok(())
                }),
        };
        if let Err(reason) = loaded {
            tracing::warn!(file = %path.display(), error = %reason, "skipping table");
            data.rejected.push((path, reason));
        }
    }

    tracing::debug!(
        conversation_tables = data.conversation_tables,
        rtp_tables = data.rtp_tables,
        runs = data.conversations.len() + data.rtp.len(),
        rejected = data.rejected.len(),
        "loaded dataset"
    );
    Ok(data)
}

fn merge_table<R>(
    tables: &mut BTreeMap<FilenameKey, Vec<R>>,
    key: FilenameKey,
    rows: Vec<R>,
    path: &Path,
) {
    match tables.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(rows);
        }
        Entry::Occupied(mut slot) => {
            tracing::info!(
                file = %path.display(),
                run = %slot.key(),
                rows = rows.len(),
                "merging table into an earlier run with the same key"
            );
            slot.get_mut().extend(rows);
        }
    }
}

impl Dataset {
    /// Check every key's mode against the known vocabulary.
    ///
    /// Each distinct unknown mode is logged once, with the files using it.
    pub fn validate_modes(&self) -> Result<(), AggregateError> {
        let mut unknown: BTreeMap<UnknownMode, Vec<String>> = BTreeMap::new();
        for key in self.conversations.keys().chain(self.rtp.keys()) {
            if let Err(mode) = key.parsed_mode() {
                unknown.entry(mode).or_default().push(key.to_string());
            }
        }
        if unknown.is_empty() {
            return Ok(());
        }
        for (mode, files) in &unknown {
            tracing::error!(%mode, files = ?files, "tables use a mode outside the known vocabulary");
        }
        Err(AggregateError::UnknownModes(unknown.into_keys().collect()))
    }

    /// Throughput per client count and mode for each byte column.
    pub fn throughput(&self) -> Result<Vec<ThroughputComparison>, AggregateError> {
        self.validate_modes()?;
        Ok(ThroughputMetric::ALL
            .iter()
            .map(|&metric| throughput_for(&self.conversations, metric))
            .collect())
    }

    /// Delta series per client count and mode for each delta column.
    pub fn deltas(&self) -> Result<Vec<DeltaSeries>, AggregateError> {
        self.validate_modes()?;
        let mut out = Vec::new();
        for &metric in &DeltaMetric::ALL {
            let mut groups: BTreeMap<(ClientCount, Mode), Vec<DeltaPoint>> = BTreeMap::new();
            for (key, rows) in &self.rtp {
                let Ok(mode) = key.parsed_mode() else {
                    continue;
                };
                let points = groups
                    .entry((ClientCount::from(key), mode))
                    .or_default();
                points.extend(rows.iter().map(|r| DeltaPoint {
                    ssrc: r.ssrc.clone(),
                    value: metric.value(r),
                }));
            }
            out.extend(
                groups
                    .into_iter()
                    .map(|((clients, mode), points)| DeltaSeries {
                        metric,
                        no_clients: clients.label,
                        mode,
                        points,
                    }),
            );
        }
        Ok(out)
    }

    /// Mean RTP loss percentage per client count and mode.
    pub fn loss(&self) -> Result<Vec<LossPoint>, AggregateError> {
        self.validate_modes()?;
        let mut groups: BTreeMap<(ClientCount, Mode), Vec<f64>> = BTreeMap::new();
        for (key, rows) in &self.rtp {
            let Ok(mode) = key.parsed_mode() else {
                continue;
            };
            groups
                .entry((ClientCount::from(key), mode))
                .or_default()
                .extend(rows.iter().filter_map(RtpStreamRow::lost_ratio));
        }
        Ok(groups
            .into_iter()
            .map(|((clients, mode), ratios)| LossPoint {
                no_clients: clients.label,
                mode,
                streams: ratios.len(),
                mean_lost_percent: (!ratios.is_empty())
                    .then(|| ratios.iter().sum::<f64>() / ratios.len() as f64),
            })
            .collect())
    }
}

/// Client-count segment; numeric counts sort first, in numeric order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ClientCount {
    non_numeric: bool,
    count: u32,
    label: String,
}

impl From<&FilenameKey> for ClientCount {
    fn from(key: &FilenameKey) -> Self {
        let count = key.client_count();
        Self {
            non_numeric: count.is_none(),
            count: count.unwrap_or(0),
            label: key.no_clients.clone(),
        }
    }
}

/// Byte columns of a conversation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThroughputMetric {
    #[serde(rename = "Bytes-A_B")]
    BytesAToB,
    #[serde(rename = "Bytes-B_A")]
    BytesBToA,
    #[serde(rename = "Total_Bytes")]
    TotalBytes,
}

impl ThroughputMetric {
    pub const ALL: [ThroughputMetric; 3] = [
        ThroughputMetric::BytesAToB,
        ThroughputMetric::BytesBToA,
        ThroughputMetric::TotalBytes,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ThroughputMetric::BytesAToB => "Bytes-A_B",
            ThroughputMetric::BytesBToA => "Bytes-B_A",
            ThroughputMetric::TotalBytes => "Total_Bytes",
        }
    }

    fn value(&self, row: &ConversationRow) -> f64 {
        match self {
            ThroughputMetric::BytesAToB => row.bytes_a_to_b,
            ThroughputMetric::BytesBToA => row.bytes_b_to_a,
            ThroughputMetric::TotalBytes => row.total_bytes,
        }
    }
}

/// eBPF vs no-eBPF throughput at one client count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputPoint {
    pub no_clients: String,
    /// `None` when no table for the mode exists or its durations sum to zero.
    pub ebpf: Option<f64>,
    pub no_ebpf: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputComparison {
    pub metric: ThroughputMetric,
    pub points: Vec<ThroughputPoint>,
}

/// Pool every table of a (client count, mode) group: sum of the byte column
/// over sum of `Duration`.
fn throughput_for(
    tables: &BTreeMap<FilenameKey, Vec<ConversationRow>>,
    metric: ThroughputMetric,
) -> ThroughputComparison {
    let mut sums: BTreeMap<ClientCount, BTreeMap<Mode, (f64, f64)>> = BTreeMap::new();
    for (key, rows) in tables {
        let Ok(mode) = key.parsed_mode() else {
            continue;
        };
        let (bytes, duration) = sums
            .entry(ClientCount::from(key))
            .or_default()
            .entry(mode)
            .or_insert((0.0, 0.0));
        for row in rows {
            *bytes += metric.value(row);
            *duration += row.duration;
        }
    }

    let points = sums
        .into_iter()
        .map(|(clients, modes)| {
            let rate = |mode: Mode| {
                let &(bytes, duration) = modes.get(&mode)?;
                if duration > 0.0 {
                    Some(bytes / duration)
                } else {
                    tracing::warn!(
                        metric = metric.label(),
                        no_clients = %clients.label,
                        %mode,
                        "total duration is zero, no throughput"
                    );
                    None
                }
            };
            ThroughputPoint {
                ebpf: rate(Mode::Ebpf),
                no_ebpf: rate(Mode::NoEbpf),
                no_clients: clients.label.clone(),
            }
        })
        .collect();

    ThroughputComparison { metric, points }
}

/// Delta columns of an RTP table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeltaMetric {
    #[serde(rename = "Min_Delta(ms)")]
    Min,
    #[serde(rename = "Max_Delta(ms)")]
    Max,
    #[serde(rename = "Mean_Delta(ms)")]
    Mean,
}

impl DeltaMetric {
    pub const ALL: [DeltaMetric; 3] = [DeltaMetric::Min, DeltaMetric::Max, DeltaMetric::Mean];

    pub fn label(&self) -> &'static str {
        match self {
            DeltaMetric::Min => "Min_Delta(ms)",
            DeltaMetric::Max => "Max_Delta(ms)",
            DeltaMetric::Mean => "Mean_Delta(ms)",
        }
    }

    fn value(&self, row: &RtpStreamRow) -> f64 {
        match self {
            DeltaMetric::Min => row.min_delta_ms,
            DeltaMetric::Max => row.max_delta_ms,
            DeltaMetric::Mean => row.mean_delta_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaPoint {
    pub ssrc: String,
    pub value: f64,
}

/// One line of the delta chart: a client count in one mode, value per SSRC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaSeries {
    pub metric: DeltaMetric,
    pub no_clients: String,
    pub mode: Mode,
    pub points: Vec<DeltaPoint>,
}

/// Average loss over the streams of one client count in one mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossPoint {
    pub no_clients: String,
    pub mode: Mode,
    /// Streams whose loss percentage could be read.
    pub streams: usize,
    pub mean_lost_percent: Option<f64>,
}

#[derive(Debug)]
pub enum AggregateError {
    Pattern(glob::PatternError),
    /// Distinct mode values outside `{ebpf, no-ebpf}`.
    UnknownModes(Vec<UnknownMode>),
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateError::Pattern(e) => write!(f, "invalid results directory pattern: {e}"),
            AggregateError::UnknownModes(modes) => {
                let names: Vec<&str> = modes.iter().map(|m| m.0.as_str()).collect();
                write!(
                    f,
                    "configuration error: unknown mode(s) {} (expected ebpf or no-ebpf)",
                    names.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AggregateError::Pattern(e) => Some(e),
            AggregateError::UnknownModes(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::extract_key;
    use crate::table::write_table;

    fn conv(bytes: f64, duration: f64) -> ConversationRow {
        ConversationRow {
            address_a: "10.0.0.1:5004".into(),
            address_b: "10.0.0.2:40000".into(),
            frames_a_to_b: 1,
            bytes_a_to_b: bytes / 2.0,
            frames_b_to_a: 1,
            bytes_b_to_a: bytes / 2.0,
            total_frames: 2,
            total_bytes: bytes,
            start: 0.0,
            duration,
        }
    }

    fn rtp(ssrc: &str, mean: f64) -> RtpStreamRow {
        RtpStreamRow {
            start: 0.0,
            end: 10.0,
            src_ip: "10.0.0.1".into(),
            src_port: 5004,
            dest_ip: "10.0.0.2".into(),
            dest_port: 40000,
            ssrc: ssrc.into(),
            payload_type: "g711U".into(),
            packet_count: 500,
            lost_count: 0,
            lost_percent: "(0.0%)".into(),
            min_delta_ms: mean - 1.0,
            mean_delta_ms: mean,
            max_delta_ms: mean + 1.0,
            min_jitter_ms: 0.0,
            mean_jitter_ms: 0.1,
            max_jitter_ms: 0.2,
            problems: String::new(),
        }
    }

    fn key(stem: &str) -> FilenameKey {
        extract_key(stem).unwrap()
    }

    #[test]
    fn test_throughput_per_client_count_and_mode() {
        let mut data = Dataset::default();
        data.conversations
            .insert(key("t1_10_300s_ebpf_conversations"), vec![conv(100.0, 10.0), conv(50.0, 5.0)]);
        data.conversations
            .insert(key("t1_10_300s_no-ebpf_conversations"), vec![conv(60.0, 10.0)]);
        data.conversations
            .insert(key("t1_2_300s_ebpf_conversations"), vec![conv(8.0, 2.0)]);

        let comparisons = data.throughput().unwrap();
        assert_eq!(comparisons.len(), 3);
        let total = comparisons
            .iter()
            .find(|c| c.metric == ThroughputMetric::TotalBytes)
            .unwrap();
        assert_eq!(
            total.points,
            vec![
                ThroughputPoint {
                    no_clients: "2".into(),
                    ebpf: Some(4.0),
                    no_ebpf: None,
                },
                ThroughputPoint {
                    no_clients: "10".into(),
                    ebpf: Some(10.0),
                    no_ebpf: Some(6.0),
                },
            ]
        );
        let a_to_b = &comparisons[0];
        assert_eq!(a_to_b.metric, ThroughputMetric::BytesAToB);
        assert_eq!(a_to_b.points[1].ebpf, Some(5.0));
    }

    #[test]
    fn test_zero_duration_is_guarded() {
        let mut data = Dataset::default();
        data.conversations
            .insert(key("t1_4_300s_ebpf_conversations"), vec![conv(10.0, 0.0)]);
        data.conversations
            .insert(key("t1_4_300s_no-ebpf_conversations"), Vec::new());
        let total = &data.throughput().unwrap()[2];
        assert_eq!(total.points[0].ebpf, None);
        assert_eq!(total.points[0].no_ebpf, None);
    }

    #[test]
    fn test_unknown_modes_reported_once_each() {
        let mut data = Dataset::default();
        data.conversations
            .insert(key("t1_4_300s_xdp_conversations"), vec![conv(1.0, 1.0)]);
        data.rtp.insert(key("t1_4_300s_xdp_rtp"), vec![rtp("0x1", 20.0)]);
        data.rtp.insert(key("t1_8_300s_tc_rtp"), vec![rtp("0x1", 20.0)]);
        data.rtp.insert(key("t1_8_300s_ebpf_rtp"), vec![rtp("0x1", 20.0)]);

        match data.throughput().unwrap_err() {
            AggregateError::UnknownModes(modes) => assert_eq!(
                modes,
                vec![UnknownMode("tc".into()), UnknownMode("xdp".into())]
            ),
            other => panic!("expected unknown modes, got {other:?}"),
        }
        assert!(data.deltas().is_err());
    }

    #[test]
    fn test_delta_series_per_ssrc() {
        let mut data = Dataset::default();
        data.rtp.insert(
            key("t1_10_300s_ebpf_rtp"),
            vec![rtp("0xA", 20.0), rtp("0xB", 21.0)],
        );
        data.rtp
            .insert(key("t1_10_300s_no-ebpf_rtp"), vec![rtp("0xA", 25.0)]);

        let series = data.deltas().unwrap();
        assert_eq!(series.len(), 6);
        let mean: Vec<&DeltaSeries> = series
            .iter()
            .filter(|s| s.metric == DeltaMetric::Mean)
            .collect();
        assert_eq!(mean.len(), 2);
        assert_eq!(mean[0].mode, Mode::Ebpf);
        assert_eq!(
            mean[0].points,
            vec![
                DeltaPoint {
                    ssrc: "0xA".into(),
                    value: 20.0
                },
                DeltaPoint {
                    ssrc: "0xB".into(),
                    value: 21.0
                },
            ]
        );
        assert_eq!(mean[1].mode, Mode::NoEbpf);
        assert_eq!(mean[1].points[0].value, 25.0);
    }

    #[test]
    fn test_loss_averages_readable_percentages() {
        let mut data = Dataset::default();
        let mut lossy = rtp("0xB", 20.0);
        lossy.lost_count = 5;
        lossy.lost_percent = "(1.0%)".into();
        let mut unreadable = rtp("0xC", 20.0);
        unreadable.lost_percent = "n/a".into();
        data.rtp.insert(
            key("t1_10_300s_ebpf_rtp"),
            vec![rtp("0xA", 20.0), lossy, unreadable],
        );
        data.rtp.insert(key("t1_10_300s_no-ebpf_rtp"), Vec::new());

        let loss = data.loss().unwrap();
        assert_eq!(
            loss,
            vec![
                LossPoint {
                    no_clients: "10".into(),
                    mode: Mode::Ebpf,
                    streams: 2,
                    mean_lost_percent: Some(0.5),
                },
                LossPoint {
                    no_clients: "10".into(),
                    mode: Mode::NoEbpf,
                    streams: 0,
                    mean_lost_percent: None,
                },
            ]
        );
    }

    #[test]
    fn test_client_counts_order_numerically() {
        let mut data = Dataset::default();
        for n in ["100", "20", "3", "many"] {
            data.conversations.insert(
                key(&format!("t1_{n}_300s_ebpf_conversations")),
                vec![conv(1.0, 1.0)],
            );
        }
        let labels: Vec<String> = data.throughput().unwrap()[0]
            .points
            .iter()
            .map(|p| p.no_clients.clone())
            .collect();
        assert_eq!(labels, vec!["3", "20", "100", "many"]);
    }

    #[test]
    fn test_load_dataset_reads_tables_and_rejects_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        write_table(
            &dir.path().join("t1_10_300s_ebpf_conversations.csv"),
            &[conv(10.0, 1.0)],
        )
        .unwrap();
        write_table(&dir.path().join("t1_10_300s_ebpf_rtp.csv"), &[rtp("0x1", 20.0)]).unwrap();
        write_table(&dir.path().join("short_rtp.csv"), &[rtp("0x1", 20.0)]).unwrap();
        std::fs::write(dir.path().join("t1_10_300s_no-ebpf_rtp.csv"), "garbage\n").unwrap();
        std::fs::write(dir.path().join("t1_10_300s_ebpf_rtp.txt"), "raw report").unwrap();

        let data = load_dataset(dir.path(), "csv").unwrap();
        assert_eq!(data.conversations.len(), 1);
        assert_eq!(data.rtp.len(), 1);
        assert_eq!(data.rtp_tables, 1);
        assert_eq!(data.rejected.len(), 2);
        let rejected: Vec<PathBuf> = data.rejected.iter().map(|(p, _)| p.clone()).collect();
        assert!(rejected.contains(&dir.path().join("short_rtp.csv")));
        assert!(rejected.contains(&dir.path().join("t1_10_300s_no-ebpf_rtp.csv")));
    }

    #[test]
    fn test_tables_with_same_key_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        for (sub, bytes) in [("run1", 100.0), ("run2", 300.0)] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
            write_table(
                &dir.path().join(sub).join("t1_10_300s_ebpf_conversations.csv"),
                &[conv(bytes, 10.0)],
            )
            .unwrap();
        }
        write_table(
            &dir.path().join("t1_10_300s_ebpf_conversations_retry.csv"),
            &[conv(500.0, 10.0)],
        )
        .unwrap();

        let data = load_dataset(dir.path(), "csv").unwrap();
        assert_eq!(data.conversations.len(), 1);
        assert_eq!(data.conversation_tables, 3);
        assert!(data.rejected.is_empty());
        assert_eq!(
            data.conversations[&key("t1_10_300s_ebpf_conversations")].len(),
            3
        );

        let total = &data.throughput().unwrap()[2];
        assert_eq!(total.points[0].ebpf, Some(30.0));
    }

    #[test]
    fn test_throughput_with_mixed_byte_units() {
        let format = crate::report::ReportFormat::new(&[], &["bytes", "kB", "MB", "<->"]);
        let report = "\
10.0.0.1 <-> 10.0.0.2 10 500 bytes 10 500 bytes 20 1000 bytes 0.0 1.0
10.0.0.1 <-> 10.0.0.3 10 1 MB 10 1 MB 20 2 MB 0.0 1.0
";
        let parsed = crate::report::parse_conversation_report(report.lines(), &format);
        assert!(parsed.skipped.is_empty());

        let mut data = Dataset::default();
        data.conversations
            .insert(key("t1_10_300s_ebpf_conversations"), parsed.rows);
        let comparisons = data.throughput().unwrap();
        // (1 kB + 2000 kB) over 2 s
        assert_eq!(comparisons[2].points[0].ebpf, Some(1000.5));
        assert_eq!(comparisons[0].points[0].ebpf, Some(500.25));
    }
}

