use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

use super::{collect_rows, field, ParseError, ParsedReport, ReportFormat};

/// Leading single-token columns; everything after them is `Problems`.
pub const RTP_FIXED_FIELDS: usize = 17;
/// Columns in an RTP stream row, `Problems` included.
pub const RTP_ARITY: usize = RTP_FIXED_FIELDS + 1;

static LOST_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(?(-?\d+(?:\.\d+)?)%\)?$").unwrap());

/// Statistics for one stream from a `tshark -z rtp,streams` report.
#[derive(Debug, Clone, PartialEq)]
pub struct RtpStreamRow {
    pub start: f64,
    pub end: f64,
    pub src_ip: String,
    pub src_port: u16,
    pub dest_ip: String,
    pub dest_port: u16,
    pub ssrc: String,
    pub payload_type: String,
    pub packet_count: u64,
    /// Negative when the stream delivered duplicates.
    pub lost_count: i64,
    /// As printed, e.g. `(0.5%)`.
    pub lost_percent: String,
    pub min_delta_ms: f64,
    pub mean_delta_ms: f64,
    pub max_delta_ms: f64,
    pub min_jitter_ms: f64,
    pub mean_jitter_ms: f64,
    pub max_jitter_ms: f64,
    /// Free text; empty for a clean stream.
    pub problems: String,
}

impl RtpStreamRow {
    /// Loss as a percentage, parsed from `lost_percent`.
    pub fn lost_ratio(&self) -> Option<f64> {
        LOST_PERCENT
            .captures(&self.lost_percent)
            .and_then(|c| c[1].parse().ok())
    }
}

/// Parse the lines of an RTP streams report into rows, in input order.
///
/// The first seventeen tokens of a data line are the fixed columns; any
/// remaining tokens are joined with single spaces into `problems`. A line
/// with fewer than seventeen tokens is skipped and reported in `skipped`.
/// Returns `NoDataExtracted` when no row survives, so callers never write
/// a table for a report that held nothing.
pub fn parse_rtp_report<'a, I>(
    lines: I,
    format: &ReportFormat,
) -> Result<ParsedReport<RtpStreamRow>, ParseError>
where
    I: IntoIterator<Item = &'a str>,
{
    let parsed = collect_rows(lines, format, "rtp", parse_line);
    if parsed.rows.is_empty() {
        return Err(ParseError::NoDataExtracted {
            skipped: parsed.skipped.len(),
        });
    }
    Ok(parsed)
}

fn parse_line(line: usize, tokens: Vec<Cow<'_, str>>) -> Result<RtpStreamRow, ParseError> {
    let (fixed, rest) = tokens.split_at(tokens.len().min(RTP_FIXED_FIELDS));
    let Ok([start, end, src_ip, src_port, dest_ip, dest_port, ssrc, payload, pkts, lost, lost_percent, min_delta, mean_delta, max_delta, min_jitter, mean_jitter, max_jitter]) =
        <&[Cow<'_, str>; RTP_FIXED_FIELDS]>::try_from(fixed)
    else {
        return Err(ParseError::MalformedRow {
            line,
            expected: RTP_ARITY,
            found: tokens.len(),
        });
    };

    Ok(RtpStreamRow {
        start: field(line, "Start", start)?,
        end: field(line, "End", end)?,
        src_ip: src_ip.to_string(),
        src_port: field(line, "Src_Port", src_port)?,
        dest_ip: dest_ip.to_string(),
        dest_port: field(line, "Dest_Port", dest_port)?,
        ssrc: ssrc.to_string(),
        payload_type: payload.to_string(),
        packet_count: field(line, "Pkts", pkts)?,
        lost_count: field(line, "Lost", lost)?,
        lost_percent: lost_percent.to_string(),
        min_delta_ms: field(line, "Min_Delta(ms)", min_delta)?,
        mean_delta_ms: field(line, "Mean_Delta(ms)", mean_delta)?,
        max_delta_ms: field(line, "Max_Delta(ms)", max_delta)?,
        min_jitter_ms: field(line, "Min_Jitter(ms)", min_jitter)?,
        mean_jitter_ms: field(line, "Mean_Jitter(ms)", mean_jitter)?,
        max_jitter_ms: field(line, "Max_Jitter(ms)", max_jitter)?,
        problems: rest.join(" "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
========================= RTP Streams ========================
    Start time      End time     Src IP addr  Port    Dest IP addr  Port       SSRC          Payload  Pkts         Lost   Min Delta(ms)  Mean Delta(ms)   Max Delta(ms)  Min Jitter(ms) Mean Jitter(ms)  Max Jitter(ms) Problems?
     0.000000     29.980000   10.0.2.15  5004   10.0.2.2  40000 0x1A2B3C4D        g711U  1500     0 (0.0%)           0.000          20.000          40.123           0.000           0.512           1.234
     0.512000     29.990000   10.0.2.15  5006   10.0.2.2  40002 0x0BADF00D        opus   1490    10 (0.7%)           0.001          20.100          95.000           0.010           2.400           9.800 X
==============================================================
";

    fn parse(text: &str) -> Result<ParsedReport<RtpStreamRow>, ParseError> {
        parse_rtp_report(text.lines(), &ReportFormat::rtp())
    }

    #[test]
    fn test_parses_tshark_rtp_streams() {
        let parsed = parse(REPORT).unwrap();
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.rows.len(), 2);

        let clean = &parsed.rows[0];
        assert_eq!(clean.start, 0.0);
        assert_eq!(clean.end, 29.98);
        assert_eq!(clean.src_ip, "10.0.2.15");
        assert_eq!(clean.src_port, 5004);
        assert_eq!(clean.dest_port, 40000);
        assert_eq!(clean.ssrc, "0x1A2B3C4D");
        assert_eq!(clean.payload_type, "g711U");
        assert_eq!(clean.packet_count, 1500);
        assert_eq!(clean.lost_count, 0);
        assert_eq!(clean.lost_percent, "(0.0%)");
        assert_eq!(clean.mean_delta_ms, 20.0);
        assert_eq!(clean.max_jitter_ms, 1.234);
        assert_eq!(clean.problems, "");

        let lossy = &parsed.rows[1];
        assert_eq!(lossy.ssrc, "0x0BADF00D");
        assert_eq!(lossy.lost_count, 10);
        assert_eq!(lossy.lost_ratio(), Some(0.7));
        assert_eq!(lossy.problems, "X");
    }

    #[test]
    fn test_problems_keeps_internal_spaces() {
        let line = "0.0 1.0 10.0.0.1 5004 10.0.0.2 6000 0x1 g711U 50 1 (2.0%) \
                    1.0 20.0 40.0 0.1 0.2 0.3 Wrong  sequence   number";
        let parsed = parse(line).unwrap();
        assert_eq!(parsed.rows[0].problems, "Wrong sequence number");
        assert_eq!(parsed.rows[0].max_jitter_ms, 0.3);
    }

    #[test]
    fn test_negative_loss_from_duplicates() {
        let line = "0.0 1.0 10.0.0.1 5004 10.0.0.2 6000 0x1 g711U 52 -2 (-4.0%) \
                    1.0 20.0 40.0 0.1 0.2 0.3 X";
        let row = &parse(line).unwrap().rows[0];
        assert_eq!(row.lost_count, -2);
        assert_eq!(row.lost_ratio(), Some(-4.0));
    }

    #[test]
    fn test_short_row_is_skipped() {
        let text = "\
0.0 1.0 10.0.0.1 5004 10.0.0.2 6000 0x1 g711U 50 0 (0.0%) 1.0 20.0 40.0 0.1 0.2
0.0 1.0 10.0.0.1 5004 10.0.0.2 6000 0x2 g711U 50 0 (0.0%) 1.0 20.0 40.0 0.1 0.2 0.3
";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].ssrc, "0x2");
        assert_eq!(
            parsed.skipped,
            vec![ParseError::MalformedRow {
                line: 1,
                expected: 18,
                found: 16
            }]
        );
    }

    #[test]
    fn test_bad_port_leaves_no_data() {
        let line = "0.0 1.0 10.0.0.1 http 10.0.0.2 6000 0x1 g711U 50 0 (0.0%) 1.0 20.0 40.0 0.1 0.2 0.3";
        let err = parse(line).unwrap_err();
        assert_eq!(err, ParseError::NoDataExtracted { skipped: 1 });
    }

    #[test]
    fn test_header_only_report_is_no_data() {
        let text = "\
========================= RTP Streams ========================
    Start time      End time     Src IP addr  Port    Dest IP addr  Port       SSRC
==============================================================
";
        assert_eq!(
            parse(text).unwrap_err(),
            ParseError::NoDataExtracted { skipped: 0 }
        );
        assert_eq!(
            parse("").unwrap_err(),
            ParseError::NoDataExtracted { skipped: 0 }
        );
    }

    #[test]
    fn test_lines_with_time_are_never_rows() {
        let text = "\
0.0 1.0 10.0.0.1 5004 10.0.0.2 6000 0x1 g711U 50 0 (0.0%) 1.0 20.0 40.0 0.1 0.2 0.3 timeout
0.0 1.0 10.0.0.1 5004 10.0.0.2 6000 0x2 g711U 50 0 (0.0%) 1.0 20.0 40.0 0.1 0.2 0.3
";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].ssrc, "0x2");
    }
}
