pub mod conversation;
pub mod rtp;

use std::borrow::Cow;

pub use conversation::{parse_conversation_report, ConversationRow};
pub use rtp::{parse_rtp_report, RtpStreamRow};

/// Decoration a tshark report layout wraps around its data rows.
///
/// A line containing `=` or any noise marker is header/footer text. Strip
/// tokens are unit and arrow literals that sit between data fields; a byte
/// unit among them also rescales the number before it to kilobytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFormat {
    pub noise_markers: Vec<String>,
    pub strip_tokens: Vec<String>,
}

/// Header and footer words of `tshark -z conv,<proto>` output.
pub const CONVERSATION_NOISE_MARKERS: &[&str] = &["Filter", "Conversations", "Bytes", "Total"];
/// Unit and separator literals interleaved with conversation fields.
pub const CONVERSATION_STRIP_TOKENS: &[&str] = &["kB", "<->"];
/// The `tshark -z rtp,streams` column header is the only line naming `time`.
pub const RTP_NOISE_MARKERS: &[&str] = &["time"];

impl ReportFormat {
    pub fn new(noise_markers: &[&str], strip_tokens: &[&str]) -> Self {
        Self {
            noise_markers: noise_markers.iter().map(|s| s.to_string()).collect(),
            strip_tokens: strip_tokens.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn conversation() -> Self {
        Self::new(CONVERSATION_NOISE_MARKERS, CONVERSATION_STRIP_TOKENS)
    }

    pub fn rtp() -> Self {
        Self::new(RTP_NOISE_MARKERS, &[])
    }

    /// Trim a raw line and return it if it can carry data.
    pub fn data_line<'a>(&self, line: &'a str) -> Option<&'a str> {
        let line = line.trim();
        if line.is_empty() || line.contains('=') {
            return None;
        }
        if self.noise_markers.iter().any(|m| line.contains(m.as_str())) {
            return None;
        }
        Some(line)
    }

    /// Split a data line on whitespace runs, dropping strip tokens.
    ///
    /// When a dropped token is a byte unit other than `kB`, the token before
    /// it is rewritten in kilobytes so byte columns share one unit.
    pub fn tokens<'a>(&self, line: &'a str) -> Vec<Cow<'a, str>> {
        let mut out: Vec<Cow<'a, str>> = Vec::new();
        for token in line.split_whitespace() {
            if !self.strip_tokens.iter().any(|s| s == token) {
                out.push(Cow::Borrowed(token));
                continue;
            }
            let Some(last) = out.last_mut() else {
                continue;
            };
            if let Some(kb) = last.parse().ok().and_then(|v| to_kilobytes(v, token)) {
                *last = Cow::Owned(kb.to_string());
            }
        }
        out
    }
}

/// `value` in `unit`, converted to kB. `None` for `kB` itself and non-units.
fn to_kilobytes(value: f64, unit: &str) -> Option<f64> {
    match unit {
        "bytes" | "B" => Some(value / 1000.0),
        "MB" => Some(value * 1000.0),
        "GB" => Some(value * 1_000_000.0),
        _ => None,
    }
}

/// Rows extracted from one report, plus the data lines that were rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport<R> {
    pub rows: Vec<R>,
    pub skipped: Vec<ParseError>,
}

impl<R> Default for ParsedReport<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Parse every data line with `parse_line`, skipping and logging the ones it rejects.
pub(crate) fn collect_rows<'a, R, I, F>(
    lines: I,
    format: &ReportFormat,
    report: &'static str,
    mut parse_line: F,
) -> ParsedReport<R>
where
    I: IntoIterator<Item = &'a str>,
    F: FnMut(usize, Vec<Cow<'a, str>>) -> Result<R, ParseError>,
{
    let mut parsed = ParsedReport::default();
    for (index, raw) in lines.into_iter().enumerate() {
        let Some(line) = format.data_line(raw) else {
            continue;
        };
        match parse_line(index + 1, format.tokens(line)) {
            Ok(row) => parsed.rows.push(row),
            Err(e) => {
                tracing::warn!(report, error = %e, "skipping malformed row");
                parsed.skipped.push(e);
            }
        }
    }
    parsed
}

/// Parse one token into its column type.
pub(crate) fn field<T: std::str::FromStr>(
    line: usize,
    column: &'static str,
    token: &str,
) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::InvalidField {
        line,
        column,
        value: token.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A data line whose token count does not fit the row layout.
    MalformedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
    /// A token that does not parse as its column's type.
    InvalidField {
        line: usize,
        column: &'static str,
        value: String,
    },
    /// No data line survived filtering.
    NoDataExtracted { skipped: usize },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MalformedRow {
                line,
                expected,
                found,
            } => write!(
                f,
                "line {line}: expected {expected} fields, found {found}"
            ),
            ParseError::InvalidField {
                line,
                column,
                value,
            } => write!(f, "line {line}: invalid {column} value \"{value}\""),
            ParseError::NoDataExtracted { skipped: 0 } => {
                write!(f, "no data rows extracted")
            }
            ParseError::NoDataExtracted { skipped } => {
                write!(f, "no data rows extracted ({skipped} malformed rows skipped)")
            }
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_line_drops_separators_and_blank_lines() {
        let format = ReportFormat::conversation();
        assert_eq!(format.data_line("   "), None);
        assert_eq!(format.data_line("================"), None);
        assert_eq!(format.data_line("a = b"), None);
        assert_eq!(format.data_line("  1.2.3.4 x  "), Some("1.2.3.4 x"));
    }

    #[test]
    fn test_data_line_drops_every_noise_marker() {
        let format = ReportFormat::conversation();
        for line in [
            "Filter:<No Filter>",
            "UDP Conversations",
            "| Frames  Bytes |",
            "| Total |",
        ] {
            assert_eq!(format.data_line(line), None, "{line}");
        }
        let rtp = ReportFormat::rtp();
        assert_eq!(rtp.data_line("Start time End time Src IP addr"), None);
        assert!(rtp.data_line("Total 1 2").is_some());
    }

    #[test]
    fn test_tokens_drop_strip_literals_only() {
        let format = ReportFormat::conversation();
        assert_eq!(
            format.tokens("a  <->\tb 5 kB 7 kBps"),
            vec!["a", "b", "5", "7", "kBps"]
        );
        assert_eq!(ReportFormat::rtp().tokens("a <-> kB"), vec!["a", "<->", "kB"]);
    }

    #[test]
    fn test_custom_markers_extend_filtering() {
        let format = ReportFormat::new(&["Relative"], &["|"]);
        assert_eq!(format.data_line("Relative Start"), None);
        assert_eq!(format.tokens("1 | 2"), vec!["1", "2"]);
    }

    #[test]
    fn test_byte_units_rescale_to_kilobytes() {
        let format = ReportFormat::new(&[], &["bytes", "kB", "MB", "<->"]);
        assert_eq!(
            format.tokens("a <-> b 1 60 bytes 2 5 kB 3 2 MB 1.5 MB x MB"),
            vec!["a", "b", "1", "0.06", "2", "5", "3", "2000", "1500", "x"]
        );
        // not a strip token, so left alone
        assert_eq!(
            ReportFormat::conversation().tokens("1 60 bytes"),
            vec!["1", "60", "bytes"]
        );
    }

    #[test]
    fn test_parse_error_messages() {
        let e = ParseError::MalformedRow {
            line: 4,
            expected: 10,
            found: 9,
        };
        assert_eq!(e.to_string(), "line 4: expected 10 fields, found 9");
        assert_eq!(
            ParseError::NoDataExtracted { skipped: 2 }.to_string(),
            "no data rows extracted (2 malformed rows skipped)"
        );
    }
}
