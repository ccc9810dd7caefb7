use std::borrow::Cow;

use super::{collect_rows, field, ParseError, ParsedReport, ReportFormat};

/// Number of fields in a conversation row once decoration is stripped.
pub const CONVERSATION_ARITY: usize = 10;

/// One bidirectional flow from a `tshark -z conv,<proto>` report.
///
/// Byte columns are kilobytes: the default format strips `kB`, and other
/// byte units listed as strip tokens are rescaled to kB.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub address_a: String,
    pub address_b: String,
    pub frames_a_to_b: u64,
    pub bytes_a_to_b: f64,
    pub frames_b_to_a: u64,
    pub bytes_b_to_a: f64,
    pub total_frames: u64,
    pub total_bytes: f64,
    pub start: f64,
    pub duration: f64,
}

/// Parse the lines of a conversation report into rows, in input order.
///
/// Header and footer lines are filtered by `format`. A surviving line with
/// other than ten tokens, or with a non-numeric counter, is skipped and
/// reported in `skipped`. An empty result is not an error: the table is
/// still written with its header.
pub fn parse_conversation_report<'a, I>(lines: I, format: &ReportFormat) -> ParsedReport<ConversationRow>
where
    I: IntoIterator<Item = &'a str>,
{
    collect_rows(lines, format, "conversations", parse_line)
}

fn parse_line(line: usize, tokens: Vec<Cow<'_, str>>) -> Result<ConversationRow, ParseError> {
    let [address_a, address_b, frames_ab, bytes_ab, frames_ba, bytes_ba, frames, bytes, start, duration] =
        &tokens[..]
    else {
        return Err(ParseError::MalformedRow {
            line,
            expected: CONVERSATION_ARITY,
            found: tokens.len(),
        });
    };

    Ok(ConversationRow {
        address_a: address_a.to_string(),
        address_b: address_b.to_string(),
        frames_a_to_b: field(line, "Frames-A_B", frames_ab)?,
        bytes_a_to_b: field(line, "Bytes-A_B", bytes_ab)?,
        frames_b_to_a: field(line, "Frames-B_A", frames_ba)?,
        bytes_b_to_a: field(line, "Bytes-B_A", bytes_ba)?,
        total_frames: field(line, "Total_Frames", frames)?,
        total_bytes: field(line, "Total_Bytes", bytes)?,
        start: field(line, "Start", start)?,
        duration: field(line, "Duration", duration)?,
    })
}
