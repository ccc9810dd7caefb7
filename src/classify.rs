//! Route files to a parser by name.

use std::path::Path;

use crate::key::extract_key;

const RTP_MARKER: &str = "rtp";
const CONVERSATION_MARKER: &str = "conversations";

/// Which report (or table) layout a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Conversation,
    RtpStream,
    Unknown,
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            ReportKind::Conversation => "conversations",
            ReportKind::RtpStream => "rtp",
            ReportKind::Unknown => "unknown",
        })
    }
}

/// Substring test: the name mentions `rtp` and the extension token.
///
/// Permissive on purpose. A name can satisfy this and
/// [`is_conversation_report`] at once; [`classify`] settles such names.
pub fn is_rtp_report(name: &str, ext: &str) -> bool {
    name.contains(RTP_MARKER) && name.contains(ext)
}

/// Substring test: the name mentions `conversations` and the extension token.
pub fn is_conversation_report(name: &str, ext: &str) -> bool {
    name.contains(CONVERSATION_MARKER) && name.contains(ext)
}

/// Classify a file name into exactly one kind.
///
/// The name must end in `.<ext>`. When the stem follows the run naming
/// convention, its `stat` segment decides. Otherwise the substring tests
/// apply, and a name matching both is `Unknown`.
pub fn classify(name: &str, ext: &str) -> ReportKind {
    let Some(stem) = name
        .strip_suffix(ext)
        .and_then(|s| s.strip_suffix('.'))
    else {
        return ReportKind::Unknown;
    };

    if let Ok(key) = extract_key(stem) {
        return match key.stat.as_str() {
            RTP_MARKER => ReportKind::RtpStream,
            CONVERSATION_MARKER => ReportKind::Conversation,
            _ => ReportKind::Unknown,
        };
    }

    match (is_rtp_report(stem, ""), is_conversation_report(stem, "")) {
        (true, false) => ReportKind::RtpStream,
        (false, true) => ReportKind::Conversation,
        _ => ReportKind::Unknown,
    }
}

/// [`classify`] on a path's file name.
pub fn classify_path(path: &Path, ext: &str) -> ReportKind {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| classify(n, ext))
        .unwrap_or(ReportKind::Unknown)
}
