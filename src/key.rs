//! Run metadata carried in report filenames.
//!
//! Captures are named `<capture_time>_<no_clients>_<clients_time>_<mode>_<stat>.<ext>`,
//! e.g. `20240101_10_300s_ebpf_rtp.txt`. The key is what groups tables by run
//! configuration before they are compared.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

/// Segment names in filename order.
pub const SEGMENTS: [&str; 5] = ["capture_time", "no_clients", "clients_time", "mode", "stat"];

static CLIENTS_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smh]?)$").unwrap());

/// Structured metadata derived from a report filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FilenameKey {
    pub capture_time: String,
    pub no_clients: String,
    pub clients_time: String,
    pub mode: String,
    pub stat: String,
}

/// Split a filename stem on `_` into a key.
///
/// The stem must already have its directory and extension removed. Segments
/// past the fifth are free-form suffixes and are ignored.
pub fn extract_key(stem: &str) -> Result<FilenameKey, KeyError> {
    let mut parts = stem.split('_');
    let mut next = |index: usize| -> Result<String, KeyError> {
        parts
            .next()
            .map(str::to_string)
            .ok_or_else(|| KeyError::MalformedFilename {
                filename: stem.to_string(),
                missing: SEGMENTS[index],
                found: index,
            })
    };

    Ok(FilenameKey {
        capture_time: next(0)?,
        no_clients: next(1)?,
        clients_time: next(2)?,
        mode: next(3)?,
        stat: next(4)?,
    })
}

/// Derive a key from a path, stripping its directory and extension first.
pub fn key_from_path(path: &Path) -> Result<FilenameKey, KeyError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| KeyError::MalformedFilename {
            filename: path.display().to_string(),
            missing: SEGMENTS[0],
            found: 0,
        })?;
    extract_key(stem)
}

impl FilenameKey {
    /// Number of clients as an integer, when the segment is numeric.
    pub fn client_count(&self) -> Option<u32> {
        self.no_clients.parse().ok()
    }

    /// How long clients ran, e.g. `300s`, `5m`, `1h`. Bare numbers are seconds.
    pub fn clients_duration(&self) -> Option<Duration> {
        let caps = CLIENTS_TIME.captures(&self.clients_time)?;
        let value: u64 = caps[1].parse().ok()?;
        let secs = match &caps[2] {
            "m" => value.checked_mul(60)?,
            "h" => value.checked_mul(3600)?,
            _ => value,
        };
        Some(Duration::from_secs(secs))
    }

    /// Capture time as a timestamp, for the layouts the capture scripts emit.
    pub fn capture_timestamp(&self) -> Option<NaiveDateTime> {
        for fmt in ["%Y%m%d%H%M%S", "%Y%m%d-%H%M%S", "%Y-%m-%d-%H-%M-%S"] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(&self.capture_time, fmt) {
                return Some(ts);
            }
        }
        chrono::NaiveDate::parse_from_str(&self.capture_time, "%Y%m%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    /// The mode segment checked against the known vocabulary.
    pub fn parsed_mode(&self) -> Result<Mode, UnknownMode> {
        self.mode.parse()
    }
}

impl std::fmt::Display for FilenameKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.capture_time, self.no_clients, self.clients_time, self.mode, self.stat
        )
    }
}

/// Operating configuration under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Mode {
    #[serde(rename = "ebpf")]
    Ebpf,
    #[serde(rename = "no-ebpf")]
    NoEbpf,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Ebpf => "ebpf",
            Mode::NoEbpf => "no-ebpf",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ebpf" => Ok(Mode::Ebpf),
            "no-ebpf" => Ok(Mode::NoEbpf),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// A mode segment outside `{ebpf, no-ebpf}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnknownMode(pub String);

impl std::fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown mode \"{}\" (expected ebpf or no-ebpf)", self.0)
    }
}

impl std::error::Error for UnknownMode {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Fewer than five `_`-separated segments.
    MalformedFilename {
        filename: String,
        missing: &'static str,
        found: usize,
    },
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyError::MalformedFilename {
                filename,
                missing,
                found,
            } => write!(
                f,
                "malformed filename \"{filename}\": missing {missing} segment \
                 (found {found} of 5, expected <capture_time>_<no_clients>_<clients_time>_<mode>_<stat>)"
            ),
        }
    }
}

impl std::error::Error for KeyError {}
