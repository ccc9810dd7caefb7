use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::report::ReportFormat;

/// Top-level configuration loaded from digest.toml.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DigestConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub conversation: ConversationConfig,
    pub rtp: RtpConfig,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory walked recursively for reports.
    pub dir: PathBuf,
    /// Extension of raw tshark reports.
    pub extension: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Extension of the generated tables, written next to each report.
    pub extension: String,
}

/// Decoration around `tshark -z conv,<proto>` rows.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub noise_markers: Vec<String>,
    /// Arrow and unit literals dropped from data lines. Byte units
    /// (`bytes`, `B`, `MB`, `GB`) also rescale the value before them to kB.
    pub strip_tokens: Vec<String>,
}

/// Decoration around `tshark -z rtp,streams` rows.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RtpConfig {
    pub noise_markers: Vec<String>,
    pub strip_tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Where `summarize` writes its JSON document, if anywhere.
    pub json: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            extension: "txt".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: "csv".to_string(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        let ReportFormat {
            noise_markers,
            strip_tokens,
        } = ReportFormat::conversation();
        Self {
            noise_markers,
            strip_tokens,
        }
    }
}

impl Default for RtpConfig {
    fn default() -> Self {
        let ReportFormat {
            noise_markers,
            strip_tokens,
        } = ReportFormat::rtp();
        Self {
            noise_markers,
            strip_tokens,
        }
    }
}

impl DigestConfig {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::from_toml(&contents).map_err(|e| e.with_path(path))
    }

    /// Parse config text. Sections and fields left out keep their defaults.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let cfg: DigestConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.input.extension.is_empty() || self.output.extension.is_empty() {
            return Err(ConfigError::Invalid(
                "input and output extensions must not be empty".to_string(),
            ));
        }
        if self.input.extension == self.output.extension {
            return Err(ConfigError::Invalid(format!(
                "input and output extension are both \"{}\"; tables would overwrite reports",
                self.input.extension
            )));
        }
        Ok(())
    }

    pub fn conversation_format(&self) -> ReportFormat {
        ReportFormat {
            noise_markers: self.conversation.noise_markers.clone(),
            strip_tokens: self.conversation.strip_tokens.clone(),
        }
    }

    pub fn rtp_format(&self) -> ReportFormat {
        ReportFormat {
            noise_markers: self.rtp.noise_markers.clone(),
            strip_tokens: self.rtp.strip_tokens.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid(String),
}

impl ConfigError {
    /// Attach the config file path to a parse error.
    fn with_path(self, path: &Path) -> Self {
        match self {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {source}", path.display())
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}
