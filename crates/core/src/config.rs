//! Scan configuration.
//!
//! Loaded from YAML (or JSON, which YAML accepts) with every field defaulted,
//! so an empty document is a valid configuration. `validate` must be called
//! before any scanning begins.

use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Extensions scanned when no configuration overrides them.
pub const DEFAULT_INCLUDE_EXT: &[&str] =
    &[".sh", ".bash", ".ksh", ".zsh", ".bat", ".cmd", ".ps1", ".psm1", ".pl", ".pm", ".py"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("parsing.include_ext must not be empty")]
    EmptyIncludeExt,

    #[error("parsing.include_ext entry '{0}' must start with '.'")]
    InvalidExtension(String),

    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidIgnorePattern { pattern: String, message: String },

    #[error("runtime.{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error(
        "resolution.case_sensitive_nodes = false requires case_sensitive_lookup = false; \
         case-folded node identities would merge files the lookup treats as distinct"
    )]
    InconsistentCaseSensitivity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub include_ext: Vec<String>,
    /// Glob patterns (gitignore syntax) excluded from enumeration.
    pub ignore: Vec<String>,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            include_ext: DEFAULT_INCLUDE_EXT.iter().map(|s| s.to_string()).collect(),
            ignore: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub case_sensitive_lookup: bool,
    pub case_sensitive_nodes: bool,
    /// Retry targets relative to the bundle root when the source-relative path misses.
    pub root_relative_fallback: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self { case_sensitive_lookup: true, case_sensitive_nodes: true, root_relative_fallback: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_budget: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runlog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub pred_prefix: String,
    pub case_insensitive: bool,
}

/// Top-level configuration for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub parsing: ParsingConfig,
    pub resolution: ResolutionConfig,
    pub runtime: RuntimeConfig,
    pub scoring: ScoringConfig,
}

impl ScanConfig {
    /// Read a configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_yaml_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Switch lookup, node identity, and scoring to case-insensitive matching.
    pub fn case_insensitive(mut self) -> Self {
        self.resolution.case_sensitive_lookup = false;
        self.resolution.case_sensitive_nodes = false;
        self.scoring.case_insensitive = true;
        self
    }

    /// Reject configurations that cannot produce a meaningful scan.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parsing.include_ext.is_empty() {
            return Err(ConfigError::EmptyIncludeExt);
        }
        for ext in &self.parsing.include_ext {
            if !ext.starts_with('.') || ext.len() < 2 {
                return Err(ConfigError::InvalidExtension(ext.clone()));
            }
        }
        let mut globs = OverrideBuilder::new(".");
        for pattern in &self.parsing.ignore {
            globs.add(pattern).map_err(|e| ConfigError::InvalidIgnorePattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        if self.runtime.file_budget == Some(0) {
            return Err(ConfigError::ZeroLimit("file_budget"));
        }
        if self.runtime.threads == Some(0) {
            return Err(ConfigError::ZeroLimit("threads"));
        }
        if self.resolution.case_sensitive_lookup && !self.resolution.case_sensitive_nodes {
            return Err(ConfigError::InconsistentCaseSensitivity);
        }
        Ok(())
    }

    /// Whether `ext` (with leading dot) is in the include list.
    pub fn includes_extension(&self, ext: &str) -> bool {
        self.parsing.include_ext.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Short content hash identifying this configuration in run logs.
    pub fn hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        let hex = format!("{:x}", digest);
        hex[..12].to_string()
    }
}
