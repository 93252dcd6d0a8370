//! Configuration loading.
//!
//! One TOML file describes every logbook to publish. The `[META]` table carries logging
//! settings plus defaults shared by all logbooks; every other table is one logbook.


use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::format::{DEFAULT_LINE_WIDTH, DEFAULT_MAX_CHARS, FormatOptions};
use crate::source::SourceKind;

/// Name of the table holding shared settings.
pub const META_SECTION: &str = "META";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        /// Path to the configuration file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as TOML.
    #[error("failed to parse config file '{path}': {source}")]
    ParseError {
        /// Path to the configuration file that could not be parsed.
        path: PathBuf,
        /// The underlying TOML parse error.
        source: toml::de::Error,
    },

    /// A logbook table is incomplete.
    #[error("invalid logbook '{logbook}': {reason}")]
    Invalid { logbook: String, reason: String },
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Daily,
    Hourly,
    #[default]
    Never,
}

/// The `[META]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MetaConfig {
    /// Log file path. Logs go to stdout only when absent.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Level of the log file.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_rotation: Rotation,

    /// Number of rotated log files kept.
    #[serde(default = "default_log_retention")]
    pub log_retention: usize,

    /// Database URL shared by every logbook.
    #[serde(default)]
    pub database: Option<String>,

    /// `zuliprc` path shared by every logbook.
    #[serde(default)]
    pub zulip_rc: Option<PathBuf>,
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_log_retention() -> usize {
    7
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            log_level: default_log_level(),
            log_rotation: Rotation::default(),
            log_retention: default_log_retention(),
            database: None,
            zulip_rc: None,
        }
    }
}

/// A logbook table as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LogbookSection {
    #[serde(default)]
    kind: SourceKind,
    elog_url: Option<String>,
    elog_credentials: Option<(String, String)>,
    database: Option<String>,
    zulip_rc: Option<PathBuf>,
    db_table: Option<String>,
    zulip_stream: Option<String>,
    zulip_topic: Option<String>,
    elog_subject: Option<String>,
    elog_prefix: Option<String>,
    quote: Option<bool>,
    max_chars: Option<usize>,
    line_width: Option<usize>,
}

/// Login for a protected logbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Settings of one logbook, with the shared `[META]` defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LogbookConfig {
    /// Table name in the config file.
    pub name: String,
    pub kind: SourceKind,
    pub elog_url: String,
    pub elog_credentials: Option<Credentials>,
    pub database: Option<String>,
    pub zulip_rc: Option<PathBuf>,
    pub db_table: String,
    pub zulip_stream: String,
    /// Topic template.
    pub zulip_topic: Option<String>,
    /// Subject template; the source kind supplies one when absent.
    pub elog_subject: Option<String>,
    /// Prefix template.
    pub elog_prefix: Option<String>,
    pub quote: bool,
    pub max_chars: usize,
    pub line_width: usize,
}

impl LogbookConfig {
    pub fn format_options(&self) -> FormatOptions {
        FormatOptions {
            max_chars: self.max_chars,
            line_width: self.line_width,
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub meta: MetaConfig,
    sections: Vec<(String, LogbookSection)>,
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the file cannot be read.
    /// Returns [`ConfigError::ParseError`] if the file is not valid TOML.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse().map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Names of the configured logbooks, in file order.
    pub fn logbook_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    /// Every logbook with the `[META]` defaults applied, in file order.
    ///
    /// A value set on the logbook itself wins over the shared one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a logbook lacks `elog-url`, `db-table` or
    /// `zulip-stream`.
    pub fn logbooks(&self) -> Result<Vec<LogbookConfig>, ConfigError> {
        self.sections
            .iter()
            .map(|(name, section)| self.merge(name, section))
            .collect()
    }

    fn merge(&self, name: &str, section: &LogbookSection) -> Result<LogbookConfig, ConfigError> {
        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::Invalid {
                    logbook: name.to_string(),
                    reason: format!("missing required key '{}'", key),
                })
        };

        Ok(LogbookConfig {
            name: name.to_string(),
            kind: section.kind,
            elog_url: required(&section.elog_url, "elog-url")?,
            elog_credentials: section
                .elog_credentials
                .clone()
                .map(|(user, password)| Credentials { user, password }),
            database: section.database.clone().or_else(|| self.meta.database.clone()),
            zulip_rc: section.zulip_rc.clone().or_else(|| self.meta.zulip_rc.clone()),
            db_table: required(&section.db_table, "db-table")?,
            zulip_stream: required(&section.zulip_stream, "zulip-stream")?,
            zulip_topic: section.zulip_topic.clone(),
            elog_subject: section.elog_subject.clone(),
            elog_prefix: section.elog_prefix.clone(),
            quote: section.quote.unwrap_or(true),
            max_chars: section.max_chars.unwrap_or(DEFAULT_MAX_CHARS),
            line_width: section.line_width.unwrap_or(DEFAULT_LINE_WIDTH),
        })
    }
}

impl std::str::FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let mut table: toml::Table = toml::from_str(content)?;

        let meta = match table.remove(META_SECTION) {
            Some(value) => value.try_into()?,
            None => MetaConfig::default(),
        };

        let mut sections = Vec::with_capacity(table.len());
        for (name, value) in table {
            let section: LogbookSection = value.try_into().map_err(|e| {
                <toml::de::Error as serde::de::Error>::custom(format!("[{}]: {}", name, e))
            })?;
            sections.push((name, section));
        }

        Ok(Self { meta, sections })
    }
}
