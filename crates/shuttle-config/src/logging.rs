use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::defaults::{default_log_filter_string, default_log_format};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Settings consumed when installing the tracing subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` expression, e.g. `info` or `shuttle_rpc=debug`.
    pub filter: String,
    /// Output format of the subscriber.
    pub format: LogFormat,
    /// Lowers the filter to `debug` regardless of `filter`.
    pub debug: bool,
}

impl LoggingConfig {
    /// Returns the filter expression that should be installed.
    #[must_use]
    pub fn effective_filter(&self) -> &str {
        if self.debug { "debug" } else { &self.filter }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter_string(),
            format: default_log_format(),
            debug: false,
        }
    }
}
