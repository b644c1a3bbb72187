//! Settings document loading.
//!
//! Boolean and string switches are read leniently: a value of the wrong JSON
//! type falls back to the default instead of failing the whole document. The
//! `clients` table is strict because a malformed table means no server can be
//! launched.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::defaults::default_log_filter_string;
use crate::logging::{LogFormat, LoggingConfig};
use crate::server::ServerConfig;

/// Errors raised while loading the settings document.
#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings from {path}: {source}")]
    Read {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
    /// The document is not valid JSON.
    #[error("settings are not valid JSON: {0}")]
    Parse(#[source] Arc<serde_json::Error>),
    /// The top level of the document is not an object.
    #[error("settings document must be a JSON object")]
    NotObject,
    /// The `clients` entry is present but is not an object.
    #[error("`clients` must be an object keyed by client name")]
    ClientsNotObject,
    /// A client entry does not match the expected shape.
    #[error("invalid configuration for client '{name}': {source}")]
    InvalidClient {
        /// Name of the offending entry.
        name: String,
        /// Deserialisation failure.
        #[source]
        source: Arc<serde_json::Error>,
    },
    /// `log_format` names an unknown format.
    #[error("unsupported log format '{0}'")]
    InvalidLogFormat(String),
}

/// Switches gating what the client forwards to its log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSwitches {
    /// Emit verbose traffic logs.
    pub debug: bool,
    /// Forward `window/logMessage` notifications.
    pub server: bool,
    /// Forward the server's stderr lines.
    pub stderr: bool,
}

impl Default for LogSwitches {
    fn default() -> Self {
        Self {
            debug: false,
            server: true,
            stderr: false,
        }
    }
}

/// The complete settings document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    clients: Vec<ServerConfig>,
    switches: LogSwitches,
    logging: LoggingConfig,
}

impl Settings {
    /// Loads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Read`] when the file cannot be read and any
    /// error of [`Settings::from_json_str`] otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::from_json_str(&text)
    }

    /// Parses settings from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] for invalid JSON and any error of
    /// [`Settings::from_value`] otherwise.
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        let value: Value =
            serde_json::from_str(text).map_err(|error| SettingsError::Parse(Arc::new(error)))?;
        Self::from_value(&value)
    }

    /// Builds settings from an already parsed document.
    ///
    /// # Errors
    ///
    /// Fails when the document or its `clients` table is not an object, when
    /// a client entry is malformed, or when `log_format` is unknown.
    pub fn from_value(value: &Value) -> Result<Self, SettingsError> {
        let document = value.as_object().ok_or(SettingsError::NotObject)?;

        let clients = match document.get("clients") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(table)) => read_clients(table)?,
            Some(_) => return Err(SettingsError::ClientsNotObject),
        };

        let defaults = LogSwitches::default();
        let switches = LogSwitches {
            debug: read_bool(document, "log_debug", defaults.debug),
            server: read_bool(document, "log_server", defaults.server),
            stderr: read_bool(document, "log_stderr", defaults.stderr),
        };

        let format = match document.get("log_format").and_then(Value::as_str) {
            Some(text) => LogFormat::from_str(text)
                .map_err(|_| SettingsError::InvalidLogFormat(text.to_owned()))?,
            None => LogFormat::default(),
        };
        let logging = LoggingConfig {
            filter: read_string(document, "log_filter", default_log_filter_string()),
            format,
            debug: switches.debug,
        };

        Ok(Self {
            clients,
            switches,
            logging,
        })
    }

    /// Every configured client, enabled or not, sorted by name.
    #[must_use]
    pub fn clients(&self) -> &[ServerConfig] {
        &self.clients
    }

    /// Clients that may be launched.
    pub fn enabled_clients(&self) -> impl Iterator<Item = &ServerConfig> {
        self.clients.iter().filter(|client| client.enabled)
    }

    /// Looks up a client by name.
    #[must_use]
    pub fn client(&self, name: &str) -> Option<&ServerConfig> {
        self.clients.iter().find(|client| client.name == name)
    }

    /// Switches consumed by the client's dispatch and stderr loop.
    #[must_use]
    pub fn log_switches(&self) -> LogSwitches {
        self.switches
    }

    /// Settings for the tracing subscriber.
    #[must_use]
    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }
}

fn read_clients(table: &Map<String, Value>) -> Result<Vec<ServerConfig>, SettingsError> {
    let mut clients = table
        .iter()
        .map(|(name, entry)| {
            let mut config: ServerConfig =
                serde_json::from_value(entry.clone()).map_err(|source| {
                    SettingsError::InvalidClient {
                        name: name.clone(),
                        source: Arc::new(source),
                    }
                })?;
            config.name.clone_from(name);
            Ok(config)
        })
        .collect::<Result<Vec<_>, SettingsError>>()?;
    clients.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(clients)
}

fn read_bool(document: &Map<String, Value>, key: &str, default: bool) -> bool {
    document
        .get(key)
        .and_then(Value::as_bool)
        .unwrap_or(default)
}

fn read_string(document: &Map<String, Value>, key: &str, default: String) -> String {
    document
        .get(key)
        .and_then(Value::as_str)
        .map_or(default, ToOwned::to_owned)
}
