//! Launch configuration for a single language server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How to launch a language server and which documents it serves.
///
/// Entries are keyed by name in the settings `clients` table; the key is
/// copied into [`ServerConfig::name`] when the table is read.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name of the entry in the `clients` table.
    #[serde(skip)]
    pub name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Editor scopes routed to this server.
    pub scopes: Vec<String>,
    /// Syntax definitions routed to this server.
    pub syntaxes: Vec<String>,
    /// Language identifier sent when opening documents.
    #[serde(rename = "languageId")]
    pub language_id: String,
    /// Disabled entries are kept but never launched.
    pub enabled: bool,
    /// Passed verbatim as `initializationOptions` during the handshake.
    #[serde(rename = "initializationOptions")]
    pub initialization_options: Map<String, Value>,
    /// Server-specific settings forwarded after initialisation.
    pub settings: Map<String, Value>,
    /// Working directory for the spawned process.
    #[serde(skip)]
    pub working_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Creates an enabled entry that runs `command`.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Returns the executable, if the command is not empty.
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    /// Returns the arguments following the executable.
    #[must_use]
    pub fn args(&self) -> &[String] {
        self.command.get(1..).unwrap_or_default()
    }

    /// Sets a custom working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            command: Vec::new(),
            scopes: Vec::new(),
            syntaxes: Vec::new(),
            language_id: String::new(),
            enabled: true,
            initialization_options: Map::new(),
            settings: Map::new(),
            working_dir: None,
        }
    }
}
