//! Shared configuration for the shuttle JSON-RPC client.
//!
//! The settings document describes which language servers can be launched
//! and how chatty the client should be about the traffic it observes. It is
//! a JSON object with a `clients` table and a handful of logging switches:
//!
//! ```json
//! {
//!   "clients": {
//!     "rust-analyzer": { "command": ["rust-analyzer"], "languageId": "rust" }
//!   },
//!   "log_server": true,
//!   "log_stderr": false,
//!   "log_format": "compact"
//! }
//! ```

mod defaults;
mod logging;
mod server;
mod settings;

pub use defaults::{DEFAULT_LOG_FILTER, default_log_filter_string, default_log_format};
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;
pub use settings::{LogSwitches, Settings, SettingsError};
