//! Server configuration.
//!
//! Every option can be given as a flag or an environment variable; flags take
//! precedence.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use clonewatch_types::{ConfigError, ServiceConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text.
    Text,
    /// One JSON object per event.
    Json,
    /// JSON when stdout is not a terminal, text otherwise.
    #[default]
    Auto,
}

/// Command-line interface for `clonewatch-server`.
#[derive(Debug, Clone, Parser)]
#[command(name = "clonewatch-server", version, about = "Cloned-site canary server")]
pub struct Cli {
    /// Address to listen on for HTTP.
    #[arg(long = "listen", env = "CLONEWATCH__LISTEN", default_value = "127.0.0.1:8080")]
    pub listen_addr: SocketAddr,

    /// Directory for persisted state. Without it, state lives in memory only.
    #[arg(long = "data", env = "CLONEWATCH__DATA")]
    pub data_dir: Option<PathBuf>,

    /// Log output format.
    #[arg(long, env = "CLONEWATCH__LOG_FORMAT", value_enum, default_value_t = LogFormat::Auto)]
    pub log_format: LogFormat,

    /// Path to a sendmail-compatible binary. Without it, alerts are only logged.
    #[arg(long, env = "CLONEWATCH__SENDMAIL")]
    pub sendmail: Option<PathBuf>,

    /// Seconds to wait for the mail transport before failing an alert.
    #[arg(long, env = "CLONEWATCH__SENDMAIL_TIMEOUT_SECS", default_value_t = 30)]
    pub sendmail_timeout_secs: u64,

    /// From address for alert emails.
    #[arg(long, env = "CLONEWATCH__SENDER")]
    pub sender: Option<String>,

    /// Serialize hit evaluation per token so concurrent first sightings
    /// alert only once.
    #[arg(long, env = "CLONEWATCH__SERIALIZE_PER_TOKEN")]
    pub serialize_per_token: bool,
}

impl Cli {
    /// Builds the service configuration from the parsed flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value is rejected by
    /// [`ServiceConfig::validate`].
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        ServiceConfig::builder()
            .serialize_per_token(self.serialize_per_token)
            .maybe_sender(self.sender.clone())
            .build()
    }

    /// Timeout applied to each sendmail invocation.
    pub fn sendmail_timeout(&self) -> Duration {
        Duration::from_secs(self.sendmail_timeout_secs)
    }

    /// Whether state is kept in memory only.
    pub fn is_ephemeral(&self) -> bool {
        self.data_dir.is_none()
    }

    /// Whether the listener only accepts loopback connections.
    pub fn is_localhost_only(&self) -> bool {
        self.listen_addr.ip().is_loopback()
    }
}
