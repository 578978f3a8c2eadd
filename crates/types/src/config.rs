//! Configuration types for Clonewatch.
//!
//! Configuration is assembled by the server binary from CLI flags and
//! environment variables. [`ServiceConfig`] validates its values at
//! construction time via a fallible builder; after deserialization call
//! [`ServiceConfig::validate`].

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Smallest email length limit that still admits `a@b.cd`.
const MIN_EMAIL_BYTES: usize = 6;

/// Largest accepted email length limit.
const MAX_EMAIL_BYTES: usize = 1024;

/// Smallest origin length limit.
const MIN_ORIGIN_BYTES: usize = 16;

/// Behaviour of the canary service.
///
/// # Validation Rules
///
/// - `max_email_bytes` must be 6-1024
/// - `max_origin_bytes` must be >= 16
/// - `max_context_bytes` must be >= 1
/// - `alert_subject` must be non-empty and single-line
/// - `sender`, when set, must contain `@` and be single-line
///
/// # Example
///
/// ```no_run
/// # use clonewatch_types::config::ServiceConfig;
/// let config = ServiceConfig::builder()
///     .serialize_per_token(true)
///     .sender("canary@example.com")
///     .build()
///     .expect("valid service config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Hold a per-token lock across the check-notify-record sequence so that
    /// concurrent first sightings of one origin notify only once.
    #[serde(default)]
    pub serialize_per_token: bool,
    /// Maximum accepted owner email length in bytes.
    #[serde(default = "default_max_email_bytes")]
    pub max_email_bytes: usize,
    /// Reported origins longer than this are truncated before use.
    #[serde(default = "default_max_origin_bytes")]
    pub max_origin_bytes: usize,
    /// Reporting context (user agent) longer than this is truncated.
    #[serde(default = "default_max_context_bytes")]
    pub max_context_bytes: usize,
    /// Subject line of alert emails.
    #[serde(default = "default_alert_subject")]
    pub alert_subject: String,
    /// From address for alert emails. The mail transport picks one when unset.
    #[serde(default)]
    pub sender: Option<String>,
}

#[bon::bon]
impl ServiceConfig {
    /// Creates a new service configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value violates the rules
    /// listed on [`ServiceConfig`].
    #[builder]
    pub fn new(
        #[builder(default)] serialize_per_token: bool,
        #[builder(default = default_max_email_bytes())] max_email_bytes: usize,
        #[builder(default = default_max_origin_bytes())] max_origin_bytes: usize,
        #[builder(default = default_max_context_bytes())] max_context_bytes: usize,
        #[builder(into, default = default_alert_subject())] alert_subject: String,
        #[builder(into)] sender: Option<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            serialize_per_token,
            max_email_bytes,
            max_origin_bytes,
            max_context_bytes,
            alert_subject,
            sender,
        };
        config.validate()?;
        Ok(config)
    }
}

impl ServiceConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_EMAIL_BYTES..=MAX_EMAIL_BYTES).contains(&self.max_email_bytes) {
            return Err(ConfigError::Validation {
                message: format!(
                    "max_email_bytes must be {MIN_EMAIL_BYTES}-{MAX_EMAIL_BYTES}, got {}",
                    self.max_email_bytes
                ),
            });
        }
        if self.max_origin_bytes < MIN_ORIGIN_BYTES {
            return Err(ConfigError::Validation {
                message: format!(
                    "max_origin_bytes must be >= {MIN_ORIGIN_BYTES}, got {}",
                    self.max_origin_bytes
                ),
            });
        }
        if self.max_context_bytes == 0 {
            return Err(ConfigError::Validation {
                message: "max_context_bytes must be >= 1".to_string(),
            });
        }
        if self.alert_subject.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "alert_subject must not be empty".to_string(),
            });
        }
        if self.alert_subject.contains(['\r', '\n']) {
            return Err(ConfigError::Validation {
                message: "alert_subject must be a single line".to_string(),
            });
        }
        if let Some(sender) = &self.sender
            && (!sender.contains('@') || sender.contains(['\r', '\n']))
        {
            return Err(ConfigError::Validation {
                message: format!("sender must be a single-line address, got {sender:?}"),
            });
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            serialize_per_token: false,
            max_email_bytes: default_max_email_bytes(),
            max_origin_bytes: default_max_origin_bytes(),
            max_context_bytes: default_max_context_bytes(),
            alert_subject: default_alert_subject(),
            sender: None,
        }
    }
}

fn default_max_email_bytes() -> usize {
    254 // RFC 5321 path limit
}

fn default_max_origin_bytes() -> usize {
    2048
}

fn default_max_context_bytes() -> usize {
    512
}

fn default_alert_subject() -> String {
    "Clonewatch: your site was loaded from a new origin".to_string()
}
