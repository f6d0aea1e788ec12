//! Configuration loading for the session host.
//!
//! The host reads `dynstack-config.yaml` from the working directory (a
//! missing file means all defaults). Every section and field has a serde
//! default, so a partial file only overrides what it names. Environment
//! variables override the connection settings:
//!
//! - `NATS_URL` overrides `transport.nats_url`
//! - `CONTROL_PORT` overrides `control.port`
//! - `PRESETS_FILE` overrides `session.presets_file`

use std::path::{Path, PathBuf};
use std::time::Duration;

use dynstack_types::PolicyMode;
use serde::Deserialize;

use crate::ingest::DEFAULT_SCHEDULE_DELAY;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid environment override {name}: {message}")]
    Env {
        /// Name of the environment variable.
        name: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level host configuration. Mirrors `dynstack-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HostConfig {
    /// Message transport settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// HTTP control API settings.
    #[serde(default)]
    pub control: ControlConfig,

    /// Session behavior.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Env`] if an override is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Env`] if an override is malformed.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override connection settings with environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if `CONTROL_PORT` is not a port number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("NATS_URL") {
            self.transport.nats_url = val;
        }
        if let Ok(val) = std::env::var("CONTROL_PORT") {
            self.control.port = val.parse().map_err(|e| ConfigError::Env {
                name: "CONTROL_PORT",
                message: format!("{e}"),
            })?;
        }
        if let Ok(val) = std::env::var("PRESETS_FILE") {
            self.session.presets_file = Some(PathBuf::from(val));
        }
        Ok(())
    }
}

/// Message transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportConfig {
    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Prefix prepended to every subject (`{prefix}.world`, ...).
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    /// Topic on which external crane schedules arrive.
    #[serde(default = "default_schedule_topic")]
    pub schedule_topic: String,
}

impl TransportConfig {
    /// Full subject for a topic.
    pub fn subject(&self, topic: &str) -> String {
        format!("{}.{topic}", self.subject_prefix)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            subject_prefix: default_subject_prefix(),
            schedule_topic: default_schedule_topic(),
        }
    }
}

/// HTTP control API settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlConfig {
    /// Bind address.
    #[serde(default = "default_control_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_control_port")]
    pub port: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            port: default_control_port(),
        }
    }
}

/// Session behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionConfig {
    /// Delay before an inbound schedule is decoded and applied. Values
    /// below 200ms are raised to 200ms.
    #[serde(default = "default_schedule_delay_ms")]
    pub schedule_delay_ms: u64,

    /// Simulated seconds per wall-clock second for paced runs. Zero or
    /// negative runs as fast as possible.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,

    /// How long a synchronous run waits for a remote policy reply.
    #[serde(default = "default_remote_policy_timeout_ms")]
    pub remote_policy_timeout_ms: u64,

    /// Preset catalog overriding the built-in one.
    #[serde(default)]
    pub presets_file: Option<PathBuf>,

    /// Start a run right after boot.
    #[serde(default)]
    pub autostart: Option<AutostartConfig>,
}

impl SessionConfig {
    /// Schedule ingestion delay, never below [`DEFAULT_SCHEDULE_DELAY`].
    pub fn schedule_delay(&self) -> Duration {
        Duration::from_millis(self.schedule_delay_ms).max(DEFAULT_SCHEDULE_DELAY)
    }

    /// Remote policy timeout as a [`Duration`].
    pub const fn remote_policy_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_policy_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            schedule_delay_ms: default_schedule_delay_ms(),
            time_scale: default_time_scale(),
            remote_policy_timeout_ms: default_remote_policy_timeout_ms(),
            presets_file: None,
            autostart: None,
        }
    }
}

/// A run started at boot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AutostartConfig {
    /// Preset to run.
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Decision maker for the run.
    #[serde(default = "default_policy")]
    pub policy: PolicyMode,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_nats_url() -> String {
    String::from("nats://localhost:4222")
}

fn default_subject_prefix() -> String {
    String::from("dynstack")
}

fn default_schedule_topic() -> String {
    String::from("crane")
}

fn default_control_host() -> String {
    String::from("0.0.0.0")
}

const fn default_control_port() -> u16 {
    8080
}

const fn default_schedule_delay_ms() -> u64 {
    200
}

const fn default_time_scale() -> f64 {
    1.0
}

const fn default_remote_policy_timeout_ms() -> u64 {
    1000
}

fn default_preset() -> String {
    String::from(crate::resolver::DEFAULT_PRESET)
}

const fn default_policy() -> PolicyMode {
    PolicyMode::RuleBased
}

fn default_log_level() -> String {
    String::from("info")
}
