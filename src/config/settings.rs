//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::protocol::{CLIENT_NAME, MCP_PROTOCOL_VERSION};
use crate::mcp::transport::LaunchSpec;

/// Environment variable carrying the API credential to the service.
pub const ENV_API_KEY: &str = "DIAGRAM_API_KEY";
/// Environment variable enabling the service's development mode.
pub const ENV_DEV_MODE: &str = "DIAGRAM_DEV_MODE";
/// Environment variable naming the service's temp directory.
pub const ENV_TEMP_DIR: &str = "DIAGRAM_TEMP_DIR";
/// Environment variable carrying the service's log verbosity.
pub const ENV_LOG_LEVEL: &str = "DIAGRAM_LOG_LEVEL";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// The service under test. `None` targets the built-in fixture in-process.
    #[serde(default)]
    pub service: Option<ServiceConfig>,

    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Environment handed to the service.
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref service) = self.service {
            if service.command.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "service.command cannot be empty".to_string(),
                });
            }
        }

        if self.session.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "session.request_timeout_ms must be greater than zero".to_string(),
            });
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        Ok(())
    }

    /// Builds the launch parameters for the configured service, if any.
    ///
    /// Environment inputs are composed into the child's environment;
    /// explicit `service.env` entries take precedence.
    #[must_use]
    pub fn launch_spec(&self) -> Option<LaunchSpec> {
        let service = self.service.as_ref()?;

        let mut env = self.environment.to_env();
        env.extend(service.env.clone());

        Some(LaunchSpec {
            command: service.command.clone(),
            args: service.args.clone(),
            env,
            working_dir: service.working_dir.clone(),
            shutdown_grace: self.session.shutdown_grace(),
        })
    }
}

/// How to start the service under test.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Executable to spawn.
    pub command: String,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory for the child process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Session timing and handshake settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// How long to wait for each response, in milliseconds.
    /// Default: 30000
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long `close` waits for the service to exit before killing it.
    /// Default: 2000
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Protocol version sent in `initialize`.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    /// Client name sent in `initialize`.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Client version sent in `initialize`.
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

impl SessionConfig {
    /// Returns the per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            client_version: default_client_version(),
        }
    }
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

const fn default_shutdown_grace_ms() -> u64 {
    2_000
}

fn default_protocol_version() -> String {
    MCP_PROTOCOL_VERSION.to_string()
}

fn default_client_name() -> String {
    CLIENT_NAME.to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Inputs the service reads from its environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    /// API credential for the generation backend.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Relaxes credential strictness in the service.
    #[serde(default)]
    pub dev_mode: bool,

    /// Directory the service uses for temporary files.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Log verbosity for the service.
    #[serde(default)]
    pub log_level: Option<String>,
}

impl EnvironmentConfig {
    /// Converts the settings into environment variables.
    #[must_use]
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(ref key) = self.api_key {
            env.insert(ENV_API_KEY.to_string(), key.clone());
        }
        if self.dev_mode {
            env.insert(ENV_DEV_MODE.to_string(), "true".to_string());
        }
        if let Some(ref dir) = self.temp_dir {
            env.insert(ENV_TEMP_DIR.to_string(), dir.display().to_string());
        }
        if let Some(ref level) = self.log_level {
            env.insert(ENV_LOG_LEVEL.to_string(), level.clone());
        }
        env
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
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

fn default_log_level() -> String {
    "warn".to_string()
}
