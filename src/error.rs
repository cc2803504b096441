//! Error types for mcp-contract-verifier.
//!
//! Transport and session errors are control flow: they abort a session or
//! turn a single scenario into a failure. Assertion failures are data and
//! live in [`crate::harness::assertion`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::mcp::protocol::RequestId;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised by a transport while talking to the service under test.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The channel could not be established (executable missing, pipes unavailable).
    #[error("failed to start service '{command}'")]
    Spawn {
        /// The command that was being spawned.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No correlated response arrived in time.
    #[error("no response for request {id} within {}ms", .timeout.as_millis())]
    Timeout {
        /// The request that timed out.
        id: RequestId,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The channel was severed (EOF, exited child, or explicit close).
    #[error("transport closed: {reason}")]
    Closed {
        /// What closed the channel.
        reason: String,
    },

    /// A response arrived whose id matches no outstanding request.
    #[error("unexpected response id {actual} while waiting for {expected}")]
    UnexpectedResponse {
        /// The id the transport was waiting for.
        expected: RequestId,
        /// The id the service actually answered with.
        actual: String,
    },

    /// Reading from or writing to the channel failed.
    #[error("transport I/O error")]
    Io(#[from] std::io::Error),

    /// An outgoing message could not be serialised.
    #[error("failed to serialise message")]
    Serialise(#[from] serde_json::Error),
}

impl TransportError {
    /// Builds a [`TransportError::Closed`] with the given reason.
    #[must_use]
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::Closed {
            reason: reason.into(),
        }
    }
}

/// Errors that prevent a session from being acquired.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The transport could not be opened.
    #[error("failed to open session")]
    Open(#[from] TransportError),

    /// The `initialize` handshake was malformed or rejected.
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Why the handshake was not accepted.
        reason: String,
    },
}

/// Errors that can occur while loading a scenario file.
#[derive(Error, Debug)]
pub enum ScenarioFileError {
    /// Scenario file could not be read.
    #[error("failed to read scenario file: {path}")]
    Read {
        /// Path to the scenario file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Scenario file is not valid JSON or does not match the scenario format.
    #[error("failed to parse scenario file: {path}")]
    Parse {
        /// Path to the scenario file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A scenario is incomplete or declares contradictory expectations.
    #[error("scenario '{scenario}': {message}")]
    InvalidScenario {
        /// Name of the offending scenario.
        scenario: String,
        /// Description of the contradiction.
        message: String,
    },
}

/// Renders an error and its chain of sources on one line.
#[must_use]
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
