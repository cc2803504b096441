//! Session handle and lifecycle management.
//!
//! A [`Session`] owns one transport for its whole life. [`with_session`]
//! performs the `initialize` handshake, runs a [`SessionBody`], and closes
//! the transport on every exit path.

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{error_chain, SessionError, TransportError};
use crate::harness::scenario::ScenarioRequest;
use crate::mcp::protocol::{JsonRpcNotification, RequestId};
use crate::mcp::transport::Transport;

/// Keys every `initialize` result must carry.
const HANDSHAKE_KEYS: [&str; 3] = ["protocolVersion", "capabilities", "serverInfo"];

/// Settings for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long `send` waits for a correlated response.
    pub request_timeout: Duration,
    /// Protocol version requested in `initialize`.
    pub protocol_version: String,
    /// Client name reported in `initialize`.
    pub client_name: String,
    /// Client version reported in `initialize`.
    pub client_version: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            protocol_version: config.protocol_version.clone(),
            client_name: config.client_name.clone(),
            client_version: config.client_version.clone(),
        }
    }
}

impl SessionOptions {
    /// Options with the given timeout and default client identity.
    #[must_use]
    pub fn with_timeout(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            ..Self::default()
        }
    }
}

/// What the service reported during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerDescription {
    /// Protocol version the server agreed to.
    pub protocol_version: String,
    /// `serverInfo.name`, if a string.
    pub name: Option<String>,
    /// `serverInfo.version`, if a string.
    pub version: Option<String>,
    /// The advertised capabilities object.
    pub capabilities: Value,
}

/// One live connection to the service under test.
pub struct Session<T: Transport> {
    transport: T,
    options: SessionOptions,
    next_id: i64,
    server: Option<ServerDescription>,
    closed: bool,
}

impl<T: Transport> Session<T> {
    /// Wraps an open transport. No handshake is performed.
    #[must_use]
    pub const fn new(transport: T, options: SessionOptions) -> Self {
        Self {
            transport,
            options,
            next_id: 1,
            server: None,
            closed: false,
        }
    }

    /// Allocates the next session-assigned request id.
    pub fn next_id(&mut self) -> RequestId {
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;
        id
    }

    /// Returns the server description once the handshake succeeded.
    #[must_use]
    pub const fn server(&self) -> Option<&ServerDescription> {
        self.server.as_ref()
    }

    /// Returns the underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns `true` while requests can still be exchanged.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.closed && !self.transport.is_closed()
    }

    /// Sends `request` and waits for its correlated response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] if no response arrives within the
    /// session's timeout, and any error the transport reports.
    pub async fn send(&mut self, request: &ScenarioRequest) -> Result<Value, TransportError> {
        if self.closed {
            return Err(TransportError::closed("session is closed"));
        }

        let timeout = self.options.request_timeout;
        let outcome =
            tokio::time::timeout(timeout, self.transport.send(&request.id, &request.payload)).await;

        match outcome {
            Ok(Err(e @ TransportError::UnexpectedResponse { .. })) => {
                // A late answer to this id is discarded.
                warn!(id = %request.id, error = %e, "Abandoning request after uncorrelated response");
                self.transport.abandon(request.id.clone());
                Err(e)
            }
            Ok(result) => result,
            Err(_) => {
                warn!(id = %request.id, timeout_ms = timeout.as_millis(), "Request timed out");
                self.transport.abandon(request.id.clone());
                Err(TransportError::Timeout {
                    id: request.id.clone(),
                    timeout,
                })
            }
        }
    }

    /// Performs the `initialize` handshake followed by the `initialized`
    /// notification.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Handshake`] if the exchange fails, the server
    /// answers with an error, or the result lacks a required key.
    pub async fn handshake(&mut self) -> Result<&ServerDescription, SessionError> {
        let handshake_error = |reason: String| SessionError::Handshake { reason };

        let id = self.next_id();
        let request = ScenarioRequest::build(
            "initialize",
            json!({
                "protocolVersion": self.options.protocol_version,
                "capabilities": {},
                "clientInfo": {
                    "name": self.options.client_name,
                    "version": self.options.client_version,
                }
            }),
            id,
        );

        let response = self
            .send(&request)
            .await
            .map_err(|e| handshake_error(format!("initialize failed: {}", error_chain(&e))))?;

        if let Some(error) = response.get("error") {
            return Err(handshake_error(format!("server rejected initialize: {error}")));
        }

        let result = response
            .get("result")
            .ok_or_else(|| handshake_error("initialize response has no result".to_string()))?;

        if let Some(missing) = HANDSHAKE_KEYS.iter().find(|key| result.get(**key).is_none()) {
            return Err(handshake_error(format!(
                "initialize result is missing '{missing}'"
            )));
        }

        let description = ServerDescription {
            protocol_version: result["protocolVersion"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            name: result
                .pointer("/serverInfo/name")
                .and_then(Value::as_str)
                .map(str::to_string),
            version: result
                .pointer("/serverInfo/version")
                .and_then(Value::as_str)
                .map(str::to_string),
            capabilities: result["capabilities"].clone(),
        };

        let initialized =
            serde_json::to_value(JsonRpcNotification::new("notifications/initialized"))
                .map_err(|e| handshake_error(e.to_string()))?;
        self.transport.notify(&initialized).await.map_err(|e| {
            handshake_error(format!(
                "initialized notification failed: {}",
                error_chain(&e)
            ))
        })?;

        info!(
            server = description.name.as_deref().unwrap_or("<unnamed>"),
            protocol_version = %description.protocol_version,
            "Session initialised"
        );

        Ok(self.server.insert(description))
    }

    /// Closes the transport. Safe to call any number of times.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("Closing session");
        self.transport.close().await;
    }
}

/// Work performed inside an initialised session.
pub trait SessionBody<T: Transport> {
    /// What the body produces.
    type Output;

    /// Runs the body against an initialised session.
    fn run(self, session: &mut Session<T>) -> impl Future<Output = Self::Output>;
}

/// Runs `body` inside a session over `transport`.
///
/// The handshake runs first; the transport is closed exactly once
/// afterwards, whether the handshake failed or the body completed.
///
/// # Errors
///
/// Returns [`SessionError::Handshake`] if the handshake fails.
pub async fn with_session<T, B>(
    transport: T,
    options: SessionOptions,
    body: B,
) -> Result<B::Output, SessionError>
where
    T: Transport,
    B: SessionBody<T>,
{
    let mut session = Session::new(transport, options);

    let outcome = match session.handshake().await {
        Ok(_) => Ok(body.run(&mut session).await),
        Err(e) => {
            warn!(error = %e, "Session handshake failed");
            Err(e)
        }
    };

    session.close().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::transport::{InProcessTransport, MessageHandler};

    /// Answers `initialize` with a configurable result and swallows the rest.
    struct Scripted {
        result: Value,
        notifications: usize,
    }

    impl MessageHandler for Scripted {
        async fn handle_line(&mut self, line: &str) -> Vec<String> {
            let msg: Value = serde_json::from_str(line).unwrap();
            if msg.get("id").is_none() {
                self.notifications += 1;
                return Vec::new();
            }
            vec![json!({"jsonrpc": "2.0", "id": msg["id"], "result": self.result}).to_string()]
        }
    }

    fn scripted(result: Value) -> InProcessTransport<Scripted> {
        InProcessTransport::new(Scripted {
            result,
            notifications: 0,
        })
    }

    #[tokio::test]
    async fn handshake_records_server_description() {
        let transport = scripted(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "scripted", "version": "0.0.1"}
        }));
        let mut session = Session::new(transport, SessionOptions::default());

        let server = session.handshake().await.unwrap().clone();
        assert_eq!(server.name.as_deref(), Some("scripted"));
        assert_eq!(server.protocol_version, "2024-11-05");
        assert_eq!(session.transport().handler().unwrap().notifications, 1);
    }

    #[tokio::test]
    async fn handshake_requires_server_info() {
        let transport = scripted(json!({"protocolVersion": "2024-11-05", "capabilities": {}}));
        let mut session = Session::new(transport, SessionOptions::default());

        let err = session.handshake().await.unwrap_err();
        assert!(err.to_string().contains("serverInfo"));
    }

    #[tokio::test]
    async fn session_ids_increase() {
        let mut session = Session::new(scripted(json!({})), SessionOptions::default());
        assert_eq!(session.next_id(), RequestId::Number(1));
        assert_eq!(session.next_id(), RequestId::Number(2));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let mut session = Session::new(scripted(json!({})), SessionOptions::default());
        session.close().await;
        session.close().await;
        assert!(!session.is_alive());

        let request = ScenarioRequest::build("ping", json!({}), 1);
        assert!(matches!(
            session.send(&request).await,
            Err(TransportError::Closed { .. })
        ));
    }
}
