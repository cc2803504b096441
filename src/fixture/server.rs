//! JSON-RPC dispatch and lifecycle for the diagram fixture.
//!
//! The server moves through the MCP lifecycle:
//!
//! 1. **Initialisation**: `initialize` request, then the `initialized` notification
//! 2. **Operation**: `tools/list`, `tools/call`, `ping`
//! 3. **Shutdown**: EOF on stdin or a termination signal
//!
//! [`DiagramServer::respond`] is the whole protocol surface: one line in, at
//! most one line out. The stdio loop and the in-process transport both sit
//! on top of it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::fixture::stdio::StdioChannel;
use crate::fixture::tools::{tool_definitions, DiagramTools, ToolCallParams, ToolError};
use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, FIXTURE_SERVER_NAME,
    MCP_PROTOCOL_VERSION,
};
use crate::mcp::transport::MessageHandler;

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: FIXTURE_SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<Value>,
}

/// The diagram fixture MCP server.
pub struct DiagramServer {
    state: ServerState,
    protocol_version: Option<String>,
    tools: DiagramTools,
}

impl DiagramServer {
    /// Creates a server around an explicitly constructed toolset.
    #[must_use]
    pub const fn new(tools: DiagramTools) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            tools,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the protocol version agreed during initialisation.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Returns the toolset.
    #[must_use]
    pub const fn tools(&self) -> &DiagramTools {
        &self.tools
    }

    /// Handles one line of input and returns the serialised reply, if any.
    ///
    /// Notifications produce no reply; everything else produces exactly one.
    pub fn respond(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }

        let reply = match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => match self.handle_request(&req) {
                Ok(resp) => serde_json::to_string(&resp),
                Err(error) => serde_json::to_string(&error),
            },
            Ok(IncomingMessage::Notification(ref notif)) => {
                self.handle_notification(notif);
                return None;
            }
            Err(error) => {
                debug!(code = error.error.code, "Rejecting malformed message");
                serde_json::to_string(&error)
            }
        };

        match reply {
            Ok(json) => Some(json),
            Err(e) => {
                error!(error = %e, "Failed to serialise reply");
                serde_json::to_string(&JsonRpcError::new(
                    None,
                    JsonRpcErrorData::from_code(ErrorCode::InternalError),
                ))
                .ok()
            }
        }
    }

    /// Serves requests over stdio until EOF or a termination signal.
    ///
    /// # Errors
    ///
    /// Returns an error if stdio I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut channel = StdioChannel::new();
        let result = self.run_with_shutdown(&mut channel).await;
        info!("Diagram fixture server stopped");
        result
    }

    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, channel: &mut StdioChannel) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = channel.read_line() => {
                    if self.handle_read(channel, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, channel: &mut StdioChannel) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = channel.read_line() => {
                    if self.handle_read(channel, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Returns `true` if the server should shut down.
    async fn handle_read(
        &mut self,
        channel: &mut StdioChannel,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            debug!("stdin closed");
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if let Some(reply) = self.respond(&line) {
            channel.write_line(&reply).await?;
        }

        Ok(self.state == ServerState::ShuttingDown)
    }

    fn handle_request(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        debug!(method = %req.method, id = %req.id, "Request");
        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "tools/list" => self.handle_tools_list(req),
            "tools/call" => self.handle_tools_call(req),
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            info!("Client initialised");
            self.state = ServerState::Running;
        } else {
            debug!(method = %notif.method, "Ignoring notification");
        }
    }

    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid initialize params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing initialize params")
            })?;

        debug!(requested = %params.protocol_version, "Negotiating protocol version");
        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();

        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": { "tools": {} },
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "tools": tool_definitions() }),
        ))
    }

    fn handle_tools_call(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid tool call params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing tool call params")
            })?;

        let result = self
            .tools
            .call(&params.name, &params.arguments)
            .map_err(|ToolError::InvalidParams(message)| {
                JsonRpcError::invalid_params(req.id.clone(), message)
            })?;

        let result_value = serde_json::to_value(&result).map_err(|e| {
            error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }
}

impl MessageHandler for DiagramServer {
    async fn handle_line(&mut self, line: &str) -> Vec<String> {
        self.respond(line).into_iter().collect()
    }
}
