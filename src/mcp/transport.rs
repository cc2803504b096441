//! Client-side transports for talking to the service under test.
//!
//! Two backends implement the same [`Transport`] capability so that scenario
//! logic is identical regardless of where the service runs:
//!
//! - [`SubprocessTransport`]: spawns the service and speaks newline-delimited
//!   JSON-RPC over its stdin/stdout. stderr is forwarded into `tracing`.
//! - [`InProcessTransport`]: hands each serialised line straight to a
//!   [`MessageHandler`] living in the same process.
//!
//! Both backends correlate responses strictly by `id`; see [`Correlator`].
//! Timeouts are not a transport concern: the session wraps every `send`.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::mcp::protocol::RequestId;

/// A bidirectional channel to a JSON-RPC service.
///
/// Only one request is ever outstanding: `send` writes the message and
/// suspends until the correlated response has been read back.
pub trait Transport {
    /// Sends `message` and waits for the response whose id is `id`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the channel dies mid-call and
    /// [`TransportError::UnexpectedResponse`] if an uncorrelated response
    /// arrives.
    fn send(
        &mut self,
        id: &RequestId,
        message: &Value,
    ) -> impl Future<Output = Result<Value, TransportError>>;

    /// Sends a one-way message; nothing is read back.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be written.
    fn notify(&mut self, message: &Value) -> impl Future<Output = Result<(), TransportError>>;

    /// Marks `id` as given up on; a late response for it is discarded.
    fn abandon(&mut self, id: RequestId);

    /// Closes the channel. Calling it more than once is a no-op.
    fn close(&mut self) -> impl Future<Output = ()>;

    /// Returns `true` once the channel can no longer carry requests.
    fn is_closed(&self) -> bool;
}

/// Matches lines read from the service against the outstanding request.
#[derive(Debug, Default)]
pub struct Correlator {
    abandoned: HashSet<RequestId>,
}

impl Correlator {
    /// Remembers a request id whose response will no longer be awaited.
    pub fn abandon(&mut self, id: RequestId) {
        self.abandoned.insert(id);
    }

    /// Classifies one line read from the service.
    ///
    /// Returns `Ok(Some(response))` when the line answers `expected`,
    /// `Ok(None)` when it should be skipped (non-JSON output, notifications,
    /// server-initiated requests, late answers to abandoned requests).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnexpectedResponse`] when the line is a
    /// response to some other id.
    pub fn accept(
        &mut self,
        line: &str,
        expected: &RequestId,
    ) -> Result<Option<Value>, TransportError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let Ok(message) = serde_json::from_str::<Value>(trimmed) else {
            warn!(line = %trimmed, "Skipping non-JSON output from service");
            return Ok(None);
        };

        let Some(obj) = message.as_object() else {
            warn!(line = %trimmed, "Skipping non-object message from service");
            return Ok(None);
        };

        if let Some(method) = obj.get("method").and_then(Value::as_str) {
            debug!(method, "Skipping service-initiated message");
            return Ok(None);
        }

        // A null or missing id means the service could not recover ours.
        let raw_id = obj.get("id").unwrap_or(&Value::Null);
        if raw_id.is_null() {
            trace!(expected = %expected, "Attributing id-less response to outstanding request");
            return Ok(Some(message));
        }

        match RequestId::from_value(raw_id) {
            Some(ref id) if id == expected => Ok(Some(message)),
            Some(id) if self.abandoned.remove(&id) => {
                warn!(id = %id, "Discarding late response to abandoned request");
                Ok(None)
            }
            _ => Err(TransportError::UnexpectedResponse {
                expected: expected.clone(),
                actual: raw_id.to_string(),
            }),
        }
    }
}

/// Launch parameters for a service run as a child process.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    pub env: BTreeMap<String, String>,
    /// Working directory for the child.
    pub working_dir: Option<PathBuf>,
    /// How long `close` waits for a graceful exit before killing.
    pub shutdown_grace: Duration,
}

/// A transport backed by a child process speaking JSON-RPC over stdio.
pub struct SubprocessTransport {
    command: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    stderr_task: Option<JoinHandle<()>>,
    correlator: Correlator,
    shutdown_grace: Duration,
    closed: bool,
}

impl SubprocessTransport {
    /// Spawns the service described by `spec`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the executable cannot be started
    /// or its pipes cannot be captured.
    pub fn spawn(spec: &LaunchSpec) -> Result<Self, TransportError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }

        let spawn_error = |source: std::io::Error| TransportError::Spawn {
            command: spec.command.clone(),
            source,
        };

        let mut child = cmd.spawn().map_err(spawn_error)?;

        let missing_pipe = |name: &str| {
            spawn_error(std::io::Error::other(format!("failed to capture child {name}")))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let server = spec.command.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = %server, "service stderr: {line}");
            }
        });

        debug!(command = %spec.command, args = ?spec.args, "Spawned service under test");

        Ok(Self {
            command: spec.command.clone(),
            child: Some(child),
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout).lines()),
            stderr_task: Some(stderr_task),
            correlator: Correlator::default(),
            shutdown_grace: spec.shutdown_grace,
            closed: false,
        })
    }

    /// Writes one newline-terminated message to the child's stdin.
    async fn write_line(&mut self, json: &str) -> Result<(), TransportError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| TransportError::closed("transport is closed"))?;

        let result = async {
            stdin.write_all(json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                self.closed = true;
                Err(TransportError::closed(format!(
                    "'{}' stopped reading its input",
                    self.command
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the next line from the child's stdout.
    async fn read_line(&mut self) -> Result<String, TransportError> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| TransportError::closed("transport is closed"))?;

        if let Some(line) = stdout.next_line().await? {
            trace!(line = %line, "<- service");
            Ok(line)
        } else {
            self.closed = true;
            Err(TransportError::closed(format!(
                "'{}' closed its output",
                self.command
            )))
        }
    }
}

impl Transport for SubprocessTransport {
    async fn send(&mut self, id: &RequestId, message: &Value) -> Result<Value, TransportError> {
        let json = serde_json::to_string(message)?;
        trace!(line = %json, "-> service");
        self.write_line(&json).await?;

        loop {
            let line = self.read_line().await?;
            if let Some(response) = self.correlator.accept(&line, id)? {
                return Ok(response);
            }
        }
    }

    async fn notify(&mut self, message: &Value) -> Result<(), TransportError> {
        let json = serde_json::to_string(message)?;
        self.write_line(&json).await
    }

    fn abandon(&mut self, id: RequestId) {
        self.correlator.abandon(id);
    }

    async fn close(&mut self) {
        self.closed = true;

        // Closing stdin is the graceful shutdown signal for stdio servers.
        drop(self.stdin.take());
        self.stdout = None;

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
                Ok(Ok(status)) => debug!(command = %self.command, %status, "Service exited"),
                Ok(Err(e)) => warn!(command = %self.command, error = %e, "Failed to reap service"),
                Err(_) => {
                    warn!(
                        command = %self.command,
                        grace_ms = self.shutdown_grace.as_millis(),
                        "Service did not exit in time, killing it"
                    );
                    if let Err(e) = child.kill().await {
                        warn!(command = %self.command, error = %e, "Failed to kill service");
                    }
                }
            }
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A service that can be driven in-process, one serialised line at a time.
pub trait MessageHandler {
    /// Handles one incoming line and returns every line the service emits
    /// in reply (responses and notifications). An empty vector means the
    /// service stays silent.
    fn handle_line(&mut self, line: &str) -> impl Future<Output = Vec<String>>;
}

/// A transport that calls a [`MessageHandler`] directly.
pub struct InProcessTransport<H> {
    handler: Option<H>,
    outbox: VecDeque<String>,
    correlator: Correlator,
}

impl<H: MessageHandler> InProcessTransport<H> {
    /// Wraps `handler` as a transport.
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self {
            handler: Some(handler),
            outbox: VecDeque::new(),
            correlator: Correlator::default(),
        }
    }

    /// Returns the wrapped handler, or `None` once the transport is closed.
    #[must_use]
    pub const fn handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    async fn deliver(&mut self, message: &Value) -> Result<(), TransportError> {
        let json = serde_json::to_string(message)?;
        let handler = self
            .handler
            .as_mut()
            .ok_or_else(|| TransportError::closed("in-process service was closed"))?;
        let replies = handler.handle_line(&json).await;
        self.outbox.extend(replies);
        Ok(())
    }
}

impl<H: MessageHandler> Transport for InProcessTransport<H> {
    async fn send(&mut self, id: &RequestId, message: &Value) -> Result<Value, TransportError> {
        self.deliver(message).await?;

        while let Some(line) = self.outbox.pop_front() {
            if let Some(response) = self.correlator.accept(&line, id)? {
                return Ok(response);
            }
        }

        // The service chose not to answer; only the session timeout ends this.
        std::future::pending().await
    }

    async fn notify(&mut self, message: &Value) -> Result<(), TransportError> {
        self.deliver(message).await
    }

    fn abandon(&mut self, id: RequestId) {
        self.correlator.abandon(id);
    }

    async fn close(&mut self) {
        self.handler = None;
        self.outbox.clear();
    }

    fn is_closed(&self) -> bool {
        self.handler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn correlator_matches_expected_id() {
        let mut correlator = Correlator::default();
        let response = correlator
            .accept(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#, &RequestId::Number(1))
            .unwrap();
        assert_eq!(response.unwrap()["result"], json!({}));
    }

    #[test]
    fn correlator_skips_notifications_and_noise() {
        let mut correlator = Correlator::default();
        let id = RequestId::Number(1);
        assert!(correlator
            .accept(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#, &id)
            .unwrap()
            .is_none());
        assert!(correlator.accept("server booting...", &id).unwrap().is_none());
        assert!(correlator.accept("   ", &id).unwrap().is_none());
    }

    #[test]
    fn correlator_attributes_null_id_to_outstanding_request() {
        let mut correlator = Correlator::default();
        let line = r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#;
        let response = correlator.accept(line, &RequestId::Number(4)).unwrap();
        assert_eq!(response.unwrap()["error"]["code"], -32700);
    }

    #[test]
    fn correlator_rejects_foreign_id() {
        let mut correlator = Correlator::default();
        let err = correlator
            .accept(r#"{"jsonrpc":"2.0","id":2,"result":{}}"#, &RequestId::Number(1))
            .unwrap_err();
        assert!(matches!(err, TransportError::UnexpectedResponse { .. }));
    }

    #[test]
    fn correlator_discards_abandoned_id_once() {
        let mut correlator = Correlator::default();
        correlator.abandon(RequestId::Number(2));
        let line = r#"{"jsonrpc":"2.0","id":2,"result":{}}"#;
        assert!(correlator
            .accept(line, &RequestId::Number(3))
            .unwrap()
            .is_none());
        // A second answer to the same id is no longer expected.
        assert!(correlator.accept(line, &RequestId::Number(3)).is_err());
    }

    struct Echo;

    impl MessageHandler for Echo {
        async fn handle_line(&mut self, line: &str) -> Vec<String> {
            let msg: Value = serde_json::from_str(line).unwrap();
            vec![
                json!({"jsonrpc": "2.0", "method": "notifications/message"}).to_string(),
                json!({"jsonrpc": "2.0", "id": msg["id"], "result": {"echo": msg["params"]}})
                    .to_string(),
            ]
        }
    }

    #[tokio::test]
    async fn in_process_send_returns_correlated_reply() {
        let mut transport = InProcessTransport::new(Echo);
        let id = RequestId::Number(8);
        let response = transport
            .send(&id, &json!({"jsonrpc": "2.0", "id": 8, "method": "x", "params": [1]}))
            .await
            .unwrap();
        assert_eq!(response["result"]["echo"], json!([1]));
    }

    #[tokio::test]
    async fn in_process_close_is_idempotent() {
        let mut transport = InProcessTransport::new(Echo);
        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());

        let err = transport
            .send(&RequestId::Number(1), &json!({"id": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed { .. }));
    }

    #[tokio::test]
    async fn spawn_missing_executable_fails() {
        let spec = LaunchSpec {
            command: "/definitely/not/a/real/binary".to_string(),
            ..LaunchSpec::default()
        };
        let err = SubprocessTransport::spawn(&spec).err().unwrap();
        assert!(matches!(err, TransportError::Spawn { .. }));
    }
}
