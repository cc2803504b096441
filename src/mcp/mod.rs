//! Model Context Protocol (MCP) wire layer.
//!
//! JSON-RPC 2.0 messages travel as single lines of UTF-8 JSON. This module
//! holds the envelope types shared by the harness (client side) and the
//! fixture (server side), plus the client transports.
//!
//! ```text
//!   harness ── Transport ──▶ stdin  ┌──────────────┐
//!                                   │   service    │
//!   harness ◀── Correlator ── stdout└──────────────┘──▶ stderr (logs)
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION};
pub use transport::{InProcessTransport, LaunchSpec, SubprocessTransport, Transport};
