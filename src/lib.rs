//! mcp-contract-verifier: contract test runner for JSON-RPC 2.0 / MCP services
//!
//! The harness drives a service over newline-delimited JSON-RPC on stdio,
//! issues declarative scenarios, and checks every response against its
//! expected shape: result paths, error codes, and tool-output text.
//!
//! # Architecture
//!
//! - **Transport**: subprocess (stdin/stdout) or in-process, behind one trait
//! - **Session**: `initialize` handshake, per-request timeouts, guaranteed close
//! - **Runner**: ordered scenarios, one outstanding request at a time
//! - **Assertions**: pure checks that never panic on malformed responses
//!
//! A bundled reference service (the diagram fixture) is the default target
//! when no external service is configured.
//!
//! # Modules
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error types
//! - [`mcp`] - JSON-RPC protocol types and client transports
//! - [`harness`] - Scenarios, sessions, runner, reports
//! - [`fixture`] - Diagram fixture service

pub mod config;
pub mod error;
pub mod fixture;
pub mod harness;
pub mod mcp;
