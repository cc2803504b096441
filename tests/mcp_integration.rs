//! Integration tests for MCP protocol handling.
//!
//! These tests cover message parsing and the diagram fixture's JSON-RPC 2.0
//! behaviour at the wire level, one line in and one line out.

use serde_json::{json, Value};

use mcp_contract_verifier::fixture::{DiagramServer, FixtureOptions, ServerState};
use mcp_contract_verifier::mcp::protocol::{parse_message, IncomingMessage, RequestId};

fn server(dir: &std::path::Path) -> DiagramServer {
    FixtureOptions {
        temp_dir: Some(dir.to_path_buf()),
        dev_mode: true,
        ..FixtureOptions::default()
    }
    .build()
    .unwrap()
}

fn reply(server: &mut DiagramServer, message: &Value) -> Value {
    let line = server.respond(&message.to_string()).unwrap();
    serde_json::from_str(&line).unwrap()
}

fn initialise(server: &mut DiagramServer) {
    let init = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {"protocolVersion": "2024-11-05", "capabilities": {}}
    });
    assert!(reply(server, &init).get("result").is_some());
    assert!(server
        .respond(r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#)
        .is_none());
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let IncomingMessage::Request(req) = parse_message(json).unwrap() else {
        panic!("Expected Request");
    };
    assert_eq!(req.method, "initialize");
    assert_eq!(req.id, RequestId::Number(1));
}

#[test]
fn test_parse_string_id() {
    let json = r#"{"jsonrpc": "2.0", "id": "abc", "method": "tools/list"}"#;

    let IncomingMessage::Request(req) = parse_message(json).unwrap() else {
        panic!("Expected Request");
    };
    assert_eq!(req.id, RequestId::from("abc"));
    assert!(req.params.is_none());
}

#[test]
fn test_parse_notification() {
    let json = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;

    let msg = parse_message(json).unwrap();
    assert!(matches!(msg, IncomingMessage::Notification(_)));
    assert_eq!(msg.method(), "notifications/initialized");
}

#[test]
fn test_parse_invalid_json() {
    let err = parse_message("not valid json").unwrap_err();
    assert_eq!(err.error.code, -32700);
    assert!(err.id.is_none());
}

#[test]
fn test_parse_missing_jsonrpc_version_keeps_id() {
    let err = parse_message(r#"{"id": 7, "method": "test"}"#).unwrap_err();
    assert_eq!(err.error.code, -32600);
    assert_eq!(err.id, Some(RequestId::Number(7)));
}

#[test]
fn test_parse_missing_method_keeps_id() {
    let err = parse_message(r#"{"jsonrpc": "2.0", "id": "m"}"#).unwrap_err();
    assert_eq!(err.error.code, -32600);
    assert_eq!(err.id, Some(RequestId::from("m")));
}

// =============================================================================
// Fixture Wire Behaviour
// =============================================================================

#[test]
fn test_requests_before_initialise_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = server(dir.path());

    let resp = reply(
        &mut server,
        &json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}),
    );
    assert_eq!(resp["error"]["code"], -32600);
    assert_eq!(resp["id"], 3);
    assert_eq!(server.state(), ServerState::AwaitingInit);
}

#[test]
fn test_lifecycle_reaches_running() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = server(dir.path());

    initialise(&mut server);
    assert_eq!(server.state(), ServerState::Running);
    assert_eq!(server.protocol_version(), Some("2024-11-05"));
}

#[test]
fn test_every_request_gets_exactly_one_reply_with_its_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = server(dir.path());
    initialise(&mut server);

    let requests = [
        json!({"jsonrpc": "2.0", "id": 10, "method": "ping"}),
        json!({"jsonrpc": "2.0", "id": "eleven", "method": "tools/list"}),
        json!({"jsonrpc": "2.0", "id": 12, "method": "nonexistent/method"}),
        json!({"jsonrpc": "2.0", "id": 13, "method": "tools/call",
               "params": {"name": "unknown_tool", "arguments": {}}}),
    ];
    for request in &requests {
        let resp = reply(&mut server, request);
        assert_eq!(resp["jsonrpc"], "2.0");
        assert_eq!(resp["id"], request["id"]);
        assert!(
            resp.get("result").is_some() != resp.get("error").is_some(),
            "exactly one of result/error: {resp}"
        );
    }
}

#[test]
fn test_tools_list_advertises_three_tools() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = server(dir.path());
    initialise(&mut server);

    let resp = reply(
        &mut server,
        &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {}}),
    );
    let names: Vec<&str> = resp["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["generate_diagram", "save_diagram", "convert_to_png"]);
    for tool in resp["result"]["tools"].as_array().unwrap() {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

#[test]
fn test_save_then_convert_by_file_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = server(dir.path());
    initialise(&mut server);

    let saved = reply(
        &mut server,
        &json!({"jsonrpc": "2.0", "id": 20, "method": "tools/call", "params": {
            "name": "save_diagram",
            "arguments": {"xml_content": "<mxfile/>", "filename": "flow.drawio"}
        }}),
    );
    assert_eq!(saved["result"]["isError"], Value::Null);
    let body: Value =
        serde_json::from_str(saved["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    let file_id = body["file_id"].as_str().unwrap().to_string();
    assert_eq!(body["filename"], "flow.drawio");

    let converted = reply(
        &mut server,
        &json!({"jsonrpc": "2.0", "id": 21, "method": "tools/call", "params": {
            "name": "convert_to_png",
            "arguments": {"file_id": file_id}
        }}),
    );
    let text = converted["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains(".png"), "unexpected convert result: {text}");
}

#[test]
fn test_blank_lines_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = server(dir.path());
    assert!(server.respond("").is_none());
    assert!(server.respond("   ").is_none());
}
