//! Scenario model: requests under test and the expectations bound to them.
//!
//! Scenarios are either built in code (see [`crate::harness::suites`]) or
//! loaded from a JSON scenario file with [`load_scenarios`].

use std::path::Path;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ScenarioFileError;
use crate::mcp::protocol::{JsonRpcRequest, RequestId};

/// One JSON-RPC call under test, ready to be written to the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRequest {
    /// Id the response is correlated by.
    pub id: RequestId,
    /// Method name, when the payload carries one.
    pub method: Option<String>,
    /// The exact JSON sent to the service.
    pub payload: Value,
}

impl ScenarioRequest {
    /// Builds a well-formed JSON-RPC 2.0 request envelope.
    #[must_use]
    pub fn build(method: &str, params: Value, id: impl Into<RequestId>) -> Self {
        debug_assert!(!method.is_empty(), "method must not be empty");
        let request = JsonRpcRequest::new(id.into(), method, params);
        // A request with a String method and Value params always serialises.
        let payload = serde_json::to_value(&request).unwrap_or(Value::Null);
        Self {
            id: request.id,
            method: Some(request.method),
            payload,
        }
    }

    /// Wraps an arbitrary JSON value, used to probe malformed requests.
    #[must_use]
    pub fn raw(id: impl Into<RequestId>, payload: Value) -> Self {
        let method = payload
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            id: id.into(),
            method,
            payload,
        }
    }
}

/// How a scenario's request is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioCall {
    /// Fully built, with a caller-chosen id.
    Prepared(ScenarioRequest),
    /// Built by the runner with the session's next id.
    Deferred {
        /// Method to call.
        method: String,
        /// Parameters for the method.
        params: Value,
    },
}

impl ScenarioCall {
    /// Shorthand for a deferred call.
    #[must_use]
    pub fn method(method: impl Into<String>, params: Value) -> Self {
        Self::Deferred {
            method: method.into(),
            params,
        }
    }

    /// Shorthand for a deferred `tools/call`.
    #[must_use]
    pub fn tool(name: &str, arguments: Value) -> Self {
        Self::method("tools/call", json!({ "name": name, "arguments": arguments }))
    }

    /// Returns the method name, if known.
    #[must_use]
    pub fn method_name(&self) -> Option<&str> {
        match self {
            Self::Prepared(req) => req.method.as_deref(),
            Self::Deferred { method, .. } => Some(method),
        }
    }

    /// Returns the tool name for `tools/call` requests.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        if self.method_name() != Some("tools/call") {
            return None;
        }
        let params = match self {
            Self::Prepared(req) => req.payload.get("params")?,
            Self::Deferred { params, .. } => params,
        };
        params.get("name").and_then(Value::as_str)
    }
}

/// Declarative assertion bound to one request.
///
/// Exactly one of the success shape (`requiredResultPaths`) or the error
/// shape (`expectedErrorCode`) applies; see [`ScenarioExpectation::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScenarioExpectation {
    /// Whether a `result` (true) or an `error` (false) is expected.
    pub expect_success: bool,

    /// Dotted paths that must resolve under `result`.
    #[serde(default)]
    pub required_result_paths: Vec<String>,

    /// Exact JSON-RPC error code, when an error is expected.
    #[serde(default)]
    pub expected_error_code: Option<i64>,

    /// Substrings that must appear in `result.content[0].text`.
    #[serde(default)]
    pub text_contains: Vec<String>,

    /// Substrings that must not appear in `result.content[0].text`.
    #[serde(default)]
    pub text_excludes: Vec<String>,

    /// Compare text case-insensitively.
    #[serde(default)]
    pub ignore_case: bool,
}

impl ScenarioExpectation {
    /// Expects a `result`.
    #[must_use]
    pub fn success() -> Self {
        Self {
            expect_success: true,
            ..Self::default()
        }
    }

    /// Expects a `result` in which every path resolves.
    #[must_use]
    pub fn success_with_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_result_paths: paths.into_iter().map(Into::into).collect(),
            ..Self::success()
        }
    }

    /// Expects an `error` with any code.
    #[must_use]
    pub fn error() -> Self {
        Self::default()
    }

    /// Expects an `error` with exactly `code`.
    #[must_use]
    pub fn error_code(code: i64) -> Self {
        Self {
            expected_error_code: Some(code),
            ..Self::default()
        }
    }

    /// Adds substrings that must be present in the tool text.
    #[must_use]
    pub fn containing<I, S>(mut self, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_contains.extend(needles.into_iter().map(Into::into));
        self
    }

    /// Adds substrings that must be absent from the tool text.
    #[must_use]
    pub fn excluding<I, S>(mut self, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_excludes.extend(needles.into_iter().map(Into::into));
        self
    }

    /// Makes text checks case-insensitive.
    #[must_use]
    pub const fn ignoring_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    /// Returns `true` if any text check is configured.
    #[must_use]
    pub fn has_text_checks(&self) -> bool {
        !self.text_contains.is_empty() || !self.text_excludes.is_empty()
    }

    /// Checks the success/error exclusivity invariant.
    ///
    /// # Errors
    ///
    /// Returns a description of the contradiction.
    pub fn validate(&self) -> Result<(), String> {
        if self.expect_success && self.expected_error_code.is_some() {
            return Err("expectedErrorCode cannot be combined with expectSuccess".to_string());
        }
        if !self.expect_success && !self.required_result_paths.is_empty() {
            return Err("requiredResultPaths requires expectSuccess".to_string());
        }
        if !self.expect_success && self.has_text_checks() {
            return Err("text checks require expectSuccess".to_string());
        }
        Ok(())
    }
}

/// One declarative (request, expectation) pair.
///
/// A scenario passes when any of its expectations holds; most scenarios
/// carry exactly one. Alternatives let a suite accept both conformant ways
/// of reporting a failure (protocol error or in-band tool text).
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Human-readable name shown in reports.
    pub name: String,
    /// The request to issue.
    pub call: ScenarioCall,
    /// Alternatives, at least one.
    pub expectations: Vec<ScenarioExpectation>,
}

impl Scenario {
    /// Creates a scenario with a single expectation.
    #[must_use]
    pub fn new(name: impl Into<String>, call: ScenarioCall, expectation: ScenarioExpectation) -> Self {
        Self {
            name: name.into(),
            call,
            expectations: vec![expectation],
        }
    }

    /// Adds an alternative expectation.
    #[must_use]
    pub fn or(mut self, expectation: ScenarioExpectation) -> Self {
        self.expectations.push(expectation);
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    scenarios: Vec<ScenarioEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioEntry {
    name: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    raw: Option<Value>,
    expect: OneOrMany,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(ScenarioExpectation),
    Many(Vec<ScenarioExpectation>),
}

impl ScenarioEntry {
    fn into_scenario(self, index: usize) -> Result<Scenario, ScenarioFileError> {
        let invalid = |message: &str| ScenarioFileError::InvalidScenario {
            scenario: self.name.clone(),
            message: message.to_string(),
        };

        let call = match (self.method.as_deref(), self.raw.clone()) {
            (Some(_), Some(_)) => return Err(invalid("method and raw are mutually exclusive")),
            (None, None) => return Err(invalid("one of method or raw is required")),
            (Some(""), None) => return Err(invalid("method cannot be empty")),
            (Some(method), None) => {
                let params = self.params.clone().unwrap_or_else(|| json!({}));
                match self.id.clone() {
                    Some(id) => ScenarioCall::Prepared(ScenarioRequest::build(method, params, id)),
                    None => ScenarioCall::method(method, params),
                }
            }
            (None, Some(payload)) => {
                let id = self
                    .id
                    .clone()
                    .or_else(|| payload.get("id").and_then(RequestId::from_value))
                    .unwrap_or_else(|| RequestId::String(format!("raw-{}", index + 1)));
                ScenarioCall::Prepared(ScenarioRequest::raw(id, payload))
            }
        };

        let expectations = match self.expect {
            OneOrMany::One(e) => vec![e],
            OneOrMany::Many(list) => list,
        };
        if expectations.is_empty() {
            return Err(invalid("expect cannot be an empty list"));
        }
        for expectation in &expectations {
            expectation.validate().map_err(|m| invalid(&m))?;
        }

        Ok(Scenario {
            name: self.name,
            call,
            expectations,
        })
    }
}

/// Parses scenarios from JSON text. `path` is only used in errors.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or a scenario is invalid.
pub fn parse_scenarios(json: &str, path: &Path) -> Result<Vec<Scenario>, ScenarioFileError> {
    let file: ScenarioFile = serde_json::from_str(json).map_err(|e| ScenarioFileError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    file.scenarios
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry.into_scenario(index))
        .collect()
}

/// Loads scenarios from a JSON scenario file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>, ScenarioFileError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ScenarioFileError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_scenarios(&contents, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_produces_jsonrpc_envelope() {
        let req = ScenarioRequest::build("tools/call", json!({"name": "x", "arguments": {}}), 1);
        assert_eq!(
            req.payload,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {"name": "x", "arguments": {}}
            })
        );
        assert_eq!(req.id, RequestId::Number(1));
    }

    #[test]
    fn raw_request_keeps_payload_verbatim() {
        let req = ScenarioRequest::raw(9, json!({"jsonrpc": "2.0", "id": 9}));
        assert_eq!(req.method, None);
        assert_eq!(req.payload, json!({"jsonrpc": "2.0", "id": 9}));
    }

    #[test]
    fn tool_name_only_for_tool_calls() {
        assert_eq!(
            ScenarioCall::tool("save_diagram", json!({})).tool_name(),
            Some("save_diagram")
        );
        assert_eq!(ScenarioCall::method("ping", json!({})).tool_name(), None);
    }

    #[test]
    fn expectation_rejects_success_with_error_code() {
        let mut expectation = ScenarioExpectation::success();
        expectation.expected_error_code = Some(-32601);
        assert!(expectation.validate().is_err());
    }

    #[test]
    fn expectation_rejects_error_with_paths() {
        let mut expectation = ScenarioExpectation::error();
        expectation.required_result_paths.push("tools".to_string());
        assert!(expectation.validate().is_err());
    }

    #[test]
    fn expectation_rejects_error_with_text_checks() {
        let expectation = ScenarioExpectation::error().containing(["unknown"]);
        let err = expectation.validate().unwrap_err();
        assert!(err.contains("text checks require expectSuccess"));

        let mut excluding = ScenarioExpectation::error();
        excluding.text_excludes.push("Traceback".to_string());
        assert!(excluding.validate().is_err());
    }

    #[test]
    fn parse_rejects_text_checks_on_error_expectation() {
        let json = r#"{ "scenarios": [
            { "name": "text on error", "method": "tools/call",
              "expect": { "expectSuccess": false, "textContains": ["unknown"] } }
        ] }"#;
        let err = parse_scenarios(json, Path::new("t.json")).unwrap_err();
        assert!(matches!(err, ScenarioFileError::InvalidScenario { .. }));
    }

    #[test]
    fn parse_file_with_alternatives_and_raw() {
        let json = r#"{ "scenarios": [
            { "name": "ping", "method": "ping", "id": 7, "expect": { "expectSuccess": true } },
            { "name": "no method", "raw": {"jsonrpc": "2.0", "id": 9},
              "expect": { "expectSuccess": false, "expectedErrorCode": -32600 } },
            { "name": "unknown tool", "method": "tools/call",
              "params": {"name": "nope", "arguments": {}},
              "expect": [ {"expectSuccess": false},
                          {"expectSuccess": true, "textContains": ["unknown"], "ignoreCase": true} ] }
        ] }"#;

        let scenarios = parse_scenarios(json, Path::new("inline.json")).unwrap();
        assert_eq!(scenarios.len(), 3);

        let ScenarioCall::Prepared(ref ping) = scenarios[0].call else {
            panic!("expected prepared call");
        };
        assert_eq!(ping.id, RequestId::Number(7));

        let ScenarioCall::Prepared(ref raw) = scenarios[1].call else {
            panic!("expected prepared call");
        };
        assert_eq!(raw.id, RequestId::Number(9));
        assert_eq!(scenarios[1].expectations[0].expected_error_code, Some(-32600));

        assert!(matches!(scenarios[2].call, ScenarioCall::Deferred { .. }));
        assert_eq!(scenarios[2].expectations.len(), 2);
        assert!(scenarios[2].expectations[1].ignore_case);
    }

    #[test]
    fn parse_rejects_contradictory_expectation() {
        let json = r#"{ "scenarios": [
            { "name": "bad", "method": "ping",
              "expect": { "expectSuccess": true, "expectedErrorCode": -32601 } }
        ] }"#;
        let err = parse_scenarios(json, Path::new("bad.json")).unwrap_err();
        assert!(matches!(err, ScenarioFileError::InvalidScenario { .. }));
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn parse_rejects_method_and_raw_together() {
        let json = r#"{ "scenarios": [
            { "name": "both", "method": "ping", "raw": {}, "expect": { "expectSuccess": true } }
        ] }"#;
        assert!(parse_scenarios(json, Path::new("x.json")).is_err());
    }

    #[test]
    fn raw_without_any_id_gets_synthetic_id() {
        let json = r#"{ "scenarios": [
            { "name": "garbage", "raw": [1, 2, 3], "expect": { "expectSuccess": false } }
        ] }"#;
        let scenarios = parse_scenarios(json, Path::new("x.json")).unwrap();
        let ScenarioCall::Prepared(ref req) = scenarios[0].call else {
            panic!("expected prepared call");
        };
        assert_eq!(req.id, RequestId::String("raw-1".to_string()));
    }
}
