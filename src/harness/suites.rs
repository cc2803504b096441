//! Built-in scenario suites.
//!
//! The protocol suite checks JSON-RPC conformance and applies to any MCP
//! service. The tools suite targets the diagram tool contract
//! (`generate_diagram`, `save_diagram`, `convert_to_png`).

use clap::ValueEnum;
use serde_json::json;

use crate::harness::scenario::{Scenario, ScenarioCall, ScenarioExpectation, ScenarioRequest};

/// Selectable built-in suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Suite {
    /// JSON-RPC and lifecycle conformance.
    Protocol,
    /// Diagram tool contract.
    Tools,
    /// Both suites, protocol first.
    #[default]
    All,
}

/// Returns the scenarios for `suite`, in execution order.
#[must_use]
pub fn scenarios(suite: Suite) -> Vec<Scenario> {
    match suite {
        Suite::Protocol => protocol_scenarios(),
        Suite::Tools => tool_scenarios(),
        Suite::All => {
            let mut all = protocol_scenarios();
            all.extend(tool_scenarios());
            all
        }
    }
}

/// Keeps the scenarios whose name matches the glob `pattern`.
///
/// # Errors
///
/// Returns an error if `pattern` is not a valid glob.
pub fn filter_scenarios(
    scenarios: Vec<Scenario>,
    pattern: &str,
) -> Result<Vec<Scenario>, glob::PatternError> {
    let pattern = glob::Pattern::new(pattern)?;
    Ok(scenarios
        .into_iter()
        .filter(|s| pattern.matches(&s.name))
        .collect())
}

/// JSON-RPC conformance scenarios.
#[must_use]
pub fn protocol_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new(
            "protocol/ping",
            ScenarioCall::method("ping", json!({})),
            ScenarioExpectation::success(),
        ),
        Scenario::new(
            "protocol/tools-list",
            ScenarioCall::method("tools/list", json!({})),
            ScenarioExpectation::success_with_paths(["tools"]),
        ),
        Scenario::new(
            "protocol/unknown-method",
            ScenarioCall::method("nonexistent/method", json!({})),
            ScenarioExpectation::error_code(-32601),
        ),
        Scenario::new(
            "protocol/missing-method",
            ScenarioCall::Prepared(ScenarioRequest::raw(
                "missing-method",
                json!({"jsonrpc": "2.0", "id": "missing-method"}),
            )),
            ScenarioExpectation::error_code(-32600),
        ),
        Scenario::new(
            "protocol/wrong-version",
            ScenarioCall::Prepared(ScenarioRequest::raw(
                "wrong-version",
                json!({"jsonrpc": "1.0", "id": "wrong-version", "method": "ping"}),
            )),
            ScenarioExpectation::error_code(-32600),
        ),
    ]
}

/// Diagram tool contract scenarios.
#[must_use]
pub fn tool_scenarios() -> Vec<Scenario> {
    let schema_paths = (0..3).flat_map(|i| {
        ["name", "description", "inputSchema"].map(|field| format!("tools.{i}.{field}"))
    });

    vec![
        Scenario::new(
            "tools/schemas",
            ScenarioCall::method("tools/list", json!({})),
            ScenarioExpectation::success_with_paths(schema_paths),
        ),
        Scenario::new(
            "tools/generate",
            ScenarioCall::tool(
                "generate_diagram",
                json!({"prompt": "A login flow: user enters credentials, server validates, dashboard opens"}),
            ),
            ScenarioExpectation::success_with_paths(["content.0.text"])
                .containing(["<mxfile"])
                .excluding(["Traceback"]),
        ),
        Scenario::new(
            "tools/generate-missing-prompt",
            ScenarioCall::tool("generate_diagram", json!({})),
            ScenarioExpectation::error(),
        )
        .or(ScenarioExpectation::success()
            .containing(["prompt"])
            .ignoring_case()),
        Scenario::new(
            "tools/save",
            ScenarioCall::tool(
                "save_diagram",
                json!({"xml_content": "<mxfile><diagram name=\"Page-1\"/></mxfile>", "filename": "contract.drawio"}),
            ),
            ScenarioExpectation::success().containing(["file_id"]),
        ),
        Scenario::new(
            "tools/save-rejects-non-xml",
            ScenarioCall::tool("save_diagram", json!({"xml_content": "definitely not a diagram"})),
            ScenarioExpectation::error(),
        )
        .or(ScenarioExpectation::success()
            .containing(["xml"])
            .ignoring_case()),
        Scenario::new(
            "tools/convert-both-sources",
            ScenarioCall::tool(
                "convert_to_png",
                json!({"file_id": "abc", "file_path": "/tmp/diagram.drawio"}),
            ),
            ScenarioExpectation::error(),
        )
        .or(ScenarioExpectation::success()
            .containing(["exactly one"])
            .ignoring_case()),
        Scenario::new(
            "tools/convert-no-source",
            ScenarioCall::tool("convert_to_png", json!({})),
            ScenarioExpectation::error(),
        )
        .or(ScenarioExpectation::success()
            .containing(["exactly one"])
            .ignoring_case()),
        Scenario::new(
            "tools/convert-unknown-id",
            ScenarioCall::tool("convert_to_png", json!({"file_id": "does-not-exist"})),
            ScenarioExpectation::error(),
        )
        .or(ScenarioExpectation::success()
            .containing(["not found"])
            .ignoring_case()),
        Scenario::new(
            "tools/unknown-tool",
            ScenarioCall::tool("nonexistent-tool", json!({})),
            ScenarioExpectation::error(),
        )
        .or(ScenarioExpectation::success()
            .containing(["unknown", "not found"])
            .ignoring_case()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_protocol_then_tools() {
        let all = scenarios(Suite::All);
        assert_eq!(
            all.len(),
            protocol_scenarios().len() + tool_scenarios().len()
        );
        assert!(all[0].name.starts_with("protocol/"));
        assert!(all.last().unwrap().name.starts_with("tools/"));
    }

    #[test]
    fn every_expectation_is_consistent() {
        for scenario in scenarios(Suite::All) {
            assert!(!scenario.expectations.is_empty(), "{}", scenario.name);
            for expectation in &scenario.expectations {
                assert!(expectation.validate().is_ok(), "{}", scenario.name);
            }
        }
    }

    #[test]
    fn names_are_unique() {
        let all = scenarios(Suite::All);
        let mut names: Vec<_> = all.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }

    #[test]
    fn glob_filter_selects_subset() {
        let convert = filter_scenarios(scenarios(Suite::All), "tools/convert-*").unwrap();
        assert_eq!(convert.len(), 3);
        assert!(filter_scenarios(scenarios(Suite::All), "[").is_err());
    }
}
