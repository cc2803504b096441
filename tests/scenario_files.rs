//! Integration tests for JSON scenario files.
//!
//! These tests load scenario files from disk and run them against the
//! bundled diagram fixture.

use std::path::{Path, PathBuf};

use mcp_contract_verifier::config::Config;
use mcp_contract_verifier::error::ScenarioFileError;
use mcp_contract_verifier::harness::report::{render_json, render_text, tool_coverage, Detail};
use mcp_contract_verifier::harness::suites::filter_scenarios;
use mcp_contract_verifier::harness::{load_scenarios, run_scenarios, ScenarioCall};

fn bundled_scenarios() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join("diagram-contract.json")
}

fn fixture_config(temp_dir: &Path) -> Config {
    let mut config = Config::default();
    config.environment.temp_dir = Some(temp_dir.to_path_buf());
    config
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_bundled_file_loads() {
    let scenarios = load_scenarios(&bundled_scenarios()).unwrap();
    assert_eq!(scenarios.len(), 5);
    assert!(matches!(scenarios[3].call, ScenarioCall::Prepared(_)));
    assert_eq!(scenarios[4].expectations.len(), 2);
}

#[test]
fn test_missing_file_is_read_error() {
    let err = load_scenarios(Path::new("/no/such/scenarios.json")).unwrap_err();
    assert!(matches!(err, ScenarioFileError::Read { .. }));
}

#[test]
fn test_unknown_expectation_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typo.json");
    std::fs::write(
        &path,
        r#"{"scenarios": [{"name": "x", "method": "ping", "expect": {"expectSucess": true}}]}"#,
    )
    .unwrap();

    let err = load_scenarios(&path).unwrap_err();
    assert!(matches!(err, ScenarioFileError::Parse { .. }));
}

#[test]
fn test_empty_alternatives_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.json");
    std::fs::write(
        &path,
        r#"{"scenarios": [{"name": "x", "method": "ping", "expect": []}]}"#,
    )
    .unwrap();

    let err = load_scenarios(&path).unwrap_err();
    assert!(matches!(err, ScenarioFileError::InvalidScenario { .. }));
}

// =============================================================================
// Running
// =============================================================================

#[tokio::test]
async fn test_bundled_file_passes_against_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let scenarios = load_scenarios(&bundled_scenarios()).unwrap();

    let report = run_scenarios(&fixture_config(dir.path()), &scenarios)
        .await
        .unwrap();
    assert!(
        report.all_passed(),
        "{}",
        render_text(&report, Detail::Failures, None)
    );

    let coverage = tool_coverage(&scenarios, &report);
    assert!(coverage.advertised.contains("save_diagram"));
    assert!(coverage.called.contains("generate_diagram"));
    assert!(coverage.uncovered.contains("convert_to_png"));

    let json: serde_json::Value =
        serde_json::from_str(&render_json(&report, Some(&coverage)).unwrap()).unwrap();
    assert_eq!(json["total"], 5);
    assert_eq!(json["passed"], 5);
    assert!(json["coverage"]["uncovered"].is_array());
}

#[tokio::test]
async fn test_failing_expectation_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failing.json");
    std::fs::write(
        &path,
        r#"{"scenarios": [
            {"name": "wrong path", "method": "tools/list",
             "expect": {"expectSuccess": true, "requiredResultPaths": ["tools.99.name"]}},
            {"name": "ok", "method": "ping", "expect": {"expectSuccess": true}}
        ]}"#,
    )
    .unwrap();
    let scenarios = load_scenarios(&path).unwrap();

    let report = run_scenarios(&fixture_config(dir.path()), &scenarios)
        .await
        .unwrap();
    assert_eq!(report.passed, 1);
    assert_eq!(report.failed, 1);
    assert!(report.results[0].message.contains("[missing-path]"));
    assert!(report.results[0].message.contains("tools.99.name"));
}

#[tokio::test]
async fn test_filtered_subset_runs_alone() {
    let dir = tempfile::tempdir().unwrap();
    let scenarios = load_scenarios(&bundled_scenarios()).unwrap();
    let subset = filter_scenarios(scenarios, "*tool*").unwrap();
    assert_eq!(subset.len(), 2);

    let report = run_scenarios(&fixture_config(dir.path()), &subset)
        .await
        .unwrap();
    assert_eq!(report.total, 2);
    assert!(report.all_passed());
}
