//! Human-readable and JSON rendering of batch reports, plus tool coverage.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::harness::runner::{BatchReport, ScenarioStatus};
use crate::harness::scenario::Scenario;

/// How much response detail the text summary includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Detail {
    /// Status lines only.
    #[default]
    Summary,
    /// Raw responses for failed scenarios.
    Failures,
    /// Raw responses for every scenario.
    All,
}

impl Detail {
    /// Maps a `-v` count to a detail level.
    #[must_use]
    pub const fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => Self::Summary,
            1 => Self::Failures,
            _ => Self::All,
        }
    }
}

/// Which tools the batch exercised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolCoverage {
    /// Tools named in any successful `tools/list` response.
    pub advertised: BTreeSet<String>,
    /// Tools a `tools/call` scenario actually reached the service with.
    pub called: BTreeSet<String>,
    /// Advertised tools never called.
    pub uncovered: BTreeSet<String>,
}

/// Computes tool coverage from a batch and the scenarios that produced it.
///
/// `scenarios` and `report.results` are matched by position.
#[must_use]
pub fn tool_coverage(scenarios: &[Scenario], report: &BatchReport) -> ToolCoverage {
    let mut coverage = ToolCoverage::default();

    for (scenario, result) in scenarios.iter().zip(&report.results) {
        if result.status == ScenarioStatus::Aborted {
            continue;
        }

        if let Some(tool) = scenario.call.tool_name() {
            coverage.called.insert(tool.to_string());
        }

        if scenario.call.method_name() == Some("tools/list") {
            let tools = result
                .raw_response
                .as_ref()
                .and_then(|r| r.pointer("/result/tools"))
                .and_then(Value::as_array);
            for tool in tools.into_iter().flatten() {
                if let Some(name) = tool.get("name").and_then(Value::as_str) {
                    coverage.advertised.insert(name.to_string());
                }
            }
        }
    }

    coverage.uncovered = coverage
        .advertised
        .difference(&coverage.called)
        .cloned()
        .collect();
    coverage
}

/// Renders the text summary printed at the end of a run.
#[must_use]
pub fn render_text(report: &BatchReport, detail: Detail, coverage: Option<&ToolCoverage>) -> String {
    let mut out = String::new();

    for result in &report.results {
        let label = match result.status {
            ScenarioStatus::Passed => "PASS ",
            ScenarioStatus::Failed => "FAIL ",
            ScenarioStatus::Aborted => "ABORT",
        };
        if result.passed() {
            let _ = writeln!(out, "{label} {}", result.scenario_name);
        } else {
            let _ = writeln!(out, "{label} {}: {}", result.scenario_name, result.message);
        }

        let show_response = match detail {
            Detail::Summary => false,
            Detail::Failures => !result.passed(),
            Detail::All => true,
        };
        if show_response {
            if let Some(ref response) = result.raw_response {
                let _ = writeln!(out, "      response: {response}");
            }
        }
    }

    let _ = writeln!(
        out,
        "\n{} scenarios: {} passed, {} failed",
        report.total, report.passed, report.failed
    );
    let aborted = report.aborted();
    if aborted > 0 {
        let _ = writeln!(out, "({aborted} aborted after the session died)");
    }

    if let Some(coverage) = coverage {
        let join = |set: &BTreeSet<String>| {
            if set.is_empty() {
                "-".to_string()
            } else {
                set.iter().cloned().collect::<Vec<_>>().join(", ")
            }
        };
        let _ = writeln!(out, "\nTool coverage:");
        let _ = writeln!(out, "  advertised:   {}", join(&coverage.advertised));
        let _ = writeln!(out, "  called:       {}", join(&coverage.called));
        let _ = writeln!(out, "  never called: {}", join(&coverage.uncovered));
    }

    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a BatchReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    coverage: Option<&'a ToolCoverage>,
}

/// Renders the report (and coverage, if given) as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialisation fails.
pub fn render_json(
    report: &BatchReport,
    coverage: Option<&ToolCoverage>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonReport { report, coverage })
}
