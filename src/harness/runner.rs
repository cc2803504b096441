//! Scenario runner and batch reports.
//!
//! Scenarios run strictly in order, one outstanding request at a time. A
//! transport failure fails only its own scenario; a dead session aborts
//! everything that has not been tried yet.

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::error_chain;
use crate::harness::assertion::evaluate;
use crate::harness::scenario::{Scenario, ScenarioCall, ScenarioRequest};
use crate::harness::session::{Session, SessionBody};
use crate::mcp::transport::Transport;

/// Outcome category of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioStatus {
    /// Every check held.
    Passed,
    /// A check failed or the transport failed for this scenario.
    Failed,
    /// Never attempted because the session died earlier.
    Aborted,
}

/// Outcome of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    /// Name of the scenario.
    pub scenario_name: String,
    /// Pass, fail, or abort.
    pub status: ScenarioStatus,
    /// Diagnostic text; `ok` on success.
    pub message: String,
    /// The response as received, when there was one.
    pub raw_response: Option<Value>,
}

impl ScenarioResult {
    /// Returns `true` if the scenario passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }

    fn aborted(scenario: &Scenario, reason: &str) -> Self {
        Self {
            scenario_name: scenario.name.clone(),
            status: ScenarioStatus::Aborted,
            message: format!("aborted: {reason}"),
            raw_response: None,
        }
    }
}

/// Aggregate of a batch run. `passed + failed == total` always holds;
/// aborted scenarios count as failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Number of scenarios in the batch.
    pub total: usize,
    /// Scenarios that passed.
    pub passed: usize,
    /// Scenarios that failed or were aborted.
    pub failed: usize,
    /// Per-scenario results, in execution order.
    pub results: Vec<ScenarioResult>,
}

impl BatchReport {
    /// Builds a report from ordered results.
    #[must_use]
    pub fn from_results(results: Vec<ScenarioResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            results,
        }
    }

    /// Returns `true` if every scenario passed.
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Number of scenarios that were never attempted.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ScenarioStatus::Aborted)
            .count()
    }
}

/// Runs `scenarios` in order against an initialised session.
pub async fn run_batch<T: Transport>(
    session: &mut Session<T>,
    scenarios: &[Scenario],
) -> BatchReport {
    let mut results = Vec::with_capacity(scenarios.len());
    let mut abort_reason: Option<String> = None;

    for scenario in scenarios {
        if abort_reason.is_none() && !session.is_alive() {
            abort_reason = Some("session is no longer alive".to_string());
        }
        if let Some(ref reason) = abort_reason {
            results.push(ScenarioResult::aborted(scenario, reason));
            continue;
        }

        let request = match &scenario.call {
            ScenarioCall::Prepared(request) => request.clone(),
            ScenarioCall::Deferred { method, params } => {
                ScenarioRequest::build(method, params.clone(), session.next_id())
            }
        };

        let result = match session.send(&request).await {
            Ok(response) => {
                let (passed, message) = evaluate(&response, &scenario.expectations);
                ScenarioResult {
                    scenario_name: scenario.name.clone(),
                    status: if passed {
                        ScenarioStatus::Passed
                    } else {
                        ScenarioStatus::Failed
                    },
                    message,
                    raw_response: Some(response),
                }
            }
            Err(e) => {
                let message = format!("transport error: {}", error_chain(&e));
                if !session.is_alive() {
                    abort_reason = Some(format!("session died during '{}'", scenario.name));
                }
                ScenarioResult {
                    scenario_name: scenario.name.clone(),
                    status: ScenarioStatus::Failed,
                    message,
                    raw_response: None,
                }
            }
        };

        if result.passed() {
            info!(scenario = %scenario.name, "Scenario passed");
        } else {
            warn!(scenario = %scenario.name, message = %result.message, "Scenario failed");
        }
        results.push(result);
    }

    let report = BatchReport::from_results(results);
    info!(
        total = report.total,
        passed = report.passed,
        failed = report.failed,
        aborted = report.aborted(),
        "Batch finished"
    );
    report
}

/// A batch of scenarios run as a [`SessionBody`].
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    scenarios: &'a [Scenario],
}

impl<'a> Batch<'a> {
    /// Wraps scenarios for [`crate::harness::session::with_session`].
    #[must_use]
    pub const fn new(scenarios: &'a [Scenario]) -> Self {
        Self { scenarios }
    }
}

impl<T: Transport> SessionBody<T> for Batch<'_> {
    type Output = BatchReport;

    async fn run(self, session: &mut Session<T>) -> BatchReport {
        run_batch(session, self.scenarios).await
    }
}
