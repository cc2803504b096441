//! Contract verification harness.
//!
//! ```text
//!  Scenario ──▶ Runner ──▶ Session ──▶ Transport ──▶ service under test
//!                 │                        (subprocess or in-process)
//!                 ▼
//!            Assertion engine ──▶ BatchReport ──▶ text / JSON summary
//! ```
//!
//! - [`scenario`]: requests under test and their expectations
//! - [`assertion`]: evaluates one response against an expectation
//! - [`session`]: handshake, timeouts, guaranteed close
//! - [`runner`]: ordered batch execution and aggregation
//! - [`suites`]: built-in scenarios
//! - [`report`]: summaries and tool coverage

pub mod assertion;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod suites;

pub use runner::{run_batch, Batch, BatchReport, ScenarioResult, ScenarioStatus};
pub use scenario::{load_scenarios, Scenario, ScenarioCall, ScenarioExpectation, ScenarioRequest};
pub use session::{with_session, Session, SessionBody, SessionOptions};
pub use suites::Suite;

use tracing::info;

use crate::config::Config;
use crate::error::{SessionError, TransportError};
use crate::fixture::FixtureOptions;
use crate::mcp::transport::{InProcessTransport, SubprocessTransport};

/// Runs `scenarios` against the service described by `config`.
///
/// A configured `service` is spawned as a child process. Without one, the
/// bundled diagram fixture runs in-process; it is put in development mode
/// unless an API key is configured.
///
/// # Errors
///
/// Returns [`SessionError`] if the service cannot be started or the
/// handshake fails.
pub async fn run_scenarios(
    config: &Config,
    scenarios: &[Scenario],
) -> Result<BatchReport, SessionError> {
    let options = SessionOptions::from(&config.session);

    if let Some(spec) = config.launch_spec() {
        info!(command = %spec.command, "Verifying external service");
        let transport = SubprocessTransport::spawn(&spec)?;
        return with_session(transport, options, Batch::new(scenarios)).await;
    }

    info!("Verifying bundled diagram fixture in-process");
    let mut fixture = FixtureOptions::from(&config.environment);
    fixture.dev_mode = fixture.dev_mode || fixture.api_key.is_none();

    let server = fixture.build().map_err(|e| TransportError::Spawn {
        command: "in-process fixture".to_string(),
        source: std::io::Error::other(e),
    })?;

    with_session(InProcessTransport::new(server), options, Batch::new(scenarios)).await
}
