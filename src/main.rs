//! mcp-contract-verifier: contract test runner for JSON-RPC 2.0 / MCP services
//!
//! Runs scenario suites against a service speaking newline-delimited JSON-RPC
//! over stdio and exits non-zero if any scenario fails.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_contract_verifier::config::{self, Config, ServiceConfig};
use mcp_contract_verifier::error::error_chain;
use mcp_contract_verifier::harness::report::{self, Detail};
use mcp_contract_verifier::harness::suites::{self, Suite};
use mcp_contract_verifier::harness::{self, load_scenarios, Scenario};

/// Contract test runner for JSON-RPC 2.0 / MCP services over stdio.
///
/// Without a configured service, the bundled diagram fixture is verified
/// in-process.
#[derive(Parser, Debug)]
#[command(name = "mcp-contract-verifier")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Built-in suite to run
    #[arg(long, value_enum, default_value_t = Suite::All)]
    suite: Suite,

    /// Load scenarios from a JSON file instead of a built-in suite
    #[arg(long, value_name = "FILE")]
    scenarios: Option<PathBuf>,

    /// Only run scenarios whose name matches this glob pattern
    #[arg(long, value_name = "GLOB")]
    only: Option<String>,

    /// Command that starts the service under test (overrides the config)
    #[arg(long, value_name = "CMD")]
    server: Option<String>,

    /// Argument passed to the service command (repeatable)
    #[arg(
        long = "server-arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        requires = "server"
    )]
    server_args: Vec<String>,

    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace).
    /// Also prints raw responses: -v for failures, -vv for every scenario.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Append a tool coverage section to the summary
    #[arg(long)]
    coverage: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Replaces the configured service with the one given on the command line.
fn apply_server_override(cfg: &mut Config, command: String, args: Vec<String>) {
    let previous = cfg.service.take();
    cfg.service = Some(ServiceConfig {
        command,
        args,
        env: previous.as_ref().map(|s| s.env.clone()).unwrap_or_default(),
        working_dir: previous.and_then(|s| s.working_dir),
    });
}

/// Resolves the scenarios to run from a file or a built-in suite.
fn select_scenarios(args: &Args) -> Result<Vec<Scenario>, String> {
    let scenarios = match args.scenarios {
        Some(ref path) => load_scenarios(path).map_err(|e| error_chain(&e))?,
        None => suites::scenarios(args.suite),
    };

    match args.only {
        Some(ref pattern) => suites::filter_scenarios(scenarios, pattern)
            .map_err(|e| format!("invalid --only pattern '{pattern}': {e}")),
        None => Ok(scenarios),
    }
}

/// Entry point for the mcp-contract-verifier CLI.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", error_chain(&e));
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref command) = args.server {
        apply_server_override(&mut cfg, command.clone(), args.server_args.clone());
        if let Err(e) = cfg.validate() {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    let scenarios = match select_scenarios(&args) {
        Ok(scenarios) if scenarios.is_empty() => {
            eprintln!("No scenarios selected");
            return ExitCode::FAILURE;
        }
        Ok(scenarios) => scenarios,
        Err(e) => {
            eprintln!("Scenario error: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        scenarios = scenarios.len(),
        "Starting contract verification"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let batch = match runtime.block_on(harness::run_scenarios(&cfg, &scenarios)) {
        Ok(batch) => batch,
        Err(e) => {
            error!(error = %error_chain(&e), "Could not acquire a session");
            eprintln!("Session error: {}", error_chain(&e));
            return ExitCode::FAILURE;
        }
    };

    let coverage = args
        .coverage
        .then(|| report::tool_coverage(&scenarios, &batch));

    if args.json {
        match report::render_json(&batch, coverage.as_ref()) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to render report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let detail = Detail::from_verbosity(args.verbose);
        print!("{}", report::render_text(&batch, detail, coverage.as_ref()));
    }

    if batch.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn log_level_resolution() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(0, false, "debug"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
        assert_eq!(get_log_level(2, false, "error"), Level::DEBUG);
    }

    #[test]
    fn server_override_keeps_env() {
        let mut cfg = Config::default();
        cfg.service = Some(ServiceConfig {
            command: "old".to_string(),
            args: vec!["--x".to_string()],
            env: [("K".to_string(), "V".to_string())].into_iter().collect(),
            working_dir: None,
        });

        apply_server_override(&mut cfg, "new".to_string(), vec!["--stdio".to_string()]);
        let service = cfg.service.unwrap();
        assert_eq!(service.command, "new");
        assert_eq!(service.args, vec!["--stdio"]);
        assert_eq!(service.env.get("K").map(String::as_str), Some("V"));
    }

    #[test]
    fn parse_flags() {
        let args = Args::parse_from([
            "mcp-contract-verifier",
            "--suite",
            "protocol",
            "--only",
            "protocol/*",
            "--server",
            "srv",
            "--server-arg",
            "--stdio",
            "-vv",
            "--json",
        ]);
        assert_eq!(args.suite, Suite::Protocol);
        assert_eq!(args.server_args, vec!["--stdio"]);
        assert_eq!(args.verbose, 2);
        assert!(args.json);

        let selected = select_scenarios(&args).unwrap();
        assert!(selected.iter().all(|s| s.name.starts_with("protocol/")));
    }
}
