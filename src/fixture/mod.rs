//! Diagram fixture: a conformant reference MCP service.
//!
//! The fixture exposes three tools (`generate_diagram`, `save_diagram`,
//! `convert_to_png`) over JSON-RPC. It is the default target of the harness
//! when no external service is configured, and ships as the
//! `diagram-fixture-server` binary for subprocess testing.
//!
//! Every resource (generator, credential policy, file store) is constructed
//! explicitly from [`FixtureOptions`] and owned by the server instance.

pub mod credentials;
pub mod generator;
pub mod server;
pub mod stdio;
pub mod store;
pub mod tools;

pub use credentials::{classify, CredentialKind, CredentialPolicy};
pub use generator::{GenerationError, TemplateGenerator, TextGenerator};
pub use server::{DiagramServer, ServerState};
pub use store::{FileStore, StoreError, DEFAULT_FILE_TTL};
pub use tools::{DiagramTools, ToolCallResult};

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::config::{EnvironmentConfig, ENV_API_KEY, ENV_DEV_MODE, ENV_TEMP_DIR};

/// Settings the fixture reads from its environment.
#[derive(Debug, Clone)]
pub struct FixtureOptions {
    /// API credential for the generation backend.
    pub api_key: Option<String>,
    /// Accept missing or malformed credentials.
    pub dev_mode: bool,
    /// Base directory for the file store.
    pub temp_dir: Option<PathBuf>,
    /// Lifetime of saved files.
    pub file_ttl: Duration,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            dev_mode: false,
            temp_dir: None,
            file_ttl: DEFAULT_FILE_TTL,
        }
    }
}

impl From<&EnvironmentConfig> for FixtureOptions {
    fn from(env: &EnvironmentConfig) -> Self {
        Self {
            api_key: env.api_key.clone(),
            dev_mode: env.dev_mode,
            temp_dir: env.temp_dir.clone(),
            ..Self::default()
        }
    }
}

impl FixtureOptions {
    /// Reads `DIAGRAM_API_KEY`, `DIAGRAM_DEV_MODE` and `DIAGRAM_TEMP_DIR`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(ENV_API_KEY).ok(),
            dev_mode: std::env::var(ENV_DEV_MODE).is_ok_and(|v| is_truthy(&v)),
            temp_dir: std::env::var_os(ENV_TEMP_DIR).map(PathBuf::from),
            ..Self::default()
        }
    }

    /// Builds a server with the bundled template generator.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file store directory cannot be created.
    pub fn build(&self) -> Result<DiagramServer, StoreError> {
        let credentials = CredentialPolicy::new(self.api_key.as_deref(), self.dev_mode);
        let store = FileStore::new(self.temp_dir.as_deref(), self.file_ttl)?;

        info!(
            credentials = ?credentials.kind(),
            dev_mode = self.dev_mode,
            store = %store.root().display(),
            "Diagram fixture ready"
        );

        Ok(DiagramServer::new(DiagramTools::new(
            Box::new(TemplateGenerator),
            credentials,
            store,
        )))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["", "0", "false", "off", "maybe"] {
            assert!(!is_truthy(v), "{v}");
        }
    }

    #[test]
    fn options_from_environment_config() {
        let env = EnvironmentConfig {
            api_key: Some("sk-ant-test-1".to_string()),
            dev_mode: true,
            temp_dir: Some(PathBuf::from("/tmp/x")),
            log_level: None,
        };
        let options = FixtureOptions::from(&env);
        assert_eq!(options.api_key.as_deref(), Some("sk-ant-test-1"));
        assert!(options.dev_mode);
        assert_eq!(options.file_ttl, DEFAULT_FILE_TTL);
    }

    #[test]
    fn build_creates_store_under_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let options = FixtureOptions {
            temp_dir: Some(dir.path().to_path_buf()),
            dev_mode: true,
            ..FixtureOptions::default()
        };
        let server = options.build().unwrap();
        assert!(server.tools().store().root().starts_with(dir.path()));
        assert_eq!(server.state(), ServerState::AwaitingInit);
    }
}
