//! Tool definitions and handlers for the diagram fixture.
//!
//! Handler failures are reported in-band (`isError: true`) except for
//! argument-shape violations of `convert_to_png`, which surface as
//! [`ToolError::InvalidParams`] and become a `-32602` protocol error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::fixture::credentials::CredentialPolicy;
use crate::fixture::generator::TextGenerator;
use crate::fixture::store::FileStore;

/// Name of the generation tool.
pub const GENERATE_DIAGRAM: &str = "generate_diagram";
/// Name of the save tool.
pub const SAVE_DIAGRAM: &str = "save_diagram";
/// Name of the conversion tool.
pub const CONVERT_TO_PNG: &str = "convert_to_png";

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Creates a successful result carrying pretty-printed JSON.
    #[must_use]
    pub fn json(value: &Value) -> Self {
        Self::text(pretty(value))
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if passes &bool
const fn is_false(b: &bool) -> bool {
    !*b
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Tool failures that are reported as protocol errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The arguments do not have the required shape.
    #[error("{0}")]
    InvalidParams(String),
}

/// Returns the list of available tools.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: GENERATE_DIAGRAM.to_string(),
            description: Some(
                "Generate a draw.io diagram from a natural-language description. \
                 Returns the diagram as mxfile XML."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "What the diagram should show"
                    }
                },
                "required": ["prompt"]
            }),
        },
        ToolDefinition {
            name: SAVE_DIAGRAM.to_string(),
            description: Some(
                "Save diagram XML to temporary storage. Returns a file_id that other \
                 tools accept. Files expire after a fixed time."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "xml_content": {
                        "type": "string",
                        "description": "The diagram XML to store"
                    },
                    "filename": {
                        "type": "string",
                        "description": "Optional plain file name (no directories)"
                    }
                },
                "required": ["xml_content"]
            }),
        },
        ToolDefinition {
            name: CONVERT_TO_PNG.to_string(),
            description: Some(
                "Resolve a saved diagram (by file_id) or a diagram on disk (by file_path) \
                 and report the PNG path it renders to. Provide exactly one of the two."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_id": {
                        "type": "string",
                        "description": "Id returned by save_diagram"
                    },
                    "file_path": {
                        "type": "string",
                        "description": "Path to an existing diagram file"
                    }
                }
            }),
        },
    ]
}

/// The fixture's tool implementations and the resources they use.
pub struct DiagramTools {
    generator: Box<dyn TextGenerator + Send>,
    credentials: CredentialPolicy,
    store: FileStore,
}

impl DiagramTools {
    /// Creates the toolset from explicitly constructed resources.
    #[must_use]
    pub fn new(
        generator: Box<dyn TextGenerator + Send>,
        credentials: CredentialPolicy,
        store: FileStore,
    ) -> Self {
        Self {
            generator,
            credentials,
            store,
        }
    }

    /// Returns the file store.
    #[must_use]
    pub const fn store(&self) -> &FileStore {
        &self.store
    }

    /// Dispatches a tool call by name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidParams`] when the arguments violate the
    /// tool's shape in a way that is reported as a protocol error.
    pub fn call(&mut self, name: &str, arguments: &Value) -> Result<ToolCallResult, ToolError> {
        debug!(tool = name, "Tool call");
        match name {
            GENERATE_DIAGRAM => Ok(self.call_generate_diagram(arguments)),
            SAVE_DIAGRAM => Ok(self.call_save_diagram(arguments)),
            CONVERT_TO_PNG => self.call_convert_to_png(arguments),
            _ => Ok(ToolCallResult::error(format!(
                "Unknown tool: {name} (not found)"
            ))),
        }
    }

    fn call_generate_diagram(&self, arguments: &Value) -> ToolCallResult {
        let Some(prompt) = arguments.get("prompt").and_then(Value::as_str) else {
            return ToolCallResult::error("Missing required parameter: prompt");
        };

        if let Err(reason) = self.credentials.check() {
            return ToolCallResult::error(format!("Diagram generation unavailable: {reason}"));
        }

        match self.generator.generate(prompt) {
            Ok(xml) => {
                info!(chars = prompt.len(), "Generated diagram");
                ToolCallResult::text(xml)
            }
            Err(e) => ToolCallResult::error(format!("Diagram generation failed: {e}")),
        }
    }

    fn call_save_diagram(&mut self, arguments: &Value) -> ToolCallResult {
        let Some(xml) = arguments.get("xml_content").and_then(Value::as_str) else {
            return ToolCallResult::error("Missing required parameter: xml_content");
        };

        if !looks_like_xml(xml) {
            return ToolCallResult::error(
                "Invalid xml_content: expected an XML document starting with '<'",
            );
        }

        let filename = arguments.get("filename").and_then(Value::as_str);

        let saved = match self.store.save(xml, filename) {
            Ok(saved) => saved,
            Err(e) => return ToolCallResult::error(format!("Failed to save diagram: {e}")),
        };

        match serde_json::to_value(&saved) {
            Ok(mut body) => {
                body["status"] = json!("success");
                ToolCallResult::json(&body)
            }
            Err(e) => ToolCallResult::error(format!("Failed to describe saved diagram: {e}")),
        }
    }

    fn call_convert_to_png(&mut self, arguments: &Value) -> Result<ToolCallResult, ToolError> {
        let file_id = arguments.get("file_id").and_then(Value::as_str);
        let file_path = arguments.get("file_path").and_then(Value::as_str);

        let source: PathBuf = match (file_id, file_path) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(ToolError::InvalidParams(
                    "Provide exactly one of file_id or file_path".to_string(),
                ))
            }
            (Some(id), None) => match self.store.get(id) {
                Ok(entry) => entry.path.clone(),
                Err(e) => return Ok(ToolCallResult::error(e.to_string())),
            },
            (None, Some(path)) => {
                let path = Path::new(path);
                if !path.is_file() {
                    return Ok(ToolCallResult::error(format!(
                        "Source file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
        };

        let png_path = source.with_extension("png");
        Ok(ToolCallResult::json(&json!({
            "status": "success",
            "source_path": source,
            "png_path": png_path,
        })))
    }
}

fn looks_like_xml(text: &str) -> bool {
    let text = text.trim();
    text.starts_with('<') && text.ends_with('>')
}
