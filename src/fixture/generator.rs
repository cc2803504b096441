//! Text generation capability behind `generate_diagram`.
//!
//! Production services call an LLM here. The fixture ships a deterministic
//! template generator that satisfies the same interface.

use thiserror::Error;

/// Longest prompt the template generator accepts, in characters.
pub const MAX_PROMPT_CHARS: usize = 4_000;

/// Errors that can occur during generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// The prompt is empty or whitespace.
    #[error("prompt is empty")]
    EmptyPrompt,

    /// The prompt exceeds the generator's limit.
    #[error("prompt exceeds {limit} characters")]
    PromptTooLong {
        /// The limit that was exceeded.
        limit: usize,
    },
}

/// Produces diagram text from a prompt.
pub trait TextGenerator {
    /// Generates diagram XML for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] if the prompt cannot be turned into a diagram.
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Deterministic generator that wraps the prompt in a draw.io document.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TextGenerator for TemplateGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(GenerationError::PromptTooLong {
                limit: MAX_PROMPT_CHARS,
            });
        }

        let label = escape_xml(prompt);
        Ok(format!(
            concat!(
                r#"<mxfile host="diagram-fixture"><diagram name="Page-1">"#,
                r#"<mxGraphModel><root><mxCell id="0"/><mxCell id="1" parent="0"/>"#,
                r#"<mxCell id="2" value="{label}" style="rounded=1;whiteSpace=wrap;" vertex="1" parent="1">"#,
                r#"<mxGeometry x="40" y="40" width="240" height="80" as="geometry"/></mxCell>"#,
                r#"</root></mxGraphModel></diagram></mxfile>"#
            ),
            label = label
        ))
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
