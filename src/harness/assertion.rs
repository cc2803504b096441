//! Response assertion engine.
//!
//! Evaluates a raw JSON-RPC response against a [`ScenarioExpectation`].
//! Failures are values, never panics or errors: they end up in the
//! scenario's report line.

use regex::RegexBuilder;
use serde_json::Value;
use thiserror::Error;

use crate::harness::scenario::ScenarioExpectation;

/// Why a response did not meet its expectation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssertionFailure {
    /// The response has neither `result` nor `error`, or has both.
    #[error("malformed response: {detail}")]
    MalformedResponse {
        /// What is wrong with the envelope.
        detail: String,
    },

    /// An error came back where a result was expected.
    #[error("expected a result but got error {code}: {message}")]
    UnexpectedError {
        /// The returned error code, verbatim.
        code: String,
        /// The returned error message.
        message: String,
    },

    /// A result came back where an error was expected.
    #[error("expected an error but got a result")]
    UnexpectedSuccess,

    /// A required path does not resolve under `result`.
    #[error("missing result path '{path}'")]
    MissingPath {
        /// The dotted path that failed to resolve.
        path: String,
    },

    /// The error code differs from the expected one.
    #[error("expected error code {expected}, got {actual}")]
    WrongErrorCode {
        /// The expected code.
        expected: i64,
        /// The actual `error.code`, verbatim.
        actual: String,
    },

    /// Text checks were requested but `result.content[0].text` is absent.
    #[error("no content to check at result.content[0].text")]
    NoTextContent,

    /// A required substring is missing from the tool text.
    #[error("text does not contain '{needle}'")]
    MissingText {
        /// The substring that was not found.
        needle: String,
    },

    /// A forbidden substring appears in the tool text.
    #[error("text contains forbidden '{needle}'")]
    ForbiddenText {
        /// The substring that was found.
        needle: String,
    },
}

impl AssertionFailure {
    /// Returns the failure's category, stable for reporting.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedResponse { .. } => "malformed-response",
            Self::UnexpectedError { .. } => "unexpected-error",
            Self::UnexpectedSuccess => "unexpected-success",
            Self::MissingPath { .. } => "missing-path",
            Self::WrongErrorCode { .. } => "wrong-error-code",
            Self::NoTextContent | Self::MissingText { .. } | Self::ForbiddenText { .. } => {
                "substring-mismatch"
            }
        }
    }
}

/// Resolves a dotted path through nested objects and arrays.
///
/// Numeric segments index into arrays; every other segment is an object key.
/// An empty path resolves to `value` itself.
#[must_use]
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Returns the conventional tool-call text at `result.content[0].text`.
#[must_use]
pub fn tool_text(response: &Value) -> Option<&str> {
    resolve_path(response, "result.content.0.text").and_then(Value::as_str)
}

/// Checks `response` against a single expectation.
///
/// # Errors
///
/// Returns the first unmet condition.
pub fn check(response: &Value, expectation: &ScenarioExpectation) -> Result<(), AssertionFailure> {
    let result = response.get("result");
    let error = response.get("error");

    match (result, error) {
        (None, None) => {
            return Err(AssertionFailure::MalformedResponse {
                detail: "neither result nor error present".to_string(),
            })
        }
        (Some(_), Some(_)) => {
            return Err(AssertionFailure::MalformedResponse {
                detail: "both result and error present".to_string(),
            })
        }
        _ => {}
    }

    if expectation.expect_success {
        if let Some(error) = error {
            return Err(AssertionFailure::UnexpectedError {
                code: error.get("code").map_or_else(|| "none".to_string(), Value::to_string),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        let result = result.unwrap_or(&Value::Null);
        for path in &expectation.required_result_paths {
            if resolve_path(result, path).is_none() {
                return Err(AssertionFailure::MissingPath { path: path.clone() });
            }
        }
    } else {
        let Some(error) = error else {
            return Err(AssertionFailure::UnexpectedSuccess);
        };
        if let Some(expected) = expectation.expected_error_code {
            let code = error.get("code");
            // Integer equality only: -32601.0 or "-32601" do not match.
            let actual = code.and_then(Value::as_i64);
            if actual != Some(expected) {
                return Err(AssertionFailure::WrongErrorCode {
                    expected,
                    actual: code.map_or_else(|| "none".to_string(), Value::to_string),
                });
            }
        }
    }

    if expectation.has_text_checks() {
        let text = tool_text(response).ok_or(AssertionFailure::NoTextContent)?;
        for needle in &expectation.text_contains {
            if !text_matches(text, needle, expectation.ignore_case) {
                return Err(AssertionFailure::MissingText {
                    needle: needle.clone(),
                });
            }
        }
        for needle in &expectation.text_excludes {
            if text_matches(text, needle, expectation.ignore_case) {
                return Err(AssertionFailure::ForbiddenText {
                    needle: needle.clone(),
                });
            }
        }
    }

    Ok(())
}

fn text_matches(haystack: &str, needle: &str, ignore_case: bool) -> bool {
    if !ignore_case {
        return haystack.contains(needle);
    }
    RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .is_ok_and(|re| re.is_match(haystack))
}

/// Evaluates `response` against a list of alternative expectations.
///
/// Returns `(true, message)` if any alternative holds. Otherwise returns
/// `(false, message)` naming every alternative's failure.
#[must_use]
pub fn evaluate(response: &Value, expectations: &[ScenarioExpectation]) -> (bool, String) {
    let mut failures = Vec::with_capacity(expectations.len());
    for expectation in expectations {
        match check(response, expectation) {
            Ok(()) => return (true, "ok".to_string()),
            Err(failure) => failures.push(failure),
        }
    }

    let message = match failures.as_slice() {
        [] => "no expectations configured".to_string(),
        [only] => format!("[{}] {only}", only.kind()),
        many => many
            .iter()
            .map(|f| format!("[{}] {f}", f.kind()))
            .collect::<Vec<_>>()
            .join(" | "),
    };
    (false, message)
}
