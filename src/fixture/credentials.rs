//! API credential classification.
//!
//! Keys are format-checked only; nothing is sent anywhere.

/// Prefix every well-formed API key starts with.
pub const API_KEY_PREFIX: &str = "sk-ant-";

/// Classification of an API credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// No key configured.
    Missing,
    /// Key present but not well-formed.
    Invalid,
    /// Well-formed key marked for testing.
    Test,
    /// Well-formed production key.
    Production,
}

/// Classifies an optional API key.
#[must_use]
pub fn classify(key: Option<&str>) -> CredentialKind {
    let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
        return CredentialKind::Missing;
    };

    let Some(body) = key.strip_prefix(API_KEY_PREFIX) else {
        return CredentialKind::Invalid;
    };

    if body.is_empty()
        || !body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return CredentialKind::Invalid;
    }

    if body.contains("test") {
        CredentialKind::Test
    } else {
        CredentialKind::Production
    }
}

/// Decides whether generation may proceed.
#[derive(Debug, Clone, Copy)]
pub struct CredentialPolicy {
    kind: CredentialKind,
    dev_mode: bool,
}

impl CredentialPolicy {
    /// Builds a policy from a key and the development-mode flag.
    #[must_use]
    pub fn new(key: Option<&str>, dev_mode: bool) -> Self {
        Self {
            kind: classify(key),
            dev_mode,
        }
    }

    /// Returns the key classification.
    #[must_use]
    pub const fn kind(&self) -> CredentialKind {
        self.kind
    }

    /// Checks whether a generation request may use the configured key.
    ///
    /// Development mode accepts missing and malformed keys.
    ///
    /// # Errors
    ///
    /// Returns a user-facing reason when the key is rejected.
    pub fn check(&self) -> Result<(), String> {
        match self.kind {
            CredentialKind::Test | CredentialKind::Production => Ok(()),
            _ if self.dev_mode => Ok(()),
            CredentialKind::Missing => Err("no API key configured".to_string()),
            CredentialKind::Invalid => Err(format!(
                "API key is malformed (expected prefix '{API_KEY_PREFIX}')"
            )),
        }
    }
}
