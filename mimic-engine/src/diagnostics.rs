use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A note attached to one trait key during generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub key: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn info(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, Severity::Info, message)
    }

    pub fn warning(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, Severity::Warning, message)
    }

    pub fn error(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(key, Severity::Error, message)
    }

    fn new(key: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.key, self.message)
    }
}

/// Append-only collector threaded through a generation call.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Info => tracing::debug!(key = %diagnostic.key, message = %diagnostic.message, "diagnostic.info"),
            Severity::Warning => tracing::warn!(key = %diagnostic.key, message = %diagnostic.message, "diagnostic.warning"),
            Severity::Error => tracing::error!(key = %diagnostic.key, message = %diagnostic.message, "diagnostic.error"),
        }
        self.entries.push(diagnostic);
    }

    pub fn warn(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.push(Diagnostic::warning(key, message));
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
