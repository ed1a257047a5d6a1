//! Validation diagnostics

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding, optionally tied to an attribute path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(attribute: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            attribute: Some(attribute.into()),
        }
    }

    pub fn warning(attribute: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            attribute: Some(attribute.into()),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        match &self.attribute {
            Some(attr) if !attr.is_empty() => write!(f, "{level}: {attr}: {}", self.summary),
            _ => write!(f, "{level}: {}", self.summary),
        }
    }
}

/// Collected diagnostics; an error when any entry has error severity
#[derive(Debug, Clone, Default, PartialEq, Error)]
#[error("{}", render(.0))]
pub struct Diagnostics(pub Vec<Diagnostic>);

fn render(items: &[Diagnostic]) -> String {
    items
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn error(&mut self, attribute: impl Into<String>, summary: impl Into<String>) {
        self.push(Diagnostic::error(attribute, summary));
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// `Err(self)` when any error is present, warnings are logged and dropped
    pub fn into_result(self) -> Result<(), Diagnostics> {
        if self.has_errors() {
            return Err(self);
        }
        for warning in &self.0 {
            tracing::warn!("{}", warning);
        }
        Ok(())
    }
}

impl From<serde_json::Error> for Diagnostics {
    fn from(err: serde_json::Error) -> Self {
        Diagnostics(vec![Diagnostic {
            severity: Severity::Error,
            summary: format!("Invalid configuration: {err}"),
            attribute: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_alone_pass() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning("name", "deprecated"));
        assert!(!diags.has_errors());
        assert!(diags.into_result().is_ok());
    }

    #[test]
    fn test_display_lists_all_errors() {
        let mut diags = Diagnostics::new();
        diags.error("name", "must not be empty");
        diags.error("action_point.0.point", "unknown value");
        let text = diags.to_string();
        assert!(text.contains("Error: name: must not be empty"));
        assert!(text.contains("Error: action_point.0.point: unknown value"));
    }
}
