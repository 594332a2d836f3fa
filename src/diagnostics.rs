//! Leveled diagnostics collected while driving the pipeline.
//!
//! Nothing in the crate prints; warnings and the final error of a failed
//! compilation are pushed here and handed back to the caller.

use crate::asr::Location;
use crate::error::Error;
use serde::Serialize;
use std::fmt;

/// Diagnostic level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Degraded but continuable
    Warning,
    /// Compilation aborted
    Error,
}

/// Pipeline stage that produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// IR rewrite passes
    Pass,
    /// Bytecode generation
    CodeGen,
    /// Output module verification
    Verify,
}

/// One diagnostic record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub level: Level,
    pub stage: Stage,
    pub message: String,
    /// Source span the message refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<Location>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(f, "{}: {}", level, self.message)?;
        if let Some(loc) = self.label {
            write!(f, " (at {}..{})", loc.first, loc.last)?;
        }
        Ok(())
    }
}

/// Ordered list of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(&mut self, stage: Stage, message: impl Into<String>, label: Option<Location>) {
        let message = message.into();
        tracing::warn!(?stage, %message, "diagnostic");
        self.records.push(Diagnostic {
            level: Level::Warning,
            stage,
            message,
            label,
        });
    }

    pub fn error(&mut self, stage: Stage, message: impl Into<String>, label: Option<Location>) {
        self.records.push(Diagnostic {
            level: Level::Error,
            stage,
            message: message.into(),
            label,
        });
    }

    /// Record a pipeline error, taking its location when it carries one
    pub fn push_error(&mut self, stage: Stage, err: &Error) {
        self.error(stage, err.to_string(), err.location());
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.records.extend(other.records);
    }

    pub fn has_errors(&self) -> bool {
        self.records.iter().any(|d| d.level == Level::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(|d| d.level == Level::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render as a JSON array for tooling
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.records).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detection() {
        let mut diags = Diagnostics::new();
        diags.warning(Stage::CodeGen, "character variable replaced by i32", None);
        assert!(!diags.has_errors());
        diags.push_error(Stage::CodeGen, &Error::codegen("allocatable arrays"));
        assert!(diags.has_errors());
        assert_eq!(diags.warnings().count(), 1);
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_json_rendering() {
        let mut diags = Diagnostics::new();
        diags.error(Stage::Pass, "bad", Some(Location::new(1, 2)));
        let json: serde_json::Value = serde_json::from_str(&diags.to_json()).unwrap();
        assert_eq!(json[0]["level"], "error");
        assert_eq!(json[0]["stage"], "pass");
        assert_eq!(json[0]["label"]["first"], 1);
    }

    #[test]
    fn test_display_includes_span() {
        let mut diags = Diagnostics::new();
        diags.error(Stage::Verify, "unbalanced end", Some(Location::new(3, 9)));
        let text = diags.iter().next().unwrap().to_string();
        assert_eq!(text, "error: unbalanced end (at 3..9)");
    }
}
