// crates/propgate-core/src/error.rs
// ============================================================================
// Module: Props Errors
// Description: Defaulting failures, rule diagnostics, and the combined error.
// Purpose: Report every rule violation together and keep defaulting failures
//          distinct from validation failures.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Two disjoint failure kinds come out of the engine:
//! - [`DefaultingError`]: a malformed default declaration or an unusable
//!   record. Always fatal; no rule runs afterwards.
//! - [`ValidationErrors`]: every [`Diagnostic`] produced by one traversal, in
//!   traversal order, never deduplicated.
//!
//! [`PropsError`] wraps either for the orchestrator entry points.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

// ============================================================================
// SECTION: Defaulting Errors
// ============================================================================

/// Fatal errors raised while populating defaults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefaultingError {
    /// A record position did not hold an object.
    #[error("{path}: expected a record object, found {found}")]
    InvalidRecord {
        /// Field path of the offending value.
        path: String,
        /// JSON type that was found.
        found: &'static str,
    },
    /// A default literal could not be parsed as the field's kind.
    #[error("{field}: malformed default literal `{literal}`: {reason}")]
    MalformedLiteral {
        /// Field path carrying the literal.
        field: String,
        /// Literal text as declared.
        literal: String,
        /// Parse failure detail.
        reason: String,
    },
    /// A setter hook could not round-trip the record.
    #[error("{record}: setter hook failed: {reason}")]
    Hook {
        /// Record name.
        record: String,
        /// Failure detail.
        reason: String,
    },
    /// Record nesting exceeded the configured depth.
    #[error("{path}: nesting exceeds max depth {max_depth}")]
    TooDeep {
        /// Field path where the limit was hit.
        path: String,
        /// Configured maximum depth.
        max_depth: usize,
    },
    /// A typed record could not be converted to or from its value tree.
    #[error("{record}: serialization failed: {reason}")]
    Serialization {
        /// Record name.
        record: String,
        /// Failure detail.
        reason: String,
    },
}

// ============================================================================
// SECTION: Diagnostics
// ============================================================================

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Dotted field path, rooted at the record name (`Props.ports[0].name`).
    pub field_path: String,
    /// Rule name as declared.
    pub rule: String,
    /// Rule parameter, when declared.
    pub param: Option<String>,
    /// Human-readable failure message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: failed '{}' rule: {}", self.field_path, self.rule, self.message)
    }
}

/// Ordered collection of diagnostics from one traversal.
///
/// # Invariants
/// - Diagnostics keep traversal order.
/// - A `ValidationErrors` returned as an error is never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    /// Collected diagnostics.
    diagnostics: Vec<Diagnostic>,
}

impl ValidationErrors {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    /// Appends a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Returns true when no diagnostic was collected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns the number of diagnostics.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Returns the diagnostics in traversal order.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Returns an iterator over the diagnostics.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    /// Returns true when any diagnostic targets `field_path`.
    #[must_use]
    pub fn has_field(&self, field_path: &str) -> bool {
        self.diagnostics.iter().any(|diagnostic| diagnostic.field_path == field_path)
    }

    /// Converts the collection into `Ok(())` when empty, `Err(self)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one diagnostic was collected.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, diagnostic) in self.diagnostics.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl<'a> IntoIterator for &'a ValidationErrors {
    type IntoIter = std::slice::Iter<'a, Diagnostic>;
    type Item = &'a Diagnostic;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

impl IntoIterator for ValidationErrors {
    type IntoIter = std::vec::IntoIter<Diagnostic>;
    type Item = Diagnostic;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

// ============================================================================
// SECTION: Orchestrator Errors
// ============================================================================

/// Result of a full validate call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropsError {
    /// Defaulting failed; no rules were run.
    #[error(transparent)]
    Defaulting(#[from] DefaultingError),
    /// One or more rules failed.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

impl PropsError {
    /// Returns the diagnostics when this is a validation failure.
    #[must_use]
    pub const fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            Self::Defaulting(_) => None,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostic(path: &str, rule: &str, message: &str) -> Diagnostic {
        Diagnostic {
            field_path: path.to_string(),
            rule: rule.to_string(),
            param: None,
            message: message.to_string(),
        }
    }

    #[test]
    fn display_joins_every_diagnostic() {
        let mut errors = ValidationErrors::new();
        errors.push(diagnostic("Props.name", "required", "value is required"));
        errors.push(diagnostic("Props.replicas", "gt", "must be greater than 0"));
        assert_eq!(
            errors.to_string(),
            "Props.name: failed 'required' rule: value is required; Props.replicas: failed 'gt' \
             rule: must be greater than 0"
        );
    }

    #[test]
    fn into_result_is_ok_only_when_empty() {
        assert_eq!(ValidationErrors::new().into_result(), Ok(()));
        let mut errors = ValidationErrors::new();
        errors.push(diagnostic("Props.a", "required", "value is required"));
        assert!(errors.clone().into_result().is_err());
        assert!(errors.has_field("Props.a"));
        assert!(!errors.has_field("Props.b"));
    }

    #[test]
    fn props_error_exposes_validation_detail() {
        let mut errors = ValidationErrors::new();
        errors.push(diagnostic("Props.a", "required", "value is required"));
        let error = PropsError::from(errors);
        assert_eq!(error.validation().map(ValidationErrors::len), Some(1));
        let defaulting = PropsError::from(DefaultingError::TooDeep {
            path: "Props".to_string(),
            max_depth: 1,
        });
        assert!(defaulting.validation().is_none());
        assert_eq!(defaulting.to_string(), "Props: nesting exceeds max depth 1");
    }
}
