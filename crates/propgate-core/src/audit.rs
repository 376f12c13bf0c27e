// crates/propgate-core/src/audit.rs
// ============================================================================
// Module: Validation Audit Logging
// Description: Structured audit events for validate calls.
// Purpose: Emit one JSON-line event per validation without a logging stack.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Each orchestrator call emits exactly one [`ValidationAuditEvent`] through
//! the validator's [`AuditSink`]. Sinks are deliberately small so hosts can
//! forward events to their own logging pipeline by implementing the trait.
//! Events carry counts and error text only, never field values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Engine stage that produced the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    /// Default population.
    Defaults,
    /// Rule traversal.
    Rules,
}

/// Overall result of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Record accepted.
    Accepted,
    /// Record rejected.
    Rejected,
}

/// Validation audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Record (schema) name.
    pub record: String,
    /// Last stage that ran.
    pub stage: ValidationStage,
    /// Call outcome.
    pub outcome: ValidationOutcome,
    /// Number of rule diagnostics.
    pub diagnostic_count: usize,
    /// Rendered error when rejected.
    pub error: Option<String>,
}

/// Inputs required to construct a validation audit event.
pub struct ValidationAuditEventParams {
    /// Record (schema) name.
    pub record: String,
    /// Last stage that ran.
    pub stage: ValidationStage,
    /// Call outcome.
    pub outcome: ValidationOutcome,
    /// Number of rule diagnostics.
    pub diagnostic_count: usize,
    /// Rendered error when rejected.
    pub error: Option<String>,
}

impl ValidationAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: ValidationAuditEventParams) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event: "props_validate",
            timestamp_ms,
            record: params.record,
            stage: params.stage,
            outcome: params.outcome,
            diagnostic_count: params.diagnostic_count,
            error: params.error,
        }
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for validation events.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &ValidationAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &ValidationAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &ValidationAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &ValidationAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use serde_json::Value;

    use super::*;

    fn rejected_event() -> ValidationAuditEvent {
        ValidationAuditEvent::new(ValidationAuditEventParams {
            record: "DeploymentProps".to_string(),
            stage: ValidationStage::Rules,
            outcome: ValidationOutcome::Rejected,
            diagnostic_count: 2,
            error: Some("DeploymentProps.name: failed 'required' rule".to_string()),
        })
    }

    #[test]
    fn event_serializes_with_snake_case_labels() {
        let payload: Value = serde_json::to_value(rejected_event()).unwrap();
        assert_eq!(payload["event"], "props_validate");
        assert_eq!(payload["stage"], "rules");
        assert_eq!(payload["outcome"], "rejected");
        assert_eq!(payload["diagnostic_count"], 2);
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path).unwrap();
        sink.record(&rejected_event());
        sink.record(&rejected_event());

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["record"], "DeploymentProps");
    }
}
