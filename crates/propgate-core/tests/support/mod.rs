// crates/propgate-core/tests/support/mod.rs
// ============================================================================
// Module: Test Support
// Description: Shared result helpers and fixture records for core integration tests.
// ============================================================================
//! ## Overview
//! Shared test helpers for consistent Result-based assertions, plus the
//! fixture records exercised by the integration suites.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    dead_code,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Mutex;

use propgate_core::AuditSink;
use propgate_core::FieldKind;
use propgate_core::FieldSpec;
use propgate_core::PropsError;
use propgate_core::Record;
use propgate_core::RecordSchema;
use propgate_core::SetDefaults;
use propgate_core::ValidationAuditEvent;
use propgate_core::can_update;
use serde::Deserialize;
use serde::Serialize;

// ========================================================================
// Test Result Helpers
// ========================================================================

/// Standard result type used across core integration tests.
pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Lightweight error type for test assertions.
#[derive(Debug)]
struct TestError {
    /// Human-readable failure message.
    message: String,
}

impl fmt::Display for TestError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}

impl Error for TestError {}

/// Returns an error when a test condition fails.
///
/// # Errors
/// Returns a `TestError` when the condition is false.
pub fn ensure(condition: bool, message: impl Into<String>) -> TestResult {
    if condition {
        Ok(())
    } else {
        Err(Box::new(TestError {
            message: message.into(),
        }))
    }
}

/// Asserts that a result is an error whose message contains `needle`.
///
/// # Errors
/// Returns a `TestError` when the result is `Ok` or the message differs.
pub fn assert_rejected(result: Result<(), PropsError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            ensure(message.contains(needle), format!("error '{message}' did not contain '{needle}'"))
        }
        Ok(()) => ensure(false, format!("expected rejection mentioning '{needle}'")),
    }
}

// ========================================================================
// Audit Capture
// ========================================================================

/// Audit sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    /// Captured events.
    pub events: Mutex<Vec<ValidationAuditEvent>>,
}

impl AuditSink for RecordingSink {
    fn record(&self, event: &ValidationAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ========================================================================
// Fixture Records
// ========================================================================

/// Child record with its own default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildProps {
    /// Value defaulted to 15 by the child itself.
    pub some_val: i64,
}

impl Record for ChildProps {
    fn schema() -> RecordSchema {
        RecordSchema::new("ChildProps")
            .field(FieldSpec::new("some_val", FieldKind::Int).with_default("15"))
    }
}

/// Parent that pins a different default for one child position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentProps {
    /// Child with a parent-level literal.
    pub child: ChildProps,
    /// Child without a parent-level literal.
    pub plain: ChildProps,
}

impl Record for ParentProps {
    fn schema() -> RecordSchema {
        RecordSchema::new("ParentProps")
            .field(
                FieldSpec::new("child", FieldKind::record::<ChildProps>())
                    .with_default(r#"{"some_val":10}"#),
            )
            .field(FieldSpec::new("plain", FieldKind::record::<ChildProps>()))
    }
}

/// Two mutually exclusive keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusiveProps {
    /// First key.
    pub key1: String,
    /// Second key.
    pub key2: String,
}

impl Record for ExclusiveProps {
    fn schema() -> RecordSchema {
        RecordSchema::new("ExclusiveProps")
            .field(FieldSpec::new("key1", FieldKind::String).with_rules("exclusive_of=key2"))
            .field(FieldSpec::new("key2", FieldKind::String).with_rules("exclusive_of=key1"))
    }
}

/// One exposed container port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSpec {
    /// Port name.
    pub name: String,
    /// Port number.
    pub port: u32,
    /// Transport protocol.
    pub protocol: String,
}

impl Record for PortSpec {
    fn schema() -> RecordSchema {
        RecordSchema::new("PortSpec")
            .field(FieldSpec::new("name", FieldKind::String).with_rules("required"))
            .field(FieldSpec::new("port", FieldKind::Uint).with_rules("required,gt=0,lte=65535"))
            .field(
                FieldSpec::new("protocol", FieldKind::String)
                    .with_default("TCP")
                    .with_rules("oneof=TCP UDP"),
            )
    }
}

/// Deployment configuration exercising most rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentProps {
    /// Deployment name.
    pub name: String,
    /// Container image reference.
    pub image: String,
    /// Application version.
    pub version: String,
    /// Replica count.
    pub replicas: u32,
    /// Exposed ports.
    pub ports: Vec<PortSpec>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Optional selector expression.
    pub selector: Option<String>,
    /// Raw values document.
    pub values: String,
    /// Rollout strategy.
    pub strategy: String,
    /// Service account, derived from the name when unset.
    pub service_account: String,
}

impl Record for DeploymentProps {
    fn schema() -> RecordSchema {
        RecordSchema::new("DeploymentProps")
            .field(FieldSpec::new("name", FieldKind::String).with_rules("required"))
            .field(FieldSpec::new("image", FieldKind::String).with_rules("required,image_uri"))
            .field(FieldSpec::new("version", FieldKind::String).with_rules("omitempty,version"))
            .field(
                FieldSpec::new("replicas", FieldKind::Uint)
                    .with_default("1")
                    .with_rules("gte=1,max=50"),
            )
            .field(
                FieldSpec::new("ports", FieldKind::list(FieldKind::record::<PortSpec>()))
                    .with_rules("required,dive"),
            )
            .field(
                FieldSpec::new("labels", FieldKind::map(FieldKind::String))
                    .with_rules("dive,required"),
            )
            .field(
                FieldSpec::new("selector", FieldKind::optional(FieldKind::String))
                    .with_rules("omitempty,expr"),
            )
            .field(FieldSpec::new("values", FieldKind::String).with_rules("omitempty,yaml"))
            .field(
                FieldSpec::new("strategy", FieldKind::String)
                    .with_default("rolling")
                    .with_rules("oneof=rolling recreate"),
            )
            .field(FieldSpec::new("service_account", FieldKind::String))
            .with_setter_hook::<Self>()
    }
}

impl SetDefaults for DeploymentProps {
    fn set_defaults(&mut self) {
        if can_update(&self.service_account) && !self.name.is_empty() {
            self.service_account = format!("{}-sa", self.name);
        }
    }
}

/// A deployment that passes every rule.
#[must_use]
pub fn valid_deployment() -> DeploymentProps {
    DeploymentProps {
        name: "web".to_string(),
        image: "gcr.io/acme/web:v1.4.0".to_string(),
        version: "v1.4.0".to_string(),
        ports: vec![PortSpec {
            name: "http".to_string(),
            port: 8080,
            protocol: String::new(),
        }],
        labels: BTreeMap::from([("app".to_string(), "web".to_string())]),
        selector: Some("request.path startsWith '/api' && replicas > %d".to_string()),
        values: "resources:\n  cpu: 500m\n".to_string(),
        ..DeploymentProps::default()
    }
}
