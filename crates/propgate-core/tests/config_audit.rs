// crates/propgate-core/tests/config_audit.rs
// ============================================================================
// Module: Config and Audit Tests
// Description: Engine configuration loading and audit event emission.
// Purpose: Ensure limits reach the rules and every call is audited once.
// ============================================================================

//! Integration tests for engine configuration and validation audit events.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod support;

use std::fs;
use std::sync::Arc;

use propgate_core::ConfigError;
use propgate_core::EngineConfig;
use propgate_core::FieldKind;
use propgate_core::FieldSpec;
use propgate_core::Record;
use propgate_core::RecordSchema;
use propgate_core::ValidationOutcome;
use propgate_core::ValidationStage;
use propgate_core::Validator;
use serde_json::Value;
use serde_json::json;
use support::DeploymentProps;
use support::RecordingSink;
use support::TestResult;
use support::ensure;
use support::valid_deployment;
use tempfile::TempDir;

fn assert_invalid(result: Result<EngineConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            ensure(message.contains(needle), format!("error '{message}' did not contain '{needle}'"))
        }
        Ok(_) => ensure(false, format!("expected invalid config containing '{needle}'")),
    }
}

#[test]
fn config_file_overrides_limits() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("propgate.toml");
    fs::write(&path, "max_depth = 4\nmax_expression_bytes = 64\n")?;
    let config = EngineConfig::load(Some(&path))?;
    ensure(config.max_depth == 4, format!("max_depth {}", config.max_depth))?;
    ensure(config.expr_limits().max_bytes == 64, "expression limit not carried")?;
    ensure(!config.audit.enabled, "audit enabled by default")
}

#[test]
fn missing_config_file_is_io_error() -> TestResult {
    let dir = TempDir::new()?;
    let result = EngineConfig::load(Some(&dir.path().join("absent.toml")));
    ensure(matches!(result, Err(ConfigError::Io(_))), format!("got {result:?}"))
}

#[test]
fn out_of_range_limits_are_invalid() -> TestResult {
    assert_invalid(EngineConfig::from_toml_str("max_depth = 0"), "max_depth must be between 1 and 512")?;
    assert_invalid(
        EngineConfig::from_toml_str("max_expression_nesting = 1000"),
        "max_expression_nesting must be between 1 and 256",
    )?;
    assert_invalid(EngineConfig::from_toml_str("[audit]\npath = \"  \""), "audit.path must be non-empty")
}

#[test]
fn unknown_keys_fail_to_parse() -> TestResult {
    let result = EngineConfig::from_toml_str("max_dept = 3");
    ensure(matches!(result, Err(ConfigError::Parse(_))), format!("got {result:?}"))
}

#[test]
fn expression_limits_reach_the_rule() -> TestResult {
    let config = EngineConfig::from_toml_str("max_expression_bytes = 8")?;
    let validator = Validator::from_config(config)?;
    let schema =
        RecordSchema::new("Props").field(FieldSpec::new("when", FieldKind::String).with_rules("expr"));
    validator.check_value(&schema, &json!({"when": "a > 1"}))?;
    let errors = validator.check_value(&schema, &json!({"when": "alpha > 100"})).unwrap_err();
    ensure(errors.has_field("Props.when"), format!("{errors}"))
}

#[test]
fn depth_limit_stops_runaway_nesting() -> TestResult {
    let validator = Validator::from_config(EngineConfig::from_toml_str("max_depth = 1")?)?;
    let inner = RecordSchema::new("Inner").field(FieldSpec::new("n", FieldKind::Int));
    let middle = RecordSchema::new("Middle").field(FieldSpec::new("inner", FieldKind::Record(inner)));
    let outer = RecordSchema::new("Outer").field(FieldSpec::new("middle", FieldKind::Record(middle)));
    let mut value = json!({});
    let error = validator.validate_value(&outer, &mut value).unwrap_err();
    ensure(error.to_string().contains("max depth 1"), format!("{error}"))
}

#[test]
fn every_call_emits_one_event() -> TestResult {
    let sink = Arc::new(RecordingSink::default());
    let validator = Validator::new().with_audit_sink(sink.clone());

    let mut good = valid_deployment();
    validator.validate(&mut good)?;
    let mut bad = DeploymentProps {
        name: String::new(),
        ..valid_deployment()
    };
    let _ = validator.validate(&mut bad);
    let mut broken = json!({"ports": "http"});
    let _ = validator.validate_value(&DeploymentProps::schema(), &mut broken);
    let _ = validator.check_value(&DeploymentProps::schema(), &json!({}));

    let events = sink.events.lock().map_err(|_| "sink poisoned")?;
    ensure(events.len() == 3, format!("expected 3 events, got {}", events.len()))?;
    ensure(
        events[0].outcome == ValidationOutcome::Accepted && events[0].diagnostic_count == 0,
        format!("{:?}", events[0]),
    )?;
    ensure(
        events[1].outcome == ValidationOutcome::Rejected
            && events[1].stage == ValidationStage::Rules
            && events[1].diagnostic_count == 1,
        format!("{:?}", events[1]),
    )?;
    ensure(
        events[2].stage == ValidationStage::Defaults && events[2].error.is_some(),
        format!("{:?}", events[2]),
    )?;
    ensure(events.iter().all(|event| event.record == "DeploymentProps"), "record name missing")
}

#[test]
fn file_audit_sink_writes_json_lines() -> TestResult {
    let dir = TempDir::new()?;
    let log = dir.path().join("audit.jsonl");
    let config_path = dir.path().join("propgate.toml");
    fs::write(&config_path, format!("[audit]\nenabled = true\npath = {:?}\n", log.display().to_string()))?;
    let validator = Validator::from_config_file(Some(&config_path))?;

    let mut props = valid_deployment();
    validator.validate(&mut props)?;
    let mut bad = DeploymentProps::default();
    let _ = validator.validate(&mut bad);

    let content = fs::read_to_string(&log)?;
    let lines: Vec<Value> =
        content.lines().map(serde_json::from_str).collect::<Result<_, _>>()?;
    ensure(lines.len() == 2, format!("expected 2 lines, got {content}"))?;
    ensure(lines[0]["event"] == json!("props_validate"), format!("{}", lines[0]))?;
    ensure(lines[0]["outcome"] == json!("accepted"), format!("{}", lines[0]))?;
    ensure(lines[1]["outcome"] == json!("rejected"), format!("{}", lines[1]))?;
    ensure(lines[1]["stage"] == json!("rules"), format!("{}", lines[1]))
}
