// crates/propgate-core/src/validator.rs
// ============================================================================
// Module: Validation Orchestrator
// Description: Defaulting followed by full rule traversal.
// Purpose: Single entry point that accepts or rejects a configuration record.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`Validator::validate`] runs the defaulting engine, stops on a
//! [`DefaultingError`], then walks every field of the defaulted record and
//! collects every rule violation into one [`ValidationErrors`].
//!
//! Traversal rules:
//! - nested records and record elements are always visited;
//! - `dive` applies the remaining rules to each element of a list or map;
//! - `omitempty` skips the remaining rules when the value is zero;
//! - an absent optional runs only `required` and `exclusive_of`;
//! - a value whose JSON shape does not match its declared kind yields a
//!   `type` diagnostic and no further rules;
//! - a panicking rule is reported as a failure of that rule.
//!
//! A process-wide instance is available through [`Validator::global`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::path::Path;
use std::sync::Arc;
use std::sync::OnceLock;

use serde_json::Map;
use serde_json::Value;

use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::StderrAuditSink;
use crate::audit::ValidationAuditEvent;
use crate::audit::ValidationAuditEventParams;
use crate::audit::ValidationOutcome;
use crate::audit::ValidationStage;
use crate::config::ConfigError;
use crate::config::EngineConfig;
use crate::defaults::apply_defaults_value_with_depth;
use crate::defaults::apply_defaults_with_depth;
use crate::defaults::is_zero_value;
use crate::defaults::json_type;
use crate::error::DefaultingError;
use crate::error::Diagnostic;
use crate::error::PropsError;
use crate::error::ValidationErrors;
use crate::registry::Directive;
use crate::registry::RuleRegistry;
use crate::registry::is_presence_rule;
use crate::rules::FieldContext;
use crate::rules::failure_message;
use crate::schema::FieldKind;
use crate::schema::FieldSpec;
use crate::schema::Record;
use crate::schema::RecordSchema;

// ============================================================================
// SECTION: Global Instance
// ============================================================================

/// Process-wide validator.
static GLOBAL: OnceLock<Validator> = OnceLock::new();
/// Stand-in for absent record members.
static NULL: Value = Value::Null;

// ============================================================================
// SECTION: Validator
// ============================================================================

/// Rule registry, engine limits, and audit sink.
pub struct Validator {
    /// Frozen rule registry.
    registry: RuleRegistry,
    /// Engine limits.
    config: EngineConfig,
    /// Audit event sink.
    audit: Arc<dyn AuditSink>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Creates a validator with built-in rules, default limits, and no audit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: RuleRegistry::default(),
            config: EngineConfig::default(),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Creates a validator from a validated configuration, wiring the audit
    /// sink it names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is invalid or the audit
    /// log cannot be opened.
    pub fn from_config(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let audit: Arc<dyn AuditSink> = match (config.audit.enabled, config.audit.path.as_deref()) {
            (false, _) => Arc::new(NoopAuditSink),
            (true, None) => Arc::new(StderrAuditSink),
            (true, Some(path)) => Arc::new(
                FileAuditSink::new(Path::new(path.trim()))
                    .map_err(|err| ConfigError::Io(err.to_string()))?,
            ),
        };
        Ok(Self {
            registry: RuleRegistry::default(),
            config,
            audit,
        })
    }

    /// Loads configuration (see [`EngineConfig::load`]) and builds a validator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or sink setup fails.
    pub fn from_config_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_config(EngineConfig::load(path)?)
    }

    /// Replaces the rule registry.
    #[must_use]
    pub fn with_registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the process-wide validator, creating the default one on first
    /// use.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Installs `validator` as the process-wide instance.
    ///
    /// # Errors
    ///
    /// Returns `validator` back when the global instance already exists.
    pub fn install_global(validator: Self) -> Result<&'static Self, Self> {
        GLOBAL.set(validator)?;
        Ok(Self::global())
    }

    /// Rule registry.
    #[must_use]
    pub const fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------------

    /// Applies defaults, then validates every rule.
    ///
    /// # Errors
    ///
    /// Returns [`PropsError::Defaulting`] when defaulting fails (the record is
    /// untouched) or [`PropsError::Validation`] listing every violation.
    pub fn validate<T: Record>(&self, record: &mut T) -> Result<(), PropsError> {
        let schema = T::schema();
        let result = self.validate_typed(&schema, record);
        self.emit(&schema, &result);
        result
    }

    /// Validates rules without applying defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PropsError`] when the record cannot be converted or a rule
    /// fails.
    pub fn check<T: Record>(&self, record: &T) -> Result<(), PropsError> {
        let schema = T::schema();
        let result = serde_json::to_value(record)
            .map_err(|err| {
                PropsError::Defaulting(DefaultingError::Serialization {
                    record: schema.name().to_string(),
                    reason: err.to_string(),
                })
            })
            .and_then(|value| self.check_value(&schema, &value).map_err(PropsError::from));
        self.emit(&schema, &result);
        result
    }

    /// Applies defaults to and validates a raw value tree.
    ///
    /// # Errors
    ///
    /// Returns [`PropsError`] as for [`Validator::validate`].
    pub fn validate_value(&self, schema: &RecordSchema, value: &mut Value) -> Result<(), PropsError> {
        let result = apply_defaults_value_with_depth(schema, value, self.config.max_depth)
            .map_err(PropsError::from)
            .and_then(|()| self.check_value(schema, value).map_err(PropsError::from));
        self.emit(schema, &result);
        result
    }

    /// Validates rules on a raw value tree without defaulting or auditing.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] listing every violation.
    pub fn check_value(&self, schema: &RecordSchema, value: &Value) -> Result<(), ValidationErrors> {
        let mut walker = Walker {
            registry: &self.registry,
            config: &self.config,
            errors: ValidationErrors::new(),
        };
        walker.record(schema, value, schema.name(), 0);
        walker.errors.into_result()
    }

    /// Applies defaults under this validator's depth limit.
    ///
    /// # Errors
    ///
    /// Returns [`DefaultingError`]; the record is untouched on error.
    pub fn apply_defaults<T: Record>(&self, record: &mut T) -> Result<(), DefaultingError> {
        apply_defaults_with_depth(record, self.config.max_depth)
    }

    /// Typed validate without auditing.
    fn validate_typed<T: Record>(&self, schema: &RecordSchema, record: &mut T) -> Result<(), PropsError> {
        apply_defaults_with_depth(record, self.config.max_depth)?;
        let value = serde_json::to_value(&*record).map_err(|err| DefaultingError::Serialization {
            record: schema.name().to_string(),
            reason: err.to_string(),
        })?;
        self.check_value(schema, &value)?;
        Ok(())
    }

    /// Emits one audit event for a finished call.
    fn emit(&self, schema: &RecordSchema, result: &Result<(), PropsError>) {
        let (stage, diagnostic_count) = match result {
            Err(PropsError::Defaulting(_)) => (ValidationStage::Defaults, 0),
            Err(PropsError::Validation(errors)) => (ValidationStage::Rules, errors.len()),
            Ok(()) => (ValidationStage::Rules, 0),
        };
        let outcome =
            if result.is_ok() { ValidationOutcome::Accepted } else { ValidationOutcome::Rejected };
        self.audit.record(&ValidationAuditEvent::new(ValidationAuditEventParams {
            record: schema.name().to_string(),
            stage,
            outcome,
            diagnostic_count,
            error: result.as_ref().err().map(ToString::to_string),
        }));
    }
}

// ============================================================================
// SECTION: Traversal
// ============================================================================

/// Rule traversal state for one call.
struct Walker<'v> {
    /// Rule registry.
    registry: &'v RuleRegistry,
    /// Engine limits.
    config: &'v EngineConfig,
    /// Collected diagnostics.
    errors: ValidationErrors,
}

impl Walker<'_> {
    /// Visits every field of a record.
    fn record(&mut self, schema: &RecordSchema, value: &Value, path: &str, depth: usize) {
        if depth > self.config.max_depth {
            let message = format!("nesting exceeds max depth {}", self.config.max_depth);
            self.report(path, "max_depth", None, message);
            return;
        }
        let Some(members) = value.as_object() else {
            self.report(path, "type", None, format!("expected record, found {}", json_type(value)));
            return;
        };
        let siblings: Vec<&str> = schema.fields().iter().map(FieldSpec::name).collect();
        for field in schema.fields() {
            let field_path = format!("{path}.{}", field.name());
            let directives = self.registry.parse_declaration(field.rules(), &siblings);
            let field_value = members.get(field.name()).unwrap_or(&NULL);
            self.field(field.kind(), &directives, field_value, members, &field_path, depth);
        }
    }

    /// Applies directives to one value, then recurses structurally.
    fn field(
        &mut self,
        kind: &FieldKind,
        directives: &[Directive],
        value: &Value,
        parent: &Map<String, Value>,
        path: &str,
        depth: usize,
    ) {
        let mut kind = kind;
        let mut absent = false;
        while let FieldKind::Optional(inner) = kind {
            absent |= value.is_null();
            kind = inner.as_ref();
        }
        if !kind.accepts(value) {
            self.report(
                path,
                "type",
                None,
                format!("expected {}, found {}", kind.label(), json_type(value)),
            );
            return;
        }

        for (index, directive) in directives.iter().enumerate() {
            match directive {
                Directive::OmitEmpty => {
                    if is_zero_value(value) {
                        return;
                    }
                }
                Directive::Dive => {
                    if !absent {
                        self.dive(kind, &directives[index + 1 ..], value, parent, path, depth);
                    }
                    return;
                }
                Directive::Unknown {
                    name,
                    param,
                } => self.report(path, name, param.as_deref(), "unknown rule".to_string()),
                Directive::Rule {
                    name,
                    param,
                } => {
                    if absent && !is_presence_rule(name) {
                        continue;
                    }
                    self.run_rule(name, param.as_deref(), kind, value, parent, path);
                }
            }
        }

        if !absent {
            self.descend(kind, value, parent, path, depth);
        }
    }

    /// Applies `rest` to each element of a collection.
    fn dive(
        &mut self,
        kind: &FieldKind,
        rest: &[Directive],
        value: &Value,
        parent: &Map<String, Value>,
        path: &str,
        depth: usize,
    ) {
        let next = depth + 1;
        match (kind, value) {
            (FieldKind::List(element), Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    self.field(element, rest, item, parent, &format!("{path}[{index}]"), next);
                }
            }
            (FieldKind::Map(element), Value::Object(entries)) => {
                for (key, item) in entries {
                    self.field(element, rest, item, parent, &format!("{path}[{key}]"), next);
                }
            }
            (FieldKind::Any, Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    self.field(&FieldKind::Any, rest, item, parent, &format!("{path}[{index}]"), next);
                }
            }
            (FieldKind::Any, Value::Object(entries)) => {
                for (key, item) in entries {
                    self.field(&FieldKind::Any, rest, item, parent, &format!("{path}[{key}]"), next);
                }
            }
            (FieldKind::List(_) | FieldKind::Map(_), Value::Null) => {}
            _ => self.report(path, "dive", None, format!("cannot dive into {}", kind.label())),
        }
    }

    /// Visits nested records reachable without `dive`.
    fn descend(
        &mut self,
        kind: &FieldKind,
        value: &Value,
        parent: &Map<String, Value>,
        path: &str,
        depth: usize,
    ) {
        match (kind, value) {
            (FieldKind::Record(schema), Value::Object(_)) => {
                self.record(schema, value, path, depth + 1);
            }
            (FieldKind::List(element), Value::Array(items)) if contains_record(element) => {
                for (index, item) in items.iter().enumerate() {
                    self.field(element, &[], item, parent, &format!("{path}[{index}]"), depth + 1);
                }
            }
            (FieldKind::Map(element), Value::Object(entries)) if contains_record(element) => {
                for (key, item) in entries {
                    self.field(element, &[], item, parent, &format!("{path}[{key}]"), depth + 1);
                }
            }
            _ => {}
        }
    }

    /// Runs one rule, converting a panic into a failure.
    fn run_rule(
        &mut self,
        name: &str,
        param: Option<&str>,
        kind: &FieldKind,
        value: &Value,
        parent: &Map<String, Value>,
        path: &str,
    ) {
        let Some(rule) = self.registry.get(name) else {
            self.report(path, name, param, "unknown rule".to_string());
            return;
        };
        let ctx = FieldContext::new(value, kind, Some(parent), path, param, self.config);
        match catch_unwind(AssertUnwindSafe(|| rule(&ctx))) {
            Ok(true) => {}
            Ok(false) => self.report(path, name, param, failure_message(name, param)),
            Err(_) => self.report(path, name, param, "rule panicked".to_string()),
        }
    }

    /// Records a diagnostic.
    fn report(&mut self, path: &str, rule: &str, param: Option<&str>, message: String) {
        self.errors.push(Diagnostic {
            field_path: path.to_string(),
            rule: rule.to_string(),
            param: param.map(str::to_string),
            message,
        });
    }
}

/// Returns true when a kind contains a record at any collection depth.
fn contains_record(kind: &FieldKind) -> bool {
    match kind {
        FieldKind::Record(_) => true,
        FieldKind::Optional(inner) | FieldKind::List(inner) | FieldKind::Map(inner) => {
            contains_record(inner)
        }
        _ => false,
    }
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

    use serde_json::json;

    use super::*;
    use crate::registry::RuleRegistryBuilder;

    fn rules_of(errors: &ValidationErrors) -> Vec<(&str, &str)> {
        errors.iter().map(|d| (d.field_path.as_str(), d.rule.as_str())).collect()
    }

    #[test]
    fn dive_applies_rules_to_elements() {
        let schema = RecordSchema::new("Props")
            .field(FieldSpec::new("ports", FieldKind::list(FieldKind::Int)).with_rules("required,dive,gt=0"));
        let errors = Validator::new().check_value(&schema, &json!({"ports": [80, 0, -1]})).unwrap_err();
        assert_eq!(rules_of(&errors), [("Props.ports[1]", "gt"), ("Props.ports[2]", "gt")]);
    }

    #[test]
    fn empty_collection_passes_dive_without_required() {
        let schema = RecordSchema::new("Props")
            .field(FieldSpec::new("ports", FieldKind::list(FieldKind::Int)).with_rules("dive,gt=0"));
        assert!(Validator::new().check_value(&schema, &json!({"ports": []})).is_ok());
    }

    #[test]
    fn omitempty_skips_zero_values() {
        let schema = RecordSchema::new("Props")
            .field(FieldSpec::new("image", FieldKind::String).with_rules("omitempty,image_uri"));
        let validator = Validator::new();
        assert!(validator.check_value(&schema, &json!({"image": ""})).is_ok());
        assert!(validator.check_value(&schema, &json!({"image": "bad image"})).is_err());
    }

    #[test]
    fn absent_optional_runs_presence_rules_only() {
        let schema = RecordSchema::new("Props")
            .field(FieldSpec::new("replicas", FieldKind::optional(FieldKind::Int)).with_rules("gt=0"))
            .field(FieldSpec::new("name", FieldKind::optional(FieldKind::String)).with_rules("required"));
        let errors = Validator::new().check_value(&schema, &json!({})).unwrap_err();
        assert_eq!(rules_of(&errors), [("Props.name", "required")]);
    }

    #[test]
    fn kind_mismatch_is_reported_once() {
        let schema = RecordSchema::new("Props")
            .field(FieldSpec::new("replicas", FieldKind::Int).with_rules("gt=0,lt=10"));
        let errors = Validator::new().check_value(&schema, &json!({"replicas": "3"})).unwrap_err();
        assert_eq!(rules_of(&errors), [("Props.replicas", "type")]);
    }

    #[test]
    fn unknown_rules_are_reported() {
        let schema = RecordSchema::new("Props")
            .field(FieldSpec::new("host", FieldKind::String).with_rules("hostname"));
        let errors = Validator::new().check_value(&schema, &json!({"host": "a"})).unwrap_err();
        assert_eq!(errors.diagnostics()[0].message, "unknown rule");
    }

    #[test]
    fn panicking_rule_counts_as_failure() {
        fn explode(_: &FieldContext<'_>) -> bool {
            panic!("boom");
        }
        let registry = RuleRegistryBuilder::with_builtins().register("explode", explode).unwrap().build();
        let validator = Validator::new().with_registry(registry);
        let schema = RecordSchema::new("Props")
            .field(FieldSpec::new("name", FieldKind::String).with_rules("explode,required"));
        let errors = validator.check_value(&schema, &json!({"name": ""})).unwrap_err();
        assert_eq!(rules_of(&errors), [("Props.name", "explode"), ("Props.name", "required")]);
        assert_eq!(errors.diagnostics()[0].message, "rule panicked");
    }

    #[test]
    fn nested_records_are_always_visited() {
        let child = RecordSchema::new("Child").field(FieldSpec::new("name", FieldKind::String).with_rules("required"));
        let schema = RecordSchema::new("Parent")
            .field(FieldSpec::new("one", FieldKind::Record(child.clone())))
            .field(FieldSpec::new("many", FieldKind::map(FieldKind::Record(child))));
        let errors = Validator::new()
            .check_value(&schema, &json!({"one": {}, "many": {"a": {"name": "x"}, "b": {}}}))
            .unwrap_err();
        assert_eq!(rules_of(&errors), [("Parent.one.name", "required"), ("Parent.many[b].name", "required")]);
    }

    #[test]
    fn global_instance_is_shared() {
        assert!(std::ptr::eq(Validator::global(), Validator::global()));
    }

    #[test]
    fn concurrent_first_callers_share_one_global() {
        let barrier = std::sync::Barrier::new(8);
        let instances: Vec<&'static Validator> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0 .. 8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        Validator::global()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });
        assert!(instances.iter().all(|instance| std::ptr::eq(*instance, Validator::global())));
    }
}
