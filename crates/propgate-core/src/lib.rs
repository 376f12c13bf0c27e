// crates/propgate-core/src/lib.rs
// ============================================================================
// Module: Propgate Core Library
// Description: Configuration defaulting and validation engine.
// Purpose: Wire together schemas, defaulting, rules, and the orchestrator.
// Dependencies: crate::{audit, config, defaults, error, registry, rules, schema,
//              validator}
// ============================================================================

//! ## Overview
//! `propgate-core` gatekeeps configuration records ("props") before they are
//! handed to a downstream pipeline. A record declares its fields once through
//! a [`RecordSchema`]; [`Validator::validate`] then fills unset fields from
//! declared defaults and setter hooks, checks every field against its rules,
//! and returns every violation in one error.
//!
//! ```
//! use propgate_core::FieldKind;
//! use propgate_core::FieldSpec;
//! use propgate_core::Record;
//! use propgate_core::RecordSchema;
//! use propgate_core::Validator;
//! use serde::Deserialize;
//! use serde::Serialize;
//!
//! #[derive(Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct WorkerProps {
//!     image: String,
//!     replicas: u32,
//! }
//!
//! impl Record for WorkerProps {
//!     fn schema() -> RecordSchema {
//!         RecordSchema::new("WorkerProps")
//!             .field(FieldSpec::new("image", FieldKind::String).with_rules("required,image_uri"))
//!             .field(FieldSpec::new("replicas", FieldKind::Uint).with_default("1").with_rules("lte=10"))
//!     }
//! }
//!
//! let mut props = WorkerProps {
//!     image: "ghcr.io/acme/worker:v2".to_string(),
//!     ..WorkerProps::default()
//! };
//! assert!(props.validate(Validator::global()).is_ok());
//! assert_eq!(props.replicas, 1);
//! ```

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod config;
pub mod defaults;
pub mod error;
pub mod registry;
pub mod rules;
pub mod schema;
pub mod validator;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::ValidationAuditEvent;
pub use audit::ValidationOutcome;
pub use audit::ValidationStage;
pub use config::AuditConfig;
pub use config::ConfigError;
pub use config::EngineConfig;
pub use defaults::SetDefaults;
pub use defaults::ZeroValue;
pub use defaults::apply_defaults;
pub use defaults::apply_defaults_value;
pub use defaults::can_update;
pub use error::DefaultingError;
pub use error::Diagnostic;
pub use error::PropsError;
pub use error::ValidationErrors;
pub use propgate_grammar as grammar;
pub use registry::Directive;
pub use registry::RegistryError;
pub use registry::RuleFn;
pub use registry::RuleRegistry;
pub use registry::RuleRegistryBuilder;
pub use rules::FieldContext;
pub use schema::FieldKind;
pub use schema::FieldSpec;
pub use schema::Record;
pub use schema::RecordSchema;
pub use validator::Validator;
