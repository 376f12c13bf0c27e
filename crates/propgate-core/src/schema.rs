// crates/propgate-core/src/schema.rs
// ============================================================================
// Module: Record Schema
// Description: Explicit per-type declarations of field kinds, rules, and
//              default literals.
// Purpose: Bind defaults and rules to record types without reflection.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A record type describes itself once through [`Record::schema`]. The engine
//! walks the record's `serde_json::Value` form guided by that schema, so any
//! `Serialize + DeserializeOwned` type can participate.
//!
//! ```
//! use propgate_core::FieldKind;
//! use propgate_core::FieldSpec;
//! use propgate_core::Record;
//! use propgate_core::RecordSchema;
//! use serde::Deserialize;
//! use serde::Serialize;
//!
//! #[derive(Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct ServiceProps {
//!     image: String,
//!     replicas: u32,
//! }
//!
//! impl Record for ServiceProps {
//!     fn schema() -> RecordSchema {
//!         RecordSchema::new("ServiceProps")
//!             .field(FieldSpec::new("image", FieldKind::String).with_rules("required,image_uri"))
//!             .field(FieldSpec::new("replicas", FieldKind::Uint).with_default("1"))
//!     }
//! }
//! ```
//!
//! Field names are the serialized (serde) names. Self-referential schemas are
//! not supported; a schema is a finite tree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::defaults::SetDefaults;
use crate::error::PropsError;
use crate::validator::Validator;

// ============================================================================
// SECTION: Record Trait
// ============================================================================

/// A configuration record the engine can default and validate.
pub trait Record: Serialize + DeserializeOwned {
    /// Returns the schema describing this record type.
    fn schema() -> RecordSchema;

    /// Applies defaults and rules using `validator`.
    ///
    /// # Errors
    ///
    /// Returns [`PropsError`] when defaulting fails or any rule is violated.
    fn validate(&mut self, validator: &Validator) -> Result<(), PropsError> {
        validator.validate(self)
    }
}

// ============================================================================
// SECTION: Kinds
// ============================================================================

/// Declared kind of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// Signed integer.
    Int,
    /// Unsigned integer.
    Uint,
    /// Floating point number.
    Float,
    /// Boolean.
    Bool,
    /// Opaque JSON value.
    Any,
    /// Nullable value of the inner kind.
    Optional(Box<FieldKind>),
    /// Ordered list of the inner kind.
    List(Box<FieldKind>),
    /// String-keyed map of the inner kind.
    Map(Box<FieldKind>),
    /// Nested record.
    Record(RecordSchema),
}

impl FieldKind {
    /// Nullable wrapper.
    #[must_use]
    pub fn optional(inner: Self) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// List wrapper.
    #[must_use]
    pub fn list(element: Self) -> Self {
        Self::List(Box::new(element))
    }

    /// Map wrapper.
    #[must_use]
    pub fn map(value: Self) -> Self {
        Self::Map(Box::new(value))
    }

    /// Nested record kind for `T`.
    #[must_use]
    pub fn record<T: Record>() -> Self {
        Self::Record(T::schema())
    }

    /// Short label used in messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Any => "any",
            Self::Optional(_) => "optional",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Record(_) => "record",
        }
    }

    /// Returns true when `value` has this kind's JSON shape. Null matches
    /// every kind and is treated as the zero value.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => true,
            (Self::String, Value::String(_))
            | (Self::Bool, Value::Bool(_))
            | (Self::List(_), Value::Array(_))
            | (Self::Map(_) | Self::Record(_), Value::Object(_)) => true,
            (Self::Int, Value::Number(number)) => number.is_i64(),
            (Self::Uint, Value::Number(number)) => number.is_u64(),
            (Self::Float, Value::Number(_)) => true,
            (Self::Optional(inner), value) => inner.accepts(value),
            _ => false,
        }
    }
}

// ============================================================================
// SECTION: Field Spec
// ============================================================================

/// Declaration of one record field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Serialized field name.
    name: String,
    /// Declared kind.
    kind: FieldKind,
    /// Rule declaration (`required,gt=0`).
    rules: String,
    /// Default literal.
    default_literal: Option<String>,
}

impl FieldSpec {
    /// Declares a field with no rules and no default.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            rules: String::new(),
            default_literal: None,
        }
    }

    /// Sets the rule declaration.
    #[must_use]
    pub fn with_rules(mut self, rules: impl Into<String>) -> Self {
        self.rules = rules.into();
        self
    }

    /// Sets the default literal. Primitive kinds take plain text (`"15"`,
    /// `"true"`, `"nginx"`); collections, records, and `Any` take JSON.
    #[must_use]
    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        self.default_literal = Some(literal.into());
        self
    }

    /// Serialized field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared kind.
    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Rule declaration text.
    #[must_use]
    pub fn rules(&self) -> &str {
        &self.rules
    }

    /// Default literal, when declared.
    #[must_use]
    pub fn default_literal(&self) -> Option<&str> {
        self.default_literal.as_deref()
    }
}

// ============================================================================
// SECTION: Record Schema
// ============================================================================

/// Setter hook operating on a record's value tree.
pub type SetterHook = fn(&mut Value) -> Result<(), String>;

/// Ordered field declarations for a record type.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    /// Record name, used as the root of field paths.
    name: String,
    /// Fields in declaration order.
    fields: Vec<FieldSpec>,
    /// Hook run after literal defaults.
    setter_hook: Option<SetterHook>,
}

impl RecordSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            setter_hook: None,
        }
    }

    /// Appends a field declaration.
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Registers `T`'s [`SetDefaults`] implementation as this schema's hook.
    #[must_use]
    pub fn with_setter_hook<T: Record + SetDefaults>(mut self) -> Self {
        self.setter_hook = Some(run_setter_hook::<T>);
        self
    }

    /// Record name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a field by serialized name.
    #[must_use]
    pub fn field_named(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Registered setter hook.
    #[must_use]
    pub const fn setter_hook(&self) -> Option<SetterHook> {
        self.setter_hook
    }
}

/// Round-trips a value tree through `T` to run its setter hook.
fn run_setter_hook<T: Record + SetDefaults>(value: &mut Value) -> Result<(), String> {
    let mut record: T = serde_json::from_value(value.clone()).map_err(|err| err.to_string())?;
    record.set_defaults();
    *value = serde_json::to_value(&record).map_err(|err| err.to_string())?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
