// crates/propgate-core/src/defaults.rs
// ============================================================================
// Module: Defaulting Engine
// Description: Recursive default population over a record's value tree.
// Purpose: Fill zero fields from literals and setter hooks without clobbering
//          caller-set values.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Defaulting walks a record depth-first in declaration order:
//! - a zero primitive takes its parsed literal; a non-zero one is untouched;
//! - a null collection takes its literal, or an empty collection;
//! - a null optional stays null unless a literal is declared;
//! - a nested record first takes the parent's literal for each still-zero
//!   sub-field it names, then its own defaults, then its setter hook;
//! - the enclosing record's setter hook runs after all of its fields.
//!
//! Every literal is parsed even when it is not applied, so a malformed
//! declaration always fails. Work happens on a copy that replaces the input
//! only when the whole walk succeeded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde_json::Map;
use serde_json::Value;

use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::DefaultingError;
use crate::schema::FieldKind;
use crate::schema::Record;
use crate::schema::RecordSchema;

// ============================================================================
// SECTION: Hook Capability
// ============================================================================

/// Custom defaulting logic run after literal defaults.
///
/// Register with [`RecordSchema::with_setter_hook`]. Use [`can_update`] to
/// avoid overwriting values the caller set explicitly.
pub trait SetDefaults {
    /// Computes remaining defaults in place.
    fn set_defaults(&mut self);
}

/// Zero-value test for hook code.
pub trait ZeroValue {
    /// Returns true when the value is still at its zero/unset state.
    fn is_zero(&self) -> bool;
}

/// Reports whether `value` is still zero and may be defaulted.
#[must_use]
pub fn can_update<T: ZeroValue + ?Sized>(value: &T) -> bool {
    value.is_zero()
}

impl ZeroValue for str {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl ZeroValue for String {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl ZeroValue for bool {
    fn is_zero(&self) -> bool {
        !*self
    }
}

/// Implements [`ZeroValue`] for numeric primitives.
macro_rules! impl_zero_numeric {
    ($($ty:ty => $zero:expr),* $(,)?) => {
        $(
            impl ZeroValue for $ty {
                fn is_zero(&self) -> bool {
                    *self == $zero
                }
            }
        )*
    };
}

impl_zero_numeric!(
    i8 => 0, i16 => 0, i32 => 0, i64 => 0, isize => 0,
    u8 => 0, u16 => 0, u32 => 0, u64 => 0, usize => 0,
    f32 => 0.0, f64 => 0.0,
);

impl<T> ZeroValue for Option<T> {
    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

impl<T> ZeroValue for Vec<T> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> ZeroValue for BTreeMap<K, V> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V, S> ZeroValue for HashMap<K, V, S> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl ZeroValue for Value {
    fn is_zero(&self) -> bool {
        is_zero_value(self)
    }
}

/// Zero test over the value tree: null, `false`, `0`, `""`, empty
/// collections, and objects whose every member is zero.
#[must_use]
pub fn is_zero_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n == 0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(members) => members.values().all(is_zero_value),
    }
}

// ============================================================================
// SECTION: Entry Points
// ============================================================================

/// Applies defaults to a typed record with the default depth limit.
///
/// # Errors
///
/// Returns [`DefaultingError`]; the record is unchanged on error.
pub fn apply_defaults<T: Record>(record: &mut T) -> Result<(), DefaultingError> {
    apply_defaults_with_depth(record, DEFAULT_MAX_DEPTH)
}

/// Applies defaults to a raw value tree with the default depth limit.
///
/// # Errors
///
/// Returns [`DefaultingError`]; the value is unchanged on error.
pub fn apply_defaults_value(schema: &RecordSchema, value: &mut Value) -> Result<(), DefaultingError> {
    apply_defaults_value_with_depth(schema, value, DEFAULT_MAX_DEPTH)
}

/// Typed defaulting under an explicit depth limit.
pub(crate) fn apply_defaults_with_depth<T: Record>(
    record: &mut T,
    max_depth: usize,
) -> Result<(), DefaultingError> {
    let schema = T::schema();
    let serialization = |err: serde_json::Error| DefaultingError::Serialization {
        record: schema.name().to_string(),
        reason: err.to_string(),
    };
    let mut value = serde_json::to_value(&*record).map_err(serialization)?;
    apply_defaults_value_with_depth(&schema, &mut value, max_depth)?;
    *record = serde_json::from_value(value).map_err(serialization)?;
    Ok(())
}

/// Untyped defaulting under an explicit depth limit.
pub(crate) fn apply_defaults_value_with_depth(
    schema: &RecordSchema,
    value: &mut Value,
    max_depth: usize,
) -> Result<(), DefaultingError> {
    let mut working = value.clone();
    Defaulter {
        max_depth,
    }
    .record(schema, &mut working, schema.name(), 0)?;
    *value = working;
    Ok(())
}

// ============================================================================
// SECTION: Walker
// ============================================================================

/// Depth-limited default walker.
struct Defaulter {
    /// Maximum nesting depth.
    max_depth: usize,
}

impl Defaulter {
    /// Defaults every field of a record, then runs its setter hook.
    fn record(
        &self,
        schema: &RecordSchema,
        value: &mut Value,
        path: &str,
        depth: usize,
    ) -> Result<(), DefaultingError> {
        if depth > self.max_depth {
            return Err(DefaultingError::TooDeep {
                path: path.to_string(),
                max_depth: self.max_depth,
            });
        }
        let Value::Object(members) = value else {
            return Err(DefaultingError::InvalidRecord {
                path: path.to_string(),
                found: json_type(value),
            });
        };
        for field in schema.fields() {
            let field_path = format!("{path}.{}", field.name());
            if let Some(slot) = members.get_mut(field.name()) {
                self.field(field.kind(), field.default_literal(), slot, &field_path, depth)?;
            } else {
                let mut slot = Value::Null;
                self.field(field.kind(), field.default_literal(), &mut slot, &field_path, depth)?;
                if !slot.is_null() {
                    members.insert(field.name().to_string(), slot);
                }
            }
        }
        if let Some(hook) = schema.setter_hook() {
            hook(value).map_err(|reason| DefaultingError::Hook {
                record: schema.name().to_string(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Defaults one slot according to its kind.
    fn field(
        &self,
        kind: &FieldKind,
        literal: Option<&str>,
        slot: &mut Value,
        path: &str,
        depth: usize,
    ) -> Result<(), DefaultingError> {
        let parsed = literal.map(|text| parse_literal(kind, text, path)).transpose()?;
        match kind {
            FieldKind::Optional(inner) => {
                if slot.is_null() {
                    let Some(parsed) = parsed else {
                        return Ok(());
                    };
                    *slot = parsed;
                }
                self.field(inner, None, slot, path, depth)
            }
            FieldKind::Record(schema) => {
                if slot.is_null() {
                    *slot = Value::Object(Map::new());
                }
                if let Some(overrides) = parsed {
                    overlay_zero_members(slot, overrides);
                }
                self.record(schema, slot, path, depth + 1)
            }
            FieldKind::List(element) => {
                if slot.is_null() {
                    *slot = parsed.unwrap_or_else(|| Value::Array(Vec::new()));
                }
                if let Value::Array(items) = slot {
                    for (index, item) in items.iter_mut().enumerate() {
                        self.element(element, item, &format!("{path}[{index}]"), depth)?;
                    }
                }
                Ok(())
            }
            FieldKind::Map(element) => {
                if slot.is_null() {
                    *slot = parsed.unwrap_or_else(|| Value::Object(Map::new()));
                }
                if let Value::Object(entries) = slot {
                    for (key, item) in entries.iter_mut() {
                        self.element(element, item, &format!("{path}[{key}]"), depth)?;
                    }
                }
                Ok(())
            }
            FieldKind::String
            | FieldKind::Int
            | FieldKind::Uint
            | FieldKind::Float
            | FieldKind::Bool
            | FieldKind::Any => {
                if let Some(parsed) = parsed
                    && is_zero_value(slot)
                {
                    *slot = parsed;
                }
                Ok(())
            }
        }
    }

    /// Recurses into a collection element.
    fn element(
        &self,
        kind: &FieldKind,
        item: &mut Value,
        path: &str,
        depth: usize,
    ) -> Result<(), DefaultingError> {
        let next = depth + 1;
        if next > self.max_depth {
            return Err(DefaultingError::TooDeep {
                path: path.to_string(),
                max_depth: self.max_depth,
            });
        }
        self.field(kind, None, item, path, next)
    }
}

// ============================================================================
// SECTION: Literals
// ============================================================================

/// Parses a literal according to `kind`.
fn parse_literal(kind: &FieldKind, literal: &str, path: &str) -> Result<Value, DefaultingError> {
    let malformed = |reason: String| DefaultingError::MalformedLiteral {
        field: path.to_string(),
        literal: literal.to_string(),
        reason,
    };
    match kind {
        FieldKind::String => Ok(Value::String(literal.to_string())),
        FieldKind::Int => literal
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|err| malformed(err.to_string())),
        FieldKind::Uint => literal
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .map_err(|err| malformed(err.to_string())),
        FieldKind::Float => {
            let number = literal.trim().parse::<f64>().map_err(|err| malformed(err.to_string()))?;
            serde_json::Number::from_f64(number)
                .map(Value::Number)
                .ok_or_else(|| malformed("number is not finite".to_string()))
        }
        FieldKind::Bool => literal
            .trim()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|err| malformed(err.to_string())),
        FieldKind::Optional(inner) => parse_literal(inner, literal, path),
        FieldKind::Any | FieldKind::List(_) | FieldKind::Map(_) | FieldKind::Record(_) => {
            let value: Value =
                serde_json::from_str(literal).map_err(|err| malformed(err.to_string()))?;
            conform(kind, &value).map_err(malformed)?;
            Ok(value)
        }
    }
}

/// Checks a JSON literal against `kind`, recursively.
fn conform(kind: &FieldKind, value: &Value) -> Result<(), String> {
    match (kind, value) {
        (FieldKind::Any, _) | (FieldKind::Optional(_), Value::Null) => Ok(()),
        (FieldKind::Optional(inner), value) => conform(inner, value),
        (FieldKind::List(element), Value::Array(items)) => {
            items.iter().try_for_each(|item| conform(element, item))
        }
        (FieldKind::Map(element), Value::Object(entries)) => {
            entries.values().try_for_each(|item| conform(element, item))
        }
        (FieldKind::Record(schema), Value::Object(members)) => {
            for (name, member) in members {
                let Some(field) = schema.field_named(name) else {
                    return Err(format!("unknown field `{name}` for {}", schema.name()));
                };
                conform(field.kind(), member)?;
            }
            Ok(())
        }
        (kind, value) if !value.is_null() && kind.accepts(value) => Ok(()),
        (kind, value) => Err(format!("expected {}, found {}", kind.label(), json_type(value))),
    }
}

/// Sets each member of `overrides` whose target in `slot` is still zero.
fn overlay_zero_members(slot: &mut Value, overrides: Value) {
    let (Value::Object(target), Value::Object(source)) = (slot, overrides) else {
        return;
    };
    for (name, replacement) in source {
        let current = target.entry(name).or_insert(Value::Null);
        if current.is_object() && replacement.is_object() {
            overlay_zero_members(current, replacement);
        } else if is_zero_value(current) {
            *current = replacement;
        }
    }
}

/// JSON type label for messages.
pub(crate) const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
