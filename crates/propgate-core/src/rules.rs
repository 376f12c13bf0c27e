// crates/propgate-core/src/rules.rs
// ============================================================================
// Module: Rule Library
// Description: Field context and the built-in rule predicates.
// Purpose: Evaluate one named rule against one field value.
// Dependencies: propgate-grammar, serde_json
// ============================================================================

//! ## Overview
//! A rule is a pure predicate over a [`FieldContext`]. Rules read the value,
//! its declared kind, the rule parameter, and (for cross-field rules) the
//! enclosing record. A rule applied to a kind it does not understand fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;

use propgate_grammar::is_valid_expression_with_limits;
use propgate_grammar::is_valid_image_reference;
use propgate_grammar::is_valid_version;
use propgate_grammar::is_valid_yaml_document;
use propgate_grammar::round_trips_yaml;
use serde_json::Map;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::defaults::is_zero_value;
use crate::schema::FieldKind;

// ============================================================================
// SECTION: Field Context
// ============================================================================

/// View over one field while a rule runs.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    /// Current value.
    value: &'a Value,
    /// Declared kind, with any optional wrapper removed.
    kind: &'a FieldKind,
    /// Enclosing record members.
    parent: Option<&'a Map<String, Value>>,
    /// Field path.
    path: &'a str,
    /// Rule parameter.
    param: Option<&'a str>,
    /// Engine configuration.
    config: &'a EngineConfig,
}

impl<'a> FieldContext<'a> {
    /// Builds a context.
    #[must_use]
    pub const fn new(
        value: &'a Value,
        kind: &'a FieldKind,
        parent: Option<&'a Map<String, Value>>,
        path: &'a str,
        param: Option<&'a str>,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            value,
            kind,
            parent,
            path,
            param,
            config,
        }
    }

    /// Current value.
    #[must_use]
    pub const fn value(&self) -> &'a Value {
        self.value
    }

    /// Declared kind.
    #[must_use]
    pub const fn kind(&self) -> &'a FieldKind {
        self.kind
    }

    /// Enclosing record members.
    #[must_use]
    pub const fn parent(&self) -> Option<&'a Map<String, Value>> {
        self.parent
    }

    /// Sibling value by serialized name.
    #[must_use]
    pub fn sibling(&self, name: &str) -> Option<&'a Value> {
        self.parent.and_then(|members| members.get(name))
    }

    /// Field path.
    #[must_use]
    pub const fn path(&self) -> &'a str {
        self.path
    }

    /// Rule parameter.
    #[must_use]
    pub const fn param(&self) -> Option<&'a str> {
        self.param
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &'a EngineConfig {
        self.config
    }

    /// Returns true when the value is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        is_zero_value(self.value)
    }
}

// ============================================================================
// SECTION: Presence Rules
// ============================================================================

/// `required`: value must be non-zero.
pub fn required(ctx: &FieldContext<'_>) -> bool {
    !ctx.is_zero()
}

/// `exclusive_of=A,B`: when set, no named sibling may be set.
pub fn exclusive_of(ctx: &FieldContext<'_>) -> bool {
    if ctx.is_zero() {
        return true;
    }
    let Some(param) = ctx.param() else {
        return false;
    };
    param
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .all(|name| ctx.sibling(name).is_none_or(is_zero_value))
}

// ============================================================================
// SECTION: Bounds
// ============================================================================

/// Measured quantity for bound rules.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Measure {
    /// Exact integer.
    Int(i128),
    /// Floating point.
    Float(f64),
}

impl Measure {
    /// Compares two measures, exactly when both are integers.
    fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    /// Float view.
    #[allow(
        clippy::cast_precision_loss,
        reason = "Mixed integer/float comparisons are inherently approximate."
    )]
    const fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }
}

/// Measures a numeric value or a collection length.
fn measure(kind: &FieldKind, value: &Value) -> Option<Measure> {
    let number = |value: &Value| match value {
        Value::Number(number) => number
            .as_i64()
            .map(|n| Measure::Int(i128::from(n)))
            .or_else(|| number.as_u64().map(|n| Measure::Int(i128::from(n))))
            .or_else(|| number.as_f64().map(Measure::Float)),
        _ => None,
    };
    let length = |len: usize| i128::try_from(len).ok().map(Measure::Int);
    match (kind, value) {
        (FieldKind::Int | FieldKind::Uint | FieldKind::Float, value) => number(value),
        (FieldKind::List(_), Value::Array(items)) => length(items.len()),
        (FieldKind::Map(_), Value::Object(entries)) => length(entries.len()),
        (FieldKind::Any, Value::Array(items)) => length(items.len()),
        (FieldKind::Any, Value::Object(entries)) => length(entries.len()),
        (FieldKind::Any, value) => number(value),
        _ => None,
    }
}

/// Parses a bound parameter.
fn parse_bound(param: Option<&str>) -> Option<Measure> {
    let text = param?.trim();
    text.parse::<i128>()
        .map(Measure::Int)
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|n| n.is_finite()).map(Measure::Float))
}

/// Shared body of the bound rules.
fn bound(ctx: &FieldContext<'_>, accept: fn(Ordering) -> bool) -> bool {
    let (Some(actual), Some(limit)) = (measure(ctx.kind(), ctx.value()), parse_bound(ctx.param()))
    else {
        return false;
    };
    actual.compare(limit).is_some_and(accept)
}

/// `gt=N`.
pub fn gt(ctx: &FieldContext<'_>) -> bool {
    bound(ctx, Ordering::is_gt)
}

/// `gte=N` and `min=N`.
pub fn gte(ctx: &FieldContext<'_>) -> bool {
    bound(ctx, Ordering::is_ge)
}

/// `lt=N`.
pub fn lt(ctx: &FieldContext<'_>) -> bool {
    bound(ctx, Ordering::is_lt)
}

/// `lte=N` and `max=N`.
pub fn lte(ctx: &FieldContext<'_>) -> bool {
    bound(ctx, Ordering::is_le)
}

// ============================================================================
// SECTION: Membership
// ============================================================================

/// `oneof=a b c`: strings match a token exactly; integers match their
/// decimal rendering.
pub fn oneof(ctx: &FieldContext<'_>) -> bool {
    let Some(param) = ctx.param() else {
        return false;
    };
    let rendered = match (ctx.kind(), ctx.value()) {
        (FieldKind::String | FieldKind::Any, Value::String(text)) => text.clone(),
        (FieldKind::Int | FieldKind::Uint | FieldKind::Any, Value::Number(number))
            if number.is_i64() || number.is_u64() =>
        {
            number.to_string()
        }
        _ => return false,
    };
    param.split_whitespace().any(|token| token == rendered)
}

// ============================================================================
// SECTION: Grammar Rules
// ============================================================================

/// `image_uri`: container image reference grammar.
pub fn image_uri(ctx: &FieldContext<'_>) -> bool {
    ctx.value().as_str().is_some_and(is_valid_image_reference)
}

/// `version`: semantic version, optional `v` prefix.
pub fn version(ctx: &FieldContext<'_>) -> bool {
    ctx.value().as_str().is_some_and(is_valid_version)
}

/// `yaml`: strings must be YAML documents; other values must round-trip.
pub fn yaml(ctx: &FieldContext<'_>) -> bool {
    match ctx.value() {
        Value::String(text) => is_valid_yaml_document(text),
        other => round_trips_yaml(other),
    }
}

/// `expr`: expression template must compile.
pub fn expr(ctx: &FieldContext<'_>) -> bool {
    let limits = ctx.config().expr_limits();
    ctx.value().as_str().is_some_and(|text| is_valid_expression_with_limits(text, limits))
}

// ============================================================================
// SECTION: Messages
// ============================================================================

/// Failure message for a rule.
pub(crate) fn failure_message(rule: &str, param: Option<&str>) -> String {
    let param = param.unwrap_or_default();
    match rule {
        "required" => "value is required".to_string(),
        "gt" => format!("must be greater than {param}"),
        "gte" | "min" => format!("must be at least {param}"),
        "lt" => format!("must be less than {param}"),
        "lte" | "max" => format!("must be at most {param}"),
        "oneof" => format!("must be one of [{param}]"),
        "exclusive_of" => format!("cannot be set together with {param}"),
        "image_uri" => "must be a valid container image reference".to_string(),
        "version" => "must be a semantic version".to_string(),
        "yaml" => "must survive a YAML round-trip".to_string(),
        "expr" => "must be a compilable expression".to_string(),
        _ => "value failed validation".to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn check(
        rule: fn(&FieldContext<'_>) -> bool,
        kind: &FieldKind,
        value: &Value,
        param: Option<&str>,
    ) -> bool {
        let config = EngineConfig::default();
        rule(&FieldContext::new(value, kind, None, "Props.field", param, &config))
    }

    #[test]
    fn required_rejects_zero_values() {
        assert!(!check(required, &FieldKind::String, &json!(""), None));
        assert!(!check(required, &FieldKind::list(FieldKind::Int), &json!([]), None));
        assert!(check(required, &FieldKind::Int, &json!(-1), None));
    }

    #[test]
    fn bounds_compare_numbers_and_lengths() {
        assert!(check(gt, &FieldKind::Int, &json!(1), Some("0")));
        assert!(!check(gt, &FieldKind::Int, &json!(0), Some("0")));
        assert!(check(lte, &FieldKind::Float, &json!(2.5), Some("2.5")));
        assert!(check(gte, &FieldKind::list(FieldKind::Int), &json!([1, 2]), Some("2")));
        assert!(!check(lt, &FieldKind::map(FieldKind::Int), &json!({"a": 1}), Some("1")));
        assert!(check(lt, &FieldKind::Uint, &json!(u64::MAX), Some("18446744073709551616")));
    }

    #[test]
    fn bounds_fail_on_unsupported_kinds() {
        assert!(!check(gt, &FieldKind::String, &json!("abc"), Some("1")));
        assert!(!check(gt, &FieldKind::Bool, &json!(true), Some("0")));
        assert!(!check(gt, &FieldKind::Int, &json!(3), Some("three")));
        assert!(!check(gt, &FieldKind::Int, &json!(3), None));
    }

    #[test]
    fn oneof_matches_tokens_exactly() {
        let param = Some("debug info warn");
        assert!(check(oneof, &FieldKind::String, &json!("info"), param));
        assert!(!check(oneof, &FieldKind::String, &json!("inf"), param));
        assert!(check(oneof, &FieldKind::Int, &json!(8080), Some("80 8080")));
        assert!(!check(oneof, &FieldKind::Float, &json!(1.0), Some("1")));
    }

    fn exclusive_with(param: &str) -> bool {
        let config = EngineConfig::default();
        let parent = json!({"key1": "v1", "key2": "v2", "key3": ""});
        let value = json!("v1");
        let kind = FieldKind::String;
        exclusive_of(&FieldContext::new(
            &value,
            &kind,
            parent.as_object(),
            "Props.key1",
            Some(param),
            &config,
        ))
    }

    #[test]
    fn exclusive_of_reads_siblings() {
        assert!(!exclusive_with("key2"));
        assert!(exclusive_with("key3,missing"));
        assert!(!exclusive_with("key3, key2"));
    }

    #[test]
    fn grammar_rules_require_strings() {
        assert!(check(image_uri, &FieldKind::String, &json!("nginx:latest"), None));
        assert!(!check(image_uri, &FieldKind::Int, &json!(1), None));
        assert!(check(version, &FieldKind::String, &json!("v1.2.3"), None));
        assert!(!check(version, &FieldKind::String, &json!("banana"), None));
        assert!(check(expr, &FieldKind::String, &json!("a > %d"), None));
        assert!(!check(expr, &FieldKind::String, &json!("a >"), None));
        assert!(check(yaml, &FieldKind::Any, &json!({"a": [1, 2]}), None));
    }

    #[test]
    fn messages_name_the_parameter() {
        assert_eq!(failure_message("gt", Some("0")), "must be greater than 0");
        assert_eq!(failure_message("custom", None), "value failed validation");
    }
}
