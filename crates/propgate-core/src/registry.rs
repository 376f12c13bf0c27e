// crates/propgate-core/src/registry.rs
// ============================================================================
// Module: Rule Registry
// Description: Immutable name-to-rule map and rule declaration parsing.
// Purpose: Resolve declared rule names once the registry is frozen.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`RuleRegistry`] maps rule names to predicates. It is assembled through
//! [`RuleRegistryBuilder`], which starts with the built-in rules and accepts
//! custom ones, and is immutable once built.
//!
//! Declarations are comma-separated tokens, each `name` or `name=param`. While
//! a parameter is open, a bare token continues it when the token names a
//! sibling field or is not a known rule, so `exclusive_of=host,port` keeps
//! both sibling names and `exclusive_of=digest,version` names the `version`
//! field rather than the `version` rule. `dive` and `omitempty` are traversal
//! directives rather than rules.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::rules;
use crate::rules::FieldContext;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rule predicate.
pub type RuleFn = fn(&FieldContext<'_>) -> bool;

/// Directive name that applies following rules to collection elements.
pub const DIVE: &str = "dive";
/// Directive name that skips remaining rules for zero values.
pub const OMIT_EMPTY: &str = "omitempty";

/// Rules that still run when an optional value is absent.
const PRESENCE_RULES: &[&str] = &["required", "exclusive_of"];

/// One parsed declaration token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Registered rule.
    Rule {
        /// Rule name.
        name: String,
        /// Rule parameter.
        param: Option<String>,
    },
    /// `omitempty`.
    OmitEmpty,
    /// `dive`.
    Dive,
    /// Name with no registered rule.
    Unknown {
        /// Declared name.
        name: String,
        /// Declared parameter.
        param: Option<String>,
    },
}

/// Registry construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Name was already registered.
    #[error("rule `{0}` is already registered")]
    Duplicate(String),
    /// Name is reserved for a traversal directive.
    #[error("rule name `{0}` is reserved")]
    Reserved(String),
    /// Name is empty or contains `=`, `,`, or whitespace.
    #[error("invalid rule name `{0}`")]
    InvalidName(String),
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Frozen rule map.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    /// Rules by name.
    rules: BTreeMap<String, RuleFn>,
}

impl RuleRegistry {
    /// Starts a builder seeded with the built-in rules.
    #[must_use]
    pub fn builder() -> RuleRegistryBuilder {
        RuleRegistryBuilder::with_builtins()
    }

    /// Looks up a rule.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<RuleFn> {
        self.rules.get(name).copied()
    }

    /// Returns true when `name` is a registered rule.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Registered rule names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Parses a declaration into directives. `siblings` lists the field names
    /// of the enclosing record.
    #[must_use]
    pub fn parse_declaration(&self, declaration: &str, siblings: &[&str]) -> Vec<Directive> {
        let mut directives: Vec<Directive> = Vec::new();
        for token in declaration.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let (name, param) = match token.split_once('=') {
                Some((name, param)) => (name.trim(), Some(param.trim().to_string())),
                None => (token, None),
            };
            if param.is_none()
                && (siblings.contains(&name) || !self.is_known(name))
                && let Some(Directive::Rule {
                    param: Some(previous),
                    ..
                }
                | Directive::Unknown {
                    param: Some(previous),
                    ..
                }) = directives.last_mut()
            {
                previous.push(',');
                previous.push_str(name);
                continue;
            }
            directives.push(match name {
                DIVE => Directive::Dive,
                OMIT_EMPTY => Directive::OmitEmpty,
                _ if self.contains(name) => Directive::Rule {
                    name: name.to_string(),
                    param,
                },
                _ => Directive::Unknown {
                    name: name.to_string(),
                    param,
                },
            });
        }
        directives
    }

    /// Returns true for rules and directives.
    fn is_known(&self, name: &str) -> bool {
        name == DIVE || name == OMIT_EMPTY || self.contains(name)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        RuleRegistryBuilder::with_builtins().build()
    }
}

/// Returns true for rules that run against absent optional values.
pub(crate) fn is_presence_rule(name: &str) -> bool {
    PRESENCE_RULES.contains(&name)
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Mutable registry under construction.
#[derive(Debug, Clone)]
pub struct RuleRegistryBuilder {
    /// Rules by name.
    rules: BTreeMap<String, RuleFn>,
}

impl RuleRegistryBuilder {
    /// Creates a builder with no rules.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Creates a builder holding the built-in rules.
    #[must_use]
    pub fn with_builtins() -> Self {
        let builtins: [(&str, RuleFn); 13] = [
            ("required", rules::required),
            ("gt", rules::gt),
            ("gte", rules::gte),
            ("min", rules::gte),
            ("lt", rules::lt),
            ("lte", rules::lte),
            ("max", rules::lte),
            ("oneof", rules::oneof),
            ("exclusive_of", rules::exclusive_of),
            ("image_uri", rules::image_uri),
            ("version", rules::version),
            ("yaml", rules::yaml),
            ("expr", rules::expr),
        ];
        Self {
            rules: builtins.into_iter().map(|(name, rule)| (name.to_string(), rule)).collect(),
        }
    }

    /// Registers a custom rule.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] for duplicate, reserved, or malformed names.
    pub fn register(mut self, name: &str, rule: RuleFn) -> Result<Self, RegistryError> {
        if name.is_empty() || name.contains(['=', ',']) || name.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if name == DIVE || name == OMIT_EMPTY {
            return Err(RegistryError::Reserved(name.to_string()));
        }
        if self.rules.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.rules.insert(name.to_string(), rule);
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> RuleRegistry {
        RuleRegistry {
            rules: self.rules,
        }
    }
}

impl Default for RuleRegistryBuilder {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
