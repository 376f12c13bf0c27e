// crates/propgate-core/src/config.rs
// ============================================================================
// Module: Engine Configuration
// Description: TOML-loaded limits and audit settings for the engine.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: propgate-grammar, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! The engine runs with built-in defaults and needs no file. Deployments that
//! want different traversal or expression limits, or audit logging, load an
//! [`EngineConfig`] from TOML:
//!
//! ```toml
//! max_depth = 64
//! max_expression_bytes = 8192
//! max_expression_nesting = 16
//!
//! [audit]
//! enabled = true
//! path = "propgate-audit.jsonl"
//! ```
//!
//! Unknown keys, oversized files, and out-of-range limits are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use propgate_grammar::ExprLimits;
use propgate_grammar::expr::DEFAULT_MAX_EXPRESSION_BYTES;
use propgate_grammar::expr::DEFAULT_MAX_EXPRESSION_NESTING;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "propgate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "PROPGATE_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default maximum record nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 32;
/// Upper bound accepted for `max_depth`.
const MAX_DEPTH_LIMIT: usize = 512;
/// Upper bound accepted for `max_expression_bytes`.
const MAX_EXPRESSION_BYTES_LIMIT: usize = 1024 * 1024;
/// Upper bound accepted for `max_expression_nesting`.
const MAX_EXPRESSION_NESTING_LIMIT: usize = 256;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Engine limits and audit settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum record and collection nesting depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Maximum size of an `expr` field in bytes.
    #[serde(default = "default_max_expression_bytes")]
    pub max_expression_bytes: usize,
    /// Maximum nesting depth inside an `expr` field.
    #[serde(default = "default_max_expression_nesting")]
    pub max_expression_nesting: usize,
    /// Audit logging settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Enable structured audit logging.
    #[serde(default)]
    pub enabled: bool,
    /// Optional audit log path (JSON lines). Stderr is used when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_expression_bytes: default_max_expression_bytes(),
            max_expression_nesting: default_max_expression_nesting(),
            audit: AuditConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then `PROPGATE_CONFIG`, then
    /// `propgate.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or fails
    /// validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text fails to parse or validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a limit is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_range("max_depth", self.max_depth, MAX_DEPTH_LIMIT)?;
        validate_range("max_expression_bytes", self.max_expression_bytes, MAX_EXPRESSION_BYTES_LIMIT)?;
        validate_range(
            "max_expression_nesting",
            self.max_expression_nesting,
            MAX_EXPRESSION_NESTING_LIMIT,
        )?;
        self.audit.validate()
    }

    /// Returns the expression limits derived from this configuration.
    #[must_use]
    pub const fn expr_limits(&self) -> ExprLimits {
        ExprLimits {
            max_bytes: self.max_expression_bytes,
            max_nesting: self.max_expression_nesting,
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            let trimmed = path.trim();
            if trimmed.is_empty() {
                return Err(ConfigError::Invalid("audit.path must be non-empty".to_string()));
            }
            validate_path(Path::new(trimmed))?;
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Requires `1 <= value <= max`.
fn validate_range(field: &str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value == 0 || value > max {
        return Err(ConfigError::Invalid(format!("{field} must be between 1 and {max}")));
    }
    Ok(())
}

/// Default record nesting depth.
const fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Default expression size limit.
const fn default_max_expression_bytes() -> usize {
    DEFAULT_MAX_EXPRESSION_BYTES
}

/// Default expression nesting limit.
const fn default_max_expression_nesting() -> usize {
    DEFAULT_MAX_EXPRESSION_NESTING
}

// ============================================================================
// SECTION: Tests
// ============================================================================
