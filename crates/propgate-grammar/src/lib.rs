// crates/propgate-grammar/src/lib.rs
// ============================================================================
// Module: Propgate Grammar Library
// Description: String grammars used by the property validation rules.
// Purpose: Wire together the image, version, YAML, and expression checkers.
// Dependencies: crate::{expr, image, version, yaml}
// ============================================================================

//! ## Overview
//! `propgate-grammar` holds the pure, allocation-light grammar checks behind
//! the string rules of `propgate-core`: container image references, semantic
//! versions, YAML round-trips, and expression compileability. Every checker
//! is total: malformed input yields `false` or an error, never a panic.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod expr;
pub mod image;
pub mod version;
pub mod yaml;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use expr::Expr;
pub use expr::ExprError;
pub use expr::ExprLimits;
pub use expr::compile;
pub use expr::compile_with_limits;
pub use expr::is_valid_expression;
pub use expr::is_valid_expression_with_limits;
pub use image::ImageReference;
pub use image::ImageReferenceError;
pub use image::is_valid_image_reference;
pub use version::is_valid_version;
pub use version::parse_version;
pub use yaml::is_valid_yaml_document;
pub use yaml::round_trips_yaml;
