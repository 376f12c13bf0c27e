// crates/propgate-grammar/src/version.rs
// ============================================================================
// Module: Semantic Version Grammar
// Description: SemVer 2.0 check with an optional `v` prefix.
// Purpose: Accept both `vX.Y.Z` and `X.Y.Z` version strings.
// Dependencies: semver
// ============================================================================

//! ## Overview
//! Thin wrapper over the `semver` crate. A single leading `v` is stripped
//! before parsing; pre-release and build metadata follow SemVer 2.0.

use semver::Version;

/// Parses a version string, accepting an optional leading `v`.
///
/// # Errors
///
/// Returns [`semver::Error`] when the remainder is not a SemVer 2.0 version.
pub fn parse_version(input: &str) -> Result<Version, semver::Error> {
    let trimmed = input.strip_prefix('v').unwrap_or(input);
    Version::parse(trimmed)
}

/// Returns true when `input` is a semantic version.
#[must_use]
pub fn is_valid_version(input: &str) -> bool {
    parse_version(input).is_ok()
}
