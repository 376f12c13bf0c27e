// crates/propgate-grammar/src/yaml.rs
// ============================================================================
// Module: YAML Round-Trip Grammar
// Description: Checks that values survive YAML serialization unchanged.
// Purpose: Reject values that would be altered by a YAML emit/parse cycle.
// Dependencies: serde, serde_json, serde_yaml
// ============================================================================

//! ## Overview
//! Two entry points: [`is_valid_yaml_document`] treats a string as YAML text
//! that must parse and re-emit losslessly, while [`round_trips_yaml`] checks
//! an already structured JSON value.

use serde_json::Value;

/// Returns true when `input` parses as a single YAML document that re-emits
/// to an equal document.
#[must_use]
pub fn is_valid_yaml_document(input: &str) -> bool {
    let Ok(parsed) = serde_yaml::from_str::<serde_yaml::Value>(input) else {
        return false;
    };
    let Ok(emitted) = serde_yaml::to_string(&parsed) else {
        return false;
    };
    serde_yaml::from_str::<serde_yaml::Value>(&emitted).is_ok_and(|reparsed| reparsed == parsed)
}

/// Returns true when `value` serializes to YAML and deserializes back equal.
#[must_use]
pub fn round_trips_yaml(value: &Value) -> bool {
    let Ok(emitted) = serde_yaml::to_string(value) else {
        return false;
    };
    serde_yaml::from_str::<Value>(&emitted).is_ok_and(|reparsed| reparsed == *value)
}
