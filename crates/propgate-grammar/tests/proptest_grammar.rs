// crates/propgate-grammar/tests/proptest_grammar.rs
// ============================================================================
// Module: Grammar Property-Based Tests
// Description: Property tests for grammar checker totality and stability.
// Purpose: Detect panics and invariants across wide input ranges.
// ============================================================================

//! Property-based tests for grammar invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use propgate_grammar::ImageReference;
use propgate_grammar::compile;
use propgate_grammar::is_valid_image_reference;
use propgate_grammar::is_valid_version;
use propgate_grammar::is_valid_yaml_document;
use proptest::prelude::*;

proptest! {
    #[test]
    fn image_parser_is_total(input in ".*") {
        let _ = is_valid_image_reference(&input);
    }

    #[test]
    fn parsed_references_keep_tag_digest_exclusive(input in "[a-z0-9.:/@_-]{0,40}") {
        if let Ok(reference) = ImageReference::parse(&input) {
            prop_assert!(reference.tag.is_none() || reference.digest.is_none());
            prop_assert!(reference.repository.iter().all(|component| !component.is_empty()));
        }
    }

    #[test]
    fn structured_references_are_accepted(
        host in "[a-z][a-z0-9]{0,8}\\.[a-z]{2,4}",
        port in 1u32..65535,
        path in prop::collection::vec("[a-z0-9]([a-z0-9_-]{0,6}[a-z0-9])?", 1..4),
        tag in "[A-Za-z0-9_][A-Za-z0-9_.-]{0,20}",
    ) {
        let input = format!("{host}:{port}/{}:{tag}", path.join("/"));
        let reference = ImageReference::parse(&input);
        prop_assert!(reference.is_ok(), "{input}");
        prop_assert_eq!(reference.map(|reference| reference.to_string()).unwrap_or_default(), input);
    }

    #[test]
    fn expression_compiler_is_total(input in ".{0,64}") {
        let _ = compile(&input);
    }

    #[test]
    fn long_chains_compile_or_fail_cleanly(
        links in prop::collection::vec(
            prop_oneof![Just(" + a"), Just(" && b"), Just(".c"), Just(" == 1"), Just("[0]")],
            1..4000,
        ),
    ) {
        let input = format!("x{}", links.concat());
        let _ = compile(&input);
    }

    #[test]
    fn version_checker_accepts_generated_versions(
        major in 0u64..1000,
        minor in 0u64..1000,
        patch in 0u64..1000,
        prefixed in any::<bool>(),
    ) {
        let prefix = if prefixed { "v" } else { "" };
        let version = format!("{prefix}{major}.{minor}.{patch}");
        prop_assert!(is_valid_version(&version));
    }

    #[test]
    fn yaml_checker_is_total(input in ".{0,64}") {
        let _ = is_valid_yaml_document(&input);
    }
}
