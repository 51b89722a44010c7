// crates/backdrop-core/src/patterns.rs
// ============================================================================
// Module: Static Patterns
// Description: Helper for compiling process-wide regular expressions.
// Purpose: Keep pattern compilation in one place for lazily built statics.
// Dependencies: regex
// ============================================================================

use regex::Regex;

/// Compiles a pattern that is a compile-time constant of this crate.
#[allow(
    clippy::expect_used,
    reason = "Patterns are string literals exercised by the unit tests of every caller."
)]
pub(crate) fn static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}
