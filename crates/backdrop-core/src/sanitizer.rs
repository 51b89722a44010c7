// crates/backdrop-core/src/sanitizer.rs
// ============================================================================
// Module: Sanitizer
// Description: Two-stage neutralization of untrusted HTML documents.
// Purpose: Produce markup that is safe to embed in the relay's own origin.
// Dependencies: html5ever, markup5ever_rcdom, regex
// ============================================================================

//! ## Overview
//! Sanitization is total: every input yields a [`SanitizedDocument`]. Bytes
//! are decoded as UTF-8 with replacement, run through the structural
//! pre-pass, then rebuilt by the allowlist pass. The combined passes are
//! repeated until the output is a fixed point, so sanitizing an already
//! sanitized document returns it unchanged.
//!
//! Security posture: the allowlist pass is authoritative. The pre-pass only
//! narrows what reaches the parser.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod allowlist;
pub(crate) mod markup;
mod policy;
mod prepass;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use policy::SanitizationPolicy;
pub use policy::TagDisposition;
pub use policy::TagRewrite;

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::document::RawDocument;
use crate::document::SanitizedDocument;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on rebuild rounds while searching for a fixed point.
const MAX_NORMALIZE_ROUNDS: usize = 6;

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Sanitizes an untrusted response body.
#[must_use]
pub fn sanitize(raw: &RawDocument, policy: &SanitizationPolicy) -> SanitizedDocument {
    sanitize_markup(&String::from_utf8_lossy(raw.bytes()), policy)
}

/// Sanitizes untrusted markup.
///
/// # Invariants
/// - The result contains no tag, attribute, or URL scheme the policy rejects.
/// - `sanitize_markup(out.as_str(), policy) == out` whenever the rebuild
///   converges within the round bound, which every tree-builder fix-up does.
#[must_use]
pub fn sanitize_markup(markup: &str, policy: &SanitizationPolicy) -> SanitizedDocument {
    let mut current = sanitize_round(markup, policy);
    for _ in 1 .. MAX_NORMALIZE_ROUNDS {
        let next = sanitize_round(&current, policy);
        if next == current {
            break;
        }
        current = next;
    }
    SanitizedDocument::from_markup(current)
}

/// Runs the allowlist pass alone until its output is stable.
///
/// The result satisfies `allowlist_pass(&allowlist_pass(x)) == allowlist_pass(x)`.
#[must_use]
pub fn allowlist_pass(markup: &str, policy: &SanitizationPolicy) -> String {
    let mut current = allowlist::rebuild(markup, policy);
    for _ in 1 .. MAX_NORMALIZE_ROUNDS {
        let next = allowlist::rebuild(&current, policy);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Runs the pre-pass and one allowlist rebuild.
fn sanitize_round(markup: &str, policy: &SanitizationPolicy) -> String {
    allowlist::rebuild(&prepass::strip_active_content(markup), policy)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
