// crates/backdrop-core/src/sanitizer/allowlist.rs
// ============================================================================
// Module: Allowlist Pass
// Description: Policy-driven rebuild of a parsed HTML document.
// Purpose: Emit only allowed tags, attributes, and URL schemes.
// Dependencies: html5ever (via markup)
// ============================================================================

//! ## Overview
//! The allowlist pass parses markup with the HTML5 tree builder and writes
//! back only what the [`SanitizationPolicy`] permits. Children are admitted
//! only where the tree builder would leave them in place on a re-parse (head
//! content in `head`, rows and sections in table contexts, cells in rows).

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::markup::ElementAction;
use super::markup::ElementFilter;
use super::markup::parse_markup;
use super::markup::serialize_document;
use super::policy::SanitizationPolicy;
use super::policy::TagDisposition;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Children the tree builder keeps inside `head`.
const HEAD_CONTENT: &[&str] = &["title", "meta", "link", "style", "base"];

/// Children the tree builder keeps inside table and table-section elements.
const TABLE_CONTENT: &[&str] = &["tbody", "thead", "tfoot", "tr", "style"];

/// Children the tree builder keeps inside rows.
const ROW_CONTENT: &[&str] = &["td", "th", "style"];

/// Table contexts that only keep whitespace text.
const TABLE_CONTEXTS: &[&str] = &["table", "tbody", "thead", "tfoot"];

/// Scheme markers that are never allowed in any attribute value.
const SCRIPT_SCHEMES: &[&str] = &["javascript:", "vbscript:"];

// ============================================================================
// SECTION: Rebuild
// ============================================================================

/// Parses and rebuilds markup once.
pub(super) fn rebuild(markup: &str, policy: &SanitizationPolicy) -> String {
    let dom = parse_markup(markup);
    serialize_document(
        &dom,
        &PolicyFilter {
            policy,
        },
    )
}

/// [`ElementFilter`] backed by a sanitization policy.
struct PolicyFilter<'p> {
    /// Policy consulted for every decision.
    policy: &'p SanitizationPolicy,
}

impl ElementFilter for PolicyFilter<'_> {
    fn element<'t>(&'t self, tag: &'t str) -> ElementAction<'t> {
        match self.policy.disposition(tag) {
            TagDisposition::Keep => ElementAction::Emit {
                tag,
                keep_children: true,
            },
            TagDisposition::Rewrite(rewrite) => ElementAction::Emit {
                tag: rewrite.target.as_str(),
                keep_children: rewrite.keep_children,
            },
            TagDisposition::Discard => ElementAction::Drop,
        }
    }

    fn admits_child(&self, parent: Option<&str>, child: &str) -> bool {
        match parent {
            None => child == "html",
            Some("html") => matches!(child, "head" | "body"),
            Some("head") => HEAD_CONTENT.contains(&child),
            Some("tr") => ROW_CONTENT.contains(&child),
            Some(tag) if TABLE_CONTEXTS.contains(&tag) => TABLE_CONTENT.contains(&child),
            Some(_) => true,
        }
    }

    fn admits_text(&self, parent: Option<&str>, text: &str) -> bool {
        match parent {
            None => false,
            Some(tag) if is_structural(tag) => text.chars().all(char::is_whitespace),
            Some(_) => true,
        }
    }

    fn attribute(&self, tag: &str, name: &str, value: &str) -> bool {
        if !self.policy.is_attribute_allowed(tag, name) {
            return false;
        }
        let compact = compact_value(value);
        if SCRIPT_SCHEMES.iter().any(|scheme| compact.contains(scheme)) {
            return false;
        }
        if self.policy.is_url_attribute(name) {
            return url_scheme(&compact).is_none_or(|scheme| self.policy.is_scheme_allowed(&scheme));
        }
        true
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true for elements whose text children are moved by the tree builder.
fn is_structural(tag: &str) -> bool {
    matches!(tag, "html" | "head" | "tr") || TABLE_CONTEXTS.contains(&tag)
}

/// Lowercases a value and removes whitespace and control characters, which
/// browsers ignore inside URL schemes.
fn compact_value(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_whitespace() && !ch.is_control())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Extracts the scheme of a compacted URL, or `None` for relative URLs.
fn url_scheme(compact: &str) -> Option<String> {
    let end = compact.find(|ch| matches!(ch, ':' | '/' | '?' | '#'))?;
    if !compact[end ..].starts_with(':') {
        return None;
    }
    let candidate = &compact[.. end];
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        // Browsers resolve such values as relative paths.
        return None;
    }
    if chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.')) {
        Some(candidate.to_string())
    } else {
        None
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
