// crates/backdrop-core/src/assembler.rs
// ============================================================================
// Module: Document Assembler
// Description: Base-URL insertion and embedding directives for relay output.
// Purpose: Make relative references resolve against the upstream origin.
// Dependencies: regex, url
// ============================================================================

//! ## Overview
//! The assembler adds a `<base href>` pointing at the trusted origin and
//! attaches the header directives the server applies to sanitized documents
//! only. `base` is never an allowed tag, so a sanitized document carries no
//! base element of its own; text that merely looks like one can only sit in
//! raw-text `style` content and is not a directive.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::document::AssembledDocument;
use crate::document::EmbeddingDirectives;
use crate::document::SanitizedDocument;
use crate::patterns::static_regex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Anti-embedding headers removed from responses carrying sanitized markup.
pub const STRIPPED_EMBEDDING_HEADERS: &[&str] =
    &["x-frame-options", "content-security-policy", "x-content-type-options"];

/// Opening `head` tag (not `header`).
static HEAD_OPEN: LazyLock<Regex> = LazyLock::new(|| static_regex(r"(?i)<head(?:[\s/][^>]*)?>"));

/// Opening `html` tag.
static HTML_OPEN: LazyLock<Regex> = LazyLock::new(|| static_regex(r"(?i)<html(?:[\s/][^>]*)?>"));

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Adds the base directive and returns the document with its embedding directives.
///
/// # Invariants
/// - Exactly one base directive is inserted.
/// - The inserted `href` is the `scheme://host[:port]/` form of `origin`.
/// - The first `<head>` opening tag is the document's head element: outside
///   raw-text `style` content the sanitizer escapes every `<`, and the head
///   precedes any `style` element.
#[must_use]
pub fn assemble(document: SanitizedDocument, origin: &Url) -> AssembledDocument {
    let embedding = EmbeddingDirectives::new(STRIPPED_EMBEDDING_HEADERS);
    let base = format!("<base href=\"{}\">", escape_href(&base_href(origin)));
    let markup = document.into_markup();
    let assembled = if let Some(head) = HEAD_OPEN.find(&markup) {
        splice(&markup, head.end(), &base)
    } else if let Some(html) = HTML_OPEN.find(&markup) {
        splice(&markup, html.end(), &format!("<head>{base}</head>"))
    } else {
        format!("<head>{base}</head>{markup}")
    };
    AssembledDocument {
        document: SanitizedDocument::from_markup(assembled),
        embedding,
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the origin form of a URL with a trailing slash.
fn base_href(origin: &Url) -> String {
    format!("{}/", origin.origin().ascii_serialization())
}

/// Inserts `insert` at byte offset `at`.
fn splice(markup: &str, at: usize, insert: &str) -> String {
    let mut out = String::with_capacity(markup.len() + insert.len());
    out.push_str(&markup[.. at]);
    out.push_str(insert);
    out.push_str(&markup[at ..]);
    out
}

/// Escapes a URL for a double-quoted attribute.
fn escape_href(href: &str) -> String {
    href.replace('&', "&amp;").replace('"', "&quot;")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
