// crates/backdrop-core/src/document.rs
// ============================================================================
// Module: Relay Documents
// Description: Typed stages of a document moving through the relay.
// Purpose: Make "sanitized" a property of the type, not of a code path.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A document is [`RawDocument`] when it leaves the fetcher,
//! [`SanitizedDocument`] once the allowlist pass has rebuilt it, and
//! [`AssembledDocument`] when it carries the base-URL directive and the
//! header directives the server applies.
//!
//! `SanitizedDocument` has no public constructor; only the sanitizer and the
//! injector preview path (which re-serializes a sanitized tree) create one.

// ============================================================================
// SECTION: Raw Document
// ============================================================================

/// Untrusted response body as received from upstream.
///
/// # Invariants
/// - `bytes.len()` never exceeds the fetcher's configured byte ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Response body bytes.
    bytes: Vec<u8>,
    /// `Content-Type` header reported by upstream, when present.
    declared_content_type: Option<String>,
}

impl RawDocument {
    /// Wraps a response body.
    #[must_use]
    pub const fn new(bytes: Vec<u8>, declared_content_type: Option<String>) -> Self {
        Self {
            bytes,
            declared_content_type,
        }
    }

    /// Returns the body bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the upstream content type, when present.
    #[must_use]
    pub fn declared_content_type(&self) -> Option<&str> {
        self.declared_content_type.as_deref()
    }

    /// Returns the body length in bytes.
    #[must_use]
    pub const fn byte_length(&self) -> usize {
        self.bytes.len()
    }
}

// ============================================================================
// SECTION: Sanitized Document
// ============================================================================

/// Markup rebuilt by the allowlist pass.
///
/// # Invariants
/// - Contains only policy-allowed tags, attributes, and URL schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedDocument {
    /// Serialized markup.
    markup: String,
}

impl SanitizedDocument {
    /// Wraps markup produced inside this crate by a sanitizing serializer.
    pub(crate) const fn from_markup(markup: String) -> Self {
        Self {
            markup,
        }
    }

    /// Returns the markup.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.markup
    }

    /// Consumes the document and returns the markup.
    #[must_use]
    pub fn into_markup(self) -> String {
        self.markup
    }

    /// Returns the markup length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.markup.len()
    }

    /// Returns true when the markup is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.markup.is_empty()
    }
}

// ============================================================================
// SECTION: Assembled Document
// ============================================================================

/// Response-header handling that applies only to sanitized documents.
///
/// # Invariants
/// - Header names are lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingDirectives {
    /// Upstream or default headers the server removes before serving.
    strip_headers: &'static [&'static str],
}

impl EmbeddingDirectives {
    /// Builds directives that strip the given lowercase header names.
    #[must_use]
    pub const fn new(strip_headers: &'static [&'static str]) -> Self {
        Self {
            strip_headers,
        }
    }

    /// Returns the header names to strip.
    #[must_use]
    pub const fn strip_headers(&self) -> &'static [&'static str] {
        self.strip_headers
    }

    /// Returns true when `name` must be stripped (ASCII case-insensitive).
    #[must_use]
    pub fn strips(&self, name: &str) -> bool {
        self.strip_headers.iter().any(|header| header.eq_ignore_ascii_case(name))
    }
}

/// A sanitized document with its base directive and embedding directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledDocument {
    /// Sanitized markup including the base directive.
    pub document: SanitizedDocument,
    /// Header directives for the server.
    pub embedding: EmbeddingDirectives,
}
