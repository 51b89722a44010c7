// crates/backdrop-core/src/lib.rs
// ============================================================================
// Module: Backdrop Core Library
// Description: Public API surface for the trusted content relay core.
// Purpose: Expose origin validation, sanitization, assembly, and injection.
// Dependencies: html5ever, markup5ever_rcdom, regex, serde, thiserror, url
// ============================================================================

//! ## Overview
//! Backdrop core turns an untrusted HTML document fetched from a single
//! allow-listed origin into a document that is safe to embed, and provides the
//! style-injection protocol that swaps a profile background inside that
//! embedded document. Everything in this crate is network-free and
//! deterministic; the fetcher lives in `backdrop-fetch`.
//!
//! Pipeline: [`OriginGuard::validate`] → fetch (external) →
//! [`sanitize`] → [`assemble`] → optional [`render_preview`].
//!
//! Security posture: every byte handed to [`sanitize`] is untrusted. Only a
//! [`SanitizedDocument`] may be served without anti-embedding headers, and
//! that type can only be produced by the sanitizer.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod assembler;
pub mod document;
pub mod injector;
pub mod origin;
mod patterns;
pub mod sanitizer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use assembler::STRIPPED_EMBEDDING_HEADERS;
pub use assembler::assemble;
pub use document::AssembledDocument;
pub use document::EmbeddingDirectives;
pub use document::RawDocument;
pub use document::SanitizedDocument;
pub use injector::ApplyOutcome;
pub use injector::CompoundSelector;
pub use injector::HtmlDocument;
pub use injector::InjectionDocument;
pub use injector::InjectorMessage;
pub use injector::LOAD_APPLY_DELAYS;
pub use injector::ResetOutcome;
pub use injector::SelectorChain;
pub use injector::StyleElement;
pub use injector::StyleInjector;
pub use injector::render_preview;
pub use origin::BackgroundSelection;
pub use origin::FetchRequest;
pub use origin::OriginGuard;
pub use origin::ValidationError;
pub use sanitizer::SanitizationPolicy;
pub use sanitizer::TagDisposition;
pub use sanitizer::TagRewrite;
pub use sanitizer::allowlist_pass;
pub use sanitizer::sanitize;
pub use sanitizer::sanitize_markup;
