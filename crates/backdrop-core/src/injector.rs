// crates/backdrop-core/src/injector.rs
// ============================================================================
// Module: Style Injector
// Description: Background swap and reset inside an embedded profile document.
// Purpose: Mutate one element's inline background without other side effects.
// Dependencies: html5ever, markup5ever_rcdom, regex, serde_json
// ============================================================================

//! ## Overview
//! The injector edits the inline `style` of the profile background element.
//! It reaches the document only through [`InjectionDocument`] and
//! [`StyleElement`], so the same state machine runs against the server-side
//! [`HtmlDocument`] and any other DOM an embedder provides.
//!
//! Apply and Reset are idempotent. A missing target is a silent no-op, since
//! upstream markup changes must not break the embedding page.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod dom;
mod message;
mod selector;
mod style;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dom::HtmlDocument;
pub use dom::HtmlElement;
pub use message::InjectorMessage;
pub use selector::CompoundSelector;
pub use selector::SelectorChain;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;

use crate::document::AssembledDocument;
use crate::document::SanitizedDocument;
use crate::injector::style::ResetKind;
use crate::origin::BackgroundSelection;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Delays after which an embedder applies the background: an eager pass
/// shortly after the frame document exists, and a settle pass after load.
pub const LOAD_APPLY_DELAYS: [Duration; 2] = [Duration::from_millis(100), Duration::from_millis(500)];

// ============================================================================
// SECTION: Document Traits
// ============================================================================

/// Element whose inline style the injector edits.
pub trait StyleElement {
    /// Returns the inline `style` attribute, when present.
    fn style_attribute(&self) -> Option<String>;

    /// Sets the inline `style` attribute.
    fn set_style_attribute(&self, value: &str);

    /// Removes the inline `style` attribute.
    fn remove_style_attribute(&self);
}

/// Document the injector searches for its target.
pub trait InjectionDocument {
    /// Element handle type.
    type Element: StyleElement;

    /// Returns the first element in document order matching `selector`.
    fn query(&self, selector: &CompoundSelector) -> Option<Self::Element>;

    /// Returns the `body` element.
    fn body(&self) -> Option<Self::Element>;

    /// Returns the document's root element.
    fn root(&self) -> Option<Self::Element>;
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// What an Apply changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No element matched the selector chain.
    NoTarget,
    /// The URL inside an existing inline background image was replaced.
    ReplacedInline,
    /// High-priority background overrides were written.
    AppliedOverrides,
}

/// What a Reset changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// No element matched the chain, `body`, or the root.
    NoTarget,
    /// The inline background image was removed.
    RemovedInline,
    /// Leftover high-priority overrides were removed.
    RemovedOverrides,
    /// There was no background to remove.
    Unchanged,
}

// ============================================================================
// SECTION: Injector
// ============================================================================

/// Applies and resets the profile background on one document.
///
/// # Invariants
/// - Only the `style` attribute of a single target element is modified.
pub struct StyleInjector<D> {
    /// Document being edited.
    document: D,
    /// Target lookup order.
    chain: SelectorChain,
}

impl<D: InjectionDocument> StyleInjector<D> {
    /// Builds an injector using the profile background chain.
    #[must_use]
    pub fn new(document: D) -> Self {
        Self::with_chain(document, SelectorChain::profile_background())
    }

    /// Builds an injector with a custom chain.
    #[must_use]
    pub const fn with_chain(document: D, chain: SelectorChain) -> Self {
        Self {
            document,
            chain,
        }
    }

    /// Returns the document.
    pub const fn document(&self) -> &D {
        &self.document
    }

    /// Consumes the injector and returns the document.
    pub fn into_document(self) -> D {
        self.document
    }

    /// Sets the background image on the target element.
    pub fn apply(&self, background: &BackgroundSelection) -> ApplyOutcome {
        let Some(target) = self.target() else {
            return ApplyOutcome::NoTarget;
        };
        let url = background.image_url().as_str();
        let current = target.style_attribute();
        if let Some(existing) = current.as_deref()
            && let Some(updated) = style::replace_background_url(existing, url)
        {
            if updated != existing {
                target.set_style_attribute(&updated);
            }
            return ApplyOutcome::ReplacedInline;
        }
        target.set_style_attribute(&style::apply_overrides(current.as_deref(), url));
        ApplyOutcome::AppliedOverrides
    }

    /// Applies eagerly and again in the settle pass, returning the eager
    /// outcome. The end state equals a single Apply.
    pub fn apply_on_load(&self, background: &BackgroundSelection) -> ApplyOutcome {
        let eager = self.apply(background);
        self.apply(background);
        eager
    }

    /// Removes the background set by [`StyleInjector::apply`].
    pub fn reset(&self) -> ResetOutcome {
        let Some(target) = self.reset_target() else {
            return ResetOutcome::NoTarget;
        };
        let Some(current) = target.style_attribute() else {
            return ResetOutcome::Unchanged;
        };
        let Some(edit) = style::reset_background(&current) else {
            return ResetOutcome::Unchanged;
        };
        match edit.style {
            Some(remaining) => target.set_style_attribute(&remaining),
            None => target.remove_style_attribute(),
        }
        match edit.kind {
            ResetKind::Inline => ResetOutcome::RemovedInline,
            ResetKind::Overrides => ResetOutcome::RemovedOverrides,
        }
    }

    /// Acts on a cross-boundary message; unknown shapes are ignored.
    pub fn handle_message(&self, message: &Value) -> Option<ResetOutcome> {
        match InjectorMessage::parse(message)? {
            InjectorMessage::ResetBackground => Some(self.reset()),
        }
    }

    /// Finds the Apply target.
    fn target(&self) -> Option<D::Element> {
        self.chain.iter().find_map(|selector| self.document.query(selector))
    }

    /// Finds the Reset target, falling back to `body` and then the root.
    fn reset_target(&self) -> Option<D::Element> {
        self.target().or_else(|| self.document.body()).or_else(|| self.document.root())
    }
}

// ============================================================================
// SECTION: Preview
// ============================================================================

/// Applies a background to an assembled document and re-serializes it.
///
/// The document is returned unchanged when no target element exists.
#[must_use]
pub fn render_preview(
    assembled: AssembledDocument,
    background: &BackgroundSelection,
) -> (AssembledDocument, ApplyOutcome) {
    let injector = StyleInjector::new(HtmlDocument::parse(assembled.document.as_str()));
    let outcome = injector.apply_on_load(background);
    if outcome == ApplyOutcome::NoTarget {
        return (assembled, outcome);
    }
    let markup = injector.into_document().to_markup();
    (
        AssembledDocument {
            document: SanitizedDocument::from_markup(markup),
            embedding: assembled.embedding,
        },
        outcome,
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================
