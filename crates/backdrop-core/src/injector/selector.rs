// crates/backdrop-core/src/injector/selector.rs
// ============================================================================
// Module: Target Selectors
// Description: Compound tag/class selectors and the profile fallback chain.
// Purpose: Locate the element that carries the profile background.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Only compound selectors of the form `tag.class1.class2` (tag optional) are
//! supported. A [`SelectorChain`] is tried in order; the first selector with
//! a match wins, and within a selector the first match in document order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

// ============================================================================
// SECTION: Compound Selector
// ============================================================================

/// Tag plus class-list selector.
///
/// # Invariants
/// - Tag and classes are non-empty when present; the tag is lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundSelector {
    /// Required element name.
    tag: Option<String>,
    /// Classes the element must all carry.
    classes: Vec<String>,
}

impl CompoundSelector {
    /// Builds a selector from parts.
    #[must_use]
    pub fn new(tag: Option<&str>, classes: &[&str]) -> Self {
        Self {
            tag: tag.map(str::to_ascii_lowercase),
            classes: classes.iter().map(|class| (*class).to_string()).collect(),
        }
    }

    /// Parses `tag.class1.class2`, `.class`, or `tag`.
    ///
    /// Returns `None` for empty input, empty segments, or characters outside
    /// identifier syntax.
    #[must_use]
    pub fn parse(selector: &str) -> Option<Self> {
        let mut parts = selector.trim().split('.');
        let tag = parts.next()?;
        let classes: Vec<&str> = parts.collect();
        if tag.is_empty() && classes.is_empty() {
            return None;
        }
        if !tag.is_empty() && !is_identifier(tag) {
            return None;
        }
        if !classes.iter().all(|class| is_identifier(class)) {
            return None;
        }
        Some(Self::new((!tag.is_empty()).then_some(tag), &classes))
    }

    /// Returns true when an element with `tag` and `class` attribute matches.
    #[must_use]
    pub fn matches(&self, tag: &str, class_attribute: Option<&str>) -> bool {
        if self.tag.as_deref().is_some_and(|expected| !expected.eq_ignore_ascii_case(tag)) {
            return false;
        }
        let present: Vec<&str> = class_attribute.map_or_else(Vec::new, |value| {
            value.split_ascii_whitespace().collect()
        });
        self.classes.iter().all(|class| present.contains(&class.as_str()))
    }
}

impl fmt::Display for CompoundSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            f.write_str(tag)?;
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        Ok(())
    }
}

/// Returns true for CSS identifier-like names.
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
}

// ============================================================================
// SECTION: Selector Chain
// ============================================================================

/// Ordered fallback list of selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorChain {
    /// Selectors in priority order.
    selectors: Vec<CompoundSelector>,
}

impl SelectorChain {
    /// Builds a chain from selectors in priority order.
    #[must_use]
    pub const fn new(selectors: Vec<CompoundSelector>) -> Self {
        Self {
            selectors,
        }
    }

    /// Chain for the profile page background container.
    #[must_use]
    pub fn profile_background() -> Self {
        Self::new(vec![
            CompoundSelector::new(Some("div"), &["no_header", "profile_page", "has_profile_background"]),
            CompoundSelector::new(None, &["profile_page", "has_profile_background"]),
            CompoundSelector::new(None, &["profile_page"]),
        ])
    }

    /// Iterates over selectors in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &CompoundSelector> {
        self.selectors.iter()
    }
}

impl Default for SelectorChain {
    fn default() -> Self {
        Self::profile_background()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
