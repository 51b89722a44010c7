// crates/backdrop-core/src/sanitizer/policy.rs
// ============================================================================
// Module: Sanitization Policy
// Description: Immutable allowlist of tags, attributes, and URL schemes.
// Purpose: Describe what survives the allowlist pass for relayed profiles.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`SanitizationPolicy`] is built once at process start and shared
//! read-only. Tag handling is a closed enumeration ([`TagDisposition`]):
//! a tag is kept, rewritten to an inert container, or discarded with its
//! content. Rewrite targets are always allowed tags.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tags kept by the default profile policy.
const PROFILE_TAGS: &[&str] = &[
    "div", "span", "p", "h1", "h2", "h3", "h4", "h5", "h6", "img", "a", "ul", "ol", "li", "br",
    "strong", "em", "b", "i", "table", "tr", "td", "th", "tbody", "thead", "section", "article",
    "header", "main", "nav", "aside", "footer", "html", "head", "body", "title", "meta", "link",
    "style",
];

/// Attributes allowed on every kept tag.
const GLOBAL_ATTRIBUTES: &[&str] = &["class", "id", "style"];

/// Attribute-name prefixes allowed on every kept tag.
const ATTRIBUTE_PREFIXES: &[&str] = &["data-"];

/// Per-tag attribute allowances.
const TAG_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("img", &["src", "alt", "width", "height"]),
    ("a", &["href"]),
    ("link", &["rel", "href", "type"]),
    ("meta", &["name", "content", "charset", "property"]),
];

/// Schemes permitted in URL-bearing attributes.
const URL_SCHEMES: &[&str] = &["http", "https", "data"];

/// Attributes whose values are URLs.
const URL_ATTRIBUTES: &[&str] = &["href", "src"];

/// Behavior-bearing tags replaced by an inert `div`, with child handling.
const INERT_REWRITES: &[(&str, bool)] = &[
    ("script", false),
    ("iframe", false),
    ("object", true),
    ("embed", true),
    ("form", true),
];

/// Inert container used for every rewrite.
const INERT_CONTAINER: &str = "div";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Replacement of a behavior-bearing tag by an inert container.
///
/// # Invariants
/// - `target` is a tag the owning policy keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRewrite {
    /// Tag emitted in place of the original.
    pub target: String,
    /// Whether allowed children of the original survive.
    pub keep_children: bool,
}

/// What the allowlist pass does with an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagDisposition<'a> {
    /// Keep the element as-is.
    Keep,
    /// Emit the rewrite target instead of the element.
    Rewrite(&'a TagRewrite),
    /// Drop the element and its entire subtree.
    Discard,
}

/// Allowlist consulted by the sanitizer.
///
/// # Invariants
/// - All names are lowercase.
/// - Every rewrite target is contained in `allowed_tags`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizationPolicy {
    /// Tags that are kept.
    allowed_tags: BTreeSet<String>,
    /// Attributes allowed on every kept tag.
    global_attributes: BTreeSet<String>,
    /// Attribute-name prefixes allowed on every kept tag.
    attribute_prefixes: Vec<String>,
    /// Per-tag attribute allowances.
    tag_attributes: BTreeMap<String, BTreeSet<String>>,
    /// Schemes permitted in URL-bearing attributes.
    allowed_schemes: BTreeSet<String>,
    /// Attributes whose values are URLs.
    url_attributes: BTreeSet<String>,
    /// Tags rewritten to inert containers.
    rewrites: BTreeMap<String, TagRewrite>,
}

impl Default for SanitizationPolicy {
    fn default() -> Self {
        Self::steam_profile()
    }
}

impl SanitizationPolicy {
    /// Builds the profile-page policy used by the relay.
    #[must_use]
    pub fn steam_profile() -> Self {
        let rewrites = INERT_REWRITES
            .iter()
            .map(|(tag, keep_children)| {
                (
                    (*tag).to_string(),
                    TagRewrite {
                        target: INERT_CONTAINER.to_string(),
                        keep_children: *keep_children,
                    },
                )
            })
            .collect();
        Self {
            allowed_tags: owned_set(PROFILE_TAGS),
            global_attributes: owned_set(GLOBAL_ATTRIBUTES),
            attribute_prefixes: ATTRIBUTE_PREFIXES.iter().map(|prefix| (*prefix).to_string()).collect(),
            tag_attributes: TAG_ATTRIBUTES
                .iter()
                .map(|(tag, attrs)| ((*tag).to_string(), owned_set(attrs)))
                .collect(),
            allowed_schemes: owned_set(URL_SCHEMES),
            url_attributes: owned_set(URL_ATTRIBUTES),
            rewrites,
        }
    }

    /// Classifies a lowercase tag name.
    #[must_use]
    pub fn disposition(&self, tag: &str) -> TagDisposition<'_> {
        if self.allowed_tags.contains(tag) {
            return TagDisposition::Keep;
        }
        self.rewrites.get(tag).map_or(TagDisposition::Discard, TagDisposition::Rewrite)
    }

    /// Returns true when the tag is kept verbatim.
    #[must_use]
    pub fn is_tag_allowed(&self, tag: &str) -> bool {
        self.allowed_tags.contains(tag)
    }

    /// Returns true when `name` may appear on `tag`, ignoring its value.
    #[must_use]
    pub fn is_attribute_allowed(&self, tag: &str, name: &str) -> bool {
        if self.global_attributes.contains(name) {
            return true;
        }
        if self.tag_attributes.get(tag).is_some_and(|attrs| attrs.contains(name)) {
            return true;
        }
        self.attribute_prefixes.iter().any(|prefix| {
            name.len() > prefix.len()
                && name.starts_with(prefix.as_str())
                && name.bytes().all(is_safe_attribute_byte)
        })
    }

    /// Returns true when the attribute value must be checked as a URL.
    #[must_use]
    pub fn is_url_attribute(&self, name: &str) -> bool {
        self.url_attributes.contains(name)
    }

    /// Returns true when a lowercase scheme is allowed in URL attributes.
    #[must_use]
    pub fn is_scheme_allowed(&self, scheme: &str) -> bool {
        self.allowed_schemes.contains(scheme)
    }

    /// Iterates over the kept tags in sorted order.
    pub fn allowed_tags(&self) -> impl Iterator<Item = &str> {
        self.allowed_tags.iter().map(String::as_str)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Collects static names into an owned set.
fn owned_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

/// Bytes allowed in prefix-matched attribute names.
const fn is_safe_attribute_byte(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'-' | b'_' | b'.')
}
