// crates/backdrop-core/src/injector/dom.rs
// ============================================================================
// Module: Injection DOM
// Description: html5ever-backed implementation of the injection traits.
// Purpose: Let the server apply backgrounds to relayed documents.
// Dependencies: html5ever, markup5ever_rcdom
// ============================================================================

//! ## Overview
//! [`HtmlDocument`] owns a parsed `RcDom`; [`HtmlElement`] is a handle to one
//! element in it. Lookups walk the tree with an explicit stack in document
//! order, and serialization goes through the shared markup writer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use html5ever::Attribute;
use html5ever::LocalName;
use html5ever::Namespace;
use html5ever::QualName;
use html5ever::tendril::StrTendril;
use markup5ever_rcdom::Handle;
use markup5ever_rcdom::NodeData;
use markup5ever_rcdom::RcDom;

use super::InjectionDocument;
use super::StyleElement;
use super::selector::CompoundSelector;
use crate::sanitizer::markup::Passthrough;
use crate::sanitizer::markup::html_element_name;
use crate::sanitizer::markup::parse_markup;
use crate::sanitizer::markup::serialize_document;

// ============================================================================
// SECTION: Document
// ============================================================================

/// Parsed HTML document the injector can edit.
pub struct HtmlDocument {
    /// Parsed tree.
    dom: RcDom,
}

impl HtmlDocument {
    /// Parses markup into an editable document.
    #[must_use]
    pub fn parse(markup: &str) -> Self {
        Self {
            dom: parse_markup(markup),
        }
    }

    /// Serializes the document, dropping comments and non-HTML content.
    #[must_use]
    pub fn to_markup(&self) -> String {
        serialize_document(&self.dom, &Passthrough)
    }

    /// Returns the first HTML element in document order satisfying `predicate`.
    fn find(&self, predicate: impl Fn(&Handle, &str) -> bool) -> Option<HtmlElement> {
        let mut stack = vec![self.dom.document.clone()];
        while let Some(node) = stack.pop() {
            if let Some(name) = html_element_name(&node)
                && predicate(&node, name)
            {
                return Some(HtmlElement {
                    handle: node.clone(),
                });
            }
            for child in node.children.borrow().iter().rev() {
                stack.push(child.clone());
            }
        }
        None
    }
}

impl InjectionDocument for HtmlDocument {
    type Element = HtmlElement;

    fn query(&self, selector: &CompoundSelector) -> Option<Self::Element> {
        self.find(|node, name| selector.matches(name, attribute(node, "class").as_deref()))
    }

    fn body(&self) -> Option<Self::Element> {
        self.find(|_, name| name == "body")
    }

    fn root(&self) -> Option<Self::Element> {
        self.dom
            .document
            .children
            .borrow()
            .iter()
            .find(|child| html_element_name(child).is_some())
            .map(|handle| HtmlElement {
                handle: handle.clone(),
            })
    }
}

// ============================================================================
// SECTION: Element
// ============================================================================

/// Handle to one element of an [`HtmlDocument`].
#[derive(Clone)]
pub struct HtmlElement {
    /// Shared node handle.
    handle: Handle,
}

impl HtmlElement {
    /// Returns the element's lowercase tag name.
    #[must_use]
    pub fn tag(&self) -> &str {
        html_element_name(&self.handle).unwrap_or_default()
    }
}

impl StyleElement for HtmlElement {
    fn style_attribute(&self) -> Option<String> {
        attribute(&self.handle, "style")
    }

    fn set_style_attribute(&self, value: &str) {
        let NodeData::Element {
            attrs, ..
        } = &self.handle.data
        else {
            return;
        };
        let mut attrs = attrs.borrow_mut();
        if let Some(existing) = attrs.iter_mut().find(|attr| is_plain_named(attr, "style")) {
            existing.value = StrTendril::from_slice(value);
            return;
        }
        attrs.push(Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from("style")),
            value: StrTendril::from_slice(value),
        });
    }

    fn remove_style_attribute(&self) {
        if let NodeData::Element {
            attrs, ..
        } = &self.handle.data
        {
            attrs.borrow_mut().retain(|attr| !is_plain_named(attr, "style"));
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a no-namespace attribute.
fn attribute(node: &Handle, name: &str) -> Option<String> {
    let NodeData::Element {
        attrs, ..
    } = &node.data
    else {
        return None;
    };
    attrs.borrow().iter().find(|attr| is_plain_named(attr, name)).map(|attr| attr.value.to_string())
}

/// Returns true for a no-namespace attribute called `name`.
fn is_plain_named(attr: &Attribute, name: &str) -> bool {
    attr.name.ns.is_empty() && attr.name.local.as_ref() == name
}
