// crates/backdrop-core/src/sanitizer/markup.rs
// ============================================================================
// Module: Markup Tree Serialization
// Description: HTML5 parsing and filtered re-serialization of DOM trees.
// Purpose: Share one bounded, non-recursive serializer between passes.
// Dependencies: html5ever, markup5ever_rcdom
// ============================================================================

//! ## Overview
//! Documents are parsed with html5ever into an `RcDom` and written back out
//! by an explicit-stack walk, so hostile nesting depth cannot exhaust the
//! call stack. An [`ElementFilter`] decides which elements, attributes, and
//! text runs survive; the writer guarantees escaping and closed elements.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::rc::Rc;

use html5ever::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use markup5ever_rcdom::Handle;
use markup5ever_rcdom::NodeData;
use markup5ever_rcdom::RcDom;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Namespace of HTML elements.
const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Maximum element depth written out; deeper subtrees are dropped.
pub(crate) const MAX_ELEMENT_DEPTH: usize = 512;

/// Elements without end tags.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text is written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script"];

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a full HTML document.
pub(crate) fn parse_markup(markup: &str) -> RcDom {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            scripting_enabled: false,
            ..TreeBuilderOpts::default()
        },
        ..ParseOpts::default()
    };
    parse_document(RcDom::default(), opts).one(markup)
}

/// Returns the lowercase local name of an HTML element node.
pub(crate) fn html_element_name(node: &Handle) -> Option<&str> {
    match &node.data {
        NodeData::Element {
            name, ..
        } if name.ns.as_ref() == HTML_NAMESPACE => Some(name.local.as_ref()),
        _ => None,
    }
}

// ============================================================================
// SECTION: Filtering
// ============================================================================

/// Outcome of filtering one element.
pub(crate) enum ElementAction<'a> {
    /// Write the element under the given tag name.
    Emit {
        /// Tag name to write.
        tag: &'a str,
        /// Whether children are visited.
        keep_children: bool,
    },
    /// Skip the element and its subtree.
    Drop,
}

/// Decides which parts of a tree are serialized.
pub(crate) trait ElementFilter {
    /// Maps an HTML element name to its action.
    fn element<'t>(&'t self, tag: &'t str) -> ElementAction<'t>;

    /// Returns true when an emitted child tag may appear under `parent`
    /// (`None` for the document node).
    fn admits_child(&self, parent: Option<&str>, child: &str) -> bool;

    /// Returns true when a text run may appear under `parent`.
    fn admits_text(&self, parent: Option<&str>, text: &str) -> bool;

    /// Returns true when the attribute survives on the emitted tag.
    fn attribute(&self, tag: &str, name: &str, value: &str) -> bool;
}

/// Filter that keeps every HTML element, attribute, and text run.
pub(crate) struct Passthrough;

impl ElementFilter for Passthrough {
    fn element<'t>(&'t self, tag: &'t str) -> ElementAction<'t> {
        ElementAction::Emit {
            tag,
            keep_children: true,
        }
    }

    fn admits_child(&self, _parent: Option<&str>, _child: &str) -> bool {
        true
    }

    fn admits_text(&self, parent: Option<&str>, _text: &str) -> bool {
        parent.is_some()
    }

    fn attribute(&self, _tag: &str, _name: &str, _value: &str) -> bool {
        true
    }
}

// ============================================================================
// SECTION: Serialization
// ============================================================================

/// Pending work for the explicit-stack walk.
enum Step {
    /// Visit a node under the given emitted parent tag.
    Visit {
        /// Node to visit.
        node: Handle,
        /// Emitted tag of the parent element, `None` at document level.
        parent: Option<Rc<str>>,
        /// Element depth of `node`.
        depth: usize,
    },
    /// Write an end tag.
    Close(Rc<str>),
}

/// Serializes a parsed document through a filter.
pub(crate) fn serialize_document(dom: &RcDom, filter: &impl ElementFilter) -> String {
    let mut out = String::new();
    let mut stack = vec![Step::Visit {
        node: dom.document.clone(),
        parent: None,
        depth: 0,
    }];
    while let Some(step) = stack.pop() {
        match step {
            Step::Close(tag) => write_end_tag(&mut out, &tag),
            Step::Visit {
                node,
                parent,
                depth,
            } => visit(&mut out, &mut stack, filter, &node, parent, depth),
        }
    }
    out
}

/// Handles one node, pushing follow-up steps for its children.
fn visit(
    out: &mut String,
    stack: &mut Vec<Step>,
    filter: &impl ElementFilter,
    node: &Handle,
    parent: Option<Rc<str>>,
    depth: usize,
) {
    match &node.data {
        NodeData::Document => push_children(stack, node, parent.as_ref(), depth),
        NodeData::Doctype {
            ..
        } => {
            if parent.is_none() {
                out.push_str("<!DOCTYPE html>");
            }
        }
        NodeData::Text {
            contents,
        } => {
            let text = contents.borrow();
            let parent_tag = parent.as_deref();
            if !filter.admits_text(parent_tag, &text) {
                return;
            }
            if parent_tag.is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag)) {
                out.push_str(&text);
            } else {
                escape_text(out, &text);
            }
        }
        NodeData::Element {
            attrs, ..
        } => {
            let Some(name) = html_element_name(node) else {
                return;
            };
            if depth >= MAX_ELEMENT_DEPTH {
                return;
            }
            let ElementAction::Emit {
                tag,
                keep_children,
            } = filter.element(name)
            else {
                return;
            };
            if !filter.admits_child(parent.as_deref(), tag) {
                return;
            }
            out.push('<');
            out.push_str(tag);
            for attr in attrs.borrow().iter() {
                if !attr.name.ns.is_empty() || attr.name.prefix.is_some() {
                    continue;
                }
                let attr_name: &str = attr.name.local.as_ref();
                let value: &str = &attr.value;
                if !is_serializable_name(attr_name) || !filter.attribute(tag, attr_name, value) {
                    continue;
                }
                out.push(' ');
                out.push_str(attr_name);
                out.push_str("=\"");
                escape_attribute(out, value);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag) {
                return;
            }
            let emitted: Rc<str> = Rc::from(tag);
            stack.push(Step::Close(Rc::clone(&emitted)));
            if keep_children {
                push_children(stack, node, Some(&emitted), depth + 1);
            }
        }
        NodeData::Comment {
            ..
        }
        | NodeData::ProcessingInstruction {
            ..
        } => {}
    }
}

/// Pushes children in reverse so they pop in document order.
fn push_children(stack: &mut Vec<Step>, node: &Handle, parent: Option<&Rc<str>>, depth: usize) {
    for child in node.children.borrow().iter().rev() {
        stack.push(Step::Visit {
            node: child.clone(),
            parent: parent.cloned(),
            depth,
        });
    }
}

/// Writes an end tag.
fn write_end_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Returns true for attribute names that cannot break out of a start tag.
fn is_serializable_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|ch| {
            !ch.is_whitespace() && !ch.is_control() && !matches!(ch, '"' | '\'' | '>' | '<' | '/' | '=')
        })
}

/// Escapes character data.
fn escape_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

/// Escapes a double-quoted attribute value.
fn escape_attribute(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}
