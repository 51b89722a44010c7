// crates/backdrop-core/src/injector/style.rs
// ============================================================================
// Module: Inline Style Editing
// Description: Declaration-level edits of an element's inline style text.
// Purpose: Swap or remove the background image without touching other rules.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! Inline style text is split into declarations on `;` outside quotes and
//! parentheses, so `url(data:image/png;base64,...)` stays whole. Edits keep
//! unrelated declarations and drop empty segments.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Regex;

use crate::patterns::static_regex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Property carrying the background image.
const BACKGROUND_IMAGE: &str = "background-image";

/// Companion properties written next to an override background image.
const COMPANION_OVERRIDES: [(&str, &str); 3] = [
    ("background-size", "cover"),
    ("background-position", "center"),
    ("background-repeat", "no-repeat"),
];

/// `url(...)` token with its quote and URL captured.
static URL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r#"(?i)url\(\s*(['"]?)([^'")]*?)(['"]?)\s*\)"#));

// ============================================================================
// SECTION: Declarations
// ============================================================================

/// One `name: value` segment of inline style text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Declaration<'a> {
    /// Trimmed source text of the declaration.
    text: &'a str,
    /// Byte offset of `text` within the style attribute.
    offset: usize,
    /// Lowercase property name.
    name: String,
    /// Whether the value ends in `!important`.
    important: bool,
    /// Whether the value contains a `url(` token.
    has_url: bool,
}

impl Declaration<'_> {
    /// Returns true for a background image given by URL.
    fn is_background_url(&self) -> bool {
        self.name == BACKGROUND_IMAGE && self.has_url
    }

    /// Returns true for any of the four properties the override path writes.
    fn is_override_property(&self) -> bool {
        self.name == BACKGROUND_IMAGE || is_companion(&self.name)
    }
}

/// Splits style text into non-empty declarations.
fn declarations(style: &str) -> Vec<Declaration<'_>> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (index, ch) in style.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                push_declaration(&mut out, style, start, index);
                start = index + 1;
            }
            (None, _) => {}
        }
    }
    push_declaration(&mut out, style, start, style.len());
    out
}

/// Adds the trimmed segment `style[start..end]` when it is not empty.
fn push_declaration<'a>(out: &mut Vec<Declaration<'a>>, style: &'a str, start: usize, end: usize) {
    let segment = &style[start .. end];
    let text = segment.trim();
    if text.is_empty() {
        return;
    }
    let offset = start + (segment.len() - segment.trim_start().len());
    let (name, value) = text.split_once(':').unwrap_or((text, ""));
    let compact: String = value.chars().filter(|ch| !ch.is_whitespace()).collect();
    let compact = compact.to_ascii_lowercase();
    out.push(Declaration {
        text,
        offset,
        name: name.trim().to_ascii_lowercase(),
        important: compact.ends_with("!important"),
        has_url: compact.contains("url("),
    });
}

/// Returns true for the companion override properties.
fn is_companion(name: &str) -> bool {
    COMPANION_OVERRIDES.iter().any(|(property, _)| *property == name)
}

/// Joins declarations back into style text.
fn join(declarations: &[&Declaration<'_>]) -> String {
    declarations.iter().map(|declaration| declaration.text).collect::<Vec<_>>().join("; ")
}

// ============================================================================
// SECTION: Apply
// ============================================================================

/// Replaces only the URL of the first inline background image.
///
/// The declaration is matched by exact property name, so custom properties
/// such as `--hero-background-image` are left alone. Returns `None` when the
/// style has no `background-image: url(...)` declaration.
pub(super) fn replace_background_url(style: &str, url: &str) -> Option<String> {
    let declaration = declarations(style).into_iter().find(Declaration::is_background_url)?;
    let caps = URL_TOKEN.captures(declaration.text)?;
    let open = caps.get(1)?;
    let target = caps.get(2)?;
    let replacement = match open.as_str() {
        "'" => escape_css_string(url, '\''),
        "\"" => escape_css_string(url, '"'),
        _ if needs_quotes(url) => format!("\"{}\"", escape_css_string(url, '"')),
        _ => url.to_string(),
    };
    let mut out = String::with_capacity(style.len() + url.len());
    out.push_str(&style[.. declaration.offset + target.start()]);
    out.push_str(&replacement);
    out.push_str(&style[declaration.offset + target.end() ..]);
    Some(out)
}

/// Writes the four high-priority background overrides.
pub(super) fn apply_overrides(style: Option<&str>, url: &str) -> String {
    let existing = style.map(declarations).unwrap_or_default();
    let mut parts: Vec<String> = existing
        .iter()
        .filter(|declaration| !declaration.is_override_property())
        .map(|declaration| declaration.text.to_string())
        .collect();
    parts.push(format!("{BACKGROUND_IMAGE}: url(\"{}\") !important", escape_css_string(url, '"')));
    for (property, value) in COMPANION_OVERRIDES {
        parts.push(format!("{property}: {value} !important"));
    }
    parts.join("; ")
}

// ============================================================================
// SECTION: Reset
// ============================================================================

/// Kind of declarations a reset removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ResetKind {
    /// The inline background image (and its overrides when important).
    Inline,
    /// Leftover high-priority overrides without an image.
    Overrides,
}

/// Result of a reset edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ResetEdit {
    /// What was removed.
    pub(super) kind: ResetKind,
    /// Remaining style text, `None` when nothing is left.
    pub(super) style: Option<String>,
}

/// Removes the background set by apply; `None` when nothing matched.
pub(super) fn reset_background(style: &str) -> Option<ResetEdit> {
    let all = declarations(style);
    let image = all.iter().find(|declaration| declaration.is_background_url());
    let (kind, kept): (ResetKind, Vec<&Declaration<'_>>) = if let Some(image) = image {
        let drop_companions = image.important;
        let kept = all
            .iter()
            .filter(|declaration| {
                !declaration.is_background_url()
                    && !(drop_companions && declaration.important && is_companion(&declaration.name))
            })
            .collect();
        (ResetKind::Inline, kept)
    } else {
        let kept = all
            .iter()
            .filter(|declaration| !(declaration.important && declaration.is_override_property()))
            .collect();
        (ResetKind::Overrides, kept)
    };
    if kept.len() == all.len() {
        return None;
    }
    let remaining = join(&kept);
    Some(ResetEdit {
        kind,
        style: (!remaining.is_empty()).then_some(remaining),
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Escapes a value for a CSS string delimited by `quote`.
fn escape_css_string(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\a "),
            '\r' => out.push_str("\\d "),
            ch if ch == quote => {
                out.push('\\');
                out.push(ch);
            }
            other => out.push(other),
        }
    }
    out
}

/// Returns true when a URL cannot appear unquoted inside `url(...)`.
fn needs_quotes(url: &str) -> bool {
    url.chars().any(|ch| ch.is_whitespace() || matches!(ch, '"' | '\'' | '(' | ')' | '\\'))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwrap for clarity.")]

    use super::ResetKind;
    use super::apply_overrides;
    use super::declarations;
    use super::replace_background_url;
    use super::reset_background;

    #[test]
    fn splits_outside_parentheses_and_quotes() {
        let parts = declarations("a:1;;background:url(data:image/png;base64,AA); content:'x;y' ;");
        let texts: Vec<&str> = parts.iter().map(|d| d.text).collect();
        assert_eq!(texts, ["a:1", "background:url(data:image/png;base64,AA)", "content:'x;y'"]);
    }

    #[test]
    fn replaces_url_keeping_quote_style() {
        assert_eq!(
            replace_background_url("color:red;background-image:url('a.png')", "b.png").unwrap(),
            "color:red;background-image:url('b.png')"
        );
        assert_eq!(
            replace_background_url("background-image: url( a.png )", "https://x/b c.png").unwrap(),
            "background-image: url( \"https://x/b c.png\" )"
        );
        assert_eq!(
            replace_background_url("background-image:url(\"a\") !important", "it's").unwrap(),
            "background-image:url(\"it's\") !important"
        );
        assert!(replace_background_url("color:red", "b.png").is_none());
    }

    #[test]
    fn custom_properties_are_not_background_images() {
        let style = "--my-background-image:url(x.png)";
        assert!(replace_background_url(style, "b.png").is_none());
        assert!(reset_background(style).is_none());
        assert_eq!(
            replace_background_url("--my-background-image:url(x.png); background-image:url(a.png)", "b.png")
                .unwrap(),
            "--my-background-image:url(x.png); background-image:url(b.png)"
        );
    }

    #[test]
    fn overrides_replace_prior_background_properties() {
        assert_eq!(
            apply_overrides(Some("color:red; background-size: 10px;"), "https://x/b.png"),
            "color:red; background-image: url(\"https://x/b.png\") !important; background-size: \
             cover !important; background-position: center !important; background-repeat: \
             no-repeat !important"
        );
    }

    #[test]
    fn reset_removes_plain_inline_image_only() {
        let edit = reset_background("color:red;background-image:url('b.png');background-size:cover")
            .unwrap();
        assert_eq!(edit.kind, ResetKind::Inline);
        assert_eq!(edit.style.unwrap(), "color:red; background-size:cover");
    }

    #[test]
    fn reset_removes_important_companions_with_image() {
        let style = apply_overrides(None, "https://x/b.png");
        let edit = reset_background(&style).unwrap();
        assert_eq!(edit.kind, ResetKind::Inline);
        assert!(edit.style.is_none());
    }

    #[test]
    fn reset_clears_orphaned_overrides() {
        let edit = reset_background("margin:0;background-size:cover !important").unwrap();
        assert_eq!(edit.kind, ResetKind::Overrides);
        assert_eq!(edit.style.unwrap(), "margin:0");
        assert!(reset_background("margin:0; background-image: none").is_none());
    }
}
