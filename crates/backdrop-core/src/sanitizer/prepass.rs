// crates/backdrop-core/src/sanitizer/prepass.rs
// ============================================================================
// Module: Structural Pre-Pass
// Description: Pattern-based removal of active content before parsing.
// Purpose: Strip script blocks, event handlers, script URLs, and refreshes.
// Dependencies: regex
// ============================================================================

//! ## Overview
//! The pre-pass works on source text and is defense in depth: the allowlist
//! pass alone guarantees the output contract. Each rule is re-applied until
//! the text stops changing, so removals that splice a new match together
//! (`<scr<script></script>ipt>`) are caught as well.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::LazyLock;

use regex::Captures;
use regex::Regex;

use crate::patterns::static_regex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Upper bound on pre-pass rounds.
const MAX_ROUNDS: usize = 8;

/// Script element with its content.
static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"(?is)<script\b[^>]*>.*?</script\s*>"));

/// Meta refresh directive, with any attribute order and quoting.
static META_REFRESH: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r#"(?i)<meta\b[^>]*\bhttp-equiv\s*=\s*["']?\s*refresh\b[^>]*>"#)
});

/// Start tag with its attribute text.
static START_TAG: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"<([a-zA-Z][^\s/>]*)(\s[^>]*)?>"));

/// Single attribute inside a start tag.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
});

/// `javascript:` with whitespace tolerated between letters.
static SCRIPT_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r"(?i)j\s*a\s*v\s*a\s*s\s*c\s*r\s*i\s*p\s*t\s*:")
});

// ============================================================================
// SECTION: Pre-Pass
// ============================================================================

/// Applies every pre-pass rule until the text is stable.
pub(super) fn strip_active_content(source: &str) -> String {
    let mut current = source.to_string();
    for _ in 0 .. MAX_ROUNDS {
        let next = strip_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Applies every rule once.
fn strip_once(source: &str) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(source, "");
    let without_refresh = META_REFRESH.replace_all(&without_scripts, "");
    START_TAG.replace_all(&without_refresh, filter_start_tag).into_owned()
}

/// Rebuilds a start tag without event handlers or script-scheme values.
fn filter_start_tag(caps: &Captures<'_>) -> String {
    let whole = caps.get(0).map_or("", |m| m.as_str());
    let Some(body) = caps.get(2).map(|m| m.as_str()) else {
        return whole.to_string();
    };
    let name = caps.get(1).map_or("", |m| m.as_str());
    let mut kept: Vec<&str> = Vec::new();
    let mut removed = false;
    for attr in ATTRIBUTE.captures_iter(body) {
        let text = attr.get(0).map_or("", |m| m.as_str());
        let attr_name = attr.get(1).map_or("", |m| m.as_str());
        let value = attr.get(2).or_else(|| attr.get(3)).or_else(|| attr.get(4)).map(|m| m.as_str());
        if is_event_handler(attr_name) || value.is_some_and(|v| SCRIPT_SCHEME.is_match(v)) {
            removed = true;
        } else {
            kept.push(text);
        }
    }
    if !removed {
        return whole.to_string();
    }
    let self_closing = body.trim_end().ends_with('/');
    let mut rebuilt = String::with_capacity(whole.len());
    rebuilt.push('<');
    rebuilt.push_str(name);
    for text in kept {
        rebuilt.push(' ');
        rebuilt.push_str(text);
    }
    if self_closing {
        rebuilt.push_str(" /");
    }
    rebuilt.push('>');
    rebuilt
}

/// Returns true for `on*` attribute names.
fn is_event_handler(name: &str) -> bool {
    name.get(.. 2).is_some_and(|prefix| prefix.eq_ignore_ascii_case("on"))
}

