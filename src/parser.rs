//! Directive Parser
//!
//! Extracts bracketed action tokens (`[OPEN https://example.com]`) from
//! model-produced text. Pure, no side effects.

use crate::models::Directive;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// A bracket pair with no nested brackets inside.
    static ref DIRECTIVE_PATTERN: Regex = Regex::new(r"\[([^\[\]]*)\]").unwrap();
}

/// Parse every bracketed directive in `text`, in order of appearance.
pub fn parse_directives(text: &str) -> Vec<Directive> {
    if text.is_empty() {
        return Vec::new();
    }

    DIRECTIVE_PATTERN
        .captures_iter(text)
        .enumerate()
        .map(|(index, caps)| Directive::from_inner(index, &caps[1]))
        .collect()
}
