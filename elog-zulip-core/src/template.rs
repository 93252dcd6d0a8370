//! Minimal `{{ Key }}` templates over entry attributes.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::entry::Attributes;

static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("VARIABLE_RE: hardcoded regex is valid")
});

/// Substitute every `{{ Key }}` in `template` with the attribute value.
///
/// Unknown keys render as an empty string.
pub fn render(template: &str, attributes: &Attributes) -> String {
    VARIABLE_RE
        .replace_all(template, |caps: &Captures<'_>| {
            attributes.get_or_empty(&caps[1]).to_string()
        })
        .into_owned()
}
