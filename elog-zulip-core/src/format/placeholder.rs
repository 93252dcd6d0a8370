//! Placeholder tokens standing in for detached nested tables and extracted images.
//!
//! Tokens are delimited by two Unicode private-use code points. Those code points are
//! scrubbed from every entry body before processing starts, so a token can never collide
//! with text typed by an author.

use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Opening delimiter of a placeholder token.
const OPEN: char = '\u{E000}';
/// Closing delimiter of a placeholder token.
const CLOSE: char = '\u{E001}';

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("\u{E000}(table|image):([0-9]+)\u{E001}")
        .expect("TOKEN_RE: hardcoded regex is valid")
});

/// What a placeholder stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlaceholderKind {
    /// A nested table detached while its parent table is parsed.
    Table,
    /// An inline base64 image extracted as an attachment.
    Image,
}

impl PlaceholderKind {
    fn tag(self) -> &'static str {
        match self {
            PlaceholderKind::Table => "table",
            PlaceholderKind::Image => "image",
        }
    }
}

/// A unique token embedded as literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Placeholder {
    kind: PlaceholderKind,
    id: u32,
}

impl Placeholder {
    /// The kind of content this placeholder replaces.
    pub fn kind(&self) -> PlaceholderKind {
        self.kind
    }

    /// The numeric id, unique within one entry.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The literal token as it appears in text.
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}{}", OPEN, self.kind.tag(), self.id, CLOSE)
    }
}

/// Issues placeholders with a monotonic id. One issuer lives for one entry.
#[derive(Debug, Default)]
pub struct PlaceholderIssuer {
    next: u32,
}

impl PlaceholderIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh placeholder of the given kind.
    pub fn issue(&mut self, kind: PlaceholderKind) -> Placeholder {
        self.next += 1;
        Placeholder {
            kind,
            id: self.next,
        }
    }
}

/// Remove placeholder delimiters from untrusted input.
pub fn scrub(text: &str) -> Cow<'_, str> {
    if text.contains(&[OPEN, CLOSE][..]) {
        Cow::Owned(text.chars().filter(|c| *c != OPEN && *c != CLOSE).collect())
    } else {
        Cow::Borrowed(text)
    }
}

/// Every placeholder token found in `text`, in order of appearance.
pub fn find_all(text: &str) -> Vec<Placeholder> {
    TOKEN_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let kind = match &caps[1] {
                "table" => PlaceholderKind::Table,
                _ => PlaceholderKind::Image,
            };
            let id = caps[2].parse().ok()?;
            Some(Placeholder { kind, id })
        })
        .collect()
}

/// Substitute resolved placeholders into `text`.
///
/// Runs to a fixed point so that a resolution may itself contain a token resolved by a
/// later entry. Each pass must consume at least one key, so the loop ends after at most
/// `resolved.len()` passes. Tokens without a resolution are left literally in place.
pub fn substitute(text: &str, resolved: &[(Placeholder, String)]) -> String {
    let mut out = text.to_string();
    let mut pending: Vec<&(Placeholder, String)> = resolved.iter().collect();

    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|(placeholder, value)| {
            let token = placeholder.token();
            if out.contains(&token) {
                out = out.replace(&token, value);
                false
            } else {
                true
            }
        });
        if pending.len() == before {
            break;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_is_monotonic_across_kinds() {
        let mut issuer = PlaceholderIssuer::new();
        let a = issuer.issue(PlaceholderKind::Table);
        let b = issuer.issue(PlaceholderKind::Image);
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert_ne!(a.token(), b.token());
    }

    #[test]
    fn test_scrub_removes_delimiters() {
        let dirty = format!("a{}table:1{}b", OPEN, CLOSE);
        assert_eq!(scrub(&dirty), "atable:1b");
        assert!(matches!(scrub("clean"), Cow::Borrowed("clean")));
    }

    #[test]
    fn test_find_all_in_order() {
        let mut issuer = PlaceholderIssuer::new();
        let t = issuer.issue(PlaceholderKind::Table);
        let i = issuer.issue(PlaceholderKind::Image);
        let text = format!("x {} y {} z", i, t);
        assert_eq!(find_all(&text), vec![i, t]);
    }

    #[test]
    fn test_author_text_is_not_a_token() {
        assert!(find_all("table:1 image:2 {}").is_empty());
    }

    #[test]
    fn test_substitute_nested_resolution() {
        let mut issuer = PlaceholderIssuer::new();
        let outer = issuer.issue(PlaceholderKind::Table);
        let inner = issuer.issue(PlaceholderKind::Table);
        let resolved = vec![
            (inner, "INNER".to_string()),
            (outer, format!("outer[{}]", inner)),
        ];
        let text = format!("start {} end", outer);
        assert_eq!(substitute(&text, &resolved), "start outer[INNER] end");
    }

    #[test]
    fn test_substitute_leaves_unresolved_tokens() {
        let mut issuer = PlaceholderIssuer::new();
        let known = issuer.issue(PlaceholderKind::Table);
        let unknown = issuer.issue(PlaceholderKind::Table);
        let text = format!("{} and {}", known, unknown);
        let out = substitute(&text, &[(known, "done".to_string())]);
        assert_eq!(out, format!("done and {}", unknown));
        assert_eq!(find_all(&out), vec![unknown]);
    }
}
