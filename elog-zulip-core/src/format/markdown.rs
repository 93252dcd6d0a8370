//! HTML fragment to chat-flavoured markdown.
//!
//! Conversion is delegated to `htmd`. Its output is then normalised so that text typed by
//! authors survives in a chat message: bullets stay bullets, emphasis and link syntax are
//! not backslash-escaped, and only the line-start quote/heading markers keep their escapes.
//! Finally long lines are wrapped at a fixed width.

use htmd::HtmlToMarkdown;

use super::html::{self, Visit};

/// Default target line width of rendered markdown.
pub const DEFAULT_LINE_WIDTH: usize = 350;

/// Characters never left escaped, wherever they appear.
const LITERAL_ANYWHERE: &[char] = &['[', ']', '*', '~', '<', '.', '(', ')'];

/// Characters left escaped at the start of a line only.
const LITERAL_MID_LINE: &[char] = &['>', '#'];

/// Converts table-free HTML fragments to markdown.
pub struct MarkdownRenderer {
    converter: HtmlToMarkdown,
    line_width: usize,
}

impl MarkdownRenderer {
    pub fn new(line_width: usize) -> Self {
        Self {
            converter: HtmlToMarkdown::builder().build(),
            line_width: line_width.max(1),
        }
    }

    pub fn line_width(&self) -> usize {
        self.line_width
    }

    /// Render an HTML fragment to markdown.
    ///
    /// Never fails: if the converter errors, the collapsed text content is used instead.
    pub fn render(&self, fragment: &str) -> String {
        let unwrapped = unwrap_containers(fragment);
        let markdown = match self.converter.convert(&unwrapped) {
            Ok(markdown) => markdown,
            Err(e) => {
                tracing::warn!("markdown conversion failed, using plain text: {}", e);
                plain_text(&unwrapped)
            }
        };
        let markdown = html_escape::decode_html_entities(&markdown);
        let markdown = normalize_escapes(&markdown);
        wrap_lines(&markdown, self.line_width)
            .trim_matches('\n')
            .to_string()
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_WIDTH)
    }
}

/// Drop `span` and `div` tags, promoting their children.
fn unwrap_containers(fragment: &str) -> String {
    let document = html::parse(fragment);
    html::rewrite(&document, &mut |element, _| match element.value().name() {
        "span" | "div" => Visit::Unwrap,
        _ => Visit::Keep,
    })
}

fn plain_text(fragment: &str) -> String {
    let document = html::parse(fragment);
    html::collapsed_text(document.root_element())
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Rewrite backslash escapes line by line, leaving fenced code untouched.
pub(crate) fn normalize_escapes(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut in_fence = false;

    for line in markdown.split_inclusive('\n') {
        if is_fence(line) {
            in_fence = !in_fence;
            out.push_str(line);
        } else if in_fence {
            out.push_str(line);
        } else {
            normalize_line(line, &mut out);
        }
    }

    out
}

fn normalize_line(line: &str, out: &mut String) {
    let mut at_line_start = true;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            if !ch.is_whitespace() {
                at_line_start = false;
            }
            out.push(ch);
            continue;
        }

        let Some(&next) = chars.peek() else {
            out.push(ch);
            break;
        };

        let unescape = if next == '\\' {
            false
        } else if at_line_start {
            next == '-' || LITERAL_ANYWHERE.contains(&next)
        } else {
            LITERAL_ANYWHERE.contains(&next) || LITERAL_MID_LINE.contains(&next)
        };

        if !unescape {
            out.push(ch);
        }
        out.push(next);
        chars.next();
        at_line_start = false;
    }
}

/// Indentation for the continuation lines of a wrapped line.
fn continuation_indent(line: &str) -> String {
    let content = line.trim_start();
    let mut indent = " ".repeat(line.len() - content.len());

    if content.starts_with("> ") {
        indent.push_str("> ");
    } else if ["- ", "* ", "+ "].iter().any(|m| content.starts_with(m)) {
        indent.push_str("  ");
    } else if let Some(dot) = content.find(". ")
        && dot > 0
        && content[..dot].chars().all(|c| c.is_ascii_digit())
    {
        indent.push_str(&" ".repeat(dot + 2));
    }

    indent
}

/// Wrap prose lines longer than `width`; code fences and table rows are left alone.
pub(crate) fn wrap_lines(markdown: &str, width: usize) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut in_fence = false;

    for (index, line) in markdown.split('\n').enumerate() {
        if index > 0 {
            out.push('\n');
        }
        if is_fence(line) {
            in_fence = !in_fence;
            out.push_str(line);
            continue;
        }
        if in_fence || line.trim_start().starts_with('|') || line.chars().count() <= width {
            out.push_str(line);
            continue;
        }

        let indent = continuation_indent(line);
        let options = textwrap::Options::new(width)
            .subsequent_indent(&indent)
            .break_words(false);
        let wrapped = textwrap::wrap(line, options);
        out.push_str(&wrapped.join("\n"));
    }

    out
}
