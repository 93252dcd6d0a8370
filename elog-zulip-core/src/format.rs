//! Entry body formatting.
//!
//! Turns the HTML body of a logbook entry into an ordered list of markdown [`Chunk`]s, each
//! small enough for one chat message. Tables (data or quoted replies) and inline images
//! are handled separately from the surrounding prose, and the results are packed back
//! together in reading order.

mod html;
pub mod images;
pub mod markdown;
pub mod pack;
pub mod placeholder;
pub mod tables;


use std::collections::HashSet;

use ego_tree::NodeId;

pub use images::InlineImage;
pub use markdown::{DEFAULT_LINE_WIDTH, MarkdownRenderer};
pub use placeholder::{Placeholder, PlaceholderKind};
pub use tables::TableClassification;

use html::Visit;
use images::{Extraction, ImageExtractor};
use pack::{pack_parts, split_lines};
use placeholder::PlaceholderIssuer;
use tables::TableConverter;

/// Default chunk budget in characters.
pub const DEFAULT_MAX_CHARS: usize = 9999;

/// Size settings of the formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Maximum characters per chunk.
    pub max_chars: usize,
    /// Target width of wrapped markdown lines.
    pub line_width: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            line_width: DEFAULT_LINE_WIDTH,
        }
    }
}

/// An ordered unit of output with the images its text references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPart {
    pub text: String,
    pub images: Vec<InlineImage>,
}

/// Consecutive parts packed into one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub images: Vec<InlineImage>,
}

/// A top-level piece of an entry body.
enum Span {
    Text(String),
    Table(String),
}

/// Formats entry bodies into chunks.
pub struct Formatter {
    options: FormatOptions,
    renderer: MarkdownRenderer,
}

impl Formatter {
    pub fn new(options: FormatOptions) -> Self {
        Self {
            options,
            renderer: MarkdownRenderer::new(options.line_width),
        }
    }

    pub fn options(&self) -> FormatOptions {
        self.options
    }

    /// Format an entry body using the configured chunk budget.
    pub fn format_text(&self, body: &str) -> Vec<Chunk> {
        self.format_text_within(body, self.options.max_chars)
    }

    /// Format an entry body into chunks of at most `max_chars` characters.
    ///
    /// Only a single line or table row that is longer than the budget on its own can
    /// produce an oversized chunk. Nothing is ever dropped.
    pub fn format_text_within(&self, body: &str, max_chars: usize) -> Vec<Chunk> {
        let max_chars = max_chars.max(1);
        let body = placeholder::scrub(body);
        let mut issuer = PlaceholderIssuer::new();
        let mut extractor = ImageExtractor::new();
        let converter = TableConverter::new(&self.renderer, max_chars);
        let mut parts = Vec::new();

        for span in partition(&body) {
            match span {
                Span::Text(fragment) => {
                    let Extraction { html, images } = extractor.extract(&fragment, &mut issuer);
                    let markdown = self.renderer.render(&html);
                    let texts = split_lines(&markdown, max_chars)
                        .into_iter()
                        .map(|block| block.trim_matches('\n').to_string())
                        .collect();
                    parts.extend(attach_images(texts, images));
                }
                Span::Table(fragment) => {
                    let Extraction { html, images } = extractor.extract(&fragment, &mut issuer);
                    let texts = converter.convert(&html, &mut issuer);
                    parts.extend(attach_images(texts, images));
                }
            }
        }

        let chunks = pack_parts(parts, max_chars);
        tracing::debug!(
            "formatted entry body into {} chunks ({} images)",
            chunks.len(),
            pack::images_of(&chunks).count()
        );
        chunks
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(FormatOptions::default())
    }
}

/// Split a body into prose and top-level tables, in document order.
fn partition(body: &str) -> Vec<Span> {
    let document = html::parse(body);
    let top_level: HashSet<NodeId> = tables::locate_tables(document.root_element(), 0)
        .iter()
        .map(|table| table.id())
        .collect();

    let mut spans = Vec::new();
    let tail = html::rewrite(&document, &mut |element, out| {
        if !top_level.contains(&element.id()) {
            return Visit::Keep;
        }
        spans.push(Span::Text(std::mem::take(out)));
        spans.push(Span::Table(element.html()));
        Visit::Skip
    });
    spans.push(Span::Text(tail));

    spans.retain(|span| !matches!(span, Span::Text(text) if text.trim().is_empty()));
    spans
}

/// Build parts from texts, giving each part the images whose tokens it contains.
fn attach_images(texts: Vec<String>, images: Vec<InlineImage>) -> Vec<ContentPart> {
    let mut parts: Vec<ContentPart> = texts
        .into_iter()
        .filter(|text| !text.trim().is_empty())
        .map(|text| ContentPart {
            text,
            images: Vec::new(),
        })
        .collect();

    for image in images {
        let token = image.placeholder.token();
        match parts.iter_mut().find(|part| part.text.contains(&token)) {
            Some(part) => part.images.push(image),
            None => {
                tracing::warn!(
                    "placeholder for image {} was lost during conversion, appending it",
                    image.filename
                );
                match parts.last_mut() {
                    Some(part) => {
                        part.text.push('\n');
                        part.text.push_str(&token);
                        part.images.push(image);
                    }
                    None => parts.push(ContentPart {
                        text: token,
                        images: vec![image],
                    }),
                }
            }
        }
    }

    parts
}
