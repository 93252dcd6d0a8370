//! HTML parsing and a visitor-driven serializer.
//!
//! Every pipeline stage reads a fragment, walks the parsed tree once and writes a new
//! fragment. Nothing is mutated in place: subtrees a stage wants to treat separately are
//! serialized on their own and replaced in the output by whatever the visitor returns.

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node};

/// Elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose content never reaches the output.
const DROPPED_ELEMENTS: &[&str] = &["script", "style", "head", "title"];

/// What the serializer does with an element.
pub(crate) enum Visit {
    /// Write the element with its tags and walk its children.
    Keep,
    /// Walk the children but drop the element's own tags.
    Unwrap,
    /// Write the given raw HTML instead of the element.
    Replace(String),
    /// Drop the element and everything below it.
    Skip,
}

/// Parse an HTML fragment.
pub(crate) fn parse(html: &str) -> Html {
    Html::parse_fragment(html)
}

/// Serialize the content of a parsed fragment, asking `visit` about every element.
pub(crate) fn rewrite<'a, F>(document: &'a Html, visit: &mut F) -> String
where
    F: FnMut(ElementRef<'a>, &mut String) -> Visit,
{
    let mut out = String::new();
    write_children(*document.root_element(), &mut out, visit);
    out
}

/// Serialize one element (tags included), asking `visit` about it and its descendants.
pub(crate) fn rewrite_element<'a, F>(element: ElementRef<'a>, visit: &mut F) -> String
where
    F: FnMut(ElementRef<'a>, &mut String) -> Visit,
{
    let mut out = String::new();
    write_element(element, &mut out, visit);
    out
}

/// Serialize the children of `parent` into `out`.
///
/// `visit` also receives `out`, so a visitor may flush what was written so far.
pub(crate) fn write_children<'a, F>(parent: NodeRef<'a, Node>, out: &mut String, visit: &mut F)
where
    F: FnMut(ElementRef<'a>, &mut String) -> Visit,
{
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&html_escape::encode_text(&**text)),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    write_element(element, out, visit);
                }
            }
            _ => {}
        }
    }
}

fn write_element<'a, F>(element: ElementRef<'a>, out: &mut String, visit: &mut F)
where
    F: FnMut(ElementRef<'a>, &mut String) -> Visit,
{
    let name = element.value().name();
    if DROPPED_ELEMENTS.contains(&name) {
        return;
    }

    match visit(element, out) {
        Visit::Skip => {}
        Visit::Replace(html) => out.push_str(&html),
        Visit::Unwrap => write_children(*element, out, visit),
        Visit::Keep => {
            write_start_tag(element, out);
            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            write_children(*element, out, visit);
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

fn write_start_tag(element: ElementRef<'_>, out: &mut String) {
    out.push('<');
    out.push_str(element.value().name());
    for (name, value) in element.value().attrs() {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(value));
        out.push('"');
    }
    out.push('>');
}

/// Whitespace-collapsed text content of an element.
pub(crate) fn collapsed_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
