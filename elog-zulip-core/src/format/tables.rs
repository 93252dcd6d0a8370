//! Nested table location and table to markdown conversion.
//!
//! Logbook bodies use tables for two unrelated things: real tabular data and quoted
//! replies (a one-column table whose header reads `<author> wrote:`). Quoted replies nest,
//! so a conversion only ever looks at the tables one level below the table it is working
//! on; deeper tables are handled by the recursive call for their own parent.

use std::collections::HashSet;
use std::sync::LazyLock;

use ego_tree::{NodeId, NodeRef};
use regex::Regex;
use scraper::{ElementRef, Node, Selector};

use super::html::{self, Visit};
use super::markdown::MarkdownRenderer;
use super::pack::text_len;
use super::placeholder::{self, Placeholder, PlaceholderIssuer, PlaceholderKind};

static WROTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*? wrote:$").expect("WROTE_RE: hardcoded regex is valid"));

static TR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("BUG: hardcoded selector 'tr' is statically valid"));

static TD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("BUG: hardcoded selector 'td' is statically valid"));

/// Upper bound on `colspan`, protecting against absurd grids.
const MAX_COLSPAN: usize = 100;

/// Quoted replies nested deeper than this are quoted as plain text.
const MAX_NESTING: usize = 16;

/// How a table is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableClassification {
    /// A previous message quoted inline by a reply.
    QuotedReply,
    /// Tabular data.
    DataTable,
    /// No usable row/column structure.
    Unparseable,
}

/// Every `<table>` below `root` whose table nesting depth, relative to `root`, is `depth`.
///
/// Depth 0 from a document root yields its top-level tables; depth 1 from a table yields
/// its immediate child tables. Results are in document order.
pub fn locate_tables<'a>(root: ElementRef<'a>, depth: usize) -> Vec<ElementRef<'a>> {
    let base = table_ancestors(*root);
    root.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "table")
        .filter(|element| table_ancestors(**element) - base == depth)
        .collect()
}

fn table_ancestors(node: NodeRef<'_, Node>) -> usize {
    node.ancestors()
        .filter(|n| matches!(n.value(), Node::Element(e) if e.name() == "table"))
        .count()
}

/// A nested table cut out of its parent.
struct DetachedTable {
    placeholder: Placeholder,
    html: String,
    text: String,
}

/// The only nested table of `table`, when `table` carries no text of its own.
fn layout_child(table: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let child = match locate_tables(table, 1).as_slice() {
        [child] => *child,
        _ => return None,
    };
    (html::collapsed_text(table) == html::collapsed_text(child)).then_some(child)
}

/// Header and rows of a parsed table.
#[derive(Debug)]
struct Grid {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    columns: usize,
}

fn classify(grid: Option<&Grid>) -> TableClassification {
    match grid {
        None => TableClassification::Unparseable,
        Some(grid) if grid.columns == 1 && WROTE_RE.is_match(grid.header[0].trim()) => {
            TableClassification::QuotedReply
        }
        Some(_) => TableClassification::DataTable,
    }
}

/// Serialize `table` with each child table replaced by a placeholder paragraph.
fn detach_children(
    table: ElementRef<'_>,
    issuer: &mut PlaceholderIssuer,
) -> (String, Vec<DetachedTable>) {
    let nested: HashSet<NodeId> = locate_tables(table, 1).iter().map(|t| t.id()).collect();
    let mut children = Vec::new();

    let html = html::rewrite_element(table, &mut |element, _| {
        if !nested.contains(&element.id()) {
            return Visit::Keep;
        }
        let placeholder = issuer.issue(PlaceholderKind::Table);
        children.push(DetachedTable {
            placeholder,
            html: element.html(),
            text: html::collapsed_text(element),
        });
        Visit::Replace(format!("<p>{}</p>", placeholder))
    });

    (html, children)
}

/// Read the row/column structure of a table without nested tables.
fn parse_grid(table: ElementRef<'_>) -> Option<Grid> {
    let mut rows: Vec<Vec<String>> = Vec::new();

    for tr in table.select(&TR_SELECTOR) {
        let mut cells = Vec::new();
        for cell in tr
            .child_elements()
            .filter(|c| matches!(c.value().name(), "td" | "th"))
        {
            let span = cell
                .value()
                .attr("colspan")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(1)
                .clamp(1, MAX_COLSPAN);
            let text = html::collapsed_text(cell);
            cells.extend(std::iter::repeat_n(text, span));
        }
        if !cells.is_empty() {
            rows.push(cells);
        }
    }

    let columns = rows.iter().map(Vec::len).max()?;
    let mut rows = rows.into_iter();
    let header = rows.next()?;
    Some(Grid {
        header,
        rows: rows.collect(),
        columns,
    })
}

fn quote_block(inner: &str) -> String {
    format!("```quote\n{}\n```", inner.trim_end())
}

/// Render rows as a pipe table with padded columns.
fn render_markdown_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|c| text_len(c).max(3)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(text_len(cell));
        }
    }

    let format_row = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{}{}", cell, " ".repeat(width - text_len(cell))))
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(header));
    lines.push(format!("| {} |", separator.join(" | ")));
    lines.extend(rows.iter().map(|row| format_row(row)));
    lines.join("\n")
}

/// Split rows into the fewest consecutive ranges whose rendered tables fit `max_chars`.
///
/// Rendered size never shrinks when a row is added, so the longest fitting range from
/// each start is found by bisection. A row that does not fit even on its own is emitted
/// as an oversized table.
fn split_rows(header: &[String], rows: &[Vec<String>], max_chars: usize) -> Vec<String> {
    let fits = |range: &[Vec<String>]| text_len(&render_markdown_table(header, range)) <= max_chars;
    let mut tables = Vec::new();
    let mut start = 0;

    while start < rows.len() {
        let mut end = rows.len();
        if !fits(&rows[start..end]) {
            let (mut lo, mut hi) = (start + 1, rows.len() - 1);
            while lo < hi {
                let mid = lo + (hi - lo).div_ceil(2);
                if fits(&rows[start..mid]) {
                    lo = mid;
                } else {
                    hi = mid - 1;
                }
            }
            end = lo;
            if !fits(&rows[start..end]) {
                tracing::warn!(
                    "table row {} alone exceeds {} characters, sending it oversized",
                    start,
                    max_chars
                );
            }
        }
        tables.push(render_markdown_table(header, &rows[start..end]));
        start = end;
    }

    tables
}

/// Converts tables to markdown, recursing into quoted replies.
pub struct TableConverter<'r> {
    renderer: &'r MarkdownRenderer,
    max_chars: usize,
}

impl<'r> TableConverter<'r> {
    pub fn new(renderer: &'r MarkdownRenderer, max_chars: usize) -> Self {
        Self {
            renderer,
            max_chars,
        }
    }

    /// Convert a top-level table fragment.
    ///
    /// Returns several tables only when a data table had to be split to fit the budget.
    pub fn convert(&self, table_html: &str, issuer: &mut PlaceholderIssuer) -> Vec<String> {
        self.convert_at(table_html, 0, issuer)
    }

    fn convert_at(
        &self,
        table_html: &str,
        level: usize,
        issuer: &mut PlaceholderIssuer,
    ) -> Vec<String> {
        let document = html::parse(table_html);
        let Some(mut table) = locate_tables(document.root_element(), 0).into_iter().next() else {
            tracing::warn!("table fragment without a table, quoting it verbatim");
            return vec![quote_block(&self.renderer.render(table_html))];
        };
        while let Some(inner) = layout_child(table) {
            tracing::debug!("unwrapping layout table at nesting level {}", level);
            table = inner;
        }

        let (detached_html, children) = detach_children(table, issuer);
        let detached = html::parse(&detached_html);
        let detached_table = locate_tables(detached.root_element(), 0).into_iter().next();
        let grid = detached_table.and_then(parse_grid);

        let classification = classify(grid.as_ref());
        tracing::debug!(
            "table at nesting level {} classified as {:?} ({} nested)",
            level,
            classification,
            children.len()
        );

        match (classification, grid, detached_table) {
            (TableClassification::QuotedReply, Some(grid), Some(table)) => {
                let text = self.render_quoted_reply(table, &grid);
                vec![self.resolve_children(text, &children, level, issuer)]
            }
            (TableClassification::DataTable, Some(grid), _) => {
                self.render_data_table(grid, &children, level == 0)
            }
            _ => {
                let text = quote_block(&self.renderer.render(&detached_html));
                vec![self.resolve_children(text, &children, level, issuer)]
            }
        }
    }

    /// Author in bold followed by the quoted body, inside a quote block.
    fn render_quoted_reply(&self, table: ElementRef<'_>, grid: &Grid) -> String {
        let cells: Vec<ElementRef<'_>> = table.select(&TD_SELECTOR).collect();
        let header = grid.header[0].trim();

        let (author, body) = match cells.as_slice() {
            [author, body, ..] => (
                self.renderer.render(&author.inner_html()),
                self.renderer.render(&body.inner_html()),
            ),
            [only] if html::collapsed_text(*only) == header => {
                (self.renderer.render(&only.inner_html()), String::new())
            }
            [only] => (
                header.trim_end_matches("wrote:").trim_end().to_string(),
                self.renderer.render(&only.inner_html()),
            ),
            [] => (header.to_string(), String::new()),
        };

        let author = author.trim();
        if author.is_empty() {
            quote_block(&body)
        } else {
            quote_block(&format!("**{}**\n{}", author, body))
        }
    }

    /// Substitute the rendered child tables for their placeholders in `text`.
    fn resolve_children(
        &self,
        text: String,
        children: &[DetachedTable],
        level: usize,
        issuer: &mut PlaceholderIssuer,
    ) -> String {
        if children.is_empty() {
            return text;
        }

        let mut resolved: Vec<(Placeholder, String)> = Vec::with_capacity(children.len());
        for child in children {
            let rendered = if level + 1 > MAX_NESTING {
                tracing::warn!(
                    "quoted replies nested deeper than {} levels, quoting table {} as text",
                    MAX_NESTING,
                    child.placeholder.id()
                );
                quote_block(&child.text)
            } else {
                self.convert_at(&child.html, level + 1, issuer).join("\n")
            };
            resolved.push((child.placeholder, rendered));
        }

        let mut out = placeholder::substitute(&text, &resolved);

        // Tables outside the author and body cells have no token in the text.
        for (placeholder, rendered) in &resolved {
            if !text.contains(&placeholder.token()) {
                out.push_str("\n\n");
                out.push_str(rendered);
            }
        }

        let unresolved = placeholder::find_all(&out)
            .into_iter()
            .filter(|p| children.iter().any(|c| c.placeholder == *p))
            .count();
        if unresolved > 0 {
            tracing::warn!("{} nested tables left as placeholders", unresolved);
        }

        out
    }

    /// Render a data table, splitting it by rows when it is top-level and too large.
    fn render_data_table(
        &self,
        grid: Grid,
        children: &[DetachedTable],
        splittable: bool,
    ) -> Vec<String> {
        let flattened: Vec<(Placeholder, String)> = children
            .iter()
            .map(|c| (c.placeholder, c.text.clone()))
            .collect();
        let columns = grid.columns;
        let fill = |mut cells: Vec<String>| {
            cells.resize(columns, String::new());
            cells
                .into_iter()
                .map(|cell| placeholder::substitute(&cell, &flattened).replace('|', "\\|"))
                .collect::<Vec<_>>()
        };

        let header = fill(grid.header);
        let rows: Vec<Vec<String>> = grid
            .rows
            .into_iter()
            .map(fill)
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .collect();

        let table = render_markdown_table(&header, &rows);
        if !splittable || rows.is_empty() || text_len(&table) <= self.max_chars {
            return vec![table];
        }

        let tables = split_rows(&header, &rows, self.max_chars);
        tracing::debug!(
            "split a {}-row table into {} tables of at most {} characters",
            rows.len(),
            tables.len(),
            self.max_chars
        );
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(html: &str, max_chars: usize) -> Vec<String> {
        let renderer = MarkdownRenderer::default();
        TableConverter::new(&renderer, max_chars).convert(html, &mut PlaceholderIssuer::new())
    }

    fn cells(line: &str) -> Vec<String> {
        line.trim()
            .trim_start_matches('|')
            .trim_end_matches('|')
            .split('|')
            .map(|c| c.trim().to_string())
            .collect()
    }

    fn reply(author: &str, body: &str) -> String {
        format!(
            "<table><tr><td>{author} wrote:</td></tr><tr><td>{body}</td></tr></table>"
        )
    }

    #[test]
    fn test_locate_depth_zero_skips_nested_tables() {
        let html = "<table id=a><tr><td><table><tr><td><table><tr><td>deep</td></tr></table></td></tr></table></td></tr></table>\
                    <p>text</p><table id=b><tr><td>b</td></tr></table>";
        let document = html::parse(html);
        let tables = locate_tables(document.root_element(), 0);
        let ids: Vec<&str> = tables.iter().filter_map(|t| t.value().attr("id")).collect();
        assert_eq!(tables.len(), 2);
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_locate_depth_one_yields_only_children() {
        let html = "<table><tr><td><table id=child><tr><td><table id=grandchild><tr><td>x</td></tr></table></td></tr></table></td></tr></table>";
        let document = html::parse(html);
        let outer = locate_tables(document.root_element(), 0)[0];
        let children = locate_tables(outer, 1);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].value().attr("id"), Some("child"));

        let grandchildren = locate_tables(children[0], 1);
        assert_eq!(grandchildren[0].value().attr("id"), Some("grandchild"));
    }

    #[test]
    fn test_quoted_reply_renders_author_and_body() {
        let html = "<table><tr><th>Alice wrote:</th></tr><tr><td>Alice</td></tr><tr><td>Hello</td></tr></table>";
        let document = html::parse(html);
        let table = locate_tables(document.root_element(), 0)[0];
        assert_eq!(classify(parse_grid(table).as_ref()), TableClassification::QuotedReply);

        let out = convert(html, 10_000);
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("```quote\n"));
        assert!(out[0].ends_with("\n```"));
        assert!(out[0].contains("**Alice**"));
        assert!(out[0].contains("Hello"));
    }

    #[test]
    fn test_nested_quoted_replies_are_resolved_in_order() {
        let inner = reply("Alice", "Original message");
        let outer = reply("Bob", &format!("Reply text{}", inner));
        let out = convert(&outer, 10_000).join("\n");

        assert_eq!(out.matches("```quote").count(), 2);
        let bob = out.find("**Bob wrote:**").expect("outer author");
        let alice = out.find("**Alice wrote:**").expect("inner author");
        assert!(bob < alice);
        assert!(out.contains("Reply text"));
        assert!(out.contains("Original message"));
        assert!(placeholder::find_all(&out).is_empty());
    }

    #[test]
    fn test_deep_nesting_keeps_innermost_text() {
        let mut html = reply("Root", "deepest words");
        for level in 0..(MAX_NESTING + 5) {
            html = reply(&format!("Level{level}"), &format!("text{level}{html}"));
        }
        let out = convert(&html, 1_000_000).join("\n");
        assert!(out.contains(&format!("**Level{} wrote:**", MAX_NESTING + 4)));
        assert!(out.contains("deepest words"), "{out}");
        assert!(out.contains("text0"));
        assert!(placeholder::find_all(&out).is_empty());
    }

    #[test]
    fn test_layout_table_around_quoted_reply_is_unwrapped() {
        let html = "<table><tr><td><table>\
            <tr><th>Alice wrote:</th></tr><tr><td>Alice</td></tr><tr><td>hello there</td></tr>\
            </table></td></tr></table>";
        let out = convert(html, 10_000);
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("```quote\n"), "{}", out[0]);
        assert!(out[0].contains("**Alice**"));
        assert!(out[0].contains("hello there"));
        assert!(!out[0].contains('|'));
    }

    #[test]
    fn test_table_with_text_beside_child_is_not_unwrapped() {
        let html = "<table><tr><td>note</td><td><table><tr><td>in</td></tr></table></td></tr></table>";
        let document = html::parse(html);
        let table = locate_tables(document.root_element(), 0)[0];
        assert!(layout_child(table).is_none());
    }

    #[test]
    fn test_data_table_fills_missing_and_drops_empty_rows() {
        let html = "<table>\
            <tr><th>A</th><th>B</th></tr>\
            <tr><td>1</td><td>2</td></tr>\
            <tr><td></td><td>4</td></tr>\
            <tr><td> </td><td></td></tr>\
            <tr><td>9</td></tr>\
            </table>";
        let out = convert(html, 10_000);
        assert_eq!(out.len(), 1);

        let lines: Vec<&str> = out[0].lines().collect();
        assert_eq!(lines.len(), 5, "{}", out[0]);
        assert_eq!(cells(lines[0]), vec!["A", "B"]);
        assert_eq!(cells(lines[2]), vec!["1", "2"]);
        assert_eq!(cells(lines[3]), vec!["", "4"]);
        assert_eq!(cells(lines[4]), vec!["9", ""]);
    }

    #[test]
    fn test_colspan_repeats_cell() {
        let html = "<table><tr><th>a</th><th>b</th></tr><tr><td colspan=2>wide</td></tr></table>";
        let out = convert(html, 10_000);
        let last = out[0].lines().last().unwrap();
        assert_eq!(cells(last), vec!["wide", "wide"]);
    }

    #[test]
    fn test_data_table_cells_escape_pipes() {
        let html = "<table><tr><th>expr</th><th>x</th></tr><tr><td>a|b</td><td>1</td></tr></table>";
        let out = convert(html, 10_000);
        assert!(out[0].contains("a\\|b"));
    }

    #[test]
    fn test_table_nested_in_data_cell_is_flattened() {
        let html = "<table><tr><th>k</th><th>v</th></tr>\
            <tr><td>x</td><td><table><tr><td>in1</td><td>in2</td></tr></table></td></tr></table>";
        let out = convert(html, 10_000);
        assert_eq!(out.len(), 1);
        assert_eq!(cells(out[0].lines().last().unwrap()), vec!["x", "in1 in2"]);
    }

    #[test]
    fn test_empty_table_is_unparseable_quote() {
        let document = html::parse("<table></table>");
        let table = locate_tables(document.root_element(), 0)[0];
        assert_eq!(classify(parse_grid(table).as_ref()), TableClassification::Unparseable);

        let out = convert("<table></table>", 10_000);
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("```quote"));
    }

    #[test]
    fn test_large_table_split_into_fitting_ranges() {
        let rows: Vec<String> = (0..500).map(|i| format!("row {:04} {}", i, "x".repeat(40))).collect();
        let body: String = rows.iter().map(|r| format!("<tr><td>{}</td></tr>", r)).collect();
        let html = format!("<table><tr><th>value</th></tr>{}</table>", body);

        let tables = convert(&html, 10_000);
        assert!(tables.len() >= 3, "got {} tables", tables.len());

        let mut recovered = Vec::new();
        for table in &tables {
            assert!(text_len(table) <= 10_000);
            let lines: Vec<&str> = table.lines().collect();
            assert_eq!(cells(lines[0]), vec!["value"]);
            recovered.extend(lines[2..].iter().map(|l| cells(l).remove(0)));
        }
        assert_eq!(recovered, rows);
    }

    #[test]
    fn test_split_is_minimal_for_uniform_rows() {
        let header = vec!["h".to_string()];
        let rows: Vec<Vec<String>> = (0..10).map(|i| vec![format!("{:03}", i)]).collect();
        // Header and separator take 2 lines of 7 chars; each row adds 8 characters.
        let tables = split_rows(&header, &rows, 15 + 8 * 4);
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[0].lines().count(), 2 + 4);
        assert_eq!(tables[2].lines().count(), 2 + 2);
    }

    #[test]
    fn test_oversized_row_passes_through() {
        let long = "y".repeat(300);
        let html = format!(
            "<table><tr><th>h</th></tr><tr><td>{long}</td></tr><tr><td>short</td></tr></table>"
        );
        let tables = convert(&html, 100);
        assert_eq!(tables.len(), 2);
        assert!(text_len(&tables[0]) > 100);
        assert!(tables[0].contains(&long));
        assert!(text_len(&tables[1]) <= 100);
    }

    #[test]
    fn test_nested_data_table_is_never_split() {
        let body: String = (0..50).map(|i| format!("<tr><td>{i}</td><td>{}</td></tr>", "z".repeat(30))).collect();
        let inner = format!("<table><tr><th>n</th><th>z</th></tr>{body}</table>");
        let html = reply("Carol", &inner);
        let out = convert(&html, 400);
        assert_eq!(out.len(), 1);
        assert!(out[0].contains("**Carol wrote:**"));
        assert!(out[0].contains("| 49 "));
    }
}
