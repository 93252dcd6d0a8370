//! Greedy packing of text into size-bounded chunks.

use super::images::InlineImage;
use super::{Chunk, ContentPart};

/// Separator inserted between two parts packed into the same chunk.
///
/// A blank line, so a table never shares a markdown block with the text around it.
pub const PART_SEPARATOR: &str = "\n\n";

/// Length of text as counted against the message budget.
pub fn text_len(text: &str) -> usize {
    text.chars().count()
}

/// Split text at line boundaries into blocks of at most `max_chars`.
///
/// Lines are kept whole: a single line longer than the limit becomes its own block.
/// Concatenating the blocks gives back the input.
pub fn split_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let len = text_len(line);
        if current_len > 0 && current_len + len > max_chars {
            blocks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if len > max_chars {
            tracing::debug!("line of {} characters exceeds the {} character limit", len, max_chars);
        }
        current.push_str(line);
        current_len += len;
    }

    if current_len > 0 {
        blocks.push(current);
    }
    blocks
}

/// Pack parts, in order, into as few chunks of at most `max_chars` as greedy filling gives.
///
/// Parts are never split. One larger than the limit travels alone in its own chunk.
/// Images follow the part that references them.
pub fn pack_parts(parts: Vec<ContentPart>, max_chars: usize) -> Vec<Chunk> {
    let separator_len = text_len(PART_SEPARATOR);
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut current_len = 0;

    for part in parts {
        let len = text_len(&part.text);
        let fits = chunks.last().is_some_and(|_| current_len + separator_len + len <= max_chars);

        if fits && let Some(chunk) = chunks.last_mut() {
            chunk.content.push_str(PART_SEPARATOR);
            chunk.content.push_str(&part.text);
            chunk.images.extend(part.images);
            current_len += separator_len + len;
        } else {
            if len > max_chars {
                tracing::warn!(
                    "content part of {} characters exceeds the {} character limit",
                    len,
                    max_chars
                );
            }
            chunks.push(Chunk {
                content: part.text,
                images: part.images,
            });
            current_len = len;
        }
    }

    chunks
}

/// All images carried by `chunks`, in order.
pub fn images_of(chunks: &[Chunk]) -> impl Iterator<Item = &InlineImage> {
    chunks.iter().flat_map(|c| c.images.iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(text: &str) -> ContentPart {
        ContentPart {
            text: text.to_string(),
            images: Vec::new(),
        }
    }

    #[test]
    fn test_split_lines_respects_limit() {
        let text = "aaaa\nbbbb\ncccc\ndddd\n";
        let blocks = split_lines(text, 10);
        assert_eq!(blocks, vec!["aaaa\nbbbb\n", "cccc\ndddd\n"]);
        assert_eq!(blocks.concat(), text);
    }

    #[test]
    fn test_split_lines_oversized_line_alone() {
        let long = "x".repeat(30);
        let text = format!("a\n{long}\nb");
        let blocks = split_lines(&text, 10);
        assert_eq!(blocks, vec!["a\n".to_string(), format!("{long}\n"), "b".to_string()]);
    }

    #[test]
    fn test_split_lines_counts_characters() {
        let text = "ééééé\nééééé\n";
        assert_eq!(split_lines(text, 12).len(), 1);
    }

    #[test]
    fn test_split_lines_empty_input() {
        assert!(split_lines("", 10).is_empty());
    }

    #[test]
    fn test_pack_parts_joins_with_separator() {
        let chunks = pack_parts(vec![part("one"), part("two"), part("three")], 9);
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["one\n\ntwo", "three"]);
    }

    #[test]
    fn test_pack_parts_oversized_part_alone() {
        let big = "z".repeat(50);
        let chunks = pack_parts(vec![part("a"), part(&big), part("b")], 10);
        let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["a", big.as_str(), "b"]);
    }

    #[test]
    fn test_pack_parts_preserves_order_and_bounds() {
        let parts: Vec<ContentPart> = (0..40).map(|i| part(&format!("part-{i:02}"))).collect();
        let chunks = pack_parts(parts, 30);
        assert!(chunks.iter().all(|c| text_len(&c.content) <= 30));

        let rejoined: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.content.split(PART_SEPARATOR).map(str::to_string).collect::<Vec<_>>())
            .collect();
        let expected: Vec<String> = (0..40).map(|i| format!("part-{i:02}")).collect();
        assert_eq!(rejoined, expected);
    }

    #[test]
    fn test_pack_parts_empty() {
        assert!(pack_parts(Vec::new(), 10).is_empty());
    }
}
