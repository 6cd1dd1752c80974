//! Context assembly: provenance-tagged passages under a character budget.

use crate::document::Document;

/// Default character budget.
pub const DEFAULT_MAX_CHARS: usize = 4000;

const BLOCK_SEPARATOR: &str = "\n\n";
const UNKNOWN: &str = "Unknown";

/// Formats retrieved documents into a single bounded context string.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    max_chars: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl ContextAssembler {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Join formatted blocks in input order, then cut at `max_chars`.
    ///
    /// The cut may land inside a block. Length is counted in characters.
    pub fn assemble(&self, results: &[Document]) -> String {
        let context = results
            .iter()
            .map(format_block)
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR);

        truncate_chars(&context, self.max_chars).to_string()
    }
}

/// `[Source: <source> | Section: <section> | Relevance: <score>%]\n<content>`
pub fn format_block(document: &Document) -> String {
    let source = document.source().unwrap_or_else(|| UNKNOWN.to_string());
    let section = document.section().unwrap_or_else(|| UNKNOWN.to_string());
    let relevance = document
        .similarity_score()
        .map(|s| format!("{:?}", s))
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "[Source: {} | Section: {} | Relevance: {}%]\n{}",
        source, section, relevance, document.content
    )
}

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PAGE_KEY, SECTION_KEY, SOURCE_KEY};

    fn scored(content: &str, source: &str, section: &str, score: f64) -> Document {
        Document::from_text(content)
            .with_meta(SOURCE_KEY, source)
            .with_meta(SECTION_KEY, section)
            .with_similarity_score(score)
    }

    #[test]
    fn test_block_format() {
        let doc = scored("Revenue was 10M.", "report.pdf", "Finance", 90.0);
        assert_eq!(
            format_block(&doc),
            "[Source: report.pdf | Section: Finance | Relevance: 90.0%]\nRevenue was 10M."
        );
    }

    #[test]
    fn test_missing_metadata_defaults() {
        let doc = Document::from_text("body");
        assert_eq!(
            format_block(&doc),
            "[Source: Unknown | Section: Unknown | Relevance: N/A%]\nbody"
        );
    }

    #[test]
    fn test_page_used_when_section_missing() {
        let doc = Document::from_text("body")
            .with_meta(PAGE_KEY, 7)
            .with_similarity_score(55.25);
        assert!(format_block(&doc).starts_with("[Source: Unknown | Section: 7 | Relevance: 55.25%]"));
    }

    #[test]
    fn test_blocks_joined_in_order() {
        let docs = vec![
            scored("first", "a", "s1", 90.0),
            scored("second", "b", "s2", 80.5),
        ];
        let context = ContextAssembler::default().assemble(&docs);
        let expected = format!("{}\n\n{}", format_block(&docs[0]), format_block(&docs[1]));
        assert_eq!(context, expected);
    }

    #[test]
    fn test_empty_input_is_empty_string() {
        assert_eq!(ContextAssembler::default().assemble(&[]), "");
    }

    #[test]
    fn test_output_never_exceeds_budget() {
        let docs: Vec<Document> = (0..50)
            .map(|i| scored(&"é".repeat(97 + i), "src", "sec", 70.0))
            .collect();

        for max_chars in [0, 1, 10, 100, 4000] {
            let context = ContextAssembler::new(max_chars).assemble(&docs);
            assert!(context.chars().count() <= max_chars);
        }
    }

    #[test]
    fn test_truncate_chars_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
