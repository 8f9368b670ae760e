use crate::store::SearchResult;

/// Formats ranked search results into a single prompt-ready block
///
/// Results keep the order they are given in. Chunk text is copied verbatim;
/// prompt-size limits are the caller's concern.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        ContextAssembler
    }

    /// Label each result "Context #n:" (1-based) and join them with blank lines
    pub fn format(&self, results: &[SearchResult]) -> String {
        results
            .iter()
            .enumerate()
            .map(|(idx, result)| format!("Context #{}:\n{}", idx + 1, result.text))
            .collect::<Vec<String>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkMetadata;

    fn result(text: &str, score: f32) -> SearchResult {
        SearchResult {
            text: text.to_string(),
            metadata: ChunkMetadata {
                source: "a.txt".to_string(),
                chunk_index: 0,
            },
            score,
        }
    }

    #[test]
    fn test_format_labels_and_separators() {
        let assembler = ContextAssembler::new();
        let formatted = assembler.format(&[
            result("The sky is blue.", 0.9),
            result("Bananas are yellow.", 0.1),
        ]);
        assert_eq!(
            formatted,
            "Context #1:\nThe sky is blue.\n\nContext #2:\nBananas are yellow."
        );
    }

    #[test]
    fn test_format_preserves_given_order_and_text() {
        let assembler = ContextAssembler::new();
        let text = "  indented\nmulti-line text  ";
        let formatted = assembler.format(&[result("low", 0.1), result(text, 0.8)]);
        assert!(formatted.starts_with("Context #1:\nlow"));
        assert!(formatted.ends_with(&format!("Context #2:\n{}", text)));
    }

    #[test]
    fn test_format_empty() {
        assert_eq!(ContextAssembler::new().format(&[]), "");
    }
}
