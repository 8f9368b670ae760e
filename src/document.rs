use crate::error::{RagError, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text;
use std::fs;
use std::path::Path;

/// File extensions picked up by directory ingestion
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "pdf"];

/// Represents a document with its content and metadata
#[derive(Debug, Clone)]
pub struct Document {
    /// The actual text content of the document
    pub content: String,
    /// The document's MIME type
    pub mime_type: String,
}

impl Document {
    /// Create a new document from a file path
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();

        // Detect MIME type
        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        // Read content based on file type
        let content = read_document_content(path, &mime_type)?;

        Ok(Document { content, mime_type })
    }
}

/// Whether the file has one of the [`SUPPORTED_EXTENSIONS`]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Read content from a document based on its MIME type
pub fn read_document_content<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<String> {
    let path = file_path.as_ref();

    match mime_type {
        // Handle PDF documents
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            let content = extract_text(path).map_err(|e| RagError::Document {
                path: path.to_path_buf(),
                reason: format!("failed to extract text from PDF: {}", e),
            })?;

            // PDF extraction can sometimes include excessive whitespace
            let cleaned_content = normalize_whitespace(&content);

            if cleaned_content.is_empty() {
                warn!(
                    "Extracted PDF content of {} is empty or contains only whitespace",
                    path.display()
                );
            }

            Ok(cleaned_content)
        }

        // Handle plain text and markdown documents
        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            fs::read_to_string(path).map_err(|e| RagError::io(path, e))
        }

        // Unsupported format
        _ => Err(RagError::Document {
            path: path.to_path_buf(),
            reason: format!(
                "unsupported document format: {}. Only text, markdown and PDF files are supported.",
                mime_type
            ),
        }),
    }
}

/// Normalize whitespace in text (remove multiple consecutive spaces, newlines, etc.)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    // Replace multiple consecutive newlines with double newlines (paragraph separator)
    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                // Add at most two newlines (paragraph break)
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
            }

            // Don't add consecutive spaces
            if !(c == ' ' && prev_char == ' ') {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalize_whitespace() {
        let text = "This  has   multiple    spaces.\n\n\nAnd multiple newlines.\r\nAnd Windows line endings.";
        let expected =
            "This has multiple spaces.\n\nAnd multiple newlines.\nAnd Windows line endings.";
        assert_eq!(normalize_whitespace(text), expected);
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(&PathBuf::from("docs/guide.md")));
        assert!(is_supported(&PathBuf::from("docs/NOTES.TXT")));
        assert!(is_supported(&PathBuf::from("paper.pdf")));
        assert!(!is_supported(&PathBuf::from("image.png")));
        assert!(!is_supported(&PathBuf::from("Makefile")));
    }

    #[test]
    fn test_reads_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.md");
        fs::write(&path, "# Title\n\nBody text.").unwrap();

        let document = Document::from_file(&path).unwrap();
        assert_eq!(document.content, "# Title\n\nBody text.");
        assert!(document.mime_type.starts_with("text/"));
    }

    #[test]
    fn test_corrupt_pdf_is_document_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"definitely not a pdf").unwrap();

        let err = Document::from_file(&path).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Document::from_file("/nonexistent/missing.txt").unwrap_err();
        assert!(matches!(err, RagError::Io { .. }));
    }
}
