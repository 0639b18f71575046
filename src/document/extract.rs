//! Page-level text extraction.

use super::types::{LoadError, Page};
use std::path::Path;

/// Extracts ordered page text from a local PDF file.
///
/// Implementations are synchronous; loaders run them on the blocking thread pool.
pub trait PageExtractor: Send + Sync {
    /// Return one [`Page`] per document page, in page order.
    fn extract(&self, path: &Path) -> Result<Vec<Page>, LoadError>;
}

/// [`PageExtractor`] backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    /// Construct the extractor.
    pub const fn new() -> Self {
        Self
    }
}

impl PageExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Page>, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.display().to_string()));
        }

        let document = lopdf::Document::load(path)
            .map_err(|error| LoadError::Format(format!("{}: {error}", path.display())))?;

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let mut pages = Vec::with_capacity(page_numbers.len());
        for page_number in page_numbers {
            let text = match document.extract_text(&[page_number]) {
                Ok(text) => normalize_page_text(&text),
                Err(error) => {
                    tracing::debug!(
                        path = %path.display(),
                        page = page_number,
                        error = %error,
                        "Page text extraction failed; keeping empty page"
                    );
                    String::new()
                }
            };
            pages.push(Page::new(text, page_number));
        }

        tracing::debug!(path = %path.display(), pages = pages.len(), "Extracted PDF pages");
        Ok(pages)
    }
}

/// Strip NUL bytes and trailing spaces while keeping line structure for the splitter.
fn normalize_page_text(raw: &str) -> String {
    raw.replace('\0', "")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
