//! Page type and loader errors.

use serde::Serialize;
use thiserror::Error;

/// Text extracted from a single document page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    /// Extracted page text, possibly empty for image-only pages.
    pub text: String,
    /// One-based page number within the source document.
    pub page_number: u32,
}

impl Page {
    /// Construct a page from its text and one-based number.
    pub fn new(text: impl Into<String>, page_number: u32) -> Self {
        Self {
            text: text.into(),
            page_number,
        }
    }
}

/// Errors raised while acquiring or parsing a source document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The path does not exist or the URL could not be fetched.
    #[error("Document not found: {0}")]
    NotFound(String),
    /// The content could not be parsed as a PDF.
    #[error("Document could not be parsed: {0}")]
    Format(String),
    /// Local filesystem access failed for reasons other than a missing file.
    #[error("Document I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
