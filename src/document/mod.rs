//! Document acquisition: page extraction from PDFs on disk or behind a URL.

mod download;
mod extract;
mod loader;
pub mod types;

pub use download::DownloadedFile;
pub use extract::{LopdfExtractor, PageExtractor};
pub use loader::{
    DocumentLoader, PdfFileLoader, UrlPdfLoader, is_remote_source, loader_for_source,
};
pub use types::{LoadError, Page};
