//! Document loaders for local and remote PDFs.

use super::{
    download::DownloadedFile,
    extract::PageExtractor,
    types::{LoadError, Page},
};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Produces the ordered page units of one source document.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load and extract every page of the source.
    async fn load(&self) -> Result<Vec<Page>, LoadError>;

    /// Human-readable source identifier, recorded on every chunk.
    fn source(&self) -> &str;
}

/// Loads a PDF from the local filesystem.
pub struct PdfFileLoader {
    path: PathBuf,
    source: String,
    extractor: Arc<dyn PageExtractor>,
}

impl PdfFileLoader {
    /// Create a loader for `path` using the supplied extractor.
    pub fn new(path: impl Into<PathBuf>, extractor: Arc<dyn PageExtractor>) -> Self {
        let path = path.into();
        let source = path.display().to_string();
        Self {
            path,
            source,
            extractor,
        }
    }
}

#[async_trait]
impl DocumentLoader for PdfFileLoader {
    async fn load(&self) -> Result<Vec<Page>, LoadError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Err(LoadError::NotFound(self.source.clone()));
        }
        extract_blocking(self.extractor.clone(), self.path.clone()).await
    }

    fn source(&self) -> &str {
        &self.source
    }
}

/// Downloads a PDF to a temporary file before extracting it.
///
/// The temporary copy belongs to the loader: it lives until the next `load` replaces it or the
/// loader is dropped.
pub struct UrlPdfLoader {
    url: String,
    client: Client,
    extractor: Arc<dyn PageExtractor>,
    downloaded: Mutex<Option<DownloadedFile>>,
}

impl UrlPdfLoader {
    /// Create a loader for `url`.
    pub fn new(url: impl Into<String>, client: Client, extractor: Arc<dyn PageExtractor>) -> Self {
        Self {
            url: url.into(),
            client,
            extractor,
            downloaded: Mutex::new(None),
        }
    }

    /// Path of the current temporary copy, if one has been downloaded.
    pub fn local_path(&self) -> Option<PathBuf> {
        self.downloaded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|file| file.path().to_path_buf())
    }
}

#[async_trait]
impl DocumentLoader for UrlPdfLoader {
    async fn load(&self) -> Result<Vec<Page>, LoadError> {
        let downloaded = DownloadedFile::fetch(&self.client, &self.url).await?;
        let path = downloaded.path().to_path_buf();
        {
            let mut slot = self
                .downloaded
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = Some(downloaded);
        }
        extract_blocking(self.extractor.clone(), path).await
    }

    fn source(&self) -> &str {
        &self.url
    }
}

async fn extract_blocking(
    extractor: Arc<dyn PageExtractor>,
    path: PathBuf,
) -> Result<Vec<Page>, LoadError> {
    tokio::task::spawn_blocking(move || extractor.extract(&path))
        .await
        .map_err(|error| LoadError::Io(std::io::Error::other(error)))?
}

/// Whether `source` names a remote document rather than a local path.
pub fn is_remote_source(source: &str) -> bool {
    let lowered = source.trim().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

/// Pick the loader variant matching `source`.
pub fn loader_for_source(
    source: &str,
    client: Client,
    extractor: Arc<dyn PageExtractor>,
) -> Box<dyn DocumentLoader> {
    if is_remote_source(source) {
        Box::new(UrlPdfLoader::new(source.trim(), client, extractor))
    } else {
        Box::new(PdfFileLoader::new(Path::new(source.trim()), extractor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};

    struct FixedExtractor(Vec<Page>);

    impl PageExtractor for FixedExtractor {
        fn extract(&self, path: &Path) -> Result<Vec<Page>, LoadError> {
            assert!(path.exists(), "extractor must see an existing file");
            Ok(self.0.clone())
        }
    }

    struct FailingExtractor;

    impl PageExtractor for FailingExtractor {
        fn extract(&self, _path: &Path) -> Result<Vec<Page>, LoadError> {
            Err(LoadError::Format("not a pdf".into()))
        }
    }

    #[tokio::test]
    async fn file_loader_reports_missing_path() {
        let loader = PdfFileLoader::new(
            "/no/such/handbook.pdf",
            Arc::new(FixedExtractor(Vec::new())),
        );
        let error = loader.load().await.unwrap_err();
        assert!(matches!(error, LoadError::NotFound(_)));
        assert_eq!(loader.source(), "/no/such/handbook.pdf");
    }

    #[tokio::test]
    async fn file_loader_delegates_to_extractor() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let pages = vec![Page::new("first", 1), Page::new("second", 2)];
        let loader = PdfFileLoader::new(file.path(), Arc::new(FixedExtractor(pages.clone())));
        assert_eq!(loader.load().await.expect("pages"), pages);
    }

    #[tokio::test]
    async fn url_loader_cleans_up_after_failed_extraction() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/doc.pdf");
                then.status(200).body("garbage");
            })
            .await;

        let loader = UrlPdfLoader::new(
            format!("{}/doc.pdf", server.base_url()),
            Client::new(),
            Arc::new(FailingExtractor),
        );
        let error = loader.load().await.unwrap_err();
        assert!(matches!(error, LoadError::Format(_)));

        let path = loader.local_path().expect("download retained by loader");
        assert!(path.exists());
        drop(loader);
        assert!(!path.exists());
    }

    #[test]
    fn remote_sources_are_detected_by_scheme() {
        assert!(is_remote_source("https://example.org/a.pdf"));
        assert!(is_remote_source("HTTP://example.org/a.pdf"));
        assert!(!is_remote_source("fixtures/handbook.pdf"));
        assert!(!is_remote_source("file:///tmp/a.pdf"));
    }
}
