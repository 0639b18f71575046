//! Temporary local copies of remote documents.

use super::types::LoadError;
use reqwest::Client;
use std::path::Path;
use tempfile::NamedTempFile;

/// A remote document fetched into a temporary file.
///
/// The file is removed when the value is dropped, whether or not the document was parsed.
#[derive(Debug)]
pub struct DownloadedFile {
    file: NamedTempFile,
    url: String,
    bytes: usize,
}

impl DownloadedFile {
    /// Download `url` into a fresh temporary file.
    ///
    /// Connection failures and non-success statuses map to [`LoadError::NotFound`].
    pub async fn fetch(client: &Client, url: &str) -> Result<Self, LoadError> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|error| LoadError::NotFound(format!("{url}: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::NotFound(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| LoadError::NotFound(format!("{url}: {error}")))?;

        let file = tempfile::Builder::new()
            .prefix("docqa-")
            .suffix(".pdf")
            .tempfile()?;
        tokio::fs::write(file.path(), &body).await?;

        tracing::debug!(
            url,
            bytes = body.len(),
            path = %file.path().display(),
            "Downloaded remote document"
        );

        Ok(Self {
            file,
            url: url.to_string(),
            bytes: body.len(),
        })
    }

    /// Local path of the downloaded copy.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// URL the document was fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Size of the downloaded body in bytes.
    pub fn len(&self) -> usize {
        self.bytes
    }

    /// Whether the remote body was empty.
    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

impl Drop for DownloadedFile {
    fn drop(&mut self) {
        tracing::debug!(
            url = %self.url,
            path = %self.file.path().display(),
            "Removing downloaded document"
        );
    }
}
