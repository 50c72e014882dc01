use async_trait::async_trait;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::models::product::{LookupKey, StoredImage};

/// URL path under which the image directory is served.
pub const PUBLIC_IMAGE_PATH: &str = "/static/upc_images";

const DEFAULT_EXTENSION: &str = ".jpg";

/// Largest image body accepted from a remote host.
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Downloads raw bytes for an image URL.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image host returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Image body exceeds {0} bytes")]
    TooLarge(u64),
}

/// Plain HTTP(S) image downloader, no authentication.
pub struct HttpImageSource {
    http: reqwest::Client,
    max_bytes: u64,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("upc-product-lookup/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            max_bytes: MAX_IMAGE_BYTES,
        })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        read_capped(response, self.max_bytes).await
    }
}

/// Read a response body, giving up as soon as it exceeds `limit` bytes.
async fn read_capped(mut response: reqwest::Response, limit: u64) -> Result<Vec<u8>, FetchError> {
    if response.content_length().is_some_and(|len| len > limit) {
        return Err(FetchError::TooLarge(limit));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if (body.len() + chunk.len()) as u64 > limit {
            return Err(FetchError::TooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("Downloaded bytes are not a decodable image: {0}")]
    Invalid(#[from] image::ImageError),

    #[error("Image storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Image validation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Per-UPC image directory on local disk, published under a base URL.
///
/// Files are named `<upc>/<upc>_<n><ext>` with `n` the 1-based position of
/// the source URL, so re-running a job finds its earlier downloads.
pub struct ImageStore {
    root: PathBuf,
    base_url: String,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Destination path for the image at 1-based `index` of `url`.
    pub fn destination(&self, key: &LookupKey, index: usize, url: &str) -> PathBuf {
        let file_name = format!("{key}_{index}{}", extension_from_url(url));
        self.root.join(key.as_str()).join(file_name)
    }

    /// Public URL for a stored file.
    pub fn public_url(&self, key: &LookupKey, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}{PUBLIC_IMAGE_PATH}/{key}/{file_name}", self.base_url)
    }

    /// Download, validate and persist every URL for `key`.
    ///
    /// Failures are logged and skipped per URL. The result keeps input
    /// order among the images that were stored. URLs whose destination
    /// already holds a non-empty file are not downloaded again.
    pub async fn fetch_and_store(
        &self,
        source: &dyn ImageSource,
        key: &LookupKey,
        urls: &[String],
    ) -> Vec<StoredImage> {
        if urls.is_empty() {
            return Vec::new();
        }

        tracing::info!(upc = %key, count = urls.len(), "Saving product images");

        if let Err(e) = fs::create_dir_all(self.root.join(key.as_str())).await {
            tracing::error!(upc = %key, stage = "images", error = %e, "Failed to create image directory");
            return Vec::new();
        }

        let attempts = urls
            .iter()
            .enumerate()
            .map(|(i, url)| self.store_one(source, key, i + 1, url));

        join_all(attempts)
            .await
            .into_iter()
            .zip(urls)
            .filter_map(|(outcome, url)| match outcome {
                Ok(image) => Some(image),
                Err(e) => {
                    tracing::warn!(upc = %key, stage = "images", url = %url, error = %e, "Skipping image");
                    None
                }
            })
            .collect()
    }

    async fn store_one(
        &self,
        source: &dyn ImageSource,
        key: &LookupKey,
        index: usize,
        url: &str,
    ) -> Result<StoredImage, ImageStoreError> {
        let path = self.destination(key, index, url);

        if let Ok(meta) = fs::metadata(&path).await {
            if meta.is_file() && meta.len() > 0 {
                tracing::debug!(path = %path.display(), "File already exists, skipping download");
                return Ok(self.stored(key, index, path));
            }
        }

        tracing::debug!(url = %url, "Downloading image");
        let bytes = source.fetch(url).await?;
        // Decoding is CPU-bound; keep it off the async workers.
        let bytes = tokio::task::spawn_blocking(move || validate_image(&bytes).map(|()| bytes)).await??;

        // The final path only ever holds a complete file.
        let partial = path.with_extension("part");
        fs::write(&partial, &bytes).await?;
        fs::rename(&partial, &path).await?;

        metrics::counter!("upc_images_stored_total").increment(1);
        Ok(self.stored(key, index, path))
    }

    fn stored(&self, key: &LookupKey, index: usize, path: PathBuf) -> StoredImage {
        StoredImage {
            index,
            url: self.public_url(key, &path),
            path,
        }
    }
}

/// Structural check that `bytes` decode as an image, independent of any
/// content-type the host claimed.
pub fn validate_image(bytes: &[u8]) -> Result<(), image::ImageError> {
    image::load_from_memory(bytes).map(|_| ())
}

/// File extension (with leading dot) taken from the URL path, or `.jpg`.
fn extension_from_url(url: &str) -> String {
    let ext = url::Url::parse(url).ok().and_then(|parsed| {
        Path::new(parsed.path())
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    });

    match ext {
        Some(e) if !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{e}")
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}
