//! Artwork acquisition
//!
//! Resolves an `ARTWORK` reference to image bytes. References starting with
//! `http://` or `https://` are downloaded through an [`ArtworkFetcher`];
//! anything else is treated as a local file path. Content is fully buffered
//! in memory before being handed to the session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::debug;

use crate::state::SharedState;

/// Content type sent for local artwork files
pub const LOCAL_ARTWORK_CONTENT_TYPE: &str = "image/jpg";

/// Content type assumed when a server does not send one
pub const DEFAULT_REMOTE_CONTENT_TYPE: &str = "image/jpeg";

/// Artwork acquisition errors
#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Artwork file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot read artwork file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Image content with its MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkBlob {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Blocking download of remote artwork
pub trait ArtworkFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<ArtworkBlob, ArtworkError>;
}

/// True for references that must be downloaded
pub fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

// ========================================
// HTTP fetcher
// ========================================

/// [`ArtworkFetcher`] backed by `reqwest`
///
/// Downloads run on the process's tokio runtime. `fetch` blocks the calling
/// thread, so it must be called from outside the runtime (the dispatcher
/// runs on its own `std::thread`).
pub struct HttpArtworkFetcher {
    client: reqwest::Client,
    runtime: Handle,
}

impl HttpArtworkFetcher {
    pub fn new(runtime: Handle) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, runtime })
    }

    async fn fetch_async(&self, url: &str) -> Result<ArtworkBlob, ArtworkError> {
        let failed = |reason: String| ArtworkError::FetchFailed {
            url: url.to_string(),
            reason,
        };

        debug!("Downloading artwork from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP status {}", status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_REMOTE_CONTENT_TYPE)
            .to_string();

        let data = response
            .bytes()
            .await
            .map_err(|e| failed(e.to_string()))?
            .to_vec();

        Ok(ArtworkBlob { content_type, data })
    }
}

impl ArtworkFetcher for HttpArtworkFetcher {
    fn fetch(&self, url: &str) -> Result<ArtworkBlob, ArtworkError> {
        self.runtime.block_on(self.fetch_async(url))
    }
}

// ========================================
// Acquirer
// ========================================

/// Resolves artwork references for the dispatcher
pub struct ArtworkAcquirer {
    fetcher: Arc<dyn ArtworkFetcher>,
    state: Arc<SharedState>,
}

impl ArtworkAcquirer {
    pub fn new(fetcher: Arc<dyn ArtworkFetcher>, state: Arc<SharedState>) -> Self {
        Self { fetcher, state }
    }

    /// Resolve `reference` to image content
    pub fn acquire(&self, reference: &str) -> Result<ArtworkBlob, ArtworkError> {
        if is_remote(reference) {
            self.acquire_remote(reference)
        } else {
            self.acquire_local(reference)
        }
    }

    fn acquire_remote(&self, url: &str) -> Result<ArtworkBlob, ArtworkError> {
        let ended = || ArtworkError::FetchFailed {
            url: url.to_string(),
            reason: "session has ended".to_string(),
        };

        if self.state.is_shutdown() {
            return Err(ended());
        }

        let blob = self.fetcher.fetch(url)?;

        // Download may outlive the session
        if self.state.is_shutdown() {
            return Err(ended());
        }
        if blob.data.is_empty() {
            return Err(ArtworkError::FetchFailed {
                url: url.to_string(),
                reason: "empty response body".to_string(),
            });
        }

        debug!("Fetched {} bytes of {} artwork", blob.data.len(), blob.content_type);
        Ok(blob)
    }

    fn acquire_local(&self, reference: &str) -> Result<ArtworkBlob, ArtworkError> {
        let path = PathBuf::from(reference);
        if !path.exists() {
            return Err(ArtworkError::NotFound(path));
        }

        let data = std::fs::read(&path).map_err(|source| ArtworkError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Read {} bytes of artwork from {}", data.len(), path.display());

        Ok(ArtworkBlob {
            content_type: LOCAL_ARTWORK_CONTENT_TYPE.to_string(),
            data,
        })
    }
}
