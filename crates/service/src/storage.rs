//! Artifact Storage
//!
//! Destinations for the proofs artifact: a local file and a Vercel-style blob
//! store. Each destination can report which artifact it currently holds so
//! unchanged artifacts are never rewritten.

use crate::config::{BlobConfig, StorageConfig};
use airdrop_claims::{ClaimsError, ProofsPayload};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors from storage destinations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("Stored artifact is invalid: {0}")]
    InvalidArtifact(#[from] ClaimsError),
}

/// A place the artifact is published to.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Short destination name for logs and warnings
    fn name(&self) -> &'static str;

    /// Human-readable location
    fn location(&self) -> String;

    /// Artifact currently held, `None` when nothing is there yet.
    async fn read(&self) -> Result<Option<ProofsPayload>, StorageError>;

    /// Replace the artifact; returns where it was written.
    async fn write(&self, json: &str) -> Result<String, StorageError>;
}

/// Build every destination enabled in `config`.
#[must_use]
pub fn stores_from_config(config: &StorageConfig) -> Vec<Arc<dyn ArtifactStore>> {
    let mut stores: Vec<Arc<dyn ArtifactStore>> = Vec::new();
    if let Some(path) = &config.local_path {
        stores.push(Arc::new(LocalStore::new(path.clone())));
    }
    if let Some(blob) = &config.blob {
        stores.push(Arc::new(BlobStore::new(blob.clone())));
    }
    stores
}

/// Artifact file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn read(&self) -> Result<Option<ProofsPayload>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => Ok(Some(ProofsPayload::from_json(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&self.path)(e)),
        }
    }

    #[instrument(skip(self, json), fields(path = %self.path.display()))]
    async fn write(&self, json: &str) -> Result<String, StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Self::io_error(parent))?;
        }

        // readers never observe a half-written file
        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .map_err(Self::io_error(&temp))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(Self::io_error(&self.path))?;

        info!(bytes = json.len(), "Wrote local artifact");
        Ok(self.location())
    }
}

/// Vercel-style blob store: `PUT {api}/{key}` with a bearer token. Reads use
/// the public URL when configured, otherwise the blob is located through the
/// authenticated list endpoint.
#[derive(Debug, Clone)]
pub struct BlobStore {
    client: Client,
    config: BlobConfig,
}

#[derive(Deserialize)]
struct PutResponse {
    url: String,
}

#[derive(Deserialize)]
struct ListResponse {
    blobs: Vec<ListedBlob>,
}

#[derive(Deserialize)]
struct ListedBlob {
    url: String,
    pathname: String,
}

impl BlobStore {
    #[must_use]
    pub fn new(config: BlobConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn put_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.api_url.as_str().trim_end_matches('/'),
            self.config.key
        )
    }

    /// Public URL of the blob stored under our key, if any.
    async fn locate(&self) -> Result<Option<String>, StorageError> {
        let url = self.config.api_url.clone();
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.config.token)
            .query(&[("prefix", self.config.key.as_str()), ("limit", "100")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }

        let list: ListResponse = response.json().await?;
        Ok(list
            .blobs
            .into_iter()
            .find(|blob| blob.pathname == self.config.key)
            .map(|blob| blob.url))
    }
}

#[async_trait]
impl ArtifactStore for BlobStore {
    fn name(&self) -> &'static str {
        "blob"
    }

    fn location(&self) -> String {
        self.config
            .public_url
            .as_ref()
            .map_or_else(|| self.config.key.clone(), ToString::to_string)
    }

    #[instrument(skip(self))]
    async fn read(&self) -> Result<Option<ProofsPayload>, StorageError> {
        let url = match &self.config.public_url {
            Some(url) => url.to_string(),
            None => match self.locate().await? {
                Some(url) => url,
                None => {
                    debug!(key = %self.config.key, "No blob stored under key");
                    return Ok(None);
                }
            },
        };

        let response = self
            .client
            .get(&url)
            .header("Cache-Control", "no-cache")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StorageError::Status {
                status: response.status(),
                url,
            });
        }

        let json = response.text().await?;
        Ok(Some(ProofsPayload::from_json(&json)?))
    }

    #[instrument(skip(self, json), fields(key = %self.config.key))]
    async fn write(&self, json: &str) -> Result<String, StorageError> {
        let url = self.put_url();
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.config.token)
            .header("x-content-type", "application/json")
            .header("x-add-random-suffix", "0")
            .header("x-allow-overwrite", "1")
            .header("x-cache-control-max-age", "60")
            .body(json.to_owned())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Status {
                status: response.status(),
                url,
            });
        }

        let put: PutResponse = response.json().await?;
        info!(url = %put.url, bytes = json.len(), "Uploaded blob artifact");
        Ok(put.url)
    }
}
