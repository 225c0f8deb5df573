//! Offline asset cache.
//!
//! A manifest of static assets is fetched into a bucket named
//! `<app-name>-<version>`. Activation drops every other bucket so exactly one
//! generation is live, and intercepted GET requests for stored URLs are
//! answered from that bucket without touching the network.

mod manifest;
mod storage;
mod transport;
mod worker;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use manifest::{default_assets, fingerprint, normalize_url, sha256_hex, AssetEntry, Manifest};
pub use storage::CacheStorage;
pub use transport::{create_transport, HttpTransport, Transport};
pub use worker::{OfflineCache, WorkerState};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Install failed for {asset}: {reason}")]
    InstallFailed { asset: String, reason: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("Cache bucket {0} does not exist")]
    MissingBucket(String),
    #[error("Cache worker is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: WorkerState,
        actual: WorkerState,
    },
    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Cache task aborted: {0}")]
    Aborted(String),
}

impl From<CacheError> for crate::NotebookError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InstallFailed { asset, reason } => {
                crate::NotebookError::InstallFailed { asset, reason }
            }
            CacheError::Network(msg) => crate::NotebookError::Network(msg),
            CacheError::InvalidManifest(msg) => crate::NotebookError::Config(msg),
            other => crate::NotebookError::CacheStorage(other.to_string()),
        }
    }
}

/// An intercepted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Request {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
