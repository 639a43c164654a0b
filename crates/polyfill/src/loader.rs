//! Document loaders
//!
//! A loader issues exactly one request per call and reports success or failure
//! exactly once. Retry policy belongs to the cache, not here.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dom::DomArena;
use url::Url;

use crate::error::LoadError;

#[async_trait]
pub trait Loader: Send + Sync {
    /// Fetch the raw markup at `address`
    async fn fetch(&self, address: &Url) -> Result<String, LoadError>;
}

/// Fetch once and parse with the document parser
pub async fn load_document(loader: &dyn Loader, address: &Url) -> Result<DomArena, LoadError> {
    let body = loader.fetch(address).await?;
    dom::parse(&body).map_err(|e| LoadError::Parse {
        address: address.to_string(),
        message: e.to_string(),
    })
}

/// In-memory documents keyed by absolute address
#[derive(Default)]
pub struct MemoryLoader {
    documents: DashMap<String, String>,
    fetches: DashMap<String, usize>,
    total: AtomicUsize,
    latency: Option<Duration>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch, to keep loads pending across scans
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, address: impl Into<String>, markup: impl Into<String>) {
        self.documents.insert(address.into(), markup.into());
    }

    pub fn fetch_count(&self, address: &str) -> usize {
        self.fetches.get(address).map(|count| *count).unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Loader for MemoryLoader {
    async fn fetch(&self, address: &Url) -> Result<String, LoadError> {
        *self.fetches.entry(address.to_string()).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.documents
            .get(address.as_str())
            .map(|markup| markup.value().clone())
            .ok_or_else(|| LoadError::NotFound(address.to_string()))
    }
}

/// Reads `file://` addresses from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FileLoader;

#[async_trait]
impl Loader for FileLoader {
    async fn fetch(&self, address: &Url) -> Result<String, LoadError> {
        if address.scheme() != "file" {
            return Err(LoadError::UnsupportedScheme {
                address: address.to_string(),
                scheme: address.scheme().to_string(),
            });
        }
        let path = address.to_file_path().map_err(|_| LoadError::Transport {
            address: address.to_string(),
            message: "not a local path".to_string(),
        })?;

        tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(address.to_string()),
            _ => LoadError::Transport {
                address: address.to_string(),
                message: e.to_string(),
            },
        })
    }
}

/// One blocking GET per fetch, off the async workers
#[cfg(feature = "http")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpLoader;

#[cfg(feature = "http")]
#[async_trait]
impl Loader for HttpLoader {
    async fn fetch(&self, address: &Url) -> Result<String, LoadError> {
        let url = address.to_string();
        let transport = |url: &str, message: String| LoadError::Transport {
            address: url.to_string(),
            message,
        };

        let request_url = url.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut response = ureq::get(&request_url).call()?;
            response.body_mut().read_to_string()
        })
        .await
        .map_err(|e| transport(&url, e.to_string()))?;

        outcome.map_err(|e| match e {
            ureq::Error::StatusCode(status) => LoadError::Status {
                address: url.clone(),
                status,
            },
            other => transport(&url, other.to_string()),
        })
    }
}
