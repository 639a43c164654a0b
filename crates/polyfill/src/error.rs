//! Error types for the resolver
//!
//! Load failures are their own type: they are recorded against an address and
//! logged, never raised out of a scan.

use dom::DomError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("no document at {0}")]
    NotFound(String),

    #[error("request for {address} failed with status {status}")]
    Status { address: String, status: u16 },

    #[error("transport error for {address}: {message}")]
    Transport { address: String, message: String },

    #[error("unsupported scheme '{scheme}' in {address}")]
    UnsupportedScheme { address: String, scheme: String },

    #[error("failed to parse {address}: {message}")]
    Parse { address: String, message: String },

    #[error("{0} has no document element")]
    Empty(String),
}

#[derive(Error, Debug)]
pub enum PolyfillError {
    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Options JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No tokio runtime available to spawn {0}")]
    NoRuntime(&'static str),
}

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, PolyfillError>;
