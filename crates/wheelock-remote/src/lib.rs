//! Artifact retrieval for wheelock.
//!
//! This crate provides the retrieval collaborator used by the installer: the
//! `Fetcher` trait, an HTTP implementation on top of `ureq` with optional
//! bearer authentication, a local-filesystem implementation that resolves
//! relative paths against the lock document's directory, and the fetch
//! configuration file.
//!
//! Fetchers only move bytes. They never interpret or trust them; every
//! artifact is hash-verified by the caller before use.

pub mod config;
pub mod http;
pub mod local;

pub use config::FetchConfig;
pub use http::HttpFetcher;
pub use local::LocalFetcher;

use thiserror::Error;
use wheelock_schema::FileLocation;

/// Sent as `User-Agent` on every HTTP request.
pub const USER_AGENT: &str = concat!("wheelock/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported location '{0}'")]
    UnsupportedLocation(String),
    #[error("fetch config error: {0}")]
    Config(String),
}

/// Retrieves the raw bytes behind a [`FileLocation`].
///
/// Implementations must be shareable across the worker pool. Failures are
/// final: callers do not retry.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, location: &FileLocation) -> Result<Vec<u8>, FetchError>;
}

/// Routes `http(s)://` URLs to an [`HttpFetcher`] and paths or `file://` URLs
/// to a [`LocalFetcher`].
pub struct LocationFetcher {
    http: HttpFetcher,
    local: LocalFetcher,
}

impl LocationFetcher {
    pub fn new(http: HttpFetcher, local: LocalFetcher) -> Self {
        Self { http, local }
    }
}

impl Fetcher for LocationFetcher {
    fn fetch(&self, location: &FileLocation) -> Result<Vec<u8>, FetchError> {
        match location {
            FileLocation::Path(_) => self.local.fetch(location),
            FileLocation::Url(url) if url.starts_with("file://") => self.local.fetch(location),
            FileLocation::Url(_) => self.http.fetch(location),
        }
    }
}
