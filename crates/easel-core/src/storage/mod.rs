//! Object storage for documents and image assets.

mod autosave;
mod file;
mod memory;

pub use autosave::{AutoSaveManager, DEFAULT_AUTOSAVE_INTERVAL_SECS, create_autosave_manager};
pub use file::FileObjectStore;
pub use memory::MemoryObjectStore;

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Backend that stores opaque blobs and hands back URLs for them.
///
/// Documents are uploaded as `application/json`; images keep their own
/// content type. A URL returned by `upload` stays valid until `delete`.
pub trait ObjectStore: Send + Sync {
    /// Store bytes and return their URL.
    fn upload(&self, bytes: Vec<u8>, content_type: &str) -> BoxFuture<'_, StorageResult<String>>;

    /// Retrieve the bytes behind a URL.
    fn fetch(&self, url: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>>;

    /// Remove an object. Deleting a missing object is an error.
    fn delete(&self, url: &str) -> BoxFuture<'_, StorageResult<()>>;
}

/// File extension for a content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "application/json" => "json",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        "text/markdown" => "md",
        _ => "bin",
    }
}
