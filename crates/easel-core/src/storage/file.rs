//! File-backed object store.

use super::{BoxFuture, ObjectStore, StorageError, StorageResult, extension_for};
use std::fs;
use std::path::PathBuf;
use url::Url;
use uuid::Uuid;

/// Stores each object as `<uuid>.<ext>` under a base directory and addresses
/// it with a `file://` URL.
pub struct FileObjectStore {
    base_path: PathBuf,
}

impl FileObjectStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        let base_path = base_path
            .canonicalize()
            .map_err(|e| StorageError::Io(format!("Failed to resolve {}: {}", base_path.display(), e)))?;
        Ok(Self { base_path })
    }

    /// Create a store in the default location.
    ///
    /// On Unix: `~/.local/share/easel/objects/`
    /// On Windows: `%LOCALAPPDATA%\easel\objects\`
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;
        Self::new(base.join("easel").join("objects"))
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// Resolve a URL to a path inside the base directory.
    fn object_path(&self, url: &str) -> StorageResult<PathBuf> {
        let parsed = Url::parse(url).map_err(|e| StorageError::Other(format!("Invalid URL {}: {}", url, e)))?;
        if parsed.scheme() != "file" {
            return Err(StorageError::Other(format!("Unsupported URL scheme: {}", parsed.scheme())));
        }
        let path = parsed
            .to_file_path()
            .map_err(|_| StorageError::Other(format!("Not a local file URL: {}", url)))?;
        match path.parent() {
            Some(parent) if parent == self.base_path => Ok(path),
            _ => Err(StorageError::NotFound(url.to_string())),
        }
    }
}

impl ObjectStore for FileObjectStore {
    fn upload(&self, bytes: Vec<u8>, content_type: &str) -> BoxFuture<'_, StorageResult<String>> {
        let path = self
            .base_path
            .join(format!("{}.{}", Uuid::new_v4(), extension_for(content_type)));
        Box::pin(async move {
            fs::write(&path, bytes).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
            })?;
            let url = Url::from_file_path(&path)
                .map_err(|_| StorageError::Other(format!("Cannot build URL for {}", path.display())))?;
            log::debug!("Stored object at {}", url);
            Ok(url.to_string())
        })
    }

    fn fetch(&self, url: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let resolved = self.object_path(url);
        let url = url.to_string();
        Box::pin(async move {
            let path = resolved?;
            if !path.exists() {
                return Err(StorageError::NotFound(url));
            }
            fs::read(&path).map_err(|e| {
                StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
            })
        })
    }

    fn delete(&self, url: &str) -> BoxFuture<'_, StorageResult<()>> {
        let resolved = self.object_path(url);
        let url = url.to_string();
        Box::pin(async move {
            let path = resolved?;
            if !path.exists() {
                return Err(StorageError::NotFound(url));
            }
            fs::remove_file(&path).map_err(|e| {
                StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollster::block_on;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::new(dir.path().to_path_buf()).unwrap();

        let url = block_on(store.upload(b"{}".to_vec(), "application/json")).unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with(".json"));
        assert_eq!(block_on(store.fetch(&url)).unwrap(), b"{}");
    }

    #[test]
    fn test_file_store_delete() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::new(dir.path().to_path_buf()).unwrap();

        let url = block_on(store.upload(vec![0x89, b'P'], "image/png")).unwrap();
        block_on(store.delete(&url)).unwrap();
        assert!(matches!(block_on(store.fetch(&url)), Err(StorageError::NotFound(_))));
        assert!(matches!(block_on(store.delete(&url)), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_file_store_rejects_outside_paths() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::new(dir.path().join("objects")).unwrap();

        let outside = Url::from_file_path(dir.path().join("secret.json")).unwrap();
        assert!(block_on(store.fetch(outside.as_str())).is_err());
        assert!(block_on(store.fetch("https://example.com/a.png")).is_err());
        assert!(block_on(store.fetch("not a url")).is_err());
    }
}
