//! In-memory object store.

use super::{BoxFuture, ObjectStore, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory object store for testing and ephemeral sessions.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

struct StoredObject {
    content_type: String,
    bytes: Vec<u8>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content type recorded for a URL.
    pub fn content_type(&self, url: &str) -> Option<String> {
        self.objects
            .read()
            .ok()?
            .get(url)
            .map(|o| o.content_type.clone())
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl ObjectStore for MemoryObjectStore {
    fn upload(&self, bytes: Vec<u8>, content_type: &str) -> BoxFuture<'_, StorageResult<String>> {
        let content_type = content_type.to_string();
        Box::pin(async move {
            let url = format!("memory://{}", Uuid::new_v4());
            let mut objects = self.objects.write().map_err(lock_error)?;
            objects.insert(url.clone(), StoredObject { content_type, bytes });
            Ok(url)
        })
    }

    fn fetch(&self, url: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
        let url = url.to_string();
        Box::pin(async move {
            let objects = self.objects.read().map_err(lock_error)?;
            objects
                .get(&url)
                .map(|o| o.bytes.clone())
                .ok_or(StorageError::NotFound(url))
        })
    }

    fn delete(&self, url: &str) -> BoxFuture<'_, StorageResult<()>> {
        let url = url.to_string();
        Box::pin(async move {
            let mut objects = self.objects.write().map_err(lock_error)?;
            objects
                .remove(&url)
                .map(|_| ())
                .ok_or(StorageError::NotFound(url))
        })
    }
}
