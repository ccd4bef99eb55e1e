//! Periodic persistence of the working scene.

use crate::document::{load_scene, save_scene};
use crate::scene::Scene;
use crate::storage::{FileObjectStore, ObjectStore, StorageError, StorageResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default auto-save interval in seconds.
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;

const DOCUMENT_CONTENT_TYPE: &str = "application/json";

/// Saves the scene to an object store when it is dirty and the interval has
/// elapsed. Each save uploads a fresh object and then deletes the previous one.
pub struct AutoSaveManager<S: ObjectStore + ?Sized> {
    store: Arc<S>,
    interval: Duration,
    last_save: Option<Instant>,
    dirty: bool,
    last_url: Option<String>,
}

impl<S: ObjectStore + ?Sized> AutoSaveManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            interval: Duration::from_secs(DEFAULT_AUTOSAVE_INTERVAL_SECS),
            last_save: None,
            dirty: false,
            last_url: None,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Mark the scene as having unsaved changes.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// URL of the most recent save.
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    /// Check if enough time has passed for an auto-save.
    pub fn should_save(&self) -> bool {
        if !self.dirty {
            return false;
        }
        match self.last_save {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Save if dirty and the interval has elapsed. Returns the new URL when a
    /// save happened.
    pub async fn maybe_save(&mut self, scene: &Scene) -> StorageResult<Option<String>> {
        if !self.should_save() {
            return Ok(None);
        }
        self.save(scene).await.map(Some)
    }

    /// Save immediately.
    pub async fn save(&mut self, scene: &Scene) -> StorageResult<String> {
        let json = save_scene(scene).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let url = self
            .store
            .upload(json.into_bytes(), DOCUMENT_CONTENT_TYPE)
            .await?;

        if let Some(previous) = self.last_url.replace(url.clone()) {
            if let Err(e) = self.store.delete(&previous).await {
                log::warn!("Failed to delete previous autosave {}: {}", previous, e);
            }
        }
        self.last_save = Some(Instant::now());
        self.dirty = false;
        log::info!("Autosaved scene to {}", url);
        Ok(url)
    }

    /// Load a saved scene by URL and make it the current save target.
    pub async fn load(&mut self, url: &str) -> StorageResult<Scene> {
        let bytes = self.store.fetch(url).await?;
        let json = String::from_utf8(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let (scene, report) = load_scene(&json).map_err(|e| StorageError::Serialization(e.to_string()))?;
        if !report.is_clean() {
            log::warn!("Loaded {} with {} repairs", url, report.warnings.len());
        }
        self.last_url = Some(url.to_string());
        self.last_save = Some(Instant::now());
        self.dirty = false;
        Ok(scene)
    }

    /// Load the most recent save, if any.
    pub async fn load_last(&mut self) -> Option<Scene> {
        let url = self.last_url.clone()?;
        match self.load(&url).await {
            Ok(scene) => Some(scene),
            Err(e) => {
                log::warn!("Failed to restore autosave {}: {}", url, e);
                None
            }
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

/// Auto-save manager over the default file store.
pub fn create_autosave_manager() -> StorageResult<AutoSaveManager<FileObjectStore>> {
    Ok(AutoSaveManager::new(Arc::new(FileObjectStore::default_location()?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, NodeContent};
    use crate::scene::DiagramType;
    use crate::storage::MemoryObjectStore;
    use kurbo::{Point, Size};
    use pollster::block_on;

    fn scene() -> Scene {
        Scene::new(DiagramType::Whiteboard)
            .add_element(Element::node(NodeContent::default(), Point::ZERO, Size::new(10.0, 10.0)))
            .unwrap()
    }

    #[test]
    fn test_clean_manager_does_not_save() {
        let mut manager = AutoSaveManager::new(Arc::new(MemoryObjectStore::new()));
        assert!(!manager.should_save());
        assert_eq!(block_on(manager.maybe_save(&scene())).unwrap(), None);
    }

    #[test]
    fn test_save_clears_dirty_and_replaces_previous() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut manager = AutoSaveManager::new(store.clone());
        manager.mark_dirty();
        assert!(manager.should_save());

        let first = block_on(manager.maybe_save(&scene())).unwrap().unwrap();
        assert!(!manager.is_dirty());
        let second = block_on(manager.save(&scene())).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(manager.last_url(), Some(second.as_str()));
    }

    #[test]
    fn test_interval_gates_saves() {
        let mut manager = AutoSaveManager::new(Arc::new(MemoryObjectStore::new()));
        manager.set_interval(Duration::from_secs(3600));
        manager.mark_dirty();
        block_on(manager.save(&scene())).unwrap();
        manager.mark_dirty();
        assert!(!manager.should_save());
    }

    #[test]
    fn test_load_last_restores_scene() {
        let mut manager = AutoSaveManager::new(Arc::new(MemoryObjectStore::new()));
        assert!(block_on(manager.load_last()).is_none());

        let original = scene();
        block_on(manager.save(&original)).unwrap();
        let restored = block_on(manager.load_last()).unwrap();
        assert_eq!(restored, original);
    }
}
