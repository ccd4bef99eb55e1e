//! Session-level error type.

use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::export::ExportError;
use crate::scene::SceneError;
use crate::storage::StorageError;
use crate::sync::SyncError;
use thiserror::Error;

/// Any error a canvas session command can return.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for session commands.
pub type EngineResult<T> = Result<T, EngineError>;
