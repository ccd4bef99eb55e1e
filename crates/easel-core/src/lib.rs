//! Easel Core Library
//!
//! Platform-agnostic canvas editing engine: scene model, history, selection
//! and arrangement, document persistence, export and collaboration.

pub mod arrange;
pub mod collaboration;
pub mod config;
pub mod document;
pub mod element;
pub mod error;
pub mod export;
pub mod group;
pub mod history;
pub mod interchange;
pub mod scene;
pub mod selection;
pub mod session;
pub mod snap;
pub mod storage;
pub mod sync;
pub mod viewport;

pub use arrange::{Alignment, Axis};
pub use collaboration::{CollaborationManager, Ingested, Participant};
pub use config::{ConfigError, EngineConfig};
pub use document::{Document, DocumentError, LoadReport, load_scene, save_scene};
pub use element::{Element, ElementId, ElementKind, ElementPatch, NodeContent, SerializableColor};
pub use error::{EngineError, EngineResult};
pub use export::{CancelToken, ExportError, ExportFormat, ExportOptions, ExportOutput, ExportQuality};
pub use group::{Group, GroupId, GroupMember};
pub use history::{ActionKind, HistoryEntry, HistoryManager, SceneDiff};
pub use scene::{DiagramType, Scene, SceneError, SceneResult};
pub use selection::{Corner, Selection};
pub use session::{CanvasSession, ChangeSource, GestureKind, SessionEvent};
pub use snap::{GRID_SIZE, Grid, snap_to_grid};
pub use storage::{FileObjectStore, MemoryObjectStore, ObjectStore, StorageError};
pub use sync::{ConnectionState, Envelope, LoopbackHub, RealtimeChannel, SyncError, WebSocketChannel};
pub use viewport::{Viewport, ZoomLimits, canvas_to_screen, screen_to_canvas};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
