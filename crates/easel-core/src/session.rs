//! Canvas session: the command API a view layer drives.
//!
//! A session owns one scene, one history and one selection. Every committed
//! mutation records exactly one history entry, is broadcast to collaborators
//! and queues a [`SessionEvent`] for the view layer.

use crate::arrange::{self, Alignment, Axis};
use crate::collaboration::{CollaborationManager, Ingested};
use crate::config::EngineConfig;
use crate::document::{self, LoadReport};
use crate::element::{Element, ElementId, ElementPatch, NodeContent};
use crate::error::EngineResult;
use crate::export::{CancelToken, ExportFormat, ExportOptions, ExportOutput, ExportProgress, ExportResult, export_scene};
use crate::group::GroupId;
use crate::history::{ActionKind, HistoryEntry, HistoryManager, SceneDiff};
use crate::interchange;
use crate::scene::{DiagramType, Scene, SceneError};
use crate::selection::{Corner, Selection, resize_frame, rotation_from_cursor};
use crate::snap::snap_angle;
use crate::storage::{AutoSaveManager, ObjectStore};
use crate::sync::{RealtimeChannel, SyncConflict, SyncResult};
use crate::viewport::{Viewport, screen_to_canvas};
use kurbo::{Point, Rect, Size, Vec2};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// What caused a scene change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    Local,
    Undo,
    Redo,
    Remote,
    Load,
    /// Uncommitted gesture frame.
    Preview,
}

/// Notification for the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SceneChanged { source: ChangeSource },
    SelectionChanged(Vec<ElementId>),
    ViewportChanged(Viewport),
    PresenceChanged,
    SyncConflict(SyncConflict),
    CollaboratorError { message: String },
}

/// Continuous pointer interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    /// Drag the selected nodes.
    Move,
    /// Drag a corner of the primary selected node.
    Resize { corner: Corner, keep_aspect_ratio: bool },
    /// Rotate the primary selected node around its center.
    Rotate,
    /// Pan the viewport.
    Pan,
}

#[derive(Debug, Clone)]
struct Gesture {
    kind: GestureKind,
    start_screen: Point,
    start_canvas: Point,
    start_viewport: Viewport,
    /// Target elements as they were when the gesture began.
    originals: HashMap<ElementId, Element>,
    /// Paint order of the targets; the first one drives grid snapping.
    order: Vec<ElementId>,
}

impl Gesture {
    fn targets(&self) -> HashSet<Uuid> {
        self.originals.keys().copied().collect()
    }
}

/// An editing session over one scene.
pub struct CanvasSession {
    config: EngineConfig,
    scene: Scene,
    history: HistoryManager,
    selection: Selection,
    autosave: AutoSaveManager<dyn ObjectStore>,
    collaboration: Option<CollaborationManager>,
    gesture: Option<Gesture>,
    events: Vec<SessionEvent>,
    /// Copied nodes and their internal edges.
    clipboard: Vec<Element>,
    /// Pastes since the last copy; each one lands one offset further.
    pastes: u32,
}

impl CanvasSession {
    /// Create a session with an empty scene.
    pub fn new(config: EngineConfig, store: Arc<dyn ObjectStore>, kind: DiagramType) -> Self {
        Self::with_scene(config, store, Scene::new(kind))
    }

    /// Create a session over an existing scene.
    pub fn with_scene(config: EngineConfig, store: Arc<dyn ObjectStore>, scene: Scene) -> Self {
        let mut autosave = AutoSaveManager::new(store);
        autosave.set_interval(Duration::from_secs(config.autosave_interval_secs));
        Self {
            history: HistoryManager::new(config.history_capacity),
            config,
            scene,
            selection: Selection::new(),
            autosave,
            collaboration: None,
            gesture: None,
            events: Vec::new(),
            clipboard: Vec::new(),
            pastes: 0,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.scene.viewport
    }

    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Drain queued notifications, oldest first.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Convert a screen point using the current viewport.
    pub fn to_canvas(&self, screen_point: Point) -> Point {
        screen_to_canvas(screen_point, &self.scene.viewport, &self.config.zoom)
    }

    // --- Commit pipeline ---

    /// Replace the scene with `next` and record the difference as one entry.
    /// Returns false when nothing changed.
    fn commit(&mut self, next: Scene, kind: ActionKind, label: impl Into<String>) -> bool {
        // `next` was derived from the current scene, so held remote writes are
        // only released after it is in place.
        let gesture = self.gesture.take();
        if let Some(gesture) = &gesture {
            self.record_gesture(gesture);
        }
        let diff = SceneDiff::between(&self.scene, &next);
        let committed = !diff.is_empty();
        if committed {
            let label = label.into();
            log::debug!("Commit {:?}: {}", kind, label);
            self.scene = next;
            self.history.record(HistoryEntry::new(kind, label, diff.clone()));
            self.after_change(&diff, ChangeSource::Local);
        }
        if gesture.is_some() {
            self.release_held();
        }
        committed
    }

    fn after_change(&mut self, diff: &SceneDiff, source: ChangeSource) {
        if self.selection.retain_existing(&self.scene) {
            self.emit_selection();
        }
        self.autosave.mark_dirty();
        self.events.push(SessionEvent::SceneChanged { source });
        if source != ChangeSource::Remote {
            self.broadcast(|collab| collab.broadcast_diff(diff));
        }
    }

    fn broadcast(&mut self, send: impl FnOnce(&mut CollaborationManager) -> SyncResult<()>) {
        let Some(collab) = self.collaboration.as_mut() else {
            return;
        };
        if let Err(e) = send(collab) {
            log::warn!("Failed to broadcast to collaborators: {}", e);
            self.events.push(SessionEvent::CollaboratorError {
                message: e.to_string(),
            });
        }
    }

    fn emit_selection(&mut self) {
        let ids = self.selection.ids().to_vec();
        self.broadcast(|collab| collab.broadcast_selection(&ids));
        self.events.push(SessionEvent::SelectionChanged(ids));
    }

    fn emit_viewport(&mut self) {
        self.events.push(SessionEvent::ViewportChanged(self.scene.viewport));
    }

    // --- Element commands ---

    /// Add a node at a canvas position, snapped to the grid when enabled.
    pub fn add_node(&mut self, content: NodeContent, position: Point, size: Size) -> EngineResult<ElementId> {
        let position = self.config.grid.snap(position);
        self.add_element(Element::node(content, position, size))
    }

    pub fn add_element(&mut self, element: Element) -> EngineResult<ElementId> {
        let id = element.id;
        let label = if element.is_edge() { "Add edge" } else { "Add node" };
        let next = self.scene.add_element(element)?;
        self.commit(next, ActionKind::Create, label);
        Ok(id)
    }

    /// Patch one element. Moves and style edits are labelled as such in history.
    pub fn update_element(&mut self, id: ElementId, patch: &ElementPatch) -> EngineResult<()> {
        let next = self.scene.update_element(id, patch)?;
        let (kind, label) = if patch.is_move_only() {
            (ActionKind::Move, "Move element")
        } else if patch.is_style_only() {
            (ActionKind::Style, "Change style")
        } else {
            (ActionKind::Update, "Edit element")
        };
        self.commit(next, kind, label);
        Ok(())
    }

    /// Patch several elements as one undoable step.
    pub fn update_elements(&mut self, patches: &[(ElementId, ElementPatch)]) -> EngineResult<()> {
        let next = self.scene.update_elements(patches)?;
        self.commit(next, ActionKind::Batch, format!("Edit {} elements", patches.len()));
        Ok(())
    }

    pub fn remove_elements(&mut self, ids: &[ElementId]) -> EngineResult<()> {
        let next = self.scene.remove_elements(ids)?;
        let label = match ids.len() {
            1 => "Delete element".to_string(),
            n => format!("Delete {n} elements"),
        };
        self.commit(next, ActionKind::Delete, label);
        Ok(())
    }

    /// Delete the selection. Returns how many elements were selected.
    pub fn delete_selection(&mut self) -> EngineResult<usize> {
        let ids = self.selection.ids().to_vec();
        if ids.is_empty() {
            return Ok(0);
        }
        self.remove_elements(&ids)?;
        Ok(ids.len())
    }

    /// Connect two nodes with an edge.
    pub fn connect(&mut self, source: ElementId, target: ElementId) -> EngineResult<ElementId> {
        let (next, id) = self.scene.add_edge(source, target)?;
        self.commit(next, ActionKind::Connect, "Connect");
        Ok(id)
    }

    pub fn group(&mut self, ids: &[ElementId]) -> EngineResult<GroupId> {
        let (next, id) = self.scene.group_elements(ids)?;
        self.commit(next, ActionKind::Group, "Group");
        Ok(id)
    }

    pub fn group_selection(&mut self) -> EngineResult<GroupId> {
        let ids = self.selection.ids().to_vec();
        self.group(&ids)
    }

    pub fn ungroup(&mut self, id: GroupId) -> EngineResult<()> {
        let next = self.scene.ungroup(id)?;
        self.commit(next, ActionKind::Ungroup, "Ungroup");
        Ok(())
    }

    pub fn align(&mut self, ids: &[ElementId], alignment: Alignment) -> EngineResult<()> {
        let next = arrange::align(&self.scene, ids, alignment)?;
        self.commit(next, ActionKind::Batch, format!("Align {alignment:?}").to_lowercase());
        Ok(())
    }

    pub fn distribute(&mut self, ids: &[ElementId], axis: Axis) -> EngineResult<()> {
        let next = arrange::distribute(&self.scene, ids, axis)?;
        self.commit(next, ActionKind::Batch, format!("Distribute {axis:?}").to_lowercase());
        Ok(())
    }

    /// Duplicate elements by the configured offset. The copies become the selection.
    pub fn duplicate(&mut self, ids: &[ElementId]) -> EngineResult<Vec<ElementId>> {
        let (next, new_ids) = arrange::duplicate(&self.scene, ids, self.config.duplicate_offset)?;
        self.commit(next, ActionKind::Create, "Duplicate");
        self.selection = Selection::from_ids(new_ids.iter().copied());
        self.emit_selection();
        Ok(new_ids)
    }

    /// Place nodes in a row or column, `layout_spacing` apart. An empty `ids`
    /// lays out every node in the scene.
    pub fn auto_layout(&mut self, ids: &[ElementId], axis: Axis) -> EngineResult<()> {
        let all: Vec<ElementId>;
        let ids = if ids.is_empty() {
            all = self.scene.nodes().map(|n| n.id).collect();
            &all[..]
        } else {
            ids
        };
        let next = arrange::auto_layout(&self.scene, ids, axis, self.config.layout_spacing)?;
        log::info!("Auto layout {:?} over {} nodes", axis, ids.len());
        self.commit(next, ActionKind::Batch, format!("Auto layout {axis:?}").to_lowercase());
        Ok(())
    }

    /// Copy nodes and the edges between them to the session clipboard.
    /// Returns the number of copied elements.
    pub fn copy(&mut self, ids: &[ElementId]) -> EngineResult<usize> {
        self.clipboard = arrange::copy_set(&self.scene, ids)?;
        self.pastes = 0;
        log::debug!("Copied {} elements", self.clipboard.len());
        Ok(self.clipboard.len())
    }

    pub fn copy_selection(&mut self) -> EngineResult<usize> {
        let ids = self.selection.ids().to_vec();
        self.copy(&ids)
    }

    pub fn has_clipboard(&self) -> bool {
        !self.clipboard.is_empty()
    }

    /// Paste the clipboard with fresh ids. Each paste since the last copy lands
    /// one more `duplicate_offset` away. The pasted elements become the selection.
    pub fn paste(&mut self) -> EngineResult<Vec<ElementId>> {
        if self.clipboard.is_empty() {
            return Ok(Vec::new());
        }
        self.pastes += 1;
        let offset = self.config.duplicate_offset * f64::from(self.pastes);
        let (next, new_ids) = arrange::paste(&self.scene, &self.clipboard, offset);
        self.commit(next, ActionKind::Create, format!("Paste {} elements", new_ids.len()));
        self.selection = Selection::from_ids(new_ids.iter().copied());
        self.emit_selection();
        Ok(new_ids)
    }

    pub fn bring_to_front(&mut self, ids: &[ElementId]) -> EngineResult<()> {
        let next = self.scene.bring_to_front(ids)?;
        self.commit(next, ActionKind::Reorder, "Bring to front");
        Ok(())
    }

    pub fn send_to_back(&mut self, ids: &[ElementId]) -> EngineResult<()> {
        let next = self.scene.send_to_back(ids)?;
        self.commit(next, ActionKind::Reorder, "Send to back");
        Ok(())
    }

    /// Undo the last entry. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        self.settle_gesture();
        let Some(entry) = self.history.undo() else {
            return false;
        };
        log::debug!("Undo: {}", entry.label);
        let next = entry.diff.apply_reverse(&self.scene);
        self.apply_history_step(next, ChangeSource::Undo);
        true
    }

    /// Redo the next entry. Returns false when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        self.settle_gesture();
        let Some(entry) = self.history.redo() else {
            return false;
        };
        log::debug!("Redo: {}", entry.label);
        let next = entry.diff.apply_forward(&self.scene);
        self.apply_history_step(next, ChangeSource::Redo);
        true
    }

    fn apply_history_step(&mut self, next: Scene, source: ChangeSource) {
        let applied = SceneDiff::between(&self.scene, &next);
        self.scene = next;
        self.after_change(&applied, source);
    }

    // --- Selection ---

    pub fn select(&mut self, id: ElementId) -> EngineResult<()> {
        if !self.scene.contains(id) {
            return Err(SceneError::NotFound(id).into());
        }
        self.selection.select(id);
        self.emit_selection();
        Ok(())
    }

    pub fn toggle(&mut self, id: ElementId) -> EngineResult<()> {
        if !self.scene.contains(id) {
            return Err(SceneError::NotFound(id).into());
        }
        self.selection.toggle(id);
        self.emit_selection();
        Ok(())
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(&self.scene);
        self.emit_selection();
    }

    /// Marquee selection with a rectangle in screen coordinates.
    pub fn select_in_rect(&mut self, screen_rect: Rect, additive: bool) {
        let a = self.to_canvas(Point::new(screen_rect.x0, screen_rect.y0));
        let b = self.to_canvas(Point::new(screen_rect.x1, screen_rect.y1));
        self.selection.select_in_rect(&self.scene, Rect::from_points(a, b), additive);
        self.emit_selection();
    }

    /// Click selection at a screen point. The hit tolerance is constant on screen.
    pub fn select_at(&mut self, screen_point: Point, additive: bool) -> Option<ElementId> {
        let point = self.to_canvas(screen_point);
        let tolerance = self.config.hit_tolerance / self.config.zoom.clamp(self.scene.viewport.zoom);
        let before = self.selection.clone();
        let hit = self.selection.select_at(&self.scene, point, tolerance, additive);
        if self.selection != before {
            self.emit_selection();
        }
        hit
    }

    pub fn clear_selection(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        self.selection.clear();
        self.emit_selection();
    }

    // --- Viewport ---

    pub fn pan(&mut self, delta: Vec2) {
        self.scene.viewport.pan(delta);
        self.emit_viewport();
    }

    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        self.scene.viewport.zoom_at(screen_point, factor, &self.config.zoom);
        self.emit_viewport();
    }

    pub fn zoom_in(&mut self, screen_point: Point) {
        self.scene.viewport.zoom_in(screen_point, &self.config.zoom);
        self.emit_viewport();
    }

    pub fn zoom_out(&mut self, screen_point: Point) {
        self.scene.viewport.zoom_out(screen_point, &self.config.zoom);
        self.emit_viewport();
    }

    /// Fit all visible content into a screen area; resets when the scene is empty.
    pub fn fit_to_content(&mut self, screen: Size) {
        match self.scene.content_bounds() {
            Some(bounds) => self.scene.viewport.fit_to_bounds(
                bounds,
                screen,
                self.config.export.padding,
                &self.config.zoom,
            ),
            None => self.scene.viewport.reset(),
        }
        self.emit_viewport();
    }

    // --- Gestures ---

    pub fn is_gesture_active(&self) -> bool {
        self.gesture.is_some()
    }

    /// Start a gesture at a screen point. A gesture already in progress is committed first.
    ///
    /// Move drags every unlocked selected node; resize and rotate act on the
    /// primary selected node.
    pub fn begin_gesture(&mut self, kind: GestureKind, screen_point: Point) -> EngineResult<()> {
        self.settle_gesture();

        let candidates: Vec<ElementId> = match kind {
            GestureKind::Pan => Vec::new(),
            GestureKind::Move => self.selection.ids().to_vec(),
            GestureKind::Resize { .. } | GestureKind::Rotate => {
                self.selection.primary().into_iter().collect()
            }
        };
        let mut targets: Vec<&Element> = candidates
            .iter()
            .filter_map(|id| self.scene.element(*id))
            .filter(|e| e.is_node() && !self.scene.is_effectively_locked(e.id))
            .collect();
        if kind != GestureKind::Pan && targets.is_empty() {
            return Err(SceneError::InsufficientSelection {
                required: 1,
                actual: 0,
            }
            .into());
        }
        targets.sort_by_key(|e| (e.z_index, e.id));

        self.gesture = Some(Gesture {
            kind,
            start_screen: screen_point,
            start_canvas: self.to_canvas(screen_point),
            start_viewport: self.scene.viewport,
            order: targets.iter().map(|e| e.id).collect(),
            originals: targets.into_iter().map(|e| (e.id, e.clone())).collect(),
        });
        log::debug!("Begin {:?} gesture", kind);
        Ok(())
    }

    /// Apply one intermediate frame. Frames are not recorded in history; the
    /// latest frame always wins.
    pub fn gesture_frame(&mut self, screen_point: Point) -> EngineResult<()> {
        let Some(gesture) = self.gesture.as_ref() else {
            return Ok(());
        };

        if gesture.kind == GestureKind::Pan {
            let mut viewport = gesture.start_viewport;
            viewport.pan(screen_point - gesture.start_screen);
            self.scene.viewport = viewport;
            self.emit_viewport();
            return Ok(());
        }

        let cursor = screen_to_canvas(screen_point, &gesture.start_viewport, &self.config.zoom);
        let delta = cursor - gesture.start_canvas;
        let patches: Vec<(ElementId, ElementPatch)> = match gesture.kind {
            GestureKind::Move => {
                let snapped_delta = gesture
                    .order
                    .first()
                    .and_then(|id| gesture.originals.get(id))
                    .map(|lead| self.config.grid.snap(lead.position + delta) - lead.position)
                    .unwrap_or(delta);
                gesture
                    .order
                    .iter()
                    .filter_map(|id| gesture.originals.get(id))
                    .map(|e| (e.id, ElementPatch::default().position(e.position + snapped_delta)))
                    .collect()
            }
            GestureKind::Resize {
                corner,
                keep_aspect_ratio,
            } => gesture
                .originals
                .values()
                .map(|e| {
                    let frame = resize_frame(e.frame(), corner, delta, keep_aspect_ratio);
                    (
                        e.id,
                        ElementPatch::default().position(frame.origin()).size(frame.size()),
                    )
                })
                .collect(),
            GestureKind::Rotate => gesture
                .originals
                .values()
                .map(|e| {
                    let degrees = rotation_from_cursor(e.center(), cursor);
                    let degrees = snap_angle(degrees, self.config.rotation_snap_degrees);
                    (e.id, ElementPatch::default().rotation(degrees))
                })
                .collect(),
            GestureKind::Pan => Vec::new(),
        };

        self.scene = self.scene.update_elements(&patches)?;
        self.events.push(SessionEvent::SceneChanged {
            source: ChangeSource::Preview,
        });
        Ok(())
    }

    /// Finish the gesture, recording one history entry for its net change.
    /// Returns false when no gesture was active or nothing changed.
    pub fn commit_gesture(&mut self) -> bool {
        let Some(gesture) = self.gesture.take() else {
            return false;
        };
        let committed = self.record_gesture(&gesture);
        self.release_held();
        committed
    }

    /// Abort the gesture and restore its targets and the viewport.
    pub fn cancel_gesture(&mut self) {
        let Some(gesture) = self.gesture.take() else {
            return;
        };
        log::debug!("Cancel {:?} gesture", gesture.kind);
        if gesture.kind == GestureKind::Pan {
            self.scene.viewport = gesture.start_viewport;
            self.emit_viewport();
        } else {
            for original in gesture.originals.into_values() {
                self.scene.put_element(original);
            }
            self.events.push(SessionEvent::SceneChanged {
                source: ChangeSource::Preview,
            });
        }
        self.release_held();
    }

    fn settle_gesture(&mut self) {
        if self.gesture.is_some() {
            self.commit_gesture();
        }
    }

    fn record_gesture(&mut self, gesture: &Gesture) -> bool {
        if gesture.kind == GestureKind::Pan {
            return false;
        }
        // Diff only the gesture targets, so remote writes applied meanwhile stay out of history.
        let mut before = self.scene.clone();
        for original in gesture.originals.values() {
            before.put_element(original.clone());
        }
        let diff = SceneDiff::between(&before, &self.scene);
        if diff.is_empty() {
            return false;
        }
        let (kind, label) = match gesture.kind {
            GestureKind::Move => (ActionKind::Move, format!("Move {} elements", gesture.originals.len())),
            GestureKind::Resize { .. } => (ActionKind::Update, "Resize".to_string()),
            GestureKind::Rotate => (ActionKind::Update, "Rotate".to_string()),
            GestureKind::Pan => return false,
        };
        self.history.record(HistoryEntry::new(kind, label, diff.clone()));
        self.after_change(&diff, ChangeSource::Local);
        true
    }

    fn release_held(&mut self) {
        let Some(collab) = self.collaboration.as_mut() else {
            return;
        };
        let outcomes = collab.release_held(&mut self.scene, &HashSet::new());
        self.after_remote(outcomes);
    }

    // --- Export ---

    /// Export a snapshot of the current scene. The returned future does not
    /// borrow the session, so editing can continue while it runs.
    pub fn export<F>(
        &self,
        format: ExportFormat,
        options: Option<ExportOptions>,
        cancel: CancelToken,
        on_progress: F,
    ) -> impl Future<Output = ExportResult<ExportOutput>> + use<F>
    where
        F: FnMut(ExportProgress),
    {
        let options = options.unwrap_or_else(|| self.config.export.clone());
        export_scene(self.scene.clone(), format, options, cancel, on_progress)
    }

    // --- Persistence ---

    /// Save the scene to the object store and return its URL.
    pub async fn save(&mut self) -> EngineResult<String> {
        self.settle_gesture();
        self.scene.meta.updated_at = crate::now_millis();
        Ok(self.autosave.save(&self.scene).await?)
    }

    /// Save when the scene is dirty and the autosave interval has elapsed.
    pub async fn maybe_autosave(&mut self) -> EngineResult<Option<String>> {
        if !self.autosave.should_save() || self.gesture.is_some() {
            return Ok(None);
        }
        self.scene.meta.updated_at = crate::now_millis();
        Ok(self.autosave.maybe_save(&self.scene).await?)
    }

    pub fn last_saved_url(&self) -> Option<&str> {
        self.autosave.last_url()
    }

    /// Replace the scene with a document fetched from the object store.
    pub async fn load(&mut self, url: &str) -> EngineResult<()> {
        let scene = self.autosave.load(url).await?;
        self.replace_scene(scene);
        Ok(())
    }

    /// Replace the scene with a native JSON document.
    pub fn load_document_json(&mut self, json: &str) -> EngineResult<LoadReport> {
        let (scene, report) = document::load_scene(json)?;
        self.replace_scene(scene);
        self.autosave.mark_dirty();
        Ok(report)
    }

    /// Replace the scene with an interchange JSON document.
    pub fn import_interchange(&mut self, json: &str) -> EngineResult<LoadReport> {
        let (scene, report) = interchange::import_interchange(json)?;
        self.replace_scene(scene);
        self.autosave.mark_dirty();
        Ok(report)
    }

    /// Serialize the scene as a native JSON document.
    pub fn document_json(&self) -> EngineResult<String> {
        Ok(document::save_scene(&self.scene)?)
    }

    fn replace_scene(&mut self, scene: Scene) {
        if let Some(gesture) = self.gesture.take() {
            log::debug!("Dropping {:?} gesture on load", gesture.kind);
        }
        let diff = SceneDiff::between(&self.scene, &scene);
        self.scene = scene;
        self.history.clear();
        if !self.selection.is_empty() {
            self.selection.clear();
            self.emit_selection();
        }
        if let Some(collab) = self.collaboration.as_mut() {
            collab.stamp_scene(&self.scene);
        }
        self.broadcast(|collab| collab.broadcast_diff(&diff));
        self.events.push(SessionEvent::SceneChanged {
            source: ChangeSource::Load,
        });
        self.emit_viewport();
        log::info!("Loaded scene with {} elements", self.scene.len());
    }

    /// Upload image bytes and add an image node referencing the stored object.
    pub async fn add_image(
        &mut self,
        bytes: Vec<u8>,
        content_type: &str,
        position: Point,
        size: Size,
    ) -> EngineResult<ElementId> {
        let source = self.autosave.store().upload(bytes, content_type).await?;
        self.add_node(
            NodeContent::Image {
                source,
                alt: String::new(),
            },
            position,
            size,
        )
    }

    // --- Collaboration ---

    /// Attach a collaboration service and connect it to a channel.
    pub fn connect_collaboration(
        &mut self,
        mut manager: CollaborationManager,
        channel: Arc<dyn RealtimeChannel>,
    ) -> EngineResult<()> {
        manager.stamp_scene(&self.scene);
        manager.connect(channel)?;
        self.collaboration = Some(manager);
        Ok(())
    }

    /// Leave the collaboration session and detach the service.
    pub fn disconnect_collaboration(&mut self) -> EngineResult<Option<CollaborationManager>> {
        let Some(mut manager) = self.collaboration.take() else {
            return Ok(None);
        };
        manager.disconnect()?;
        Ok(Some(manager))
    }

    pub fn collaboration(&self) -> Option<&CollaborationManager> {
        self.collaboration.as_ref()
    }

    /// Apply every queued remote envelope in arrival order. Remote changes never
    /// enter history. Returns the number of envelopes processed.
    pub fn pump_remote(&mut self) -> usize {
        let in_flight = self.gesture.as_ref().map(Gesture::targets).unwrap_or_default();
        let Some(collab) = self.collaboration.as_mut() else {
            return 0;
        };
        let envelopes = collab.inbox().drain();
        let count = envelopes.len();
        let outcomes: Vec<Ingested> = envelopes
            .into_iter()
            .map(|envelope| collab.ingest(&mut self.scene, envelope, &in_flight))
            .collect();
        self.after_remote(outcomes);
        count
    }

    fn after_remote(&mut self, outcomes: Vec<Ingested>) {
        let mut touched: Vec<Uuid> = Vec::new();
        let mut presence = false;
        for outcome in outcomes {
            match outcome {
                Ingested::Applied { touched: ids } => touched.extend(ids),
                Ingested::Presence => presence = true,
                Ingested::Held | Ingested::Buffered | Ingested::Stale | Ingested::Ignored => {}
            }
        }
        let conflicts = self
            .collaboration
            .as_mut()
            .map(CollaborationManager::take_conflicts)
            .unwrap_or_default();

        if !touched.is_empty() {
            log::debug!("Applied remote changes to {} records", touched.len());
            if self.selection.retain_existing(&self.scene) {
                self.emit_selection();
            }
            self.autosave.mark_dirty();
            self.events.push(SessionEvent::SceneChanged {
                source: ChangeSource::Remote,
            });
        }
        if presence {
            self.events.push(SessionEvent::PresenceChanged);
        }
        self.events
            .extend(conflicts.into_iter().map(SessionEvent::SyncConflict));
    }

    /// Publish the local cursor, given in screen coordinates.
    pub fn set_cursor(&mut self, screen_point: Option<Point>) {
        let position = screen_point.map(|p| self.to_canvas(p));
        self.broadcast(|collab| collab.broadcast_cursor(position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ShapeFamily;
    use crate::export::ExportStage;
    use crate::storage::MemoryObjectStore;
    use crate::sync::LoopbackHub;
    use crate::element::SerializableColor;

    fn session() -> CanvasSession {
        CanvasSession::new(
            EngineConfig::default(),
            Arc::new(MemoryObjectStore::new()),
            DiagramType::Whiteboard,
        )
    }

    fn rect() -> NodeContent {
        NodeContent::Shape {
            family: ShapeFamily::Rectangle,
        }
    }

    fn add(session: &mut CanvasSession, x: f64, y: f64) -> ElementId {
        session
            .add_node(rect(), Point::new(x, y), Size::new(100.0, 50.0))
            .unwrap()
    }

    #[test]
    fn test_commands_record_history_and_events() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        let b = add(&mut s, 200.0, 0.0);
        s.connect(a, b).unwrap();
        assert_eq!(s.history().len(), 3);
        assert!(s.is_dirty());

        let events = s.take_events();
        let changes = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::SceneChanged { source: ChangeSource::Local }))
            .count();
        assert_eq!(changes, 3);
        assert!(s.take_events().is_empty());
    }

    #[test]
    fn test_failed_command_changes_nothing() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        let before = s.scene().clone();
        assert!(s.connect(a, Uuid::new_v4()).is_err());
        assert!(s.group(&[a]).is_err());
        assert_eq!(s.scene(), &before);
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_no_op_command_is_not_recorded() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        s.bring_to_front(&[a]).unwrap();
        s.update_element(a, &ElementPatch::default().position(Point::ZERO)).unwrap();
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_undo_redo() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        s.update_element(a, &ElementPatch::default().label("A")).unwrap();
        assert!(s.undo());
        assert_eq!(s.scene().element(a).unwrap().label, "");
        assert!(s.undo());
        assert!(s.scene().is_empty());
        assert!(!s.undo());
        assert!(s.redo());
        assert!(s.redo());
        assert_eq!(s.scene().element(a).unwrap().label, "A");
        assert!(!s.redo());
    }

    #[test]
    fn test_delete_selection_prunes_selection() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        let b = add(&mut s, 200.0, 0.0);
        s.select(a).unwrap();
        s.toggle(b).unwrap();
        assert_eq!(s.delete_selection().unwrap(), 2);
        assert!(s.selection().is_empty());
        assert_eq!(s.delete_selection().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_selects_copies() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        let copies = s.duplicate(&[a]).unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(s.selection().ids(), copies.as_slice());
        let copy = s.scene().element(copies[0]).unwrap();
        assert!((copy.position.x - 20.0).abs() < 1e-9);
        assert!(copy.z_index > s.scene().element(a).unwrap().z_index);
    }

    #[test]
    fn test_paste_offsets_grow_and_survive_delete() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        let b = add(&mut s, 200.0, 0.0);
        s.connect(a, b).unwrap();
        assert_eq!(s.copy(&[a, b]).unwrap(), 3);
        s.remove_elements(&[a, b]).unwrap();

        let first = s.paste().unwrap();
        let second = s.paste().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(s.selection().ids(), second.as_slice());
        assert!(s.scene().is_consistent());

        let x_of = |ids: &[ElementId]| {
            ids.iter()
                .filter_map(|id| s.scene().element(*id))
                .filter(|e| e.is_node())
                .map(|e| e.position.x)
                .fold(f64::INFINITY, f64::min)
        };
        assert!((x_of(&first) - 20.0).abs() < 1e-9);
        assert!((x_of(&second) - 40.0).abs() < 1e-9);

        let entries = s.history().len();
        assert!(s.undo());
        assert_eq!(s.history().len(), entries);
        assert!(second.iter().all(|id| !s.scene().contains(*id)));
    }

    #[test]
    fn test_paste_with_empty_clipboard_is_a_no_op() {
        let mut s = session();
        assert!(!s.has_clipboard());
        assert!(s.paste().unwrap().is_empty());
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_auto_layout_uses_configured_spacing() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        let b = add(&mut s, 500.0, 300.0);
        s.auto_layout(&[], Axis::Horizontal).unwrap();
        assert_eq!(s.scene().element(b).unwrap().position, Point::new(200.0, 0.0));
        assert_eq!(s.scene().element(a).unwrap().position, Point::ZERO);
        assert_eq!(s.history().len(), 3);
    }

    #[test]
    fn test_grid_snapping_on_add() {
        let mut config = EngineConfig::default();
        config.grid.enabled = true;
        let mut s = CanvasSession::new(config, Arc::new(MemoryObjectStore::new()), DiagramType::Flowchart);
        let id = s.add_node(rect(), Point::new(27.0, 33.0), Size::new(40.0, 40.0)).unwrap();
        let position = s.scene().element(id).unwrap().position;
        assert!((position.x - 20.0).abs() < 1e-9);
        assert!((position.y - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_select_at_respects_zoom() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        s.zoom_at(Point::ZERO, 2.0);
        // Canvas (50, 25) is at screen (100, 50) at 200%.
        assert_eq!(s.select_at(Point::new(100.0, 50.0), false), Some(a));
        assert_eq!(s.select_at(Point::new(500.0, 500.0), false), None);
        assert!(s.selection().is_empty());
    }

    #[test]
    fn test_move_gesture_records_one_entry() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        s.select(a).unwrap();
        s.take_events();

        s.begin_gesture(GestureKind::Move, Point::new(10.0, 10.0)).unwrap();
        for step in 1..=5 {
            s.gesture_frame(Point::new(10.0 + step as f64 * 10.0, 10.0)).unwrap();
        }
        assert_eq!(s.history().len(), 1);
        assert!(s.commit_gesture());
        assert_eq!(s.history().len(), 2);
        assert!((s.scene().element(a).unwrap().position.x - 50.0).abs() < 1e-9);

        let previews = s
            .take_events()
            .iter()
            .filter(|e| matches!(e, SessionEvent::SceneChanged { source: ChangeSource::Preview }))
            .count();
        assert_eq!(previews, 5);

        assert!(s.undo());
        assert!(s.scene().element(a).unwrap().position.x.abs() < 1e-9);
    }

    #[test]
    fn test_cancel_gesture_restores() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        s.select(a).unwrap();
        s.begin_gesture(GestureKind::Rotate, Point::new(50.0, -40.0)).unwrap();
        s.gesture_frame(Point::new(150.0, 25.0)).unwrap();
        assert!((s.scene().element(a).unwrap().rotation - 90.0).abs() < 1e-9);
        s.cancel_gesture();
        assert!(s.scene().element(a).unwrap().rotation.abs() < 1e-9);
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_resize_gesture() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        s.select(a).unwrap();
        s.begin_gesture(
            GestureKind::Resize {
                corner: Corner::BottomRight,
                keep_aspect_ratio: false,
            },
            Point::new(100.0, 50.0),
        )
        .unwrap();
        s.gesture_frame(Point::new(150.0, 100.0)).unwrap();
        assert!(s.commit_gesture());
        let size = s.scene().element(a).unwrap().size;
        assert!((size.width - 150.0).abs() < 1e-9);
        assert!((size.height - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_pan_gesture_skips_history() {
        let mut s = session();
        s.begin_gesture(GestureKind::Pan, Point::ZERO).unwrap();
        s.gesture_frame(Point::new(30.0, -10.0)).unwrap();
        s.gesture_frame(Point::new(40.0, -20.0)).unwrap();
        assert!(!s.commit_gesture());
        assert!((s.viewport().x - 40.0).abs() < 1e-9);
        assert!((s.viewport().y + 20.0).abs() < 1e-9);
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_gesture_needs_selection() {
        let mut s = session();
        assert!(s.begin_gesture(GestureKind::Move, Point::ZERO).is_err());
        assert!(!s.is_gesture_active());
    }

    #[test]
    fn test_export_runs_on_snapshot() {
        let mut s = session();
        add(&mut s, 0.0, 0.0);
        let mut stages = Vec::new();
        let future = s.export(ExportFormat::Svg, None, CancelToken::new(), |p| stages.push(p.stage));
        // The export owns its snapshot; the session stays editable.
        add(&mut s, 300.0, 0.0);
        let output = pollster::block_on(future).unwrap();
        assert_eq!(
            stages,
            vec![ExportStage::Analyzing, ExportStage::Converting, ExportStage::Finalizing]
        );
        assert_eq!(output.metadata.node_count, 1);
    }

    #[test]
    fn test_save_and_load() {
        let mut s = session();
        let a = add(&mut s, 0.0, 0.0);
        let url = pollster::block_on(s.save()).unwrap();
        assert!(!s.is_dirty());
        assert_eq!(s.last_saved_url(), Some(url.as_str()));

        s.remove_elements(&[a]).unwrap();
        pollster::block_on(s.load(&url)).unwrap();
        assert!(s.scene().contains(a));
        assert!(!s.can_undo());
    }

    #[test]
    fn test_add_image_uploads() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut s = CanvasSession::new(EngineConfig::default(), store.clone(), DiagramType::Slides);
        let id = pollster::block_on(s.add_image(
            vec![0x89, b'P', b'N', b'G'],
            "image/png",
            Point::ZERO,
            Size::new(64.0, 64.0),
        ))
        .unwrap();
        let Some(NodeContent::Image { source, .. }) = s.scene().element(id).and_then(Element::as_node) else {
            panic!("expected an image node");
        };
        assert!(source.starts_with("memory://"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remote_changes_skip_history() {
        let hub = LoopbackHub::new();
        let mut alice = session();
        let mut bob = session();
        alice
            .connect_collaboration(
                CollaborationManager::new("alice", SerializableColor::new(200, 0, 0, 255)),
                Arc::new(hub.channel()),
            )
            .unwrap();
        bob.connect_collaboration(
            CollaborationManager::new("bob", SerializableColor::new(0, 0, 200, 255)),
            Arc::new(hub.channel()),
        )
        .unwrap();

        let a = add(&mut alice, 0.0, 0.0);
        assert!(bob.pump_remote() >= 1);
        assert!(bob.scene().contains(a));
        assert!(bob.history().is_empty());
        assert!(
            bob.take_events()
                .iter()
                .any(|e| matches!(e, SessionEvent::SceneChanged { source: ChangeSource::Remote }))
        );
    }

    #[test]
    fn test_concurrent_adds_converge_on_paint_order() {
        let hub = LoopbackHub::new();
        let mut alice = session();
        let mut bob = session();
        alice
            .connect_collaboration(
                CollaborationManager::new("alice", SerializableColor::black()),
                Arc::new(hub.channel()),
            )
            .unwrap();
        bob.connect_collaboration(
            CollaborationManager::new("bob", SerializableColor::white()),
            Arc::new(hub.channel()),
        )
        .unwrap();

        let a = add(&mut alice, 0.0, 0.0);
        let b = add(&mut bob, 200.0, 0.0);
        assert_eq!(alice.scene().element(a).unwrap().z_index, 1);
        assert_eq!(bob.scene().element(b).unwrap().z_index, 1);

        for _ in 0..3 {
            alice.pump_remote();
            bob.pump_remote();
        }
        let order = |s: &CanvasSession| {
            s.scene()
                .elements_ordered()
                .iter()
                .map(|e| (e.id, e.z_index))
                .collect::<Vec<_>>()
        };
        assert_eq!(order(&alice), order(&bob));
        assert_eq!(order(&alice).len(), 2);
        assert!(alice.scene().is_consistent());
        assert!(bob.scene().is_consistent());
    }

    #[test]
    fn test_remote_write_held_during_gesture() {
        let hub = LoopbackHub::new();
        let mut alice = session();
        let mut bob = session();
        alice
            .connect_collaboration(
                CollaborationManager::new("alice", SerializableColor::black()),
                Arc::new(hub.channel()),
            )
            .unwrap();
        bob.connect_collaboration(
            CollaborationManager::new("bob", SerializableColor::black()),
            Arc::new(hub.channel()),
        )
        .unwrap();

        let a = add(&mut alice, 0.0, 0.0);
        bob.pump_remote();
        bob.select(a).unwrap();
        bob.begin_gesture(GestureKind::Move, Point::ZERO).unwrap();
        bob.gesture_frame(Point::new(30.0, 0.0)).unwrap();

        alice.update_element(a, &ElementPatch::default().label("remote")).unwrap();
        bob.pump_remote();
        assert_eq!(bob.scene().element(a).unwrap().label, "");

        bob.commit_gesture();
        let element = bob.scene().element(a).unwrap();
        // The gesture commit is the later write, so it wins.
        assert!((element.position.x - 30.0).abs() < 1e-9);
        assert_eq!(bob.history().len(), 1);
    }
}
