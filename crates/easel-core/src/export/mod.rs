//! Terminal export of a scene snapshot to raster, vector and structured formats.
//!
//! Export is lossy and read-only: it works on an owned scene snapshot, reports
//! `Analyzing → Converting → Finalizing` progress, and can be cancelled between
//! stages. A failure never touches the live scene.

mod markdown;
#[cfg(feature = "pdf")]
mod pdf;
#[cfg(feature = "raster")]
mod raster;
mod svg;

pub use svg::render_svg;

use crate::element::SerializableColor;
use crate::interchange::to_interchange;
use crate::scene::Scene;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;
use thiserror::Error;

/// Export errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExportError {
    #[error("Export failed: {cause}")]
    Failed { cause: String },
    #[error("Export cancelled")]
    Cancelled,
    #[error("Export format {0:?} is not available in this build")]
    Unsupported(ExportFormat),
}

impl ExportError {
    pub(crate) fn failed(cause: impl Into<String>) -> Self {
        ExportError::Failed {
            cause: cause.into(),
        }
    }
}

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Raster image.
    Png,
    /// Vector image.
    Svg,
    /// Single-page vector document.
    Pdf,
    /// React-Flow-style interchange data.
    Json,
    /// Human-readable structured summary.
    Markdown,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Svg => "svg",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Json => "application/json",
            ExportFormat::Markdown => "text/markdown",
        }
    }

    /// Visual formats cannot be produced from an empty scene.
    pub fn is_visual(self) -> bool {
        matches!(self, ExportFormat::Png | ExportFormat::Svg | ExportFormat::Pdf)
    }
}

/// Export quality presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportQuality {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
}

impl ExportQuality {
    /// Raster scale factor.
    pub fn scale(self) -> f32 {
        match self {
            ExportQuality::Low => 1.0,
            ExportQuality::Medium => 2.0,
            ExportQuality::High => 3.0,
            ExportQuality::Ultra => 4.0,
        }
    }

    /// Dots per inch written into raster output.
    pub fn dpi(self) -> u32 {
        match self {
            ExportQuality::Low => 72,
            ExportQuality::Medium => 150,
            ExportQuality::High => 300,
            ExportQuality::Ultra => 600,
        }
    }
}

/// Export options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub quality: ExportQuality,
    /// Background fill; `None` keeps it transparent.
    pub background_color: Option<SerializableColor>,
    /// Embed title, counts and element metadata where the format allows.
    pub include_metadata: bool,
    /// Margin around the content, in canvas units.
    pub padding: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            quality: ExportQuality::default(),
            background_color: Some(SerializableColor::white()),
            include_metadata: true,
            padding: 20.0,
        }
    }
}

/// Discrete export stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Analyzing,
    Converting,
    Finalizing,
}

/// Progress notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportProgress {
    pub stage: ExportStage,
    /// Overall completion, 0.0..1.0.
    pub fraction: f64,
}

/// Cooperative cancellation flag shared between the caller and a running export.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary attached to every export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub node_count: usize,
    pub edge_count: usize,
    /// Milliseconds since the Unix epoch.
    pub exported_at: u64,
    pub processing_ms: u64,
}

/// A finished export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutput {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: String,
    /// Pixel size for raster output.
    pub pixel_size: Option<(u32, u32)>,
    pub metadata: ExportMetadata,
}

impl ExportOutput {
    /// Encode as a `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// Yields once to the executor so a cancel request can land between stages.
struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

fn file_stem(title: &str) -> String {
    let slug: String = title
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "easel-export".to_string()
    } else {
        slug
    }
}

/// Export a scene snapshot.
///
/// `on_progress` is called once per stage, in order, and never after the
/// export has been cancelled or has failed.
pub async fn export_scene(
    scene: Scene,
    format: ExportFormat,
    options: ExportOptions,
    cancel: CancelToken,
    mut on_progress: impl FnMut(ExportProgress),
) -> ExportResult<ExportOutput> {
    let started = Instant::now();
    let check = |cancel: &CancelToken| {
        if cancel.is_cancelled() {
            log::info!("Export to {:?} cancelled", format);
            Err(ExportError::Cancelled)
        } else {
            Ok(())
        }
    };

    check(&cancel)?;
    on_progress(ExportProgress {
        stage: ExportStage::Analyzing,
        fraction: 0.0,
    });
    log::debug!("Export {:?}: analyzing {} elements", format, scene.len());

    let node_count = scene.nodes().count();
    let edge_count = scene.edges().count();
    if format.is_visual() && scene.content_bounds().is_none() {
        log::warn!("Export {:?} failed: nothing visible", format);
        return Err(ExportError::failed("the scene has no visible elements to export"));
    }

    YieldNow(false).await;
    check(&cancel)?;
    on_progress(ExportProgress {
        stage: ExportStage::Converting,
        fraction: 1.0 / 3.0,
    });

    let mut pixel_size = None;
    let bytes = match format {
        ExportFormat::Svg => render_svg(&scene, &options).0.into_bytes(),
        ExportFormat::Png => {
            let (png, width, height) = render_png(&scene, &options)?;
            pixel_size = Some((width, height));
            png
        }
        ExportFormat::Pdf => render_pdf(&scene, &options)?,
        ExportFormat::Json => {
            let mut value = to_interchange(&scene, options.include_metadata);
            if options.include_metadata {
                if let serde_json::Value::Object(map) = &mut value {
                    map.insert(
                        "exportInfo".into(),
                        serde_json::json!({ "nodeCount": node_count, "edgeCount": edge_count }),
                    );
                }
            }
            serde_json::to_vec_pretty(&value).map_err(|e| ExportError::failed(e.to_string()))?
        }
        ExportFormat::Markdown => markdown::render_markdown(&scene, options.include_metadata).into_bytes(),
    };

    YieldNow(false).await;
    check(&cancel)?;
    on_progress(ExportProgress {
        stage: ExportStage::Finalizing,
        fraction: 2.0 / 3.0,
    });

    let output = ExportOutput {
        format,
        mime_type: format.mime_type(),
        file_name: format!("{}.{}", file_stem(&scene.meta.title), format.extension()),
        pixel_size,
        metadata: ExportMetadata {
            node_count,
            edge_count,
            exported_at: crate::now_millis(),
            processing_ms: started.elapsed().as_millis() as u64,
        },
        bytes,
    };
    log::info!(
        "Exported {} ({} bytes, {} ms)",
        output.file_name,
        output.bytes.len(),
        output.metadata.processing_ms
    );
    Ok(output)
}

#[cfg(feature = "raster")]
fn render_png(scene: &Scene, options: &ExportOptions) -> ExportResult<(Vec<u8>, u32, u32)> {
    let (svg, _, _) = render_svg(scene, options);
    let mut text = Vec::new();
    if options.include_metadata {
        text.push(("Software".to_string(), "easel".to_string()));
        if !scene.meta.title.is_empty() {
            text.push(("Title".to_string(), scene.meta.title.clone()));
        }
    }
    raster::svg_to_png(&svg, options.quality, &text)
}

#[cfg(not(feature = "raster"))]
fn render_png(_scene: &Scene, _options: &ExportOptions) -> ExportResult<(Vec<u8>, u32, u32)> {
    Err(ExportError::Unsupported(ExportFormat::Png))
}

#[cfg(feature = "pdf")]
fn render_pdf(scene: &Scene, options: &ExportOptions) -> ExportResult<Vec<u8>> {
    let (svg, _, _) = render_svg(scene, options);
    pdf::svg_to_pdf(&svg)
}

#[cfg(not(feature = "pdf"))]
fn render_pdf(_scene: &Scene, _options: &ExportOptions) -> ExportResult<Vec<u8>> {
    Err(ExportError::Unsupported(ExportFormat::Pdf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, NodeContent};
    use crate::scene::DiagramType;
    use kurbo::{Point, Size};

    fn scene() -> Scene {
        let a = Element::node(NodeContent::default(), Point::new(0.0, 0.0), Size::new(100.0, 50.0))
            .with_label("Start");
        let b = Element::node(NodeContent::default(), Point::new(200.0, 0.0), Size::new(100.0, 50.0))
            .with_label("End");
        let (a_id, b_id) = (a.id, b.id);
        let mut scene = Scene::new(DiagramType::Flowchart)
            .add_element(a)
            .unwrap()
            .add_element(b)
            .unwrap()
            .add_edge(a_id, b_id)
            .unwrap()
            .0;
        scene.meta.title = "Order Flow".into();
        scene
    }

    fn run(scene: Scene, format: ExportFormat) -> (ExportResult<ExportOutput>, Vec<ExportStage>) {
        let mut stages = Vec::new();
        let result = pollster::block_on(export_scene(
            scene,
            format,
            ExportOptions::default(),
            CancelToken::new(),
            |p| stages.push(p.stage),
        ));
        (result, stages)
    }

    #[test]
    fn test_svg_export_reports_stages() {
        let (result, stages) = run(scene(), ExportFormat::Svg);
        let output = result.unwrap();
        assert_eq!(
            stages,
            vec![ExportStage::Analyzing, ExportStage::Converting, ExportStage::Finalizing]
        );
        assert_eq!(output.file_name, "order-flow.svg");
        assert_eq!(output.metadata.node_count, 2);
        assert_eq!(output.metadata.edge_count, 1);
        let text = String::from_utf8(output.bytes).unwrap();
        assert!(text.starts_with("<svg"));
        assert!(text.contains("Start"));
    }

    #[test]
    fn test_empty_scene_fails_for_visual_formats() {
        let (result, stages) = run(Scene::new(DiagramType::Whiteboard), ExportFormat::Svg);
        assert!(matches!(result, Err(ExportError::Failed { .. })));
        assert_eq!(stages, vec![ExportStage::Analyzing]);

        let (json, _) = run(Scene::new(DiagramType::Whiteboard), ExportFormat::Json);
        assert!(json.is_ok());
    }

    #[test]
    fn test_cancel_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut calls = 0;
        let result = pollster::block_on(export_scene(
            scene(),
            ExportFormat::Svg,
            ExportOptions::default(),
            cancel,
            |_| calls += 1,
        ));
        assert_eq!(result, Err(ExportError::Cancelled));
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_cancel_during_progress_stops_callbacks() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut stages = Vec::new();
        let result = pollster::block_on(export_scene(
            scene(),
            ExportFormat::Svg,
            ExportOptions::default(),
            cancel,
            |p| {
                stages.push(p.stage);
                trigger.cancel();
            },
        ));
        assert_eq!(result, Err(ExportError::Cancelled));
        assert_eq!(stages, vec![ExportStage::Analyzing]);
    }

    #[test]
    fn test_json_export_and_data_url() {
        let (result, _) = run(scene(), ExportFormat::Json);
        let output = result.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output.bytes).unwrap();
        assert_eq!(value["nodes"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["exportInfo"]["edgeCount"], 1);
        assert!(output.to_data_url().starts_with("data:application/json;base64,"));
    }

    #[test]
    fn test_markdown_export() {
        let (result, _) = run(scene(), ExportFormat::Markdown);
        let text = String::from_utf8(result.unwrap().bytes).unwrap();
        assert!(text.starts_with("# Order Flow"));
        assert!(text.contains("Start → End"));
    }

    #[cfg(feature = "raster")]
    #[test]
    fn test_png_export_scales_with_quality() {
        let output = pollster::block_on(export_scene(
            scene(),
            ExportFormat::Png,
            ExportOptions {
                quality: ExportQuality::Low,
                ..ExportOptions::default()
            },
            CancelToken::new(),
            |_| {},
        ))
        .unwrap();
        // Content 300x50 plus 20 padding on each side at scale 1.
        assert_eq!(output.pixel_size, Some((340, 90)));
        assert_eq!(&output.bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[cfg(feature = "raster")]
    #[test]
    fn test_png_export_with_non_latin1_title() {
        let mut scene = scene();
        scene.meta.title = "Proposta Solar ☀".into();
        let (result, _) = run(scene, ExportFormat::Png);
        let output = result.unwrap();
        assert_eq!(&output.bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn test_pdf_export() {
        let (result, _) = run(scene(), ExportFormat::Pdf);
        assert!(result.unwrap().bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_quality_presets() {
        assert!((ExportQuality::Ultra.scale() - 4.0).abs() < f32::EPSILON);
        assert_eq!(ExportQuality::High.dpi(), 300);
        assert_eq!(file_stem("  "), "easel-export");
    }
}
