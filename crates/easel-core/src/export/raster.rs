//! PNG rendering via resvg.

use super::{ExportError, ExportQuality, ExportResult};
use resvg::{tiny_skia, usvg};

/// Largest side, in pixels, a raster export may have.
pub const MAX_RASTER_SIDE: u32 = 16_384;

/// Rasterize SVG markup at the quality's scale and encode it as PNG.
///
/// `text` pairs are written as `tEXt` chunks, or `iTXt` when the value is not
/// Latin-1. Returns the PNG bytes and the pixel size.
pub(crate) fn svg_to_png(
    svg: &str,
    quality: ExportQuality,
    text: &[(String, String)],
) -> ExportResult<(Vec<u8>, u32, u32)> {
    let scale = quality.scale();
    let mut opts = usvg::Options::default();
    opts.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(svg, &opts)
        .map_err(|e| ExportError::failed(format!("Failed to parse SVG: {e}")))?;

    let width = (tree.size().width() * scale).ceil() as u32;
    let height = (tree.size().height() * scale).ceil() as u32;
    if width > MAX_RASTER_SIDE || height > MAX_RASTER_SIDE {
        return Err(ExportError::failed(format!(
            "Image of {width}x{height} pixels exceeds the {MAX_RASTER_SIDE} pixel limit; lower the quality"
        )));
    }
    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ExportError::failed("Failed to allocate pixmap"))?;
    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );

    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    let bytes = encode_png(&data, width, height, quality.dpi(), text)
        .map_err(|e| ExportError::failed(format!("Failed to encode PNG: {e}")))?;
    log::debug!("Rasterized {}x{} at scale {}", width, height, scale);
    Ok((bytes, width, height))
}

fn encode_png(
    rgba: &[u8],
    width: u32,
    height: u32,
    dpi: u32,
    text: &[(String, String)],
) -> Result<Vec<u8>, png::EncodingError> {
    let mut buffer = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buffer, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let per_meter = (dpi as f64 / 0.0254).round() as u32;
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: per_meter,
            yppu: per_meter,
            unit: png::Unit::Meter,
        }));
        for (key, value) in text {
            if !is_text_keyword(key) {
                log::warn!("Skipping PNG text chunk with invalid keyword {:?}", key);
                continue;
            }
            let added = if is_latin1(value) {
                encoder.add_text_chunk(key.clone(), value.clone())
            } else {
                encoder.add_itxt_chunk(key.clone(), value.clone())
            };
            if let Err(e) = added {
                log::warn!("Skipping PNG text chunk {}: {}", key, e);
            }
        }
        let mut writer = encoder.write_header()?;
        writer.write_image_data(rgba)?;
        writer.finish()?;
    }
    Ok(buffer)
}

fn is_latin1(text: &str) -> bool {
    text.chars().all(|c| u32::from(c) <= 0xFF)
}

/// PNG keywords are 1-79 Latin-1 characters.
fn is_text_keyword(key: &str) -> bool {
    (1..=79).contains(&key.chars().count()) && is_latin1(key)
}
