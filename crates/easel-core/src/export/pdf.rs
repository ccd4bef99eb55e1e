//! PDF conversion via svg2pdf.

use super::{ExportError, ExportResult};
use std::sync::Arc;
use svg2pdf::usvg::{self, fontdb};

/// Convert SVG markup into a single-page PDF. Text is emitted as paths.
pub(crate) fn svg_to_pdf(svg: &str) -> ExportResult<Vec<u8>> {
    let mut fonts = fontdb::Database::new();
    fonts.load_system_fonts();

    let mut opts = usvg::Options::default();
    opts.fontdb = Arc::new(fonts);

    let tree = usvg::Tree::from_str(svg, &opts)
        .map_err(|e| ExportError::failed(format!("Failed to parse SVG: {e}")))?;

    let options = svg2pdf::ConversionOptions {
        embed_text: false,
        ..Default::default()
    };
    svg2pdf::to_pdf(&tree, options, svg2pdf::PageOptions::default())
        .map_err(|e| ExportError::failed(format!("Failed to convert SVG to PDF: {e}")))
}
