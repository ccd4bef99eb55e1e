//! SVG rendering of a scene. Raster and PDF output go through this too.

use super::ExportOptions;
use crate::element::{
    ChartKind, EdgeData, EdgeRoute, Element, ElementKind, ElementStyle, NodeContent, ShapeFamily,
};
use crate::scene::Scene;
use kurbo::{Point, Rect, Vec2};
use std::fmt::Write as _;

const FONT_FAMILY: &str = "sans-serif";
const ARROW_MARKER: &str = "easel-arrow";

/// Escape text for use in SVG content and attribute values.
pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render visible content to an SVG document.
///
/// Returns the markup with its width and height in canvas units. The view box
/// is the content bounds grown by `options.padding`.
pub fn render_svg(scene: &Scene, options: &ExportOptions) -> (String, f64, f64) {
    let padding = options.padding.max(0.0);
    let bounds = scene
        .content_bounds()
        .unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0))
        .inflate(padding, padding);
    let (width, height) = (bounds.width().max(1.0), bounds.height().max(1.0));

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="{x} {y} {w} {h}">"#,
        x = bounds.x0,
        y = bounds.y0,
        w = width,
        h = height,
    );
    if options.include_metadata && !scene.meta.title.is_empty() {
        let _ = write!(svg, "<title>{}</title>", escape_xml(&scene.meta.title));
    }
    let _ = write!(
        svg,
        r#"<defs><marker id="{ARROW_MARKER}" viewBox="0 0 10 10" refX="9" refY="5" markerWidth="8" markerHeight="8" orient="auto-start-reverse"><path d="M0,0 L10,5 L0,10 z" fill="context-stroke"/></marker></defs>"#
    );
    if let Some(background) = options.background_color {
        let _ = write!(
            svg,
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" fill-opacity="{}"/>"#,
            bounds.x0,
            bounds.y0,
            width,
            height,
            background.to_hex(),
            background.alpha_f64()
        );
    }

    for element in scene.elements_ordered() {
        if !scene.is_effectively_visible(element.id) {
            continue;
        }
        match &element.kind {
            ElementKind::Node(content) => write_node(&mut svg, element, content),
            ElementKind::Edge(edge) => write_edge(&mut svg, scene, element, edge),
        }
    }
    svg.push_str("</svg>");
    (svg, width, height)
}

fn paint_attributes(style: &ElementStyle, fill: bool) -> String {
    let mut attrs = String::new();
    match (fill, style.fill) {
        (true, Some(color)) => {
            let _ = write!(
                attrs,
                r#" fill="{}" fill-opacity="{}""#,
                color.to_hex(),
                color.alpha_f64()
            );
        }
        _ => attrs.push_str(r#" fill="none""#),
    }
    let _ = write!(
        attrs,
        r#" stroke="{}" stroke-opacity="{}" stroke-width="{}""#,
        style.stroke.to_hex(),
        style.stroke.alpha_f64(),
        style.stroke_width
    );
    if let Some(dash) = style.stroke_style.dash_array(style.stroke_width) {
        let _ = write!(attrs, r#" stroke-dasharray="{dash}""#);
    }
    attrs
}

fn polygon(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{},{}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_outline(svg: &mut String, family: ShapeFamily, frame: Rect, paint: &str) {
    let (x, y, w, h) = (frame.x0, frame.y0, frame.width(), frame.height());
    let c = frame.center();
    match family {
        ShapeFamily::Rectangle => {
            let _ = write!(svg, r#"<rect x="{x}" y="{y}" width="{w}" height="{h}"{paint}/>"#);
        }
        ShapeFamily::RoundedRectangle => {
            let r = (w.min(h) * 0.15).min(12.0);
            let _ = write!(
                svg,
                r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" rx="{r}" ry="{r}"{paint}/>"#
            );
        }
        ShapeFamily::Ellipse => {
            let _ = write!(
                svg,
                r#"<ellipse cx="{}" cy="{}" rx="{}" ry="{}"{paint}/>"#,
                c.x,
                c.y,
                w / 2.0,
                h / 2.0
            );
        }
        ShapeFamily::Diamond => {
            let points = [
                Point::new(c.x, frame.y0),
                Point::new(frame.x1, c.y),
                Point::new(c.x, frame.y1),
                Point::new(frame.x0, c.y),
            ];
            let _ = write!(svg, r#"<polygon points="{}"{paint}/>"#, polygon(&points));
        }
        ShapeFamily::Triangle => {
            let points = [
                Point::new(c.x, frame.y0),
                Point::new(frame.x1, frame.y1),
                Point::new(frame.x0, frame.y1),
            ];
            let _ = write!(svg, r#"<polygon points="{}"{paint}/>"#, polygon(&points));
        }
        ShapeFamily::Hexagon => {
            let inset = w * 0.25;
            let points = [
                Point::new(frame.x0 + inset, frame.y0),
                Point::new(frame.x1 - inset, frame.y0),
                Point::new(frame.x1, c.y),
                Point::new(frame.x1 - inset, frame.y1),
                Point::new(frame.x0 + inset, frame.y1),
                Point::new(frame.x0, c.y),
            ];
            let _ = write!(svg, r#"<polygon points="{}"{paint}/>"#, polygon(&points));
        }
        ShapeFamily::Parallelogram => {
            let skew = w * 0.2;
            let points = [
                Point::new(frame.x0 + skew, frame.y0),
                Point::new(frame.x1, frame.y0),
                Point::new(frame.x1 - skew, frame.y1),
                Point::new(frame.x0, frame.y1),
            ];
            let _ = write!(svg, r#"<polygon points="{}"{paint}/>"#, polygon(&points));
        }
        ShapeFamily::Cylinder => {
            let ry = (h * 0.12).min(w / 2.0);
            let rx = w / 2.0;
            let _ = write!(
                svg,
                r#"<path d="M{x0},{top} A{rx},{ry} 0 0 0 {x1},{top} L{x1},{bottom} A{rx},{ry} 0 0 1 {x0},{bottom} Z"{paint}/>"#,
                x0 = frame.x0,
                x1 = frame.x1,
                top = frame.y0 + ry,
                bottom = frame.y1 - ry,
            );
            let _ = write!(
                svg,
                r#"<path d="M{x0},{top} A{rx},{ry} 0 0 1 {x1},{top}"{paint}/>"#,
                x0 = frame.x0,
                x1 = frame.x1,
                top = frame.y0 + ry,
            );
        }
    }
}

fn write_text(svg: &mut String, at: Point, text: &str, style: &ElementStyle, anchor: &str) {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return;
    }
    let line_height = style.font_size * 1.25;
    let first_y = at.y - line_height * (lines.len() as f64 - 1.0) / 2.0;
    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" font-family="{FONT_FAMILY}" font-size="{}" fill="{}" text-anchor="{anchor}" dominant-baseline="central">"#,
        at.x,
        first_y,
        style.font_size,
        style.stroke.to_hex(),
    );
    for (i, line) in lines.iter().enumerate() {
        let dy = if i == 0 { 0.0 } else { line_height };
        let _ = write!(
            svg,
            r#"<tspan x="{}" dy="{}">{}</tspan>"#,
            at.x,
            dy,
            escape_xml(line)
        );
    }
    svg.push_str("</text>");
}

fn write_chart(svg: &mut String, frame: Rect, chart: ChartKind, series: &[crate::element::DataSeries], style: &ElementStyle) {
    let inner = frame.inset(-8.0);
    let max = series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    let Some(first) = series.first() else {
        return;
    };
    if first.values.is_empty() || max <= 0.0 {
        return;
    }
    let stroke = style.stroke.to_hex();
    let n = first.values.len() as f64;
    match chart {
        ChartKind::Bar => {
            let slot = inner.width() / n;
            for (i, value) in first.values.iter().enumerate() {
                let h = inner.height() * (value.max(0.0) / max);
                let _ = write!(
                    svg,
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{stroke}" fill-opacity="0.6"/>"#,
                    inner.x0 + slot * i as f64 + slot * 0.1,
                    inner.y1 - h,
                    slot * 0.8,
                    h
                );
            }
        }
        ChartKind::Line | ChartKind::Area => {
            let step = if n > 1.0 { inner.width() / (n - 1.0) } else { 0.0 };
            let points: Vec<Point> = first
                .values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    Point::new(
                        inner.x0 + step * i as f64,
                        inner.y1 - inner.height() * (v.max(0.0) / max),
                    )
                })
                .collect();
            if chart == ChartKind::Area {
                let mut closed = points.clone();
                if let (Some(last), Some(first)) = (points.last(), points.first()) {
                    closed.push(Point::new(last.x, inner.y1));
                    closed.push(Point::new(first.x, inner.y1));
                }
                let _ = write!(
                    svg,
                    r#"<polygon points="{}" fill="{stroke}" fill-opacity="0.3"/>"#,
                    polygon(&closed)
                );
            }
            let _ = write!(
                svg,
                r#"<polyline points="{}" fill="none" stroke="{stroke}" stroke-width="{}"/>"#,
                polygon(&points),
                style.stroke_width
            );
        }
        ChartKind::Pie => {
            let total: f64 = first.values.iter().filter(|v| **v > 0.0).sum();
            let center = inner.center();
            let radius = inner.width().min(inner.height()) / 2.0;
            let mut angle = -std::f64::consts::FRAC_PI_2;
            for value in first.values.iter().filter(|v| **v > 0.0) {
                let sweep = value / total * std::f64::consts::TAU;
                let start = center + Vec2::from_angle(angle) * radius;
                let end = center + Vec2::from_angle(angle + sweep) * radius;
                let large = if sweep > std::f64::consts::PI { 1 } else { 0 };
                let _ = write!(
                    svg,
                    r#"<path d="M{},{} L{},{} A{r},{r} 0 {large} 1 {},{} Z" fill="{stroke}" fill-opacity="0.5" stroke="{stroke}"/>"#,
                    center.x,
                    center.y,
                    start.x,
                    start.y,
                    end.x,
                    end.y,
                    r = radius,
                );
                angle += sweep;
            }
        }
    }
}

fn write_table(svg: &mut String, frame: Rect, rows: &[Vec<String>], header: bool, style: &ElementStyle) {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if rows.is_empty() || columns == 0 {
        return;
    }
    let cell_w = frame.width() / columns as f64;
    let cell_h = frame.height() / rows.len() as f64;
    let stroke = style.stroke.to_hex();
    for r in 1..rows.len() {
        let y = frame.y0 + cell_h * r as f64;
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{y}" x2="{}" y2="{y}" stroke="{stroke}" stroke-width="1"/>"#,
            frame.x0, frame.x1
        );
    }
    for c in 1..columns {
        let x = frame.x0 + cell_w * c as f64;
        let _ = write!(
            svg,
            r#"<line x1="{x}" y1="{}" x2="{x}" y2="{}" stroke="{stroke}" stroke-width="1"/>"#,
            frame.y0, frame.y1
        );
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let at = Point::new(
                frame.x0 + cell_w * (c as f64 + 0.5),
                frame.y0 + cell_h * (r as f64 + 0.5),
            );
            let mut cell_style = style.clone();
            if header && r == 0 {
                cell_style.font_size *= 1.05;
            }
            write_text(svg, at, cell, &cell_style, "middle");
        }
    }
}

fn write_node(svg: &mut String, element: &Element, content: &NodeContent) {
    let frame = element.frame();
    let center = frame.center();
    let _ = write!(svg, r#"<g opacity="{}""#, element.style.opacity.clamp(0.0, 1.0));
    if element.rotation != 0.0 {
        let _ = write!(
            svg,
            r#" transform="rotate({} {} {})""#,
            element.rotation, center.x, center.y
        );
    }
    svg.push('>');

    match content {
        NodeContent::Text { body } => {
            if element.style.fill.is_some() {
                write_outline(svg, ShapeFamily::Rectangle, frame, &paint_attributes(&element.style, true));
            }
            write_text(svg, center, body, &element.style, "middle");
        }
        NodeContent::Image { source, alt } => {
            let _ = write!(
                svg,
                r#"<image x="{}" y="{}" width="{}" height="{}" href="{}" preserveAspectRatio="xMidYMid meet"><title>{}</title></image>"#,
                frame.x0,
                frame.y0,
                frame.width(),
                frame.height(),
                escape_xml(source),
                escape_xml(alt)
            );
        }
        NodeContent::Chart { chart, series } => {
            write_outline(svg, ShapeFamily::Rectangle, frame, &paint_attributes(&element.style, true));
            write_chart(svg, frame, *chart, series, &element.style);
        }
        NodeContent::Table { rows, header } => {
            write_outline(svg, ShapeFamily::Rectangle, frame, &paint_attributes(&element.style, true));
            write_table(svg, frame, rows, *header, &element.style);
        }
        _ => {
            write_outline(svg, content.outline(), frame, &paint_attributes(&element.style, true));
        }
    }
    if !element.label.is_empty() && !matches!(content, NodeContent::Text { .. }) {
        write_text(svg, center, &element.label, &element.style, "middle");
    }
    svg.push_str("</g>");
}

/// Point where the segment from the frame center towards `toward` leaves the frame.
fn clip_to_frame(frame: Rect, toward: Point) -> Point {
    let center = frame.center();
    let d = toward - center;
    if d.hypot() < f64::EPSILON || frame.contains(toward) {
        return center;
    }
    let tx = if d.x.abs() > f64::EPSILON { (frame.width() / 2.0) / d.x.abs() } else { f64::INFINITY };
    let ty = if d.y.abs() > f64::EPSILON { (frame.height() / 2.0) / d.y.abs() } else { f64::INFINITY };
    center + d * tx.min(ty).min(1.0)
}

fn write_edge(svg: &mut String, scene: &Scene, element: &Element, edge: &EdgeData) {
    let (Some(source), Some(target)) = (scene.element(edge.source), scene.element(edge.target)) else {
        return;
    };
    let Some((mut start, mut end)) = scene.edge_endpoints(element.id) else {
        return;
    };
    if edge.source_handle.is_none() && source.rotation == 0.0 {
        start = clip_to_frame(source.frame(), end);
    }
    if edge.target_handle.is_none() && target.rotation == 0.0 {
        end = clip_to_frame(target.frame(), start);
    }

    let mid_x = (start.x + end.x) / 2.0;
    let d = match edge.route {
        EdgeRoute::Straight => format!("M{},{} L{},{}", start.x, start.y, end.x, end.y),
        EdgeRoute::Step => format!(
            "M{},{} L{mid_x},{} L{mid_x},{} L{},{}",
            start.x, start.y, start.y, end.y, end.x, end.y
        ),
        EdgeRoute::SmoothStep => {
            let r = ((end.y - start.y).abs() / 2.0).min((end.x - start.x).abs() / 2.0).min(8.0);
            let sx = (end.x - start.x).signum();
            let sy = (end.y - start.y).signum();
            format!(
                "M{},{} L{},{} Q{mid_x},{} {mid_x},{} L{mid_x},{} Q{mid_x},{} {},{} L{},{}",
                start.x,
                start.y,
                mid_x - sx * r,
                start.y,
                start.y,
                start.y + sy * r,
                end.y - sy * r,
                end.y,
                mid_x + sx * r,
                end.y,
                end.x,
                end.y
            )
        }
        EdgeRoute::Bezier => format!(
            "M{},{} C{mid_x},{} {mid_x},{} {},{}",
            start.x, start.y, start.y, end.y, end.x, end.y
        ),
    };
    let _ = write!(
        svg,
        r#"<path d="{d}" opacity="{}"{} marker-end="url(#{ARROW_MARKER})"/>"#,
        element.style.opacity.clamp(0.0, 1.0),
        paint_attributes(&element.style, false)
    );
    if !element.label.is_empty() {
        let at = Point::new(mid_x, (start.y + end.y) / 2.0);
        write_text(svg, at, &element.label, &element.style, "middle");
    }
}
