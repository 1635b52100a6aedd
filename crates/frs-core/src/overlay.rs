//! Overlay annotations drawn on top of the live video.

use crate::types::{BoundingBox, Detection, MatchResult};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::Serialize;
use std::io::Cursor;

/// Stroke and text style for one class of annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
    pub color: [u8; 3],
    pub line_width: u32,
    pub font_px: u32,
}

/// Style for faces that matched a registered name (#10b981).
pub const MATCHED_STYLE: OverlayStyle = OverlayStyle {
    color: [0x10, 0xb9, 0x81],
    line_width: 2,
    font_px: 16,
};

/// Style for faces nobody was matched to (#ef4444).
pub const UNKNOWN_STYLE: OverlayStyle = OverlayStyle {
    color: [0xef, 0x44, 0x44],
    line_width: 2,
    font_px: 16,
};

/// Label text drawn for an unmatched face.
pub const UNKNOWN_TEXT: &str = "Unknown";

/// Vertical gap between a box's top edge and its label baseline.
const LABEL_OFFSET_PX: f32 = 10.0;

/// One box-plus-label to draw for one detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub bounding_box: BoundingBox,
    pub label: String,
    pub matched: bool,
    pub distance: f32,
}

impl Annotation {
    pub fn from_match(detection: &Detection, result: &MatchResult) -> Self {
        let (label, matched) = match result.label.name() {
            Some(name) => (name.to_string(), true),
            None => (UNKNOWN_TEXT.to_string(), false),
        };
        Self {
            bounding_box: detection.bounding_box,
            label,
            matched,
            distance: result.distance,
        }
    }

    pub fn style(&self) -> &'static OverlayStyle {
        if self.matched {
            &MATCHED_STYLE
        } else {
            &UNKNOWN_STYLE
        }
    }
}

/// A drawable surface laid over the video.
pub trait OverlaySurface: Send {
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn stroke_rect(&mut self, bbox: &BoundingBox, style: &OverlayStyle);
    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &OverlayStyle);

    /// PNG of what is currently drawn, for surfaces that keep pixels.
    fn snapshot_png(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Resize the surface to the video's native size, clear it, and draw every
/// annotation in order.
pub fn render(surface: &mut dyn OverlaySurface, width: u32, height: u32, annotations: &[Annotation]) {
    surface.resize(width, height);
    surface.clear();
    for a in annotations {
        let style = a.style();
        surface.stroke_rect(&a.bounding_box, style);
        surface.fill_text(
            &a.label,
            a.bounding_box.x,
            a.bounding_box.y - LABEL_OFFSET_PX,
            style,
        );
    }
}

/// A text label placed on a [`RasterOverlay`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLabel {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub color: [u8; 3],
    pub font_px: u32,
}

/// In-memory overlay: box outlines are rasterized into an RGBA canvas with a
/// transparent background; labels are kept as positioned text. The canvas is
/// exported through [`OverlaySurface::snapshot_png`]; label text only exists
/// in the annotations.
pub struct RasterOverlay {
    canvas: RgbaImage,
    labels: Vec<TextLabel>,
}

impl Default for RasterOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterOverlay {
    pub fn new() -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
            labels: Vec::new(),
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn labels(&self) -> &[TextLabel] {
        &self.labels
    }

    fn fill_span(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
        let (w, h) = (self.canvas.width() as i64, self.canvas.height() as i64);
        let xs = x0.max(0)..x1.min(w);
        let ys = y0.max(0)..y1.min(h);
        for y in ys {
            for x in xs.clone() {
                self.canvas.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

impl OverlaySurface for RasterOverlay {
    fn resize(&mut self, width: u32, height: u32) {
        if self.canvas.dimensions() != (width, height) {
            self.canvas = RgbaImage::new(width, height);
        }
    }

    fn clear(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
        self.labels.clear();
    }

    fn stroke_rect(&mut self, bbox: &BoundingBox, style: &OverlayStyle) {
        let [r, g, b] = style.color;
        let color = Rgba([r, g, b, 255]);
        let lw = i64::from(style.line_width.max(1));
        // Engine coordinates are untrusted; keep every edge near the canvas.
        let limit = i64::from(self.canvas.width().max(self.canvas.height())) + lw;
        let px = |v: f32| v.is_finite().then(|| (v.round() as i64).clamp(-limit, 2 * limit));
        let (Some(x0), Some(y0), Some(x1), Some(y1)) = (
            px(bbox.x),
            px(bbox.y),
            px(bbox.x + bbox.width),
            px(bbox.y + bbox.height),
        ) else {
            tracing::debug!(?bbox, "skipping box with non-finite coordinates");
            return;
        };

        self.fill_span(x0, y0, x1, y0 + lw, color); // top
        self.fill_span(x0, y1 - lw, x1, y1, color); // bottom
        self.fill_span(x0, y0, x0 + lw, y1, color); // left
        self.fill_span(x1 - lw, y0, x1, y1, color); // right
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: &OverlayStyle) {
        self.labels.push(TextLabel {
            text: text.to_string(),
            x,
            y,
            color: style.color,
            font_px: style.font_px,
        });
    }

    fn snapshot_png(&self) -> Option<Vec<u8>> {
        if self.canvas.width() == 0 || self.canvas.height() == 0 {
            return None;
        }
        let mut out = Cursor::new(Vec::new());
        match self.canvas.write_to(&mut out, ImageFormat::Png) {
            Ok(()) => Some(out.into_inner()),
            Err(e) => {
                tracing::warn!(error = %e, "overlay PNG encoding failed");
                None
            }
        }
    }
}
