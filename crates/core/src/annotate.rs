//! Annotated page rendering
//!
//! Draws each matched segment, its endpoints, the canonical label and the
//! measurement onto a copy of the page raster. Unmatched callouts can be
//! boxed in a separate colour so reviewers see what the pipeline missed.
//! The input raster is never modified.

use crate::geometry::{BoundingBox, LineSegment};
use crate::record::TendonMatch;
use ab_glyph::{FontVec, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LINE_COLOR: Rgba<u8> = Rgba([220, 20, 60, 255]);
const ENDPOINT_COLOR: Rgba<u8> = Rgba([0, 160, 0, 255]);
const LABEL_COLOR: Rgba<u8> = Rgba([0, 0, 200, 255]);
const UNMATCHED_COLOR: Rgba<u8> = Rgba([255, 140, 0, 255]);

/// Fonts tried when no font path is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Drawing options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    /// Stroke width for matched segments, in pixels
    pub line_thickness: u32,
    /// TrueType/OpenType font for labels; system fonts are tried when unset
    pub font_path: Option<PathBuf>,
    /// Label height in pixels
    pub font_scale: f32,
    /// Outline callouts that found no line
    pub mark_unmatched: bool,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            line_thickness: 3,
            font_path: None,
            font_scale: 24.0,
            mark_unmatched: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid font file {path}")]
    FontInvalid { path: PathBuf },
}

fn load_font(path: &Path) -> Result<FontVec, AnnotateError> {
    let data = std::fs::read(path).map_err(|source| AnnotateError::FontRead {
        path: path.to_path_buf(),
        source,
    })?;
    FontVec::try_from_vec(data).map_err(|_| AnnotateError::FontInvalid {
        path: path.to_path_buf(),
    })
}

fn find_system_font() -> Option<FontVec> {
    SYSTEM_FONTS
        .iter()
        .map(Path::new)
        .filter(|p| p.exists())
        .find_map(|p| load_font(p).ok())
}

/// Renders annotation overlays
pub struct Annotator {
    config: AnnotateConfig,
    font: Option<FontVec>,
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("config", &self.config)
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl Annotator {
    /// Create an annotator
    ///
    /// A configured font that cannot be loaded is an error. Without a
    /// configured font the first readable system font is used; if none is
    /// found, labels are skipped and only geometry is drawn.
    pub fn new(config: AnnotateConfig) -> Result<Self, AnnotateError> {
        let font = match &config.font_path {
            Some(path) => Some(load_font(path)?),
            None => {
                let font = find_system_font();
                if font.is_none() {
                    tracing::warn!("no usable system font found, annotations will omit labels");
                }
                font
            }
        };
        Ok(Self { config, font })
    }

    /// Annotator that never draws text
    pub fn without_text(config: AnnotateConfig) -> Self {
        Self { config, font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw `matches` over a copy of `source`
    pub fn annotate(&self, source: &RgbaImage, matches: &[TendonMatch]) -> RgbaImage {
        let mut canvas = source.clone();

        for record in matches {
            match record.segment {
                Some(segment) => {
                    self.draw_segment(&mut canvas, &segment);
                    let mid = segment.midpoint();
                    self.draw_label(&mut canvas, mid.x, mid.y, record);
                }
                None if self.config.mark_unmatched => {
                    draw_box(&mut canvas, &record.callout_bbox, UNMATCHED_COLOR, 2);
                }
                None => {}
            }
        }

        canvas
    }

    fn draw_segment(&self, canvas: &mut RgbaImage, segment: &LineSegment) {
        let thickness = self.config.line_thickness.max(1) as i32;
        let (dx, dy) = segment.direction();
        let normal = (-dy, dx);
        let half = thickness / 2;

        for k in -half..(thickness - half) {
            let (ox, oy) = (normal.0 * k as f32, normal.1 * k as f32);
            draw_line_segment_mut(
                canvas,
                (segment.start.x + ox, segment.start.y + oy),
                (segment.end.x + ox, segment.end.y + oy),
                LINE_COLOR,
            );
        }

        let radius = thickness + 2;
        for p in [segment.start, segment.end] {
            draw_filled_circle_mut(canvas, (p.x.round() as i32, p.y.round() as i32), radius, ENDPOINT_COLOR);
        }
    }

    fn draw_label(&self, canvas: &mut RgbaImage, x: f32, y: f32, record: &TendonMatch) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(self.config.font_scale);
        let line_height = (self.config.font_scale * 1.2).ceil() as i32;

        let max_x = canvas.width() as i32 - 1;
        let max_y = canvas.height() as i32 - 1;
        let text_x = (x as i32 + 6).clamp(0, max_x.max(0));
        let text_y = (y as i32 - 2 * line_height - 4).clamp(0, max_y.max(0));

        draw_text_mut(canvas, LABEL_COLOR, text_x, text_y, scale, font, &record.label);
        draw_text_mut(
            canvas,
            LABEL_COLOR,
            text_x,
            text_y + line_height,
            scale,
            font,
            &record.measurement.text,
        );
    }
}

fn draw_box(canvas: &mut RgbaImage, bbox: &BoundingBox, color: Rgba<u8>, thickness: u32) {
    for t in 0..thickness {
        let x = bbox.x_min.floor() as i32 - t as i32;
        let y = bbox.y_min.floor() as i32 - t as i32;
        let w = (bbox.width().ceil() as u32 + 2 * t).max(1);
        let h = (bbox.height().ceil() as u32 + 2 * t).max(1);
        draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w, h), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::CalloutMatch;
    use crate::measurement::{LengthUnit, MeasurementConfig};
    use crate::ocr::TextDetection;
    use crate::scale::ScaleReference;

    fn white(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
    }

    fn record(segment: Option<LineSegment>) -> TendonMatch {
        let scale = ScaleReference::from_ratio(4.0, LengthUnit::Feet);
        TendonMatch::from_callout(
            CalloutMatch {
                callout: TextDetection::new(0, BoundingBox::new(20.0, 20.0, 80.0, 35.0), "TENDON A", 0.9),
                segment,
                distance: segment.map(|_| 5.0),
                confidence: 0.9,
            },
            Some(&scale),
            &MeasurementConfig::default(),
        )
    }

    #[test]
    fn test_source_is_not_mutated() {
        let source = white(120, 80);
        let annotator = Annotator::without_text(AnnotateConfig::default());
        let out = annotator.annotate(&source, &[record(Some(LineSegment::from_coords(10.0, 50.0, 110.0, 50.0)))]);

        assert!(source.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
        assert_ne!(out, source);
        assert_eq!(out.get_pixel(60, 50), &LINE_COLOR);
    }

    #[test]
    fn test_unmatched_callout_is_boxed() {
        let source = white(120, 80);
        let annotator = Annotator::without_text(AnnotateConfig::default());
        let out = annotator.annotate(&source, &[record(None)]);
        assert_eq!(out.get_pixel(20, 20), &UNMATCHED_COLOR);

        let quiet = Annotator::without_text(AnnotateConfig {
            mark_unmatched: false,
            ..Default::default()
        });
        assert_eq!(quiet.annotate(&source, &[record(None)]), source);
    }

    #[test]
    fn test_no_matches_returns_copy() {
        let source = white(30, 30);
        let annotator = Annotator::without_text(AnnotateConfig::default());
        assert_eq!(annotator.annotate(&source, &[]), source);
    }

    #[test]
    fn test_missing_configured_font_is_error() {
        let config = AnnotateConfig {
            font_path: Some(PathBuf::from("/nonexistent/font.ttf")),
            ..Default::default()
        };
        assert!(matches!(Annotator::new(config), Err(AnnotateError::FontRead { .. })));
    }

    #[test]
    fn test_invalid_font_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.ttf");
        std::fs::write(&path, b"not a font").unwrap();

        let config = AnnotateConfig {
            font_path: Some(path),
            ..Default::default()
        };
        assert!(matches!(Annotator::new(config), Err(AnnotateError::FontInvalid { .. })));
    }
}
