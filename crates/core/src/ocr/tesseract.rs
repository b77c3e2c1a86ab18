//! Tesseract text detection (feature `tesseract`)
//!
//! Each tile is encoded to PNG and handed to a fresh Tesseract handle, then
//! read back one text line at a time. A new handle per tile keeps the
//! detector free of cross-tile state.

use super::{DetectorError, RawDetection, TextDetector, TileOutcome};
use crate::geometry::BoundingBox;
use crate::tile::TileView;
use leptess::{LepTess, Variable};

/// Tesseract settings
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Language code (e.g. "eng")
    pub language: String,
    /// Page segmentation mode; 11 ("sparse text") suits drawings
    pub page_segmentation_mode: u32,
    /// Lines below this confidence (0.0-1.0) are dropped
    pub min_confidence: f32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_segmentation_mode: 11,
            min_confidence: 0.3,
        }
    }
}

/// Line-level Tesseract detector
#[derive(Debug, Clone)]
pub struct TesseractDetector {
    config: TesseractConfig,
}

impl TesseractDetector {
    /// Create a detector, failing early if the language data cannot be loaded
    pub fn new(config: TesseractConfig) -> Result<Self, DetectorError> {
        LepTess::new(None, &config.language)
            .map_err(|e| DetectorError::Model(format!("failed to initialize Tesseract: {e}")))?;
        Ok(Self { config })
    }

    fn detect_tile(&self, view: &TileView) -> TileOutcome {
        let tile_failed = |reason: String| DetectorError::TileFailed {
            tile: view.tile.id,
            reason,
        };

        let mut lt = LepTess::new(None, &self.config.language)
            .map_err(|e| DetectorError::Model(format!("failed to initialize Tesseract: {e}")))?;
        lt.set_variable(
            Variable::TesseditPagesegMode,
            &self.config.page_segmentation_mode.to_string(),
        )
        .map_err(|e| DetectorError::Model(format!("failed to set page segmentation mode: {e}")))?;

        let mut png = std::io::Cursor::new(Vec::new());
        view.image
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| tile_failed(format!("PNG encoding failed: {e}")))?;
        lt.set_image_from_mem(png.get_ref())
            .map_err(|e| tile_failed(format!("Tesseract rejected image: {e}")))?;

        let Some(boxes) = lt.get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_TEXTLINE, true) else {
            return Ok(Vec::new());
        };

        let mut detections = Vec::new();
        for component in &boxes {
            let geom = component.get_geometry();
            lt.set_rectangle(geom.x, geom.y, geom.w, geom.h);

            let text = lt.get_utf8_text().unwrap_or_default().trim().to_string();
            if text.is_empty() {
                continue;
            }
            let confidence = lt.mean_text_conf() as f32 / 100.0;
            if confidence < self.config.min_confidence {
                continue;
            }

            let bbox = BoundingBox::from_origin_size(geom.x as f32, geom.y as f32, geom.w as f32, geom.h as f32);
            detections.push(RawDetection::from_bbox(bbox, text, confidence));
        }

        tracing::debug!(tile = %view.tile.id, lines = detections.len(), "tesseract tile done");
        Ok(detections)
    }
}

impl TextDetector for TesseractDetector {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn detect_batch(&self, batch: &[TileView]) -> Result<Vec<TileOutcome>, DetectorError> {
        Ok(batch.iter().map(|view| self.detect_tile(view)).collect())
    }
}
