//! Replay of precomputed OCR results
//!
//! Reads a JSON array of page-space detections and serves them back tile by
//! tile as if a model had produced them. A detection is reported by every
//! tile that fully contains its box, which exercises the same overlap
//! deduplication a real model would trigger.

use super::{DetectorError, RawDetection, TextDetector, TileOutcome};
use crate::geometry::BoundingBox;
use crate::tile::TileView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One recorded detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEntry {
    /// Zero-based page index
    pub page: u32,
    pub text: String,
    pub confidence: f32,
    /// `[x0, y0, x1, y1]` in page pixels
    pub bbox: [f32; 4],
}

impl ReplayEntry {
    fn bounding_box(&self) -> BoundingBox {
        let [x0, y0, x1, y1] = self.bbox;
        BoundingBox::new(x0, y0, x1, y1)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("failed to read replay file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid replay JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Detector that replays recorded detections
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    by_page: BTreeMap<u32, Vec<ReplayEntry>>,
}

impl ReplayDetector {
    pub fn new(entries: Vec<ReplayEntry>) -> Self {
        let mut by_page: BTreeMap<u32, Vec<ReplayEntry>> = BTreeMap::new();
        for entry in entries {
            by_page.entry(entry.page).or_default().push(entry);
        }
        Self { by_page }
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        let entries: Vec<ReplayEntry> = serde_json::from_str(json)?;
        Ok(Self::new(entries))
    }

    pub fn from_file(path: &Path) -> Result<Self, ReplayError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Number of recorded detections across all pages
    pub fn len(&self) -> usize {
        self.by_page.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn detect_tile(&self, view: &TileView) -> Vec<RawDetection> {
        let Some(entries) = self.by_page.get(&view.page_index) else {
            return Vec::new();
        };

        let tile = &view.tile;
        let bounds = BoundingBox::from_origin_size(
            tile.x as f32,
            tile.y as f32,
            tile.width as f32,
            tile.height as f32,
        );

        entries
            .iter()
            .filter(|entry| bounds.contains_box(&entry.bounding_box()))
            .map(|entry| {
                let local = entry.bounding_box().translate(-(tile.x as f32), -(tile.y as f32));
                RawDetection::from_bbox(local, entry.text.clone(), entry.confidence)
            })
            .collect()
    }
}

impl TextDetector for ReplayDetector {
    fn name(&self) -> &str {
        "replay"
    }

    fn detect_batch(&self, batch: &[TileView]) -> Result<Vec<TileOutcome>, DetectorError> {
        Ok(batch.iter().map(|view| Ok(self.detect_tile(view))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{DocumentId, Page};
    use crate::tile::tile_grid;
    use image::RgbaImage;

    const JSON: &str = r#"[
        {"page": 0, "text": "TENDON A", "confidence": 0.9, "bbox": [12, 12, 18, 16]},
        {"page": 0, "text": "edge", "confidence": 0.8, "bbox": [0, 0, 4, 4]},
        {"page": 1, "text": "other page", "confidence": 0.7, "bbox": [0, 0, 4, 4]}
    ]"#;

    fn views(page_index: u32) -> Vec<TileView> {
        let page = Page::new(DocumentId::new(), page_index, 200, RgbaImage::new(30, 30)).unwrap();
        tile_grid(30, 30, 20, 10)
            .unwrap()
            .into_iter()
            .map(|t| TileView::from_page(t, &page))
            .collect()
    }

    #[test]
    fn test_parse_and_count() {
        let detector = ReplayDetector::from_json(JSON).unwrap();
        assert_eq!(detector.len(), 3);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            ReplayDetector::from_json("{not json"),
            Err(ReplayError::Json(_))
        ));
    }

    #[test]
    fn test_overlap_detection_reported_by_every_containing_tile() {
        let detector = ReplayDetector::from_json(JSON).unwrap();
        let views = views(0);
        let outcomes = detector.detect_batch(&views).unwrap();

        let hits: Vec<_> = views
            .iter()
            .zip(&outcomes)
            .filter_map(|(view, outcome)| {
                let detections = outcome.as_ref().unwrap();
                detections
                    .iter()
                    .find(|d| d.text == "TENDON A")
                    .map(|d| (view.tile.x, view.tile.y, d.polygon.bounding_box()))
            })
            .collect();

        // Box (12,12)-(18,16) lies in the overlap of all four 20px tiles
        assert_eq!(hits.len(), 4);
        for (x, y, local) in hits {
            assert_eq!(local.translate(x as f32, y as f32), BoundingBox::new(12.0, 12.0, 18.0, 16.0));
        }
    }

    #[test]
    fn test_filters_by_page() {
        let detector = ReplayDetector::from_json(JSON).unwrap();
        let views = views(1);
        let outcomes = detector.detect_batch(&views).unwrap();
        let texts: Vec<String> = outcomes
            .into_iter()
            .flat_map(|o| o.unwrap().into_iter().map(|d| d.text))
            .collect();
        assert_eq!(texts, vec!["other page".to_string()]);
    }
}
