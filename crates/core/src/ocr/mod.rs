//! Text detection over page tiles
//!
//! The detector model is owned by the caller and borrowed for the duration of
//! a page. [`detect_tiles`] feeds it tiles in fixed-size batches, checks for
//! cancellation between batches, and isolates per-tile failures so one bad
//! tile cannot sink the page.

mod replay;
#[cfg(feature = "tesseract")]
mod tesseract;

pub use replay::{ReplayDetector, ReplayEntry, ReplayError};
#[cfg(feature = "tesseract")]
pub use tesseract::{TesseractConfig, TesseractDetector};

use crate::geometry::{BoundingBox, Polygon};
use crate::page::Page;
use crate::tile::{Tile, TileId, TileView};
use serde::{Deserialize, Serialize};
use tendon_scheduler::{CancellationToken, Cancelled};

/// A text span as reported by a detector, in tile-local pixels
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub polygon: Polygon,
    pub text: String,
    /// Recognition confidence in `0.0..=1.0`
    pub confidence: f32,
}

impl RawDetection {
    pub fn from_bbox(bbox: BoundingBox, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            polygon: Polygon::from_bbox(&bbox),
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A recognized text span in page space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetection {
    pub page_index: u32,
    pub polygon: Polygon,
    pub text: String,
    pub confidence: f32,
    /// Tile the span was read from, for traceability
    #[serde(skip)]
    pub source_tile: Option<TileId>,
}

impl TextDetection {
    /// Page-space detection with no tile provenance (e.g. from tests or replay)
    pub fn new(page_index: u32, bbox: BoundingBox, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            page_index,
            polygon: Polygon::from_bbox(&bbox),
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source_tile: None,
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        self.polygon.bounding_box()
    }
}

/// Detector failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectorError {
    /// One tile could not be processed; its contribution is dropped
    #[error("detection failed on tile {tile}: {reason}")]
    TileFailed { tile: TileId, reason: String },

    /// The batch did not fit in memory or on the accelerator
    #[error("detector resources exhausted: {0}")]
    ResourceExhausted(String),

    /// The model failed for the whole batch
    #[error("detector model error: {0}")]
    Model(String),
}

/// Per-tile outcome of one batch
pub type TileOutcome = Result<Vec<RawDetection>, DetectorError>;

/// A text detection/recognition model
///
/// Implementations must be stateless across calls: the result for a tile may
/// depend only on that tile's pixels, never on which batch it arrived in.
pub trait TextDetector: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Detect text in every tile of `batch`
    ///
    /// Returns one outcome per tile, in input order. An outer `Err` applies to
    /// the whole batch.
    fn detect_batch(&self, batch: &[TileView]) -> Result<Vec<TileOutcome>, DetectorError>;
}

/// Detections of one tile, still in tile-local coordinates
#[derive(Debug, Clone)]
pub struct TileDetections {
    pub tile: Tile,
    pub detections: Vec<RawDetection>,
}

/// Fatal outcomes of a detection run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectionRunError {
    #[error("detector resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Run `detector` over `tiles` in batches of `batch_size`
///
/// `on_batch(processed, total)` is called after every completed batch. Tiles
/// are cropped one batch at a time so only `batch_size` crops are alive at
/// once.
pub fn detect_tiles(
    detector: &dyn TextDetector,
    page: &Page,
    tiles: &[Tile],
    batch_size: usize,
    cancel: &CancellationToken,
    on_batch: &mut dyn FnMut(usize, usize),
) -> Result<Vec<TileDetections>, DetectionRunError> {
    let total = tiles.len();
    let mut results = Vec::with_capacity(total);
    if total == 0 {
        return Ok(results);
    }

    let batch_size = batch_size.max(1);
    let mut processed = 0;

    for (batch_index, chunk) in tiles.chunks(batch_size).enumerate() {
        cancel.checkpoint("ocr")?;

        let views: Vec<TileView> = chunk.iter().map(|tile| TileView::from_page(*tile, page)).collect();

        let outcomes = match detector.detect_batch(&views) {
            Ok(outcomes) => outcomes,
            Err(DetectorError::ResourceExhausted(reason)) => {
                return Err(DetectionRunError::ResourceExhausted(reason));
            }
            Err(e) => {
                tracing::warn!(
                    detector = detector.name(),
                    batch = batch_index,
                    error = %e,
                    "batch failed, treating its tiles as empty"
                );
                Vec::new()
            }
        };

        if !outcomes.is_empty() && outcomes.len() != chunk.len() {
            tracing::warn!(
                detector = detector.name(),
                expected = chunk.len(),
                got = outcomes.len(),
                "detector returned a mismatched outcome count"
            );
        }

        let mut outcomes = outcomes.into_iter();
        for tile in chunk {
            let detections = match outcomes.next() {
                Some(Ok(detections)) => detections,
                Some(Err(DetectorError::ResourceExhausted(reason))) => {
                    return Err(DetectionRunError::ResourceExhausted(reason));
                }
                Some(Err(e)) => {
                    tracing::warn!(tile = %tile.id, error = %e, "tile detection failed");
                    Vec::new()
                }
                None => Vec::new(),
            };
            results.push(TileDetections {
                tile: *tile,
                detections,
            });
        }

        processed += chunk.len();
        tracing::debug!(
            detector = detector.name(),
            batch = batch_index,
            processed,
            total,
            "OCR batch complete"
        );
        on_batch(processed, total);
    }

    Ok(results)
}
