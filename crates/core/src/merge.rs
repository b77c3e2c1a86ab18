//! Tile-to-page coordinate merging and overlap deduplication
//!
//! Text that falls inside the overlap band of neighbouring tiles is read
//! more than once. After translating every detection into page space, two
//! detections count as duplicates only when their boxes overlap strongly AND
//! their strings agree up to OCR noise. Two distinct callouts printed on top
//! of each other therefore both survive.

use crate::ocr::{TextDetection, TileDetections};
use std::cmp::Ordering;

/// Deduplication thresholds
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Minimum box IoU for two detections to be considered the same span
    pub iou_threshold: f32,
    /// Minimum normalized Levenshtein similarity of the normalized strings
    pub text_similarity_threshold: f32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.6,
            text_similarity_threshold: 0.9,
        }
    }
}

/// Lowercase, trim, collapse internal whitespace
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn digits(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// Whether two strings are the same text up to OCR noise
///
/// Similar strings still differ when their digit sequences differ, so
/// "TENDON (1)" and "TENDON (2)" are never merged.
pub fn texts_match(a: &str, b: &str, similarity_threshold: f32) -> bool {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a == b {
        return true;
    }
    if digits(&a) != digits(&b) {
        return false;
    }
    strsim::normalized_levenshtein(&a, &b) as f32 >= similarity_threshold
}

fn is_duplicate(a: &TextDetection, b: &TextDetection, config: &DedupConfig) -> bool {
    a.bbox().iou(&b.bbox()) >= config.iou_threshold
        && texts_match(&a.text, &b.text, config.text_similarity_threshold)
}

/// Total order used for deduplication: confidence descending, then reading order
fn dedup_order(a: &TextDetection, b: &TextDetection) -> Ordering {
    let (ba, bb) = (a.bbox(), b.bbox());
    b.confidence
        .total_cmp(&a.confidence)
        .then(ba.y_min.total_cmp(&bb.y_min))
        .then(ba.x_min.total_cmp(&bb.x_min))
        .then_with(|| a.text.cmp(&b.text))
}

/// Translate tile-local detections into page space
pub fn to_page_space(page_index: u32, tiles: Vec<TileDetections>) -> Vec<TextDetection> {
    tiles
        .into_iter()
        .flat_map(|TileDetections { tile, detections }| {
            let (dx, dy) = (tile.x as f32, tile.y as f32);
            detections.into_iter().map(move |raw| TextDetection {
                page_index,
                polygon: raw.polygon.translate(dx, dy),
                text: raw.text,
                confidence: raw.confidence,
                source_tile: Some(tile.id),
            })
        })
        .collect()
}

/// Drop overlap duplicates, keeping the most confident reading of each span
///
/// The output order is not part of the contract. Running this on its own
/// output returns the same set.
pub fn deduplicate(mut detections: Vec<TextDetection>, config: &DedupConfig) -> Vec<TextDetection> {
    detections.sort_by(dedup_order);

    let before = detections.len();
    let mut kept: Vec<TextDetection> = Vec::with_capacity(before);
    for detection in detections {
        if kept.iter().any(|k| is_duplicate(k, &detection, config)) {
            continue;
        }
        kept.push(detection);
    }

    tracing::debug!(before, after = kept.len(), "deduplicated detections");
    kept
}

/// Translate and deduplicate in one step
pub fn merge_tiles(page_index: u32, tiles: Vec<TileDetections>, config: &DedupConfig) -> Vec<TextDetection> {
    deduplicate(to_page_space(page_index, tiles), config)
}
