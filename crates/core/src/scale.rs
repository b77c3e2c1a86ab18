//! Drawing scale resolution
//!
//! Looks for a scale indicator among a page's text detections and turns it
//! into a pixels-per-unit ratio for that page. Two kinds of indicator are
//! understood:
//!
//! - scale notations: `1:100`, `SCALE 1:50 M`, `1/4" = 1'-0"`, `1" = 20'`.
//!   These describe paper-to-world ratios, converted to pixels via the page DPI.
//! - graphic scale bars: a `0` tick label and a `20'` (or `20 FT`, `5 M`) tick
//!   label on the same baseline. The distance between the labels, divided by
//!   the labelled length, gives pixels per unit directly.
//!
//! When several indicators are found the one with the highest combined
//! confidence (pattern confidence times OCR confidence) wins; remaining ties
//! go to the indicator that comes first in reading order.

use crate::geometry::BoundingBox;
use crate::measurement::LengthUnit;
use crate::ocr::TextDetection;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const METERS_PER_INCH: f32 = 0.0254;

static NOT_TO_SCALE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:NTS|N\.T\.S\.?|NOT\s+TO\s+SCALE)\b").expect("valid not-to-scale regex")
});

static ARCHITECTURAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:^|[^\d./])(?:(\d+)\s+)?(\d+)\s*/\s*(\d+)\s*(?:"|''|in\b|inch(?:es)?\b)\s*=\s*1\s*(?:'|ft\b|foot\b|feet\b)"#,
    )
    .expect("valid architectural scale regex")
});

static ENGINEERING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?:^|[^\d./])(\d+(?:\.\d+)?)\s*(?:"|''|in\b|inch(?:es)?\b)\s*=\s*(\d+(?:\.\d+)?)\s*(?:'|ft\b|foot\b|feet\b)"#,
    )
    .expect("valid engineering scale regex")
});

static METRIC_RATIO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^\d.:/])1\s*:\s*(\d+(?:\.\d+)?)(?:\s*(mm|cm|m|meters?|metres?)\b)?")
        .expect("valid metric ratio regex")
});

static BAR_ZERO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^0\s*(?:'|ft|feet|m)?$").expect("valid scale bar origin regex"));

static BAR_TICK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+(?:\.\d+)?)\s*('|ft|feet|foot|m|meters?|metres?)$").expect("valid scale bar tick regex")
});

/// Where a scale came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleSource {
    Notation,
    GraphicBar,
    /// Supplied directly rather than read from the page
    Manual,
}

/// Pixel-to-world conversion for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleReference {
    /// Pixel length of the reference feature
    pub pixel_length: f32,
    /// Real-world length the feature represents, in `unit`
    pub real_length: f32,
    pub unit: LengthUnit,
    pub pixels_per_unit: f32,
    pub source: ScaleSource,
    pub source_text: String,
    pub confidence: f32,
}

impl ScaleReference {
    /// Reference spanning `pixel_length` pixels for `real_length` units
    pub fn new(pixel_length: f32, real_length: f32, unit: LengthUnit, source: ScaleSource) -> Self {
        Self {
            pixel_length,
            real_length,
            unit,
            pixels_per_unit: pixel_length / real_length,
            source,
            source_text: String::new(),
            confidence: 1.0,
        }
    }

    /// Manual scale with a known ratio
    pub fn from_ratio(pixels_per_unit: f32, unit: LengthUnit) -> Self {
        Self::new(pixels_per_unit, 1.0, unit, ScaleSource::Manual)
    }

    fn with_origin(mut self, source_text: &str, confidence: f32) -> Self {
        self.source_text = source_text.to_string();
        self.confidence = confidence;
        self
    }

    /// Pixels per `target` unit
    pub fn pixels_per(&self, target: LengthUnit) -> f64 {
        self.pixels_per_unit as f64 * target.in_meters() / self.unit.in_meters()
    }
}

/// A scale indicator found on the page, before selection
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleCandidate {
    pub reference: ScaleReference,
    /// Pattern confidence times OCR confidence
    pub score: f32,
    /// Page-space box of the text the candidate was read from
    pub anchor: BoundingBox,
}

fn parse_number(s: &str) -> Option<f32> {
    s.parse::<f32>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

/// Scale notations in one string, as `(reference, pattern_confidence)` pairs
pub fn parse_notation(text: &str, dpi: u32) -> Vec<(ScaleReference, f32)> {
    if NOT_TO_SCALE.is_match(text) {
        return Vec::new();
    }

    let dpi = dpi as f32;
    let mentions_scale = text.to_lowercase().contains("scale");
    let mut found = Vec::new();

    for caps in ARCHITECTURAL.captures_iter(text) {
        let whole = caps.get(1).and_then(|m| m.as_str().parse::<f32>().ok()).unwrap_or(0.0);
        let (Some(num), Some(den)) = (
            caps.get(2).and_then(|m| m.as_str().parse::<f32>().ok()),
            caps.get(3).and_then(|m| parse_number(m.as_str())),
        ) else {
            continue;
        };
        let paper_inches = whole + num / den;
        if paper_inches <= 0.0 {
            continue;
        }
        let reference = ScaleReference::new(paper_inches * dpi, 1.0, LengthUnit::Feet, ScaleSource::Notation);
        found.push((reference, 0.95));
    }

    for caps in ENGINEERING.captures_iter(text) {
        let (Some(paper_inches), Some(feet)) = (
            caps.get(1).and_then(|m| parse_number(m.as_str())),
            caps.get(2).and_then(|m| parse_number(m.as_str())),
        ) else {
            continue;
        };
        let reference = ScaleReference::new(paper_inches * dpi, feet, LengthUnit::Feet, ScaleSource::Notation);
        found.push((reference, 0.9));
    }

    for caps in METRIC_RATIO.captures_iter(text) {
        let Some(denominator) = caps.get(1).and_then(|m| parse_number(m.as_str())) else {
            continue;
        };
        if denominator > 10_000.0 {
            continue;
        }
        let confidence = if caps.get(2).is_some() {
            0.95
        } else if mentions_scale {
            0.9
        } else {
            0.7
        };
        // One paper metre covers `denominator` metres
        let reference = ScaleReference::new(dpi / METERS_PER_INCH, denominator, LengthUnit::Meters, ScaleSource::Notation);
        found.push((reference, confidence));
    }

    found
}

/// Scale bars formed by a `0` tick label and a labelled tick on the same baseline
fn graphic_bars(detections: &[TextDetection]) -> Vec<ScaleCandidate> {
    let zeros: Vec<&TextDetection> = detections
        .iter()
        .filter(|d| BAR_ZERO.is_match(d.text.trim()))
        .collect();
    if zeros.is_empty() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for tick in detections {
        let Some(caps) = BAR_TICK.captures(tick.text.trim()) else {
            continue;
        };
        let Some(length) = caps.get(1).and_then(|m| parse_number(m.as_str())) else {
            continue;
        };
        let unit = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
            Some(u) if u.starts_with('m') => LengthUnit::Meters,
            _ => LengthUnit::Feet,
        };

        let tick_box = tick.bbox();
        let tick_center = tick_box.center();
        let origin = zeros
            .iter()
            .filter(|zero| {
                let zero_box = zero.bbox();
                let tolerance = zero_box.height().max(tick_box.height()) * 0.5;
                (zero_box.center().y - tick_center.y).abs() <= tolerance
                    && zero_box.center().x < tick_center.x
            })
            .min_by(|a, b| {
                let da = tick_center.x - a.bbox().center().x;
                let db = tick_center.x - b.bbox().center().x;
                da.total_cmp(&db)
            });

        if let Some(zero) = origin {
            let zero_box = zero.bbox();
            let dx = tick_center.x - zero_box.center().x;
            let score = 0.85 * zero.confidence.min(tick.confidence);
            let source = format!("{} .. {}", zero.text.trim(), tick.text.trim());
            let reference = ScaleReference::new(dx, length, unit, ScaleSource::GraphicBar).with_origin(&source, score);
            candidates.push(ScaleCandidate {
                reference,
                score,
                anchor: BoundingBox::new(
                    zero_box.x_min.min(tick_box.x_min),
                    zero_box.y_min.min(tick_box.y_min),
                    zero_box.x_max.max(tick_box.x_max),
                    zero_box.y_max.max(tick_box.y_max),
                ),
            });
        }
    }
    candidates
}

/// Every scale indicator on the page
pub fn scale_candidates(detections: &[TextDetection], dpi: u32) -> Vec<ScaleCandidate> {
    let mut candidates: Vec<ScaleCandidate> = detections
        .iter()
        .flat_map(|detection| {
            parse_notation(&detection.text, dpi)
                .into_iter()
                .map(move |(reference, pattern_confidence)| {
                    let score = pattern_confidence * detection.confidence;
                    ScaleCandidate {
                        reference: reference.with_origin(detection.text.trim(), score),
                        score,
                        anchor: detection.bbox(),
                    }
                })
        })
        .collect();
    candidates.extend(graphic_bars(detections));

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.anchor.y_min.total_cmp(&b.anchor.y_min))
            .then(a.anchor.x_min.total_cmp(&b.anchor.x_min))
    });
    candidates
}

/// Pick the page's scale, or `None` when the page carries no readable indicator
pub fn resolve_scale(detections: &[TextDetection], dpi: u32) -> Option<ScaleReference> {
    let candidates = scale_candidates(detections, dpi);
    if candidates.len() > 1 {
        tracing::debug!(
            candidates = candidates.len(),
            chosen = %candidates[0].reference.source_text,
            "multiple scale indicators, picked highest confidence"
        );
    }
    candidates.into_iter().next().map(|c| c.reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(text: &str, conf: f32, bbox: (f32, f32, f32, f32)) -> TextDetection {
        TextDetection::new(0, BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3), text, conf)
    }

    fn ppf(text: &str, dpi: u32) -> f64 {
        let found = parse_notation(text, dpi);
        assert_eq!(found.len(), 1, "expected one notation in {text:?}, got {found:?}");
        found[0].0.pixels_per(LengthUnit::Feet)
    }

    #[test]
    fn test_architectural_notation() {
        assert!((ppf("SCALE: 1/4\" = 1'-0\"", 200) - 50.0).abs() < 1e-3);
        assert!((ppf("1/8\"=1'-0\"", 200) - 25.0).abs() < 1e-3);
        assert!((ppf("1 1/2\" = 1'-0\"", 100) - 150.0).abs() < 1e-3);
    }

    #[test]
    fn test_engineering_notation() {
        assert!((ppf("1\" = 20'", 200) - 10.0).abs() < 1e-3);
        assert!((ppf("SCALE 1 in = 40 ft", 400) - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_metric_ratio() {
        let found = parse_notation("SCALE 1:100", 254);
        assert_eq!(found.len(), 1);
        let (reference, confidence) = &found[0];
        assert_eq!(*confidence, 0.9);
        assert!((reference.pixels_per(LengthUnit::Meters) - 100.0).abs() < 1e-3);

        let (_, with_unit) = &parse_notation("1:50 m", 254)[0];
        assert_eq!(*with_unit, 0.95);
    }

    #[test]
    fn test_rejects_non_scale_text() {
        assert!(parse_notation("TENDON BANDED (1)", 200).is_empty());
        assert!(parse_notation("11:30 AM", 200).is_empty());
        assert!(parse_notation("SCALE: NTS", 200).is_empty());
        assert!(parse_notation("1:100 NOT TO SCALE", 200).is_empty());
    }

    #[test]
    fn test_no_detections_is_unresolved() {
        assert!(resolve_scale(&[], 200).is_none());
        assert!(resolve_scale(&[det("TENDON A", 0.9, (0.0, 0.0, 50.0, 10.0))], 200).is_none());
    }

    #[test]
    fn test_graphic_scale_bar() {
        let detections = vec![
            det("0", 0.9, (100.0, 500.0, 110.0, 520.0)),
            det("20'", 0.8, (496.0, 500.0, 524.0, 520.0)),
            det("0", 0.9, (100.0, 900.0, 110.0, 920.0)),
        ];

        let scale = resolve_scale(&detections, 200).unwrap();
        assert_eq!(scale.source, ScaleSource::GraphicBar);
        assert_eq!(scale.unit, LengthUnit::Feet);
        assert!((scale.pixels_per_unit - 405.0 / 20.0).abs() < 1e-4);
        assert!((scale.confidence - 0.85 * 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_highest_confidence_wins() {
        let detections = vec![
            det("SCALE 1:100", 0.6, (0.0, 0.0, 100.0, 20.0)),
            det("1/4\" = 1'-0\"", 0.9, (0.0, 800.0, 100.0, 820.0)),
        ];
        let scale = resolve_scale(&detections, 200).unwrap();
        assert_eq!(scale.unit, LengthUnit::Feet);
        assert!((scale.pixels_per_unit - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_reading_order_breaks_ties() {
        let detections = vec![
            det("1\" = 10'", 0.9, (500.0, 100.0, 600.0, 120.0)),
            det("1\" = 20'", 0.9, (0.0, 100.0, 100.0, 120.0)),
            det("1\" = 40'", 0.9, (0.0, 50.0, 100.0, 70.0)),
        ];
        let scale = resolve_scale(&detections, 200).unwrap();
        assert_eq!(scale.source_text, "1\" = 40'");

        let reversed: Vec<_> = detections.into_iter().rev().collect();
        assert_eq!(resolve_scale(&reversed, 200).unwrap().source_text, "1\" = 40'");
    }

    #[test]
    fn test_pixels_per_converts_units() {
        let scale = ScaleReference::from_ratio(12.0, LengthUnit::Feet);
        assert!((scale.pixels_per(LengthUnit::Inches) - 1.0).abs() < 1e-6);
    }
}
