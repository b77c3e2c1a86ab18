//! Exported tendon records

use crate::geometry::{BoundingBox, LineSegment};
use crate::matcher::CalloutMatch;
use crate::measurement::{canonical_label, measure, Measurement, MeasurementConfig};
use crate::scale::ScaleReference;
use serde::{Deserialize, Serialize};

/// One callout with its line and measurement; the unit of export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TendonMatch {
    /// Zero-based page index
    pub page_index: u32,
    /// Canonical callout label, always populated
    pub label: String,
    /// Callout text as recognized
    pub raw_text: String,
    pub ocr_confidence: f32,
    pub callout_bbox: BoundingBox,
    pub segment: Option<LineSegment>,
    pub distance: Option<f32>,
    /// Matcher confidence; zero when no segment was bound
    pub confidence: f32,
    pub measurement: Measurement,
}

impl TendonMatch {
    /// Measure a matched callout against its own page's scale
    pub fn from_callout(matched: CalloutMatch, scale: Option<&ScaleReference>, config: &MeasurementConfig) -> Self {
        let CalloutMatch {
            callout,
            segment,
            distance,
            confidence,
        } = matched;
        let measurement = measure(segment.map(|s| s.length()), scale, config);

        Self {
            page_index: callout.page_index,
            label: canonical_label(&callout.text),
            callout_bbox: callout.bbox(),
            raw_text: callout.text,
            ocr_confidence: callout.confidence,
            segment,
            distance,
            confidence,
            measurement,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.segment.is_some()
    }

    /// Pixel length of the bound segment
    pub fn line_length(&self) -> Option<f32> {
        self.segment.map(|s| s.length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{LengthUnit, MeasurementStatus};
    use crate::ocr::TextDetection;

    fn matched(segment: Option<LineSegment>) -> CalloutMatch {
        CalloutMatch {
            callout: TextDetection::new(2, BoundingBox::new(0.0, 0.0, 100.0, 20.0), " tendon banded ( 1 )", 0.8),
            segment,
            distance: segment.map(|_| 10.0),
            confidence: if segment.is_some() { 0.9 } else { 0.0 },
        }
    }

    #[test]
    fn test_matched_record() {
        let line = LineSegment::from_coords(0.0, 30.0, 200.0, 30.0);
        let scale = ScaleReference::from_ratio(4.0, LengthUnit::Feet);
        let record = TendonMatch::from_callout(matched(Some(line)), Some(&scale), &MeasurementConfig::default());

        assert_eq!(record.page_index, 2);
        assert_eq!(record.label, "TENDON BANDED (1)");
        assert_eq!(record.measurement.text, "~50.00 ft");
        assert_eq!(record.line_length(), Some(200.0));
        assert!(record.is_matched());
    }

    #[test]
    fn test_unmatched_record_keeps_label() {
        let scale = ScaleReference::from_ratio(4.0, LengthUnit::Feet);
        let record = TendonMatch::from_callout(matched(None), Some(&scale), &MeasurementConfig::default());

        assert_eq!(record.label, "TENDON BANDED (1)");
        assert_eq!(record.measurement.status, MeasurementStatus::NoLine);
        assert_eq!(record.measurement.text, "unresolved");
    }
}
