//! Real-world lengths and canonical callout labels
//!
//! A matched segment's pixel length is divided by the page's pixels-per-unit
//! ratio and formatted with an approximation marker, e.g. `~50.00 ft`.
//! Whenever a length cannot be trusted the record says so: a configured
//! fallback scale is flagged `(default scale)`, and a missing scale or line
//! yields the literal `unresolved`.

use crate::scale::ScaleReference;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text written in place of a length that could not be computed
pub const UNRESOLVED: &str = "unresolved";

/// Suffix appended to lengths computed with the configured fallback scale
pub const FALLBACK_FLAG: &str = "(default scale)";

/// Length units supported for scales and output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthUnit {
    #[serde(rename = "ft")]
    Feet,
    #[serde(rename = "in")]
    Inches,
    #[serde(rename = "m")]
    Meters,
    #[serde(rename = "cm")]
    Centimeters,
    #[serde(rename = "mm")]
    Millimeters,
}

impl LengthUnit {
    /// Length of one unit in metres
    pub fn in_meters(&self) -> f64 {
        match self {
            LengthUnit::Feet => 0.3048,
            LengthUnit::Inches => 0.0254,
            LengthUnit::Meters => 1.0,
            LengthUnit::Centimeters => 0.01,
            LengthUnit::Millimeters => 0.001,
        }
    }

    /// Suffix used in formatted measurements
    pub fn suffix(&self) -> &'static str {
        match self {
            LengthUnit::Feet => "ft",
            LengthUnit::Inches => "in",
            LengthUnit::Meters => "m",
            LengthUnit::Centimeters => "cm",
            LengthUnit::Millimeters => "mm",
        }
    }

    /// Convert `value` expressed in `self` into `target`
    pub fn convert(&self, value: f64, target: LengthUnit) -> f64 {
        value * self.in_meters() / target.in_meters()
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown length unit `{0}`")]
pub struct UnknownUnit(pub String);

impl FromStr for LengthUnit {
    type Err = UnknownUnit;

    /// Accepts suffixes, full names and the foot/inch marks
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ft" | "foot" | "feet" | "'" => Ok(LengthUnit::Feet),
            "in" | "inch" | "inches" | "\"" => Ok(LengthUnit::Inches),
            "m" | "meter" | "meters" | "metre" | "metres" => Ok(LengthUnit::Meters),
            "cm" | "centimeter" | "centimeters" | "centimetre" | "centimetres" => {
                Ok(LengthUnit::Centimeters)
            }
            "mm" | "millimeter" | "millimeters" | "millimetre" | "millimetres" => {
                Ok(LengthUnit::Millimeters)
            }
            _ => Err(UnknownUnit(s.to_string())),
        }
    }
}

/// Output formatting for measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    pub unit: LengthUnit,
    /// Decimal places
    pub precision: usize,
    pub approximation_marker: String,
    /// Pixels per output unit used when a page has no readable scale
    pub fallback_pixels_per_unit: Option<f32>,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            unit: LengthUnit::Feet,
            precision: 2,
            approximation_marker: "~".to_string(),
            fallback_pixels_per_unit: None,
        }
    }
}

/// How a measurement was (or was not) obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementStatus {
    /// Scale read from the page itself
    Resolved,
    /// Configured fallback scale; value is flagged in the output
    FallbackScale,
    /// Line found but no scale available
    NoScale,
    /// No line matched the callout
    NoLine,
}

impl MeasurementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementStatus::Resolved => "resolved",
            MeasurementStatus::FallbackScale => "fallback_scale",
            MeasurementStatus::NoScale => "no_scale",
            MeasurementStatus::NoLine => "no_line",
        }
    }

    /// Whether a numeric length is available
    pub fn has_value(&self) -> bool {
        matches!(self, MeasurementStatus::Resolved | MeasurementStatus::FallbackScale)
    }
}

impl fmt::Display for MeasurementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A computed (or unresolved) length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: Option<f64>,
    pub unit: LengthUnit,
    pub status: MeasurementStatus,
    /// Display string, e.g. `~50.00 ft` or `unresolved`
    pub text: String,
}

impl Measurement {
    fn unresolved(status: MeasurementStatus, unit: LengthUnit) -> Self {
        Self {
            value: None,
            unit,
            status,
            text: UNRESOLVED.to_string(),
        }
    }
}

/// Format a length the way it appears in exports and annotations
pub fn format_length(value: f64, config: &MeasurementConfig) -> String {
    format!(
        "{}{:.prec$} {}",
        config.approximation_marker,
        value,
        config.unit.suffix(),
        prec = config.precision
    )
}

/// Convert a matched segment's pixel length into a real-world measurement
///
/// `scale` must come from the same page as the segment.
pub fn measure(pixel_length: Option<f32>, scale: Option<&ScaleReference>, config: &MeasurementConfig) -> Measurement {
    let unit = config.unit;
    let Some(pixels) = pixel_length else {
        return Measurement::unresolved(MeasurementStatus::NoLine, unit);
    };

    let (pixels_per_unit, status) = match (scale, config.fallback_pixels_per_unit) {
        (Some(scale), _) => (scale.pixels_per(unit), MeasurementStatus::Resolved),
        (None, Some(fallback)) => (fallback as f64, MeasurementStatus::FallbackScale),
        (None, None) => return Measurement::unresolved(MeasurementStatus::NoScale, unit),
    };
    if pixels_per_unit <= 0.0 || !pixels_per_unit.is_finite() {
        return Measurement::unresolved(MeasurementStatus::NoScale, unit);
    }

    let value = pixels as f64 / pixels_per_unit;
    let mut text = format_length(value, config);
    if status == MeasurementStatus::FallbackScale {
        text.push(' ');
        text.push_str(FALLBACK_FLAG);
    }

    Measurement {
        value: Some(value),
        unit,
        status,
        text,
    }
}

static LEADING_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\p{L}\p{N}(\[#]+").expect("valid leading-noise regex"));
static TRAILING_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N})\]]+$").expect("valid trailing-noise regex"));
static PAREN_PADDING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*([^()]*?)\s*\)").expect("valid parenthesis regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Canonical form of a callout string
///
/// Uppercases, collapses whitespace, strips stray punctuation OCR picks up at
/// either end and tightens parenthesised tags: `" tendon  banded ( 1 ) ."`
/// becomes `"TENDON BANDED (1)"`.
pub fn canonical_label(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let collapsed = WHITESPACE.replace_all(upper.trim(), " ");
    let tightened = PAREN_PADDING.replace_all(&collapsed, "($1)");
    let without_leading = LEADING_NOISE.replace(&tightened, "");
    let without_trailing = TRAILING_NOISE.replace(&without_leading, "");
    without_trailing.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ScaleReference;

    #[test]
    fn test_unit_conversion() {
        assert!((LengthUnit::Feet.convert(1.0, LengthUnit::Inches) - 12.0).abs() < 1e-9);
        assert!((LengthUnit::Meters.convert(1.0, LengthUnit::Millimeters) - 1000.0).abs() < 1e-9);
        assert!((LengthUnit::Centimeters.convert(30.48, LengthUnit::Feet) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("Feet".parse::<LengthUnit>(), Ok(LengthUnit::Feet));
        assert_eq!("'".parse::<LengthUnit>(), Ok(LengthUnit::Feet));
        assert_eq!(" mm ".parse::<LengthUnit>(), Ok(LengthUnit::Millimeters));
        assert!("furlong".parse::<LengthUnit>().is_err());
    }

    #[test]
    fn test_measure_round_trip() {
        let config = MeasurementConfig::default();
        for ppu in [0.5_f32, 4.0, 13.7, 250.0] {
            let scale = ScaleReference::from_ratio(ppu, LengthUnit::Feet);
            let m = measure(Some(ppu * 5.0), Some(&scale), &config);
            assert_eq!(m.status, MeasurementStatus::Resolved);
            assert!((m.value.unwrap() - 5.0).abs() < 1e-4);
            assert_eq!(m.text, "~5.00 ft");
        }
    }

    #[test]
    fn test_measure_tendon_scenario() {
        let scale = ScaleReference::from_ratio(4.0, LengthUnit::Feet);
        let m = measure(Some(200.0), Some(&scale), &MeasurementConfig::default());
        assert_eq!(m.text, "~50.00 ft");
    }

    #[test]
    fn test_measure_converts_scale_unit() {
        // 10 px per metre, output in centimetres
        let scale = ScaleReference::from_ratio(10.0, LengthUnit::Meters);
        let config = MeasurementConfig {
            unit: LengthUnit::Centimeters,
            precision: 1,
            ..Default::default()
        };
        let m = measure(Some(25.0), Some(&scale), &config);
        assert_eq!(m.text, "~250.0 cm");
    }

    #[test]
    fn test_measure_without_scale_is_unresolved() {
        let m = measure(Some(200.0), None, &MeasurementConfig::default());
        assert_eq!(m.status, MeasurementStatus::NoScale);
        assert_eq!(m.text, UNRESOLVED);
        assert!(m.value.is_none());
    }

    #[test]
    fn test_measure_without_line_is_unresolved() {
        let scale = ScaleReference::from_ratio(4.0, LengthUnit::Feet);
        let m = measure(None, Some(&scale), &MeasurementConfig::default());
        assert_eq!(m.status, MeasurementStatus::NoLine);
        assert_eq!(m.text, UNRESOLVED);
    }

    #[test]
    fn test_fallback_scale_is_flagged() {
        let config = MeasurementConfig {
            fallback_pixels_per_unit: Some(8.0),
            ..Default::default()
        };
        let m = measure(Some(200.0), None, &config);
        assert_eq!(m.status, MeasurementStatus::FallbackScale);
        assert_eq!(m.text, "~25.00 ft (default scale)");
    }

    #[test]
    fn test_custom_marker_and_precision() {
        let scale = ScaleReference::from_ratio(3.0, LengthUnit::Feet);
        let config = MeasurementConfig {
            precision: 0,
            approximation_marker: String::new(),
            ..Default::default()
        };
        assert_eq!(measure(Some(100.0), Some(&scale), &config).text, "33 ft");
    }

    #[test]
    fn test_canonical_label() {
        assert_eq!(canonical_label(" tendon  banded ( 1 ) ."), "TENDON BANDED (1)");
        assert_eq!(canonical_label("|TENDON BANDED (1)"), "TENDON BANDED (1)");
        assert_eq!(canonical_label("~T1 TENDON,"), "T1 TENDON");
        assert_eq!(canonical_label("TENDON\tT-12"), "TENDON T-12");
        assert_eq!(canonical_label("..."), "");
    }
}
