//! Callout-to-line association
//!
//! Callouts are visited in reading order (top to bottom, then left to right)
//! and each one greedily claims the best remaining segment within
//! `max_distance`. A claimed segment leaves the pool, so no segment is ever
//! bound to two callouts. Every step is deterministic: identical detections
//! and segments always produce identical matches.

use crate::geometry::{angle_difference, BoundingBox, LineSegment};
use crate::ocr::TextDetection;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Matching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Farthest a segment may lie from a callout box, in pixels
    pub max_distance: f32,
    /// How strongly a mismatch between text and line orientation is penalized
    pub orientation_weight: f32,
    /// Words that mark a text span as a tendon callout
    pub keywords: Vec<String>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_distance: 150.0,
            orientation_weight: 0.5,
            keywords: vec!["TENDON".to_string()],
        }
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// Whether `text` contains any keyword as a whole word (or word sequence)
pub fn is_callout(text: &str, keywords: &[String]) -> bool {
    let text_words = words(text);
    keywords.iter().any(|keyword| {
        let needle = words(keyword);
        !needle.is_empty() && text_words.windows(needle.len()).any(|w| w == needle.as_slice())
    })
}

/// A callout and the segment it was bound to, if any
#[derive(Debug, Clone, PartialEq)]
pub struct CalloutMatch {
    pub callout: TextDetection,
    pub segment: Option<LineSegment>,
    /// Segment-to-callout distance in pixels
    pub distance: Option<f32>,
    /// Match confidence in `0.0..=1.0`; zero when unmatched
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    distance: f32,
    cost: f32,
    confidence: f32,
}

/// `|cos|` of the angle between the line and the callout's reading direction
fn orientation_score(segment: &LineSegment, callout: &BoundingBox) -> f32 {
    angle_difference(segment.angle_degrees(), callout.reading_angle())
        .to_radians()
        .cos()
        .abs()
}

fn score(index: usize, segment: &LineSegment, callout: &BoundingBox, config: &MatchConfig) -> Option<Candidate> {
    let distance = segment.distance_to_box(callout);
    if distance > config.max_distance {
        return None;
    }
    let orientation = orientation_score(segment, callout);
    Some(Candidate {
        index,
        distance,
        cost: distance * (1.0 + config.orientation_weight * (1.0 - orientation)),
        confidence: (1.0 - distance / config.max_distance) * (0.5 + 0.5 * orientation),
    })
}

/// Lowest cost first, then closest, then most confident, then lowest index
fn better(a: &Candidate, b: &Candidate) -> Ordering {
    a.cost
        .total_cmp(&b.cost)
        .then(a.distance.total_cmp(&b.distance))
        .then(b.confidence.total_cmp(&a.confidence))
        .then(a.index.cmp(&b.index))
}

fn reading_order(a: &TextDetection, b: &TextDetection) -> Ordering {
    let (ba, bb) = (a.bbox(), b.bbox());
    ba.y_min
        .total_cmp(&bb.y_min)
        .then(ba.x_min.total_cmp(&bb.x_min))
        .then_with(|| a.text.cmp(&b.text))
}

/// Bind tendon callouts to line segments
///
/// Non-callout text is ignored. The result lists every callout, matched or
/// not, in reading order.
pub fn match_callouts(detections: &[TextDetection], segments: &[LineSegment], config: &MatchConfig) -> Vec<CalloutMatch> {
    let mut callouts: Vec<&TextDetection> = detections
        .iter()
        .filter(|d| is_callout(&d.text, &config.keywords))
        .collect();
    callouts.sort_by(|a, b| reading_order(a, b));

    let mut claimed = vec![false; segments.len()];
    let mut matches = Vec::with_capacity(callouts.len());

    for callout in callouts {
        let bbox = callout.bbox();
        let best = segments
            .iter()
            .enumerate()
            .filter(|(i, _)| !claimed[*i])
            .filter_map(|(i, segment)| score(i, segment, &bbox, config))
            .min_by(better);

        let matched = match best {
            Some(candidate) => {
                claimed[candidate.index] = true;
                tracing::debug!(
                    callout = %callout.text,
                    segment = candidate.index,
                    distance = candidate.distance,
                    "callout matched"
                );
                CalloutMatch {
                    callout: callout.clone(),
                    segment: Some(segments[candidate.index]),
                    distance: Some(candidate.distance),
                    confidence: candidate.confidence,
                }
            }
            None => {
                tracing::debug!(callout = %callout.text, "no line within reach");
                CalloutMatch {
                    callout: callout.clone(),
                    segment: None,
                    distance: None,
                    confidence: 0.0,
                }
            }
        };
        matches.push(matched);
    }

    matches
}
