//! Candidate tendon line extraction
//!
//! Canny edges feed a Hough transform, which only yields infinite lines.
//! Each Hough line is walked across the edge map to recover the runs of
//! pixels that actually lie on it; runs become segments. Short segments are
//! dropped, then near-collinear pieces are merged so that a tendon interrupted
//! by its own callout text comes back as one segment.

use crate::geometry::{angle_difference, LineSegment, Point};
use image::GrayImage;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use serde::{Deserialize, Serialize};

/// Line detection parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Canny hysteresis thresholds
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum Hough accumulator votes for a line
    pub vote_threshold: u32,
    /// Non-maximum suppression radius in the Hough accumulator
    pub suppression_radius: u32,
    /// Segments shorter than this (pixels) are discarded
    pub min_length: f32,
    /// Largest run of missing edge pixels bridged while walking a line
    pub max_gap: f32,
    /// Angular tolerance (degrees) for merging collinear segments
    pub merge_angle_tolerance: f32,
    /// Perpendicular offset (pixels) allowed when merging
    pub merge_distance_tolerance: f32,
    /// End-to-end gap (pixels) bridged when merging, wide enough for a label
    /// printed across the line
    pub merge_gap_tolerance: f32,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            vote_threshold: 80,
            suppression_radius: 8,
            min_length: 40.0,
            max_gap: 5.0,
            merge_angle_tolerance: 3.0,
            merge_distance_tolerance: 6.0,
            merge_gap_tolerance: 60.0,
        }
    }
}

/// Half-width of the band sampled around a Hough line, in pixels
const EDGE_BAND: i32 = 1;

fn is_edge_near(edges: &GrayImage, p: Point, normal: (f32, f32)) -> bool {
    let (w, h) = (edges.width() as i32, edges.height() as i32);
    (-EDGE_BAND..=EDGE_BAND).any(|k| {
        let x = (p.x + normal.0 * k as f32).round() as i32;
        let y = (p.y + normal.1 * k as f32).round() as i32;
        x >= 0 && y >= 0 && x < w && y < h && edges.get_pixel(x as u32, y as u32)[0] > 0
    })
}

/// Recover the supported runs of one Hough line as segments
fn trace_line(edges: &GrayImage, line: &PolarLine, config: &LineConfig) -> Vec<LineSegment> {
    let theta = (line.angle_in_degrees as f32).to_radians();
    let (sin, cos) = theta.sin_cos();
    // Points satisfy x*cos + y*sin = r
    let foot = Point::new(line.r * cos, line.r * sin);
    let dir = (-sin, cos);
    let normal = (cos, sin);

    let (w, h) = (edges.width() as f32, edges.height() as f32);
    let reach = (w * w + h * h).sqrt();
    let at = |t: f32| Point::new(foot.x + dir.0 * t, foot.y + dir.1 * t);
    let in_bounds = |p: Point| p.x >= 0.0 && p.y >= 0.0 && p.x < w && p.y < h;

    let mut segments = Vec::new();
    let mut run: Option<(f32, f32)> = None;
    // Fragments shorter than min_length survive until after merging
    let min_run = config.min_length / 4.0;
    let push_run = |start: f32, end: f32, segments: &mut Vec<LineSegment>| {
        if end - start >= min_run {
            segments.push(LineSegment::new(at(start), at(end)));
        }
    };

    let mut t = -reach;
    while t <= reach {
        let p = at(t);
        if in_bounds(p) && is_edge_near(edges, p, normal) {
            run = match run {
                Some((start, last)) if t - last <= config.max_gap + 1.0 => Some((start, t)),
                Some((start, last)) => {
                    push_run(start, last, &mut segments);
                    Some((t, t))
                }
                None => Some((t, t)),
            };
        }
        t += 1.0;
    }
    if let Some((start, last)) = run {
        push_run(start, last, &mut segments);
    }

    segments
}

/// Tolerances for joining two segments into one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeTolerance {
    /// Degrees
    pub angle: f32,
    /// Largest perpendicular offset of either endpoint, pixels
    pub offset: f32,
    /// Largest gap along the line, pixels
    pub gap: f32,
}

impl From<&LineConfig> for MergeTolerance {
    fn from(config: &LineConfig) -> Self {
        Self {
            angle: config.merge_angle_tolerance,
            offset: config.merge_distance_tolerance,
            gap: config.merge_gap_tolerance,
        }
    }
}

/// Try to merge `b` into `a`; `a` should be the longer segment
///
/// The result spans both segments' extents projected onto `a`'s line. When
/// the segments are separated by a gap the merged length exceeds the sum of
/// the two lengths by at most that gap.
pub fn merge_pair(a: &LineSegment, b: &LineSegment, tolerance: MergeTolerance) -> Option<LineSegment> {
    if angle_difference(a.angle_degrees(), b.angle_degrees()) > tolerance.angle {
        return None;
    }
    if a.perpendicular_distance(&b.start) > tolerance.offset || a.perpendicular_distance(&b.end) > tolerance.offset {
        return None;
    }

    let len = a.length();
    let (p0, p1) = (a.project(&b.start), a.project(&b.end));
    let (b_lo, b_hi) = (p0.min(p1), p0.max(p1));
    let gap = (b_lo - len).max(-b_hi).max(0.0);
    if gap > tolerance.gap {
        return None;
    }

    Some(LineSegment::new(a.point_at(b_lo.min(0.0)), a.point_at(b_hi.max(len))))
}

/// Merge near-collinear segments until no pair qualifies
///
/// Longer segments absorb shorter ones; the result does not depend on the
/// input order beyond ties in length.
pub fn merge_collinear(segments: Vec<LineSegment>, tolerance: MergeTolerance) -> Vec<LineSegment> {
    let mut pool = segments;
    loop {
        pool.sort_by(|a, b| {
            b.length()
                .total_cmp(&a.length())
                .then(a.start.y.total_cmp(&b.start.y))
                .then(a.start.x.total_cmp(&b.start.x))
        });

        let mut merged: Vec<LineSegment> = Vec::with_capacity(pool.len());
        let mut changed = false;
        for segment in pool {
            let absorbed = merged.iter_mut().any(|existing| {
                match merge_pair(existing, &segment, tolerance) {
                    Some(joined) => {
                        *existing = joined;
                        true
                    }
                    None => false,
                }
            });
            changed |= absorbed;
            if !absorbed {
                merged.push(segment);
            }
        }

        pool = merged;
        if !changed {
            return pool;
        }
    }
}

/// Detect candidate line segments on a grayscale page raster
pub fn detect_segments(gray: &GrayImage, config: &LineConfig) -> Vec<LineSegment> {
    if gray.width() == 0 || gray.height() == 0 {
        return Vec::new();
    }

    let edges = imageproc::edges::canny(gray, config.canny_low, config.canny_high);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold: config.vote_threshold,
            suppression_radius: config.suppression_radius,
        },
    );

    let raw: Vec<LineSegment> = lines
        .iter()
        .flat_map(|line| trace_line(&edges, line, config))
        .collect();
    let raw_count = raw.len();

    let merged = merge_collinear(raw, MergeTolerance::from(config));
    let segments: Vec<LineSegment> = merged
        .into_iter()
        .filter(|s| s.length() >= config.min_length)
        .collect();

    tracing::debug!(
        hough_lines = lines.len(),
        raw_segments = raw_count,
        segments = segments.len(),
        "line detection complete"
    );
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    const TIGHT: MergeTolerance = MergeTolerance {
        angle: 3.0,
        offset: 6.0,
        gap: 6.0,
    };

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    #[test]
    fn test_blank_page_has_no_segments() {
        assert!(detect_segments(&blank(200, 120), &LineConfig::default()).is_empty());
    }

    #[test]
    fn test_detects_horizontal_bar() {
        let mut img = blank(320, 120);
        draw_filled_rect_mut(&mut img, Rect::at(60, 58).of_size(200, 3), Luma([0]));

        let segments = detect_segments(&img, &LineConfig::default());
        let best = segments
            .iter()
            .max_by(|a, b| a.length().total_cmp(&b.length()))
            .copied()
            .unwrap();

        assert!((best.length() - 200.0).abs() < 12.0, "length {}", best.length());
        assert!(angle_difference(best.angle_degrees(), 0.0) < 2.0);
        assert!((best.midpoint().y - 59.5).abs() < 4.0);
    }

    #[test]
    fn test_detects_vertical_bar() {
        let mut img = blank(120, 320);
        draw_filled_rect_mut(&mut img, Rect::at(40, 50).of_size(3, 220), Luma([0]));

        let segments = detect_segments(&img, &LineConfig::default());
        assert!(segments
            .iter()
            .any(|s| angle_difference(s.angle_degrees(), 90.0) < 2.0 && (s.length() - 220.0).abs() < 12.0));
    }

    #[test]
    fn test_merge_overlapping_collinear_segments() {
        let a = LineSegment::from_coords(0.0, 10.0, 120.0, 10.0);
        let b = LineSegment::from_coords(100.0, 11.0, 180.0, 11.0);

        let merged = merge_collinear(vec![a, b], TIGHT);
        assert_eq!(merged.len(), 1);

        let len = merged[0].length();
        assert!(len >= a.length().max(b.length()));
        assert!(len <= a.length() + b.length());
        assert!((len - 180.0).abs() < 0.5);
    }

    #[test]
    fn test_merge_bridges_small_gap() {
        let a = LineSegment::from_coords(0.0, 0.0, 100.0, 0.0);
        let b = LineSegment::from_coords(104.0, 0.0, 150.0, 0.0);

        let merged = merge_collinear(vec![b, a], TIGHT);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].length() - 150.0).abs() < 1e-3);
    }

    #[test]
    fn test_no_merge_beyond_tolerances() {
        let a = LineSegment::from_coords(0.0, 0.0, 100.0, 0.0);
        let parallel_far = LineSegment::from_coords(0.0, 20.0, 100.0, 20.0);
        let crossing = LineSegment::from_coords(50.0, -50.0, 50.0, 50.0);
        let distant = LineSegment::from_coords(130.0, 0.0, 200.0, 0.0);

        let merged = merge_collinear(vec![a, parallel_far, crossing, distant], TIGHT);
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_merge_chains_fragments() {
        let fragments = vec![
            LineSegment::from_coords(0.0, 0.0, 50.0, 0.0),
            LineSegment::from_coords(53.0, 0.0, 100.0, 0.0),
            LineSegment::from_coords(104.0, 0.0, 150.0, 0.0),
        ];

        let merged = merge_collinear(fragments, TIGHT);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].length() - 150.0).abs() < 1e-3);
    }

    #[test]
    fn test_gap_tolerance_is_separate_from_offset() {
        let a = LineSegment::from_coords(0.0, 0.0, 120.0, 0.0);
        let across_label = LineSegment::from_coords(150.0, 0.0, 270.0, 0.0);
        let offset = LineSegment::from_coords(150.0, 10.0, 270.0, 10.0);
        let tolerance = MergeTolerance { gap: 40.0, ..TIGHT };

        let joined = merge_pair(&a, &across_label, tolerance).unwrap();
        assert!((joined.length() - 270.0).abs() < 1e-3);
        assert!(merge_pair(&a, &offset, tolerance).is_none());
        assert!(merge_pair(&a, &across_label, TIGHT).is_none());
    }

    #[test]
    fn test_line_interrupted_by_label_is_one_segment() {
        let mut img = blank(400, 120);
        draw_filled_rect_mut(&mut img, Rect::at(50, 58).of_size(120, 3), Luma([0]));
        draw_filled_rect_mut(&mut img, Rect::at(200, 58).of_size(120, 3), Luma([0]));

        let segments = detect_segments(&img, &LineConfig::default());
        let best = segments
            .iter()
            .max_by(|a, b| a.length().total_cmp(&b.length()))
            .copied()
            .unwrap();

        assert!((best.length() - 270.0).abs() < 12.0, "length {}", best.length());
        assert!(angle_difference(best.angle_degrees(), 0.0) < 2.0);
    }
}
