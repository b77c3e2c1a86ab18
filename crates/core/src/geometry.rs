//! Page-space geometry primitives
//!
//! All coordinates are raster pixels with the origin at the top-left corner of
//! the page image, X increasing to the right and Y increasing downward.

use serde::{Deserialize, Serialize};

/// A point in page (or tile) pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    /// Create a box from two corners in any order
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x_min: x0.min(x1),
            y_min: y0.min(y1),
            x_max: x0.max(x1),
            y_max: y0.max(y1),
        }
    }

    /// Create a box from an origin and a size
    pub fn from_origin_size(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// Smallest box containing every point, `None` for an empty iterator
    pub fn enclosing<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::new(first.x, first.y, first.x, first.y);
        for p in iter {
            bbox.x_min = bbox.x_min.min(p.x);
            bbox.y_min = bbox.y_min.min(p.y);
            bbox.x_max = bbox.x_max.max(p.x);
            bbox.y_max = bbox.y_max.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x_min, self.y_min),
            Point::new(self.x_max, self.y_min),
            Point::new(self.x_max, self.y_max),
            Point::new(self.x_min, self.y_max),
        ]
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            x_min: self.x_min + dx,
            y_min: self.y_min + dy,
            x_max: self.x_max + dx,
            y_max: self.y_max + dy,
        }
    }

    /// Overlapping region, `None` when the boxes are disjoint or only touch
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x_min = self.x_min.max(other.x_min);
        let y_min = self.y_min.max(other.y_min);
        let x_max = self.x_max.min(other.x_max);
        let y_max = self.y_max.min(other.y_max);

        if x_max > x_min && y_max > y_min {
            Some(BoundingBox {
                x_min,
                y_min,
                x_max,
                y_max,
            })
        } else {
            None
        }
    }

    /// Intersection-over-union in `0.0..=1.0`
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection(other).map(|b| b.area()).unwrap_or(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    /// Whether `other` lies entirely inside this box (edges inclusive)
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.x_min >= self.x_min
            && other.y_min >= self.y_min
            && other.x_max <= self.x_max
            && other.y_max <= self.y_max
    }

    /// Distance from a point to the box, zero when inside
    pub fn distance_to_point(&self, p: &Point) -> f32 {
        let dx = (self.x_min - p.x).max(0.0).max(p.x - self.x_max);
        let dy = (self.y_min - p.y).max(0.0).max(p.y - self.y_max);
        (dx * dx + dy * dy).sqrt()
    }

    /// Dominant reading direction of text in this box, in degrees
    ///
    /// Wide boxes read horizontally (0°), tall boxes vertically (90°).
    pub fn reading_angle(&self) -> f32 {
        if self.width() >= self.height() {
            0.0
        } else {
            90.0
        }
    }
}

/// Closed polygon outlining a text span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Four-corner polygon, clockwise from the top-left
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self::new(bbox.corners().to_vec())
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Axis-aligned bounds; a degenerate polygon yields a zero-size box at the origin
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::enclosing(&self.points).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.points.iter().map(|p| p.translate(dx, dy)).collect())
    }
}

/// Smallest angle between two undirected line orientations, in `0.0..=90.0`
pub fn angle_difference(a_degrees: f32, b_degrees: f32) -> f32 {
    let diff = (a_degrees - b_degrees).rem_euclid(180.0);
    diff.min(180.0 - diff)
}

/// A straight line segment in page space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
}

impl LineSegment {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    pub fn from_coords(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::new(Point::new(x0, y0), Point::new(x1, y1))
    }

    /// Pixel length
    pub fn length(&self) -> f32 {
        self.start.distance_to(&self.end)
    }

    /// Orientation in degrees, normalized to `0.0..180.0`
    pub fn angle_degrees(&self) -> f32 {
        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        dy.atan2(dx).to_degrees().rem_euclid(180.0)
    }

    pub fn midpoint(&self) -> Point {
        Point::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }

    /// Unit direction from `start` to `end`; zero vector for a degenerate segment
    pub fn direction(&self) -> (f32, f32) {
        let len = self.length();
        if len < 1e-6 {
            (0.0, 0.0)
        } else {
            (
                (self.end.x - self.start.x) / len,
                (self.end.y - self.start.y) / len,
            )
        }
    }

    /// Signed position of `p` projected onto this segment's line, measured from `start`
    pub fn project(&self, p: &Point) -> f32 {
        let (ux, uy) = self.direction();
        (p.x - self.start.x) * ux + (p.y - self.start.y) * uy
    }

    /// Point on the infinite line at signed offset `t` from `start`
    pub fn point_at(&self, t: f32) -> Point {
        let (ux, uy) = self.direction();
        Point::new(self.start.x + ux * t, self.start.y + uy * t)
    }

    /// Distance from `p` to the infinite line through this segment
    pub fn perpendicular_distance(&self, p: &Point) -> f32 {
        let (ux, uy) = self.direction();
        if ux == 0.0 && uy == 0.0 {
            return p.distance_to(&self.start);
        }
        ((p.x - self.start.x) * uy - (p.y - self.start.y) * ux).abs()
    }

    /// Nearest point of the segment to `p`
    pub fn closest_point(&self, p: &Point) -> Point {
        let dx = self.end.x - self.start.x;
        let dy = self.end.y - self.start.y;
        let length_sq = dx * dx + dy * dy;

        if length_sq < 1e-6 {
            return self.start;
        }

        let t = (((p.x - self.start.x) * dx + (p.y - self.start.y) * dy) / length_sq).clamp(0.0, 1.0);
        Point::new(self.start.x + t * dx, self.start.y + t * dy)
    }

    pub fn distance_to_point(&self, p: &Point) -> f32 {
        p.distance_to(&self.closest_point(p))
    }

    /// Whether two segments cross or touch
    pub fn intersects(&self, other: &LineSegment) -> bool {
        fn orient(a: &Point, b: &Point, c: &Point) -> f32 {
            (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
        }
        fn on_segment(a: &Point, b: &Point, p: &Point) -> bool {
            p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
        }

        let (p1, p2, q1, q2) = (&self.start, &self.end, &other.start, &other.end);
        let d1 = orient(q1, q2, p1);
        let d2 = orient(q1, q2, p2);
        let d3 = orient(p1, p2, q1);
        let d4 = orient(p1, p2, q2);

        if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
            && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
        {
            return true;
        }

        (d1 == 0.0 && on_segment(q1, q2, p1))
            || (d2 == 0.0 && on_segment(q1, q2, p2))
            || (d3 == 0.0 && on_segment(p1, p2, q1))
            || (d4 == 0.0 && on_segment(p1, p2, q2))
    }

    /// Shortest distance between the segment and a box, zero when they touch
    pub fn distance_to_box(&self, bbox: &BoundingBox) -> f32 {
        if bbox.contains_point(&self.start) || bbox.contains_point(&self.end) {
            return 0.0;
        }

        let corners = bbox.corners();
        let edges = [
            LineSegment::new(corners[0], corners[1]),
            LineSegment::new(corners[1], corners[2]),
            LineSegment::new(corners[2], corners[3]),
            LineSegment::new(corners[3], corners[0]),
        ];
        if edges.iter().any(|edge| edge.intersects(self)) {
            return 0.0;
        }

        let from_endpoints = bbox
            .distance_to_point(&self.start)
            .min(bbox.distance_to_point(&self.end));
        corners
            .iter()
            .map(|c| self.distance_to_point(c))
            .fold(from_endpoints, f32::min)
    }
}
