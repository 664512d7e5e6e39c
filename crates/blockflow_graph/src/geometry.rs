// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipe geometry used for hit-testing and token interpolation.
//!
//! The renderer owns the real curve math; [`PipeGeometry`] is the seam it
//! plugs into. [`BezierGeometry`] is the default used headless and in tests.

use crate::block::Block;
use serde::{Deserialize, Serialize};

/// A point in block-layer space
pub type Point = [f32; 2];

/// Default number of segments in a pipe curve
pub const DEFAULT_CURVE_RESOLUTION: usize = 20;

/// Default horizontal distance from a block's center to its sockets
pub const DEFAULT_SOCKET_OFFSET: f32 = 32.0;

/// Source of pipe curves
pub trait PipeGeometry {
    /// Socket anchors for a pipe from `source` to `target`
    fn anchors(&self, source: &Block, target: &Block) -> (Point, Point);

    /// Polyline approximating the pipe between two anchors
    fn curve(&self, start: Point, end: Point) -> Vec<Point>;

    /// Polyline for a pipe between two blocks
    fn pipe_curve(&self, source: &Block, target: &Block) -> Vec<Point> {
        let (start, end) = self.anchors(source, target);
        self.curve(start, end)
    }
}

/// Cubic bezier pipes leaving and entering sockets horizontally
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BezierGeometry {
    /// Segments per curve
    pub resolution: usize,
    /// Horizontal offset from block center to socket
    pub socket_offset: f32,
}

impl Default for BezierGeometry {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_CURVE_RESOLUTION,
            socket_offset: DEFAULT_SOCKET_OFFSET,
        }
    }
}

impl PipeGeometry for BezierGeometry {
    fn anchors(&self, source: &Block, target: &Block) -> (Point, Point) {
        let [sx, sy] = source.position;
        let [tx, ty] = target.position;
        ([sx + self.socket_offset, sy], [tx - self.socket_offset, ty])
    }

    fn curve(&self, start: Point, end: Point) -> Vec<Point> {
        let control_offset = distance(start, end) * 0.5;
        let ctrl1 = [start[0] + control_offset, start[1]];
        let ctrl2 = [end[0] - control_offset, end[1]];
        bezier_points(start, ctrl1, ctrl2, end, self.resolution.max(1))
    }
}

/// Straight pipes, mostly useful for tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StraightGeometry;

impl PipeGeometry for StraightGeometry {
    fn anchors(&self, source: &Block, target: &Block) -> (Point, Point) {
        (source.position, target.position)
    }

    fn curve(&self, start: Point, end: Point) -> Vec<Point> {
        vec![start, end]
    }
}

/// Generate points along a cubic bezier curve
fn bezier_points(p0: Point, p1: Point, p2: Point, p3: Point, segments: usize) -> Vec<Point> {
    let mut points = Vec::with_capacity(segments + 1);
    for i in 0..=segments {
        let t = i as f32 / segments as f32;
        let t2 = t * t;
        let t3 = t2 * t;
        let mt = 1.0 - t;
        let mt2 = mt * mt;
        let mt3 = mt2 * mt;

        let x = mt3 * p0[0] + 3.0 * mt2 * t * p1[0] + 3.0 * mt * t2 * p2[0] + t3 * p3[0];
        let y = mt3 * p0[1] + 3.0 * mt2 * t * p1[1] + 3.0 * mt * t2 * p2[1] + t3 * p3[1];

        points.push([x, y]);
    }
    points
}

/// Euclidean distance
pub fn distance(a: Point, b: Point) -> f32 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    (dx * dx + dy * dy).sqrt()
}

/// Linear interpolation between two points
pub fn lerp(a: Point, b: Point, t: f32) -> Point {
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
}

/// Distance from `p` to the segment `a..b`
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let len_sq = ab[0] * ab[0] + ab[1] * ab[1];
    if len_sq <= f32::EPSILON {
        return distance(p, a);
    }
    let t = (((p[0] - a[0]) * ab[0] + (p[1] - a[1]) * ab[1]) / len_sq).clamp(0.0, 1.0);
    distance(p, lerp(a, b, t))
}

/// Minimum distance from `p` to a polyline. `None` for an empty polyline.
pub fn polyline_distance(p: Point, polyline: &[Point]) -> Option<f32> {
    match polyline {
        [] => None,
        [only] => Some(distance(p, *only)),
        _ => polyline
            .windows(2)
            .map(|w| point_segment_distance(p, w[0], w[1]))
            .min_by(f32::total_cmp),
    }
}

/// Total length of a polyline
pub fn polyline_length(polyline: &[Point]) -> f32 {
    polyline.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Point at arc-length fraction `t` (clamped to `[0, 1]`) along a polyline
pub fn point_along(polyline: &[Point], t: f32) -> Option<Point> {
    let first = *polyline.first()?;
    let total = polyline_length(polyline);
    if total <= f32::EPSILON {
        return Some(first);
    }

    let mut remaining = total * t.clamp(0.0, 1.0);
    for w in polyline.windows(2) {
        let segment = distance(w[0], w[1]);
        if remaining <= segment {
            let local = if segment > 0.0 { remaining / segment } else { 0.0 };
            return Some(lerp(w[0], w[1], local));
        }
        remaining -= segment;
    }
    polyline.last().copied()
}
