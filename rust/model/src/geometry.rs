// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Planar geometry of drawing entities

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// A 2D point (simplified for serialization)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_nalgebra(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn from_nalgebra(p: &Point2<f64>) -> Self {
        Self { x: p.x, y: p.y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        nalgebra::distance(&self.to_nalgebra(), &other.to_nalgebra())
    }
}

/// A 3D point. Drawing coordinates arrive at a nominal elevation, so `z`
/// defaults to zero when absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn planar(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn to_nalgebra(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }
}

/// Raw CAD primitive kind, used in template signatures
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    Line,
    Polyline,
    Circle,
    Arc,
    Insert,
}

/// Geometry of a single drawing entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    Point {
        at: Point3D,
    },
    Line {
        start: Point3D,
        end: Point3D,
    },
    Polyline {
        points: Vec<Point3D>,
        #[serde(default)]
        closed: bool,
    },
    Circle {
        center: Point3D,
        radius: f64,
    },
    Arc {
        center: Point3D,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
    /// Block (symbol) insertion
    Insert {
        at: Point3D,
        #[serde(default)]
        rotation: f64,
        #[serde(default = "unit_scale")]
        scale: f64,
    },
}

fn unit_scale() -> f64 {
    1.0
}

/// Axis-aligned 2D bounds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bounds2D {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds2D {
    fn around(points: impl IntoIterator<Item = Point2D>) -> Option<Self> {
        let mut bounds: Option<Bounds2D> = None;
        for p in points {
            let b = bounds.get_or_insert(Bounds2D {
                min_x: p.x,
                min_y: p.y,
                max_x: p.x,
                max_y: p.y,
            });
            b.min_x = b.min_x.min(p.x);
            b.min_y = b.min_y.min(p.y);
            b.max_x = b.max_x.max(p.x);
            b.max_y = b.max_y.max(p.y);
        }
        bounds
    }
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point { .. } => GeometryKind::Point,
            Geometry::Line { .. } => GeometryKind::Line,
            Geometry::Polyline { .. } => GeometryKind::Polyline,
            Geometry::Circle { .. } => GeometryKind::Circle,
            Geometry::Arc { .. } => GeometryKind::Arc,
            Geometry::Insert { .. } => GeometryKind::Insert,
        }
    }

    /// Representative plan position of the entity.
    ///
    /// Insertion point for points and blocks, midpoint for lines, vertex
    /// centroid for polylines and centre for circles and arcs.
    pub fn anchor(&self) -> Point2D {
        match self {
            Geometry::Point { at } | Geometry::Insert { at, .. } => at.planar(),
            Geometry::Line { start, end } => {
                Point2D::new((start.x + end.x) / 2.0, (start.y + end.y) / 2.0)
            }
            Geometry::Polyline { points, .. } => {
                if points.is_empty() {
                    return Point2D::new(0.0, 0.0);
                }
                let n = points.len() as f64;
                let (sx, sy) = points
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
                Point2D::new(sx / n, sy / n)
            }
            Geometry::Circle { center, .. } | Geometry::Arc { center, .. } => center.planar(),
        }
    }

    /// Plan-view segments traced by the entity (empty for point-like kinds).
    pub fn segments(&self) -> Vec<(Point2D, Point2D)> {
        match self {
            Geometry::Line { start, end } => vec![(start.planar(), end.planar())],
            Geometry::Polyline { points, closed } => {
                let mut segs: Vec<_> = points
                    .windows(2)
                    .map(|w| (w[0].planar(), w[1].planar()))
                    .collect();
                if *closed && points.len() > 2 {
                    segs.push((points[points.len() - 1].planar(), points[0].planar()));
                }
                segs
            }
            _ => Vec::new(),
        }
    }

    /// Plan-view bounds of the entity.
    pub fn bounds(&self) -> Bounds2D {
        let single = |p: Point2D| Bounds2D {
            min_x: p.x,
            min_y: p.y,
            max_x: p.x,
            max_y: p.y,
        };
        match self {
            Geometry::Point { at } | Geometry::Insert { at, .. } => single(at.planar()),
            Geometry::Line { start, end } => {
                Bounds2D::around([start.planar(), end.planar()]).unwrap_or(single(start.planar()))
            }
            Geometry::Polyline { points, .. } => Bounds2D::around(points.iter().map(|p| p.planar()))
                .unwrap_or(single(Point2D::new(0.0, 0.0))),
            Geometry::Circle { center, radius } | Geometry::Arc { center, radius, .. } => {
                let r = radius.abs();
                Bounds2D {
                    min_x: center.x - r,
                    min_y: center.y - r,
                    max_x: center.x + r,
                    max_y: center.y + r,
                }
            }
        }
    }
}

/// 2D ray-casting point-in-polygon test.
pub fn point_in_polygon(point: &Point2D, polygon: &[Point2D]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;

    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (&polygon[i], &polygon[j]);
        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}
