// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uniform plan grid shared by separation and clash analysis.
//!
//! The horizontal plane is divided into square cells of side `cell_size`.
//! Each element is registered in every cell its plan footprint touches, and
//! two elements are neighbours when they share at least one cell.

use cad_lift_model::{Geometry, MatchedElement, Point2D};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Integer cell coordinates
pub type CellKey = (i64, i64);

/// Element indices registered in one cell
pub type CellMembers = SmallVec<[usize; 4]>;

/// Upper bound on the cells one footprint may cover
pub const MAX_FOOTPRINT_CELLS: usize = 65_536;

fn oversized(geometry: &Geometry) {
    let anchor = geometry.anchor();
    tracing::warn!(
        kind = ?geometry.kind(),
        x = anchor.x,
        y = anchor.y,
        "Footprint too large for the grid, using its anchor cell"
    );
}

/// A spatial hash grid over element footprints
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: FxHashMap<CellKey, CellMembers>,
}

impl SpatialGrid {
    /// Creates an empty grid with the given cell size.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: FxHashMap::default(),
        }
    }

    /// Builds a grid from the footprints of all elements.
    pub fn from_elements(elements: &[MatchedElement], cell_size: f64) -> Self {
        let mut grid = Self::new(cell_size);
        for (index, element) in elements.iter().enumerate() {
            let cells = grid.footprint(&element.geometry);
            grid.insert(index, &cells);
        }
        grid
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn cell_of(&self, p: &Point2D) -> CellKey {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
        )
    }

    /// Cells covered by a geometry, sorted and deduplicated.
    ///
    /// Point-like entities occupy one cell. Linear entities are sampled along
    /// every segment at half-cell steps. Circles and arcs cover their
    /// bounding box. A footprint that would exceed [`MAX_FOOTPRINT_CELLS`]
    /// collapses to the anchor cell.
    pub fn footprint(&self, geometry: &Geometry) -> Vec<CellKey> {
        let anchor_cell = || vec![self.cell_of(&geometry.anchor())];
        let mut cells = match geometry {
            Geometry::Point { .. } | Geometry::Insert { .. } => anchor_cell(),
            Geometry::Line { .. } | Geometry::Polyline { .. } => {
                let segments = geometry.segments();
                let step = self.cell_size / 2.0;
                let samples: f64 = segments
                    .iter()
                    .map(|(a, b)| (a.distance_to(b) / step).ceil().max(1.0) + 1.0)
                    .sum();
                if segments.is_empty() {
                    anchor_cell()
                } else if !samples.is_finite() || samples > MAX_FOOTPRINT_CELLS as f64 {
                    oversized(geometry);
                    anchor_cell()
                } else {
                    let mut cells = Vec::with_capacity(samples as usize);
                    for (a, b) in segments {
                        let steps = (a.distance_to(&b) / step).ceil().max(1.0) as usize;
                        for i in 0..=steps {
                            let t = i as f64 / steps as f64;
                            let p = Point2D::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
                            cells.push(self.cell_of(&p));
                        }
                    }
                    cells
                }
            }
            Geometry::Circle { .. } | Geometry::Arc { .. } => {
                let b = geometry.bounds();
                let (x0, y0) = self.cell_of(&Point2D::new(b.min_x, b.min_y));
                let (x1, y1) = self.cell_of(&Point2D::new(b.max_x, b.max_y));
                let count = (x1 as i128 - x0 as i128 + 1) * (y1 as i128 - y0 as i128 + 1);
                if count > MAX_FOOTPRINT_CELLS as i128 {
                    oversized(geometry);
                    anchor_cell()
                } else {
                    let mut cells = Vec::with_capacity(count as usize);
                    for cx in x0..=x1 {
                        for cy in y0..=y1 {
                            cells.push((cx, cy));
                        }
                    }
                    cells
                }
            }
        };
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    /// Registers an element index in the given cells.
    pub fn insert(&mut self, index: usize, cells: &[CellKey]) {
        for &cell in cells {
            let members = self.cells.entry(cell).or_default();
            if !members.contains(&index) {
                members.push(index);
            }
        }
    }

    pub fn members(&self, cell: CellKey) -> &[usize] {
        self.cells.get(&cell).map(|m| m.as_slice()).unwrap_or(&[])
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// All occupied cells in coordinate order.
    pub fn occupied_cells(&self) -> Vec<(CellKey, &[usize])> {
        let mut cells: Vec<_> = self
            .cells
            .iter()
            .map(|(k, m)| (*k, m.as_slice()))
            .collect();
        cells.sort_unstable_by_key(|(k, _)| *k);
        cells
    }

    /// Unique index pairs `(i, j)` with `i < j` sharing at least one cell,
    /// each tagged with the lowest shared cell. Sorted by `(i, j)`.
    pub fn candidate_pairs(&self) -> Vec<(usize, usize, CellKey)> {
        let mut seen: FxHashSet<(usize, usize)> = FxHashSet::default();
        let mut pairs = Vec::new();
        for (cell, members) in self.occupied_cells() {
            for (n, &a) in members.iter().enumerate() {
                for &b in &members[n + 1..] {
                    let key = if a < b { (a, b) } else { (b, a) };
                    if seen.insert(key) {
                        pairs.push((key.0, key.1, cell));
                    }
                }
            }
        }
        pairs.sort_unstable_by_key(|&(a, b, _)| (a, b));
        pairs
    }
}

/// Cells at Chebyshev distance exactly `ring` from `center`.
fn ring_cells(center: CellKey, ring: i64) -> impl Iterator<Item = CellKey> {
    let (cx, cy) = center;
    let rows = if ring == 0 { 1 } else { 2 };
    let horizontal = (-ring..=ring).flat_map(move |dx| {
        [-ring, ring]
            .into_iter()
            .take(rows)
            .map(move |dy| (cx + dx, cy + dy))
    });
    let vertical = (1 - ring..ring)
        .flat_map(move |dy| [(cx - ring, cy + dy), (cx + ring, cy + dy)]);
    horizontal.chain(vertical)
}

/// Horizontal distance from each point to its nearest other point.
///
/// Uses a point grid and searches outward ring by ring until no closer
/// point can exist. Points with no neighbour at all yield no entry.
pub fn nearest_neighbor_distances(points: &[Point2D]) -> Vec<f64> {
    if points.len() < 2 {
        return Vec::new();
    }

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let n = points.len() as f64;
    let (span_x, span_y) = (max_x - min_x, max_y - min_y);
    let span = span_x.max(span_y);
    // A row of points has little or no area; its length bounds the cell size
    let cell_size = (span_x * span_y / n).sqrt().max(span / n);
    let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
        cell_size
    } else {
        // All points coincide
        1.0
    };

    let mut grid = SpatialGrid::new(cell_size);
    for (i, p) in points.iter().enumerate() {
        let cell = grid.cell_of(p);
        grid.insert(i, &[cell]);
    }
    let max_ring = (span / cell_size).ceil() as i64 + 1;

    let mut distances = Vec::with_capacity(points.len());
    for (i, p) in points.iter().enumerate() {
        let center = grid.cell_of(p);
        let mut best = f64::MAX;
        for ring in 0..=max_ring {
            // Anything in ring r is at least (r - 1) cells away
            if best <= (ring - 1).max(0) as f64 * cell_size {
                break;
            }
            for cell in ring_cells(center, ring) {
                for &j in grid.members(cell) {
                    if j != i {
                        best = best.min(p.distance_to(&points[j]));
                    }
                }
            }
        }
        if best < f64::MAX {
            distances.push(best);
        }
    }
    distances
}
