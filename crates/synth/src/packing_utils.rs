//! Coarse packing grid shared by the annealer and the quality report.
//!
//! The grid groups `factor³` voxels into one packing cell. A grain covers the
//! cells whose centres lie inside its shape; every cell keeps a count of the
//! grains covering it.
//!
//! # Cost
//!
//! - packable cell with count `c`: `(c − 1)²` (penalizes gaps and overlaps)
//! - non-packable cell: `mask_penalty · c`

use crate::domain::Domain;
use crate::shape::ShapeEvaluator;
use nalgebra::Point3;

/// Per-cell coverage counts over a coarsened copy of the domain.
#[derive(Debug, Clone)]
pub struct PackingGrid {
    dims: [usize; 3],
    origin: [f64; 3],
    cell_size: [f64; 3],
    extent: [f64; 3],
    packable: Vec<bool>,
    counts: Vec<u32>,
    mask_penalty: f64,
}

impl PackingGrid {
    /// Builds the grid for a domain; a cell is packable if any of its voxels is.
    pub fn new(domain: &Domain, factor: usize, mask_penalty: f64) -> Self {
        let factor = factor.max(1);
        let vd = domain.dims();
        let res = domain.resolution();
        let dims = [
            vd[0].div_ceil(factor),
            vd[1].div_ceil(factor),
            vd[2].div_ceil(factor),
        ];
        let cell_size = [
            res[0] * factor as f64,
            res[1] * factor as f64,
            res[2] * factor as f64,
        ];

        let cells = dims[0] * dims[1] * dims[2];
        let mut packable = vec![false; cells];
        for v in 0..domain.voxel_count() {
            if domain.is_included(v) {
                let [x, y, z] = domain.coords(v);
                packable[(z / factor * dims[1] + y / factor) * dims[0] + x / factor] = true;
            }
        }

        Self {
            dims,
            origin: domain.origin(),
            cell_size,
            extent: domain.extent(),
            packable,
            counts: vec![0; cells],
            mask_penalty,
        }
    }

    /// Cell counts along x, y, z.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.counts.len()
    }

    /// Number of packable cells.
    pub fn packable_count(&self) -> usize {
        self.packable.iter().filter(|&&p| p).count()
    }

    /// Whether a cell is packable.
    pub fn is_packable(&self, cell: usize) -> bool {
        self.packable[cell]
    }

    /// Number of grains covering a cell.
    pub fn count(&self, cell: usize) -> u32 {
        self.counts[cell]
    }

    #[inline]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    /// Centre of the in-domain part of a cell.
    pub fn cell_center(&self, cell: usize) -> Point3<f64> {
        let nx = self.dims[0];
        let ny = self.dims[1];
        let c = [cell % nx, (cell / nx) % ny, cell / (nx * ny)];
        let mut p = [0.0; 3];
        for axis in 0..3 {
            let lo = c[axis] as f64 * self.cell_size[axis];
            let hi = (lo + self.cell_size[axis]).min(self.extent[axis]);
            p[axis] = self.origin[axis] + 0.5 * (lo + hi);
        }
        Point3::new(p[0], p[1], p[2])
    }

    /// Cell containing a point, if inside the domain.
    pub fn cell_of(&self, p: &Point3<f64>) -> Option<usize> {
        let mut c = [0usize; 3];
        for axis in 0..3 {
            let t = p[axis] - self.origin[axis];
            if !(t >= 0.0 && t <= self.extent[axis]) {
                return None;
            }
            c[axis] = ((t / self.cell_size[axis]).floor() as usize).min(self.dims[axis] - 1);
        }
        Some(self.index(c[0], c[1], c[2]))
    }

    /// Cell index range `[lo, hi]` overlapped by `[min, max]` along an axis.
    fn axis_range(&self, axis: usize, min: f64, max: f64) -> Option<(usize, usize)> {
        let lo = (min - self.origin[axis]) / self.cell_size[axis];
        let hi = (max - self.origin[axis]) / self.cell_size[axis];
        let n = self.dims[axis] as f64;
        if hi < 0.0 || lo >= n {
            return None;
        }
        let lo = lo.max(0.0).floor() as usize;
        let hi = (hi.min(n - 1.0).floor() as usize).max(lo);
        Some((lo, hi))
    }

    /// Cells covered by a shape: those whose centre lies inside it. A shape that
    /// contains no cell centre covers the cell of its centroid.
    pub fn coverage(&self, shape: &ShapeEvaluator) -> Vec<usize> {
        let aabb = shape.aabb();
        let mut cells = Vec::new();

        if let (Some((x0, x1)), Some((y0, y1)), Some((z0, z1))) = (
            self.axis_range(0, aabb.min_x, aabb.max_x),
            self.axis_range(1, aabb.min_y, aabb.max_y),
            self.axis_range(2, aabb.min_z, aabb.max_z),
        ) {
            for z in z0..=z1 {
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        let cell = self.index(x, y, z);
                        if shape.contains(&self.cell_center(cell)) {
                            cells.push(cell);
                        }
                    }
                }
            }
        }

        if cells.is_empty() {
            if let Some(cell) = self.cell_of(shape.centroid()) {
                cells.push(cell);
            }
        }
        cells
    }

    #[inline]
    fn cell_cost(&self, cell: usize) -> f64 {
        let c = self.counts[cell] as f64;
        if self.packable[cell] {
            (c - 1.0) * (c - 1.0)
        } else {
            self.mask_penalty * c
        }
    }

    /// Total cost of the current coverage.
    pub fn cost(&self) -> f64 {
        (0..self.counts.len()).map(|c| self.cell_cost(c)).sum()
    }

    /// Adds one grain's coverage; returns the cost delta.
    pub fn add(&mut self, cells: &[usize]) -> f64 {
        let mut delta = 0.0;
        for &cell in cells {
            let before = self.cell_cost(cell);
            self.counts[cell] += 1;
            delta += self.cell_cost(cell) - before;
        }
        delta
    }

    /// Removes one grain's coverage; returns the cost delta.
    pub fn remove(&mut self, cells: &[usize]) -> f64 {
        let mut delta = 0.0;
        for &cell in cells {
            let before = self.cell_cost(cell);
            self.counts[cell] = self.counts[cell].saturating_sub(1);
            delta += self.cell_cost(cell) - before;
        }
        delta
    }

    /// Packing quality of one grain: overlap excess plus mask-violating cells,
    /// per covered cell. Zero is a perfect fit.
    pub fn quality(&self, cells: &[usize]) -> f64 {
        if cells.is_empty() {
            return 0.0;
        }
        let penalty: f64 = cells
            .iter()
            .map(|&cell| {
                let overlap = self.counts[cell].saturating_sub(1) as f64;
                let outside = if self.packable[cell] { 0.0 } else { 1.0 };
                overlap + outside
            })
            .sum();
        penalty / cells.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeType;
    use approx::assert_relative_eq;
    use farfield_core::EulerAngles;

    fn sphere(x: f64, y: f64, z: f64, r: f64) -> ShapeEvaluator {
        ShapeEvaluator::new(
            ShapeType::Ellipsoid,
            Point3::new(x, y, z),
            [r, r, r],
            &EulerAngles::zero(),
            1.0,
        )
    }

    #[test]
    fn test_grid_dims_round_up() {
        let grid = PackingGrid::new(&Domain::uniform([5, 4, 1], 1.0), 2, 1.0);
        assert_eq!(grid.dims(), [3, 2, 1]);
        assert_eq!(grid.cell_count(), 6);
        // Partial cells are centred on their in-domain part.
        let c = grid.cell_center(2);
        assert_relative_eq!(c.x, 4.5);
        assert_relative_eq!(c.z, 0.5);
    }

    #[test]
    fn test_packable_follows_mask() {
        let mut mask = vec![true; 16];
        for &v in &[0, 1, 4, 5] {
            mask[v] = false;
        }
        let domain = Domain::uniform([4, 4, 1], 1.0).with_mask(mask);
        let grid = PackingGrid::new(&domain, 2, 1.0);
        assert!(!grid.is_packable(0));
        assert_eq!(grid.packable_count(), 3);
    }

    #[test]
    fn test_coverage_of_sphere() {
        let grid = PackingGrid::new(&Domain::uniform([10, 10, 10], 1.0), 1, 1.0);
        let cells = grid.coverage(&sphere(5.0, 5.0, 5.0, 1.0));
        // Cell centres at distance ≤ 1 from (5,5,5): the 8 centres at (4.5|5.5)^3 are
        // at distance 0.866.
        assert_eq!(cells.len(), 8);
    }

    #[test]
    fn test_tiny_grain_covers_its_centroid_cell() {
        let grid = PackingGrid::new(&Domain::uniform([10, 10, 10], 1.0), 2, 1.0);
        let cells = grid.coverage(&sphere(3.1, 3.1, 3.1, 0.1));
        assert_eq!(cells, vec![grid.cell_of(&Point3::new(3.1, 3.1, 3.1)).unwrap()]);

        let outside = grid.coverage(&sphere(-5.0, 3.0, 3.0, 0.1));
        assert!(outside.is_empty());
    }

    #[test]
    fn test_incremental_cost_matches_full_cost() {
        let mut mask = vec![true; 64];
        mask[0] = false;
        let domain = Domain::uniform([4, 4, 4], 1.0).with_mask(mask);
        let mut grid = PackingGrid::new(&domain, 1, 3.0);

        let before = grid.cost();
        assert_relative_eq!(before, 63.0);

        let a = grid.coverage(&sphere(1.0, 1.0, 1.0, 1.2));
        let b = grid.coverage(&sphere(1.5, 1.5, 1.5, 1.2));
        let mut running = before;
        running += grid.add(&a);
        running += grid.add(&b);
        assert_relative_eq!(running, grid.cost(), epsilon = 1e-9);
        running += grid.remove(&a);
        assert_relative_eq!(running, grid.cost(), epsilon = 1e-9);
    }

    #[test]
    fn test_quality() {
        let mut mask = vec![true; 8];
        mask[0] = false;
        let domain = Domain::uniform([2, 2, 2], 1.0).with_mask(mask);
        let mut grid = PackingGrid::new(&domain, 1, 1.0);

        let cells = vec![0, 1, 2, 3];
        grid.add(&cells);
        grid.add(&[1]);
        // Cell 0 violates the mask, cell 1 is doubly covered.
        assert_relative_eq!(grid.quality(&cells), 2.0 / 4.0);
        assert_relative_eq!(grid.quality(&[2, 3]), 0.0);
    }
}
