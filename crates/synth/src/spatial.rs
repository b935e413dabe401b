//! Uniform-bin spatial index over feature bounding boxes.

use crate::domain::Domain;
use farfield_core::AABB3D;
use nalgebra::Point3;

/// Buckets feature ids by the bins their bounding boxes overlap.
///
/// A query returns the candidates of the bin containing the point, in the
/// order they were inserted.
#[derive(Debug, Clone)]
pub struct BinIndex {
    origin: [f64; 3],
    bin_size: [f64; 3],
    dims: [usize; 3],
    bins: Vec<Vec<u32>>,
}

impl BinIndex {
    /// Creates an empty index over the domain with bins of roughly
    /// `bin_edge` length (at least one voxel).
    pub fn new(domain: &Domain, bin_edge: f64) -> Self {
        let extent = domain.extent();
        let res = domain.resolution();
        let mut dims = [1usize; 3];
        let mut bin_size = [0.0; 3];
        for axis in 0..3 {
            let edge = if bin_edge.is_finite() {
                bin_edge.max(res[axis])
            } else {
                extent[axis]
            };
            dims[axis] = ((extent[axis] / edge).ceil() as usize).clamp(1, domain.dims()[axis]);
            bin_size[axis] = extent[axis] / dims[axis] as f64;
        }
        Self {
            origin: domain.origin(),
            bin_size,
            dims,
            bins: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
        }
    }

    /// Builds an index with a bin edge near the mean box size.
    pub fn build<I>(domain: &Domain, boxes: I) -> Self
    where
        I: IntoIterator<Item = (u32, AABB3D<f64>)>,
        I::IntoIter: Clone,
    {
        let boxes = boxes.into_iter();
        let (sum, count) = boxes.clone().fold((0.0, 0usize), |(s, n), (_, b)| {
            let e = b.extent();
            (s + (e[0] + e[1] + e[2]) / 3.0, n + 1)
        });
        let edge = if count > 0 { sum / count as f64 } else { f64::INFINITY };

        let mut index = Self::new(domain, edge);
        for (id, aabb) in boxes {
            index.insert(id, &aabb);
        }
        index
    }

    /// Bin counts along x, y, z.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn bin_coord(&self, axis: usize, v: f64) -> isize {
        ((v - self.origin[axis]) / self.bin_size[axis]).floor() as isize
    }

    /// Adds a feature to every bin its box overlaps. Boxes outside the domain
    /// are ignored.
    pub fn insert(&mut self, id: u32, aabb: &AABB3D<f64>) {
        let lo = aabb.min();
        let hi = aabb.max();
        let mut range = [(0usize, 0usize); 3];
        for axis in 0..3 {
            let n = self.dims[axis] as isize;
            let a = self.bin_coord(axis, lo[axis]).max(0);
            let b = self.bin_coord(axis, hi[axis]).min(n - 1);
            if a > b {
                return;
            }
            range[axis] = (a as usize, b as usize);
        }
        for z in range[2].0..=range[2].1 {
            for y in range[1].0..=range[1].1 {
                for x in range[0].0..=range[0].1 {
                    let bin = (z * self.dims[1] + y) * self.dims[0] + x;
                    self.bins[bin].push(id);
                }
            }
        }
    }

    /// Candidates whose boxes overlap the bin containing `p`.
    pub fn query(&self, p: &Point3<f64>) -> &[u32] {
        let mut c = [0usize; 3];
        for (axis, coord) in c.iter_mut().enumerate() {
            let k = self.bin_coord(axis, p[axis]);
            if k < 0 || k >= self.dims[axis] as isize {
                return &[];
            }
            *coord = k as usize;
        }
        &self.bins[(c[2] * self.dims[1] + c[1]) * self.dims[0] + c[0]]
    }

    /// Reorders every bin by a rank (lower rank first).
    pub fn sort_bins_by_key<K: Ord, F: Fn(u32) -> K>(&mut self, key: F) {
        for bin in &mut self.bins {
            bin.sort_by_key(|&id| key(id));
        }
    }
}
