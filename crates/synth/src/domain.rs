//! Voxel domain: grid geometry, optional packing mask and z-slabs.

use farfield_core::{Error, Result, AABB3D};
use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A regular voxel grid that grains are packed into.
///
/// Voxels are stored x-fastest, then y, then z. The optional mask marks
/// packable voxels with `true`; excluded voxels never receive a grain.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Domain {
    /// Number of voxels along x, y, z.
    dims: [usize; 3],

    /// Voxel edge length along x, y, z.
    resolution: [f64; 3],

    /// Physical position of the grid corner.
    origin: [f64; 3],

    /// Packable voxels (`None` = every voxel).
    mask: Option<Vec<bool>>,

    /// Number of equal z-slabs (0 = no slab partitioning).
    slab_count: usize,
}

impl Domain {
    /// Creates a domain with the given voxel counts and per-axis resolution.
    pub fn new(dims: [usize; 3], resolution: [f64; 3]) -> Self {
        Self {
            dims,
            resolution,
            origin: [0.0; 3],
            mask: None,
            slab_count: 0,
        }
    }

    /// Creates a domain with cubic voxels.
    pub fn uniform(dims: [usize; 3], resolution: f64) -> Self {
        Self::new(dims, [resolution; 3])
    }

    /// Sets the grid origin.
    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// Restricts packing to voxels flagged `true`.
    pub fn with_mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Partitions the domain into `count` z-slabs of (nearly) equal thickness.
    pub fn with_slabs(mut self, count: usize) -> Self {
        self.slab_count = count;
        self
    }

    /// Returns the voxel counts.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Returns the voxel resolution.
    pub fn resolution(&self) -> [f64; 3] {
        self.resolution
    }

    /// Returns the grid origin.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Returns the mask, if any.
    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    /// Returns the number of z-slabs (0 = none).
    pub fn slab_count(&self) -> usize {
        self.slab_count
    }

    /// Total number of voxels.
    pub fn voxel_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Number of voxels in one z-slice.
    pub fn slice_len(&self) -> usize {
        self.dims[0] * self.dims[1]
    }

    /// Volume of one voxel.
    pub fn voxel_volume(&self) -> f64 {
        self.resolution[0] * self.resolution[1] * self.resolution[2]
    }

    /// Physical size along x, y, z.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.dims[0] as f64 * self.resolution[0],
            self.dims[1] as f64 * self.resolution[1],
            self.dims[2] as f64 * self.resolution[2],
        ]
    }

    /// Physical bounds of the grid.
    pub fn bounds(&self) -> AABB3D<f64> {
        let e = self.extent();
        AABB3D::new(
            self.origin[0],
            self.origin[1],
            self.origin[2],
            self.origin[0] + e[0],
            self.origin[1] + e[1],
            self.origin[2] + e[2],
        )
    }

    /// Number of packable voxels.
    pub fn packable_voxel_count(&self) -> usize {
        match &self.mask {
            Some(mask) => mask.iter().filter(|&&m| m).count(),
            None => self.voxel_count(),
        }
    }

    /// Volume available for packing (packable voxels only).
    pub fn packable_volume(&self) -> f64 {
        self.packable_voxel_count() as f64 * self.voxel_volume()
    }

    /// Linear index of voxel (x, y, z).
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    /// Voxel coordinates of a linear index.
    #[inline]
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let nx = self.dims[0];
        let ny = self.dims[1];
        [index % nx, (index / nx) % ny, index / (nx * ny)]
    }

    /// Physical centre of a voxel.
    pub fn voxel_center(&self, index: usize) -> Point3<f64> {
        let [x, y, z] = self.coords(index);
        Point3::new(
            self.origin[0] + (x as f64 + 0.5) * self.resolution[0],
            self.origin[1] + (y as f64 + 0.5) * self.resolution[1],
            self.origin[2] + (z as f64 + 0.5) * self.resolution[2],
        )
    }

    /// Whether a voxel may receive a grain.
    #[inline]
    pub fn is_included(&self, index: usize) -> bool {
        self.mask.as_ref().map_or(true, |m| m[index])
    }

    /// Whether a point lies inside the grid bounds.
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        self.bounds().contains([p.x, p.y, p.z])
    }

    /// Voxel containing a point, if the point is inside the grid.
    pub fn voxel_of(&self, p: &Point3<f64>) -> Option<usize> {
        let mut c = [0usize; 3];
        for axis in 0..3 {
            let t = (p[axis] - self.origin[axis]) / self.resolution[axis];
            if !(t >= 0.0 && t <= self.dims[axis] as f64) {
                return None;
            }
            // Points on the far face belong to the last voxel.
            c[axis] = (t.floor() as usize).min(self.dims[axis] - 1);
        }
        Some(self.index(c[0], c[1], c[2]))
    }

    /// Inclusive voxel index ranges `(min, max)` overlapped by a box, clipped to
    /// the grid. `None` when the box misses the grid.
    pub fn voxel_range(&self, aabb: &AABB3D<f64>) -> Option<([usize; 3], [usize; 3])> {
        let lo_pt = aabb.min();
        let hi_pt = aabb.max();
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for axis in 0..3 {
            let n = self.dims[axis] as f64;
            let a = (lo_pt[axis] - self.origin[axis]) / self.resolution[axis];
            let b = (hi_pt[axis] - self.origin[axis]) / self.resolution[axis];
            if !(b >= 0.0 && a < n) {
                return None;
            }
            lo[axis] = a.max(0.0).floor() as usize;
            hi[axis] = (b.min(n - 1.0).floor() as usize).max(lo[axis]);
        }
        Some((lo, hi))
    }

    /// Range of voxel z-indices `[start, end)` covered by a slab (1-based id).
    ///
    /// Slab 0 covers the whole grid. Any other id is `None` unless the domain
    /// was partitioned into at least that many slabs.
    pub fn slab_z_range(&self, slab: u32) -> Option<(usize, usize)> {
        let nz = self.dims[2];
        if slab == 0 {
            return Some((0, nz));
        }
        if self.slab_count == 0 {
            return None;
        }
        let j = slab as usize - 1;
        if j >= self.slab_count {
            return None;
        }
        Some((j * nz / self.slab_count, (j + 1) * nz / self.slab_count))
    }

    /// Slab id (1-based) of a voxel, or 0 when the domain has no slabs.
    pub fn voxel_slab(&self, index: usize) -> u32 {
        if self.slab_count == 0 {
            return 0;
        }
        let z = self.coords(index)[2];
        (1..=self.slab_count as u32)
            .find(|&s| {
                self.slab_z_range(s)
                    .map_or(false, |(lo, hi)| z >= lo && z < hi)
            })
            .unwrap_or(0)
    }

    /// Whether a point lies inside the physical z-range of a slab.
    pub fn point_in_slab(&self, p: &Point3<f64>, slab: u32) -> bool {
        match self.slab_z_range(slab) {
            Some((lo, hi)) => {
                let z0 = self.origin[2] + lo as f64 * self.resolution[2];
                let z1 = self.origin[2] + hi as f64 * self.resolution[2];
                p.z >= z0 && p.z <= z1
            }
            None => false,
        }
    }

    /// Whether a point may carry a centroid of a feature in `slab`: inside the
    /// grid, on a packable voxel and inside the slab.
    pub fn accepts_centroid(&self, p: &Point3<f64>, slab: u32) -> bool {
        match self.voxel_of(p) {
            Some(v) => self.is_included(v) && self.point_in_slab(p, slab),
            None => false,
        }
    }

    /// Packable voxels of a slab (slab 0 = the whole domain).
    pub fn packable_voxels(&self, slab: u32) -> Vec<usize> {
        let Some((lo, hi)) = self.slab_z_range(slab) else {
            return Vec::new();
        };
        let slice = self.slice_len();
        (lo * slice..hi * slice)
            .filter(|&v| self.is_included(v))
            .collect()
    }

    /// The 6-connected neighbors of a voxel: -x, +x, -y, +y, -z, +z.
    /// `None` marks a neighbor outside the grid.
    pub fn neighbors(&self, index: usize) -> [Option<usize>; 6] {
        let [x, y, z] = self.coords(index);
        let [nx, ny, nz] = self.dims;
        let slice = nx * ny;
        [
            (x > 0).then(|| index - 1),
            (x + 1 < nx).then(|| index + 1),
            (y > 0).then(|| index - nx),
            (y + 1 < ny).then(|| index + nx),
            (z > 0).then(|| index - slice),
            (z + 1 < nz).then(|| index + slice),
        ]
    }

    /// Validates the domain geometry and mask.
    pub fn validate(&self) -> Result<()> {
        if self.dims.iter().any(|&d| d == 0) {
            return Err(Error::InvalidDomain(format!(
                "all dimensions must be positive, got {:?}",
                self.dims
            )));
        }
        if self
            .resolution
            .iter()
            .any(|&r| !(r.is_finite() && r > 0.0))
        {
            return Err(Error::InvalidDomain(format!(
                "resolution must be positive, got {:?}",
                self.resolution
            )));
        }
        if self.origin.iter().any(|o| !o.is_finite()) {
            return Err(Error::InvalidDomain("origin must be finite".into()));
        }
        if let Some(mask) = &self.mask {
            if mask.len() != self.voxel_count() {
                return Err(Error::InvalidMask {
                    expected: self.voxel_count(),
                    found: mask.len(),
                });
            }
            if !mask.iter().any(|&m| m) {
                return Err(Error::InvalidDomain("mask excludes every voxel".into()));
            }
        }
        if self.slab_count > self.dims[2] {
            return Err(Error::InvalidDomain(format!(
                "{} slabs requested for {} z-slices",
                self.slab_count, self.dims[2]
            )));
        }
        Ok(())
    }

    /// Validates the domain and checks that a per-voxel array covers it.
    pub fn check_voxel_array(&self, len: usize) -> Result<()> {
        self.validate()?;
        if len != self.voxel_count() {
            return Err(Error::InvariantViolation(format!(
                "voxel array has {} entries, domain has {} voxels",
                len,
                self.voxel_count()
            )));
        }
        Ok(())
    }
}
