//! Dense per-voxel output arrays.

use crate::domain::Domain;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-voxel arrays, all indexed like [`Domain::index`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellData {
    /// Owning feature id (0 = none).
    pub feature_ids: Vec<u32>,
    /// Phase of the owner (0 = none).
    pub phases: Vec<u32>,
    /// Whether a 6-neighbor differs in owner, is masked out or lies outside the grid.
    pub boundary: Vec<bool>,
    /// Bunge Euler angles of the owner.
    pub orientations: Vec<[f32; 3]>,
}

impl CellData {
    /// Zeroed arrays for `n` voxels.
    pub fn new(n: usize) -> Self {
        Self {
            feature_ids: vec![0; n],
            phases: vec![0; n],
            boundary: vec![false; n],
            orientations: vec![[0.0; 3]; n],
        }
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.feature_ids.len()
    }

    /// Returns true if there are no voxels.
    pub fn is_empty(&self) -> bool {
        self.feature_ids.is_empty()
    }

    /// Packable voxels still without an owner.
    pub fn unassigned_count(&self, domain: &Domain) -> usize {
        self.feature_ids
            .iter()
            .enumerate()
            .filter(|&(v, &id)| id == 0 && domain.is_included(v))
            .count()
    }

    /// Number of voxels owned by `id`.
    pub fn owned_by(&self, id: u32) -> usize {
        self.feature_ids.iter().filter(|&&f| f == id).count()
    }
}
