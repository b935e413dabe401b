//! Per-voxel orientation and phase from the owning feature.

use crate::cells::CellData;
use crate::feature::FeatureTable;
use crate::stats::Ensemble;
use farfield_core::{Error, Result};
use log::debug;
use rayon::prelude::*;

/// Maps every feature's orientation into its structure's fundamental zone.
/// Features of structures without symmetry operators are left as they are.
pub fn reduce_feature_orientations(features: &mut FeatureTable, ensemble: &Ensemble) {
    features.iter_mut().for_each(|f| {
        if let Some(ops) = ensemble.crystal_structure(f.phase).laue_ops() {
            f.orientation = ops.reduce_euler(&f.orientation);
        }
    });
}

/// Writes orientation and phase arrays from the remapped owner of each voxel.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrientationAssigner;

impl OrientationAssigner {
    /// Fills `cells.orientations` and `cells.phases` from `cells.feature_ids`.
    ///
    /// A voxel owned by `id` takes the values of feature `new_names[id]`;
    /// unowned voxels get a zero triple and phase 0. Owners with phase 0 are
    /// written as phase 1. Re-running on the same inputs gives the same arrays.
    pub fn assign(cells: &mut CellData, features: &FeatureTable, new_names: &[u32]) -> Result<()> {
        let voxels = cells.feature_ids.len();
        if cells.orientations.len() != voxels || cells.phases.len() != voxels {
            return Err(Error::InvariantViolation(format!(
                "cell arrays disagree: {} ids, {} orientations, {} phases",
                voxels,
                cells.orientations.len(),
                cells.phases.len()
            )));
        }
        let n = features.len();
        if new_names.len() != n + 1 {
            return Err(Error::InvariantViolation(format!(
                "{} new names for {} features",
                new_names.len(),
                n
            )));
        }
        if let Some(&bad) = new_names.iter().find(|&&id| id as usize > n) {
            return Err(Error::InvariantViolation(format!(
                "new name {} exceeds feature count {}",
                bad, n
            )));
        }
        if let Some(&bad) = cells.feature_ids.par_iter().find_any(|&&id| id as usize > n) {
            return Err(Error::InvariantViolation(format!(
                "voxel references feature {} but only {} exist",
                bad, n
            )));
        }

        // Per-id lookup: (orientation, phase).
        let table: Vec<([f32; 3], u32)> = (0..=n)
            .map(|id| {
                features
                    .get(new_names[id])
                    .filter(|_| id != 0)
                    .map_or(([0.0; 3], 0), |owner| {
                        (owner.orientation.to_f32(), owner.phase.max(1))
                    })
            })
            .collect();

        cells
            .feature_ids
            .par_iter()
            .zip(cells.orientations.par_iter_mut())
            .zip(cells.phases.par_iter_mut())
            .for_each(|((&id, orientation), phase)| {
                let (o, p) = table[id as usize];
                *orientation = o;
                *phase = p;
            });

        debug!("Assigned orientations to {} voxels", cells.len());
        Ok(())
    }
}
