//! Rasterization of packed features onto the voxel grid.

use crate::domain::Domain;
use crate::feature::FeatureTable;
use crate::shape::ShapeEvaluator;
use crate::spatial::BinIndex;
use crate::stats::Ensemble;
use farfield_core::Result;
use log::debug;
use nalgebra::Point3;
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which feature wins a voxel contained in several grains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContainmentPriority {
    /// Largest volume first, ties to the lower id.
    #[default]
    LargestFirst,
    /// Lower (earlier generated) id first.
    GenerationOrder,
    /// Smallest normalized radial distance, ties by `LargestFirst`.
    SmallestRadialDistance,
}

/// Assigns every packable voxel to the feature containing its centre.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoxelAssignmentEngine {
    priority: ContainmentPriority,
}

impl VoxelAssignmentEngine {
    /// Creates an engine with the given tie-break.
    pub fn new(priority: ContainmentPriority) -> Self {
        Self { priority }
    }

    /// Returns the tie-break in use.
    pub fn priority(&self) -> ContainmentPriority {
        self.priority
    }

    fn evaluators(features: &FeatureTable, ensemble: &Ensemble) -> Vec<Option<ShapeEvaluator>> {
        features
            .iter()
            .map(|f| ShapeEvaluator::for_feature(f, ensemble.shape(f.phase)))
            .collect()
    }

    /// Rank of every feature (index = id − 1); lower ranks are tested first.
    fn ranks(&self, features: &FeatureTable) -> Vec<usize> {
        let mut order: Vec<usize> = (0..features.len()).collect();
        if self.priority != ContainmentPriority::GenerationOrder {
            let f = features.as_slice();
            order.sort_by(|&a, &b| {
                f[b].volume
                    .total_cmp(&f[a].volume)
                    .then(f[a].id.cmp(&f[b].id))
            });
        }
        let mut rank = vec![0; order.len()];
        for (r, &i) in order.iter().enumerate() {
            rank[i] = r;
        }
        rank
    }

    /// Picks the owner of `p` among candidates given in rank order.
    fn pick<I>(&self, candidates: I, p: &Point3<f64>, evaluators: &[Option<ShapeEvaluator>]) -> u32
    where
        I: IntoIterator<Item = u32>,
    {
        let shape = |id: u32| evaluators[id as usize - 1].as_ref();
        match self.priority {
            ContainmentPriority::LargestFirst | ContainmentPriority::GenerationOrder => candidates
                .into_iter()
                .find(|&id| shape(id).map_or(false, |e| e.contains(p)))
                .unwrap_or(0),
            ContainmentPriority::SmallestRadialDistance => {
                let mut best: Option<(f64, u32)> = None;
                for id in candidates {
                    let Some(e) = shape(id) else { continue };
                    let r = e.radial_distance(p);
                    if r <= 1.0 && best.map_or(true, |(b, _)| r < b) {
                        best = Some((r, id));
                    }
                }
                best.map_or(0, |(_, id)| id)
            }
        }
    }

    /// Owner id per voxel using the spatial index; masked-out and uncovered
    /// voxels get 0.
    pub fn assign(
        &self,
        domain: &Domain,
        features: &FeatureTable,
        ensemble: &Ensemble,
    ) -> Result<Vec<u32>> {
        domain.validate()?;
        let evaluators = Self::evaluators(features, ensemble);
        let ranks = self.ranks(features);

        let mut index = BinIndex::build(
            domain,
            evaluators
                .iter()
                .enumerate()
                .filter_map(|(i, e)| e.as_ref().map(|e| (i as u32 + 1, e.aabb()))),
        );
        index.sort_bins_by_key(|id| ranks[id as usize - 1]);

        let mut ids = vec![0u32; domain.voxel_count()];
        let slice = domain.slice_len();
        ids.par_chunks_mut(slice)
            .enumerate()
            .for_each(|(z, chunk)| {
                for (k, id) in chunk.iter_mut().enumerate() {
                    let v = z * slice + k;
                    if !domain.is_included(v) {
                        continue;
                    }
                    let p = domain.voxel_center(v);
                    *id = self.pick(index.query(&p).iter().copied(), &p, &evaluators);
                }
            });

        debug!(
            "Rasterized {} features over {:?} bins, {} voxels owned",
            features.placed_count(),
            index.dims(),
            ids.iter().filter(|&&id| id != 0).count()
        );
        Ok(ids)
    }

    /// Same result as [`assign`](Self::assign), testing every feature at every voxel.
    #[cfg(any(test, feature = "validation"))]
    pub fn assign_exhaustive(
        &self,
        domain: &Domain,
        features: &FeatureTable,
        ensemble: &Ensemble,
    ) -> Result<Vec<u32>> {
        domain.validate()?;
        let evaluators = Self::evaluators(features, ensemble);
        let ranks = self.ranks(features);
        let mut order: Vec<u32> = (1..=features.len() as u32).collect();
        order.sort_by_key(|&id| ranks[id as usize - 1]);

        Ok((0..domain.voxel_count())
            .map(|v| {
                if domain.is_included(v) {
                    self.pick(order.iter().copied(), &domain.voxel_center(v), &evaluators)
                } else {
                    0
                }
            })
            .collect())
    }

    /// Boundary flag per voxel: a packable voxel is on a boundary when any
    /// 6-neighbor lies outside the grid, is masked out, or has another owner.
    /// Masked-out voxels are never flagged.
    pub fn mark_boundaries(domain: &Domain, ids: &[u32]) -> Result<Vec<bool>> {
        domain.check_voxel_array(ids.len())?;
        let mut flags = vec![false; ids.len()];
        let slice = domain.slice_len();
        flags
            .par_chunks_mut(slice)
            .enumerate()
            .for_each(|(z, chunk)| {
                for (k, flag) in chunk.iter_mut().enumerate() {
                    let v = z * slice + k;
                    if !domain.is_included(v) {
                        continue;
                    }
                    *flag = domain.neighbors(v).iter().any(|n| match *n {
                        None => true,
                        Some(n) => !domain.is_included(n) || ids[n] != ids[v],
                    });
                }
            });
        Ok(flags)
    }
}
