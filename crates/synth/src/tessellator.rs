//! Full tessellation pipeline.

use crate::cells::CellData;
use crate::config::TessellationConfig;
use crate::domain::Domain;
use crate::feature::{Feature, FeatureTable};
use crate::gap_fill::GapFiller;
use crate::generator::FeatureGenerator;
use crate::orientation::{reduce_feature_orientations, OrientationAssigner};
use crate::result::{Diagnostics, TessellationResult};
use crate::sa_packing::PackingEngine;
use crate::stats::{Ensemble, StatsData};
use crate::twins::TwinMerger;
use crate::voxelize::VoxelAssignmentEngine;
use farfield_core::Result;
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Runs generation, packing, rasterization, gap filling, twin merging and
/// orientation assignment in sequence.
pub struct Tessellator {
    config: TessellationConfig,
    cancelled: Arc<AtomicBool>,
}

impl Tessellator {
    /// Creates a tessellator with the given configuration.
    pub fn new(config: TessellationConfig) -> Self {
        Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a tessellator with default configuration.
    pub fn default_config() -> Self {
        Self::new(TessellationConfig::default())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TessellationConfig {
        &self.config
    }

    /// Requests cancellation. The annealer stops at its next temperature
    /// level and the remaining stages still produce a consistent result.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns a handle that cancels this tessellator when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Generates grains from statistics and tessellates the domain with them.
    pub fn run(&self, domain: &Domain, stats: &StatsData) -> Result<TessellationResult> {
        let start = Instant::now();
        self.config.validate()?;
        domain.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let generation = FeatureGenerator::new(stats, self.config.generator)
            .generate(domain.packable_volume(), &mut rng)?;

        let diagnostics = Diagnostics {
            skipped_phases: generation.skipped_phases,
            generation_capped: generation.capped,
            ..Diagnostics::default()
        };
        self.tessellate(
            domain,
            generation.ensemble,
            generation.features,
            diagnostics,
            start,
        )
    }

    /// Tessellates the domain with an externally supplied feature list.
    ///
    /// Inputs with an unknown phase, an unknown slab or an unusable size are
    /// refused and reported in the diagnostics.
    pub fn run_with_features(
        &self,
        domain: &Domain,
        ensemble: Ensemble,
        features: Vec<Feature>,
    ) -> Result<TessellationResult> {
        let start = Instant::now();
        self.config.validate()?;
        domain.validate()?;

        let admission = FeatureGenerator::admit(features, &ensemble, domain)?;
        let diagnostics = Diagnostics {
            rejected_input_features: admission.rejected,
            ..Diagnostics::default()
        };
        self.tessellate(domain, ensemble, admission.features, diagnostics, start)
    }

    fn tessellate(
        &self,
        domain: &Domain,
        ensemble: Ensemble,
        mut features: FeatureTable,
        mut diagnostics: Diagnostics,
        start: Instant,
    ) -> Result<TessellationResult> {
        if self.config.reduce_orientations {
            reduce_feature_orientations(&mut features, &ensemble);
        }

        let packing = PackingEngine::new(self.config.packing.clone())
            .with_cancel_handle(self.cancelled.clone())
            .pack(domain, &ensemble, &mut features, self.config.seed)?;
        diagnostics.packing_failures = packing.failures.clone();

        let mut ids =
            VoxelAssignmentEngine::new(self.config.priority).assign(domain, &features, &ensemble)?;
        diagnostics.unassigned_after_raster = ids
            .iter()
            .enumerate()
            .filter(|&(v, &id)| id == 0 && domain.is_included(v))
            .count();

        diagnostics.gap_fill = GapFiller::new().fill(domain, &mut ids)?;

        let merge = TwinMerger::new(self.config.twins.clone())
            .merge(domain, &ids, &mut features, &ensemble)?;
        diagnostics.twin_pairs = merge.pairs;

        let mut cells = CellData::new(domain.voxel_count());
        cells.boundary = VoxelAssignmentEngine::mark_boundaries(domain, &ids)?;
        cells.feature_ids = ids;
        OrientationAssigner::assign(&mut cells, &features, &merge.new_names)?;

        diagnostics.cancelled = packing.anneal.cancelled || self.cancelled.load(Ordering::Relaxed);
        diagnostics.elapsed = start.elapsed();

        info!(
            "Tessellated {} voxels with {} features ({} packing failures, {} unreachable voxels) in {:?}",
            domain.voxel_count(),
            features.len(),
            diagnostics.packing_failures.len(),
            diagnostics.gap_fill.unreachable,
            diagnostics.elapsed
        );

        Ok(TessellationResult {
            cells,
            features,
            ensemble,
            new_names: merge.new_names,
            packing,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeType;
    use crate::stats::{PhaseInfo, PhaseStatistics, SizeDistribution};
    use farfield_core::{CrystalStructure, Error, SaConfig};
    use nalgebra::Point3;

    fn quick_config(seed: u64) -> TessellationConfig {
        let mut config = TessellationConfig::new().with_seed(seed);
        config.packing.sa = SaConfig::new().with_max_iterations(2_000);
        config
    }

    fn stats() -> StatsData {
        StatsData::new(vec![PhaseStatistics::new(
            CrystalStructure::CubicHigh,
            SizeDistribution::new(1.2, 0.2),
        )])
    }

    #[test]
    fn test_every_packable_voxel_gets_an_owner() {
        let domain = Domain::uniform([12, 12, 12], 1.0);
        let result = Tessellator::new(quick_config(3)).run(&domain, &stats()).unwrap();

        assert!(result.feature_count() > 0);
        assert!(result.is_complete());
        assert!(result.cells.feature_ids.iter().all(|&id| id != 0));
        assert!(result
            .cells
            .feature_ids
            .iter()
            .all(|&id| id as usize <= result.feature_count()));
        assert!(result.cells.phases.iter().all(|&p| p == 1));
        assert_eq!(result.new_names.len(), result.feature_count() + 1);
    }

    #[test]
    fn test_same_seed_same_result() {
        let domain = Domain::uniform([10, 10, 6], 1.0);
        let a = Tessellator::new(quick_config(11)).run(&domain, &stats()).unwrap();
        let b = Tessellator::new(quick_config(11)).run(&domain, &stats()).unwrap();
        assert_eq!(a.cells, b.cells);
        assert_eq!(a.features, b.features);
    }

    #[test]
    fn test_cancelled_run_is_still_consistent() {
        let domain = Domain::uniform([10, 10, 4], 1.0);
        let tessellator = Tessellator::new(quick_config(5));
        tessellator.cancel();
        let result = tessellator.run(&domain, &stats()).unwrap();
        assert!(result.diagnostics.cancelled);
        assert!(!result.is_complete());
        assert_eq!(result.cells.unassigned_count(&domain), 0);
    }

    #[test]
    fn test_configuration_errors_come_first() {
        let domain = Domain::uniform([0, 4, 4], 1.0);
        let err = Tessellator::default_config().run(&domain, &stats()).unwrap_err();
        assert!(matches!(err, Error::InvalidDomain(_)));

        let empty = StatsData::new(vec![]);
        let err = Tessellator::default_config()
            .run(&Domain::uniform([4, 4, 4], 1.0), &empty)
            .unwrap_err();
        assert!(matches!(err, Error::NoFeatureStatistics(_)));
    }

    #[test]
    fn test_input_features_are_admitted() {
        let domain = Domain::uniform([8, 8, 2], 1.0);
        let ensemble = Ensemble::new(vec![PhaseInfo::new(
            CrystalStructure::Orthorhombic,
            ShapeType::Ellipsoid,
        )]);
        let features = vec![
            Feature::new(1)
                .with_axis_lengths(2.5, 2.5, 1.0)
                .with_centroid(2.0, 2.0, 1.0),
            Feature::new(1)
                .with_axis_lengths(2.5, 2.5, 1.0)
                .with_centroid(6.0, 6.0, 1.0),
            Feature::new(1).with_axis_lengths(0.0, 1.0, 1.0),
            Feature::new(7).with_axis_lengths(1.0, 1.0, 1.0),
        ];
        let result = Tessellator::new(quick_config(1))
            .run_with_features(&domain, ensemble, features)
            .unwrap();

        assert_eq!(result.feature_count(), 2);
        let rejected: Vec<usize> = result
            .diagnostics
            .rejected_input_features
            .iter()
            .map(|r| r.index)
            .collect();
        assert_eq!(rejected, vec![2, 3]);
        assert_eq!(result.cells.unassigned_count(&domain), 0);

        // Measured grains are neither moved nor resized.
        let kept: Vec<_> = result.features.iter().map(|f| (f.centroid, f.axis_lengths)).collect();
        assert_eq!(
            kept,
            vec![
                (Some(Point3::new(2.0, 2.0, 1.0)), [2.5, 2.5, 1.0]),
                (Some(Point3::new(6.0, 6.0, 1.0)), [2.5, 2.5, 1.0]),
            ]
        );
        assert_eq!(result.packing.anneal.iterations, 0);
    }
}
