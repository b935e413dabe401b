//! Tessellation result representation.

use crate::cells::CellData;
use crate::feature::FeatureTable;
use crate::gap_fill::GapFillReport;
use crate::generator::RejectedFeature;
use crate::sa_packing::{PackingFailure, PackingReport, SizeHistogram};
use crate::stats::Ensemble;
use crate::twins::TwinPair;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Non-fatal findings of a run.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    /// Phases skipped for invalid statistics.
    pub skipped_phases: Vec<u32>,
    /// Whether generation stopped at the feature cap.
    pub generation_capped: bool,
    /// Input features refused at admission.
    pub rejected_input_features: Vec<RejectedFeature>,
    /// Features the packer could not place properly.
    pub packing_failures: Vec<PackingFailure>,
    /// Packable voxels left without an owner by rasterization.
    pub unassigned_after_raster: usize,
    /// Gap fill outcome; `unreachable` voxels stay 0.
    pub gap_fill: GapFillReport,
    /// Grain pairs merged as twins.
    pub twin_pairs: Vec<TwinPair>,
    /// Whether the run was cancelled (the result is still consistent).
    pub cancelled: bool,
    /// Wall time of the whole pipeline.
    pub elapsed: Duration,
}

/// Per-feature arrays; index 0 is reserved and zeroed.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureArrays {
    /// Phase id.
    pub phases: Vec<u32>,
    /// Equivalent sphere diameter.
    pub equivalent_diameters: Vec<f32>,
    /// Semi-axes `a ≥ b ≥ c`.
    pub axis_lengths: Vec<[f32; 3]>,
    /// Bunge angles of the shape axes, radians.
    pub axis_euler_angles: Vec<[f32; 3]>,
    /// Omega3 shape factor (1 = ellipsoid).
    pub omega3s: Vec<f32>,
    /// Packed centroid; unplaced features are zeroed.
    pub centroids: Vec<[f32; 3]>,
    /// Shape volume.
    pub volumes: Vec<f32>,
    /// Voigt placeholder, always zero.
    pub elastic_strains: Vec<[f32; 6]>,
    /// Slab id (0 = none).
    pub slab_ids: Vec<u32>,
    /// Crystal orientation, Bunge radians.
    pub orientations: Vec<[f32; 3]>,
    /// Canonical id after twin merging.
    pub new_names: Vec<u32>,
}

impl FeatureArrays {
    /// Flattens a feature table.
    pub fn from_features(features: &FeatureTable) -> Self {
        let mut arrays = Self::with_reserved_slot(features.len() + 1);
        for f in features {
            let [a, b, c] = f.axis_lengths;
            arrays.phases.push(f.phase);
            arrays.equivalent_diameters.push(f.equivalent_diameter as f32);
            arrays.axis_lengths.push([a as f32, b as f32, c as f32]);
            arrays.axis_euler_angles.push(f.axis_euler.to_f32());
            arrays.omega3s.push(f.omega3 as f32);
            arrays.centroids.push(
                f.centroid
                    .map_or([0.0; 3], |p| [p.x as f32, p.y as f32, p.z as f32]),
            );
            arrays.volumes.push(f.volume as f32);
            arrays.elastic_strains.push(f.elastic_strains.map(|s| s as f32));
            arrays.slab_ids.push(f.slab_id);
            arrays.orientations.push(f.orientation.to_f32());
            arrays.new_names.push(f.new_name);
        }
        arrays
    }

    fn with_reserved_slot(capacity: usize) -> Self {
        fn slot<T: Default>(capacity: usize) -> Vec<T> {
            let mut v = Vec::with_capacity(capacity);
            v.push(T::default());
            v
        }
        Self {
            phases: slot(capacity),
            equivalent_diameters: slot(capacity),
            axis_lengths: slot(capacity),
            axis_euler_angles: slot(capacity),
            omega3s: slot(capacity),
            centroids: slot(capacity),
            volumes: slot(capacity),
            elastic_strains: slot(capacity),
            slab_ids: slot(capacity),
            orientations: slot(capacity),
            new_names: slot(capacity),
        }
    }

    /// Number of entries including the reserved slot.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Returns true if there are no features besides the reserved slot.
    pub fn is_empty(&self) -> bool {
        self.phases.len() <= 1
    }
}

/// Output of a full tessellation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TessellationResult {
    /// Per-voxel arrays.
    pub cells: CellData,
    /// Final feature table.
    pub features: FeatureTable,
    /// Phase table (row 0 = unknown).
    pub ensemble: Ensemble,
    /// Canonical id per feature id after twin merging (index 0 → 0).
    pub new_names: Vec<u32>,
    /// Packing statistics.
    pub packing: PackingReport,
    /// Non-fatal findings.
    pub diagnostics: Diagnostics,
}

impl TessellationResult {
    /// Number of features.
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Per-feature packing quality (index 0 reserved).
    pub fn pack_qualities(&self) -> &[f64] {
        &self.packing.qualities
    }

    /// Per-phase size histograms.
    pub fn size_histograms(&self) -> &[SizeHistogram] {
        &self.packing.size_histograms
    }

    /// Crystal-structure codes per phase (index 0 = unknown).
    pub fn crystal_structure_codes(&self) -> Vec<u32> {
        self.ensemble.crystal_structure_codes()
    }

    /// Per-feature arrays (index 0 reserved).
    pub fn feature_arrays(&self) -> FeatureArrays {
        FeatureArrays::from_features(&self.features)
    }

    /// Fraction of voxels owned by some grain.
    pub fn assigned_fraction(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        let owned = self.cells.feature_ids.iter().filter(|&&id| id != 0).count();
        owned as f64 / self.cells.len() as f64
    }

    /// Returns true if the run finished and every packable voxel has an owner.
    pub fn is_complete(&self) -> bool {
        !self.diagnostics.cancelled && self.diagnostics.gap_fill.unreachable == 0
    }

    /// Number of distinct grains after twin merging.
    pub fn merged_grain_count(&self) -> usize {
        let mut names: Vec<u32> = self.new_names.iter().skip(1).copied().collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }
}
