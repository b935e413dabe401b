//! # farfield synth
//!
//! Synthetic polycrystal builder for the farfield workspace.
//!
//! Grains are drawn from per-phase statistics, packed into a voxel domain by
//! simulated annealing, rasterized, gap filled, merged across twin boundaries
//! and given per-voxel orientations. [`Tessellator`] runs the whole chain;
//! every stage is also usable on its own.

pub mod cells;
pub mod config;
pub mod domain;
pub mod feature;
pub mod gap_fill;
pub mod generator;
pub mod orientation;
pub mod packing_utils;
pub mod result;
pub mod sa_packing;
pub mod shape;
pub mod spatial;
pub mod stats;
pub mod tessellator;
pub mod twins;
pub mod voxelize;

// Re-exports
pub use cells::CellData;
pub use config::TessellationConfig;
pub use domain::Domain;
pub use feature::{Feature, FeatureTable};
pub use gap_fill::{GapFillReport, GapFiller};
pub use generator::{Admission, FeatureGenerator, GeneratorConfig, Generation, RejectedFeature};
pub use orientation::{reduce_feature_orientations, OrientationAssigner};
pub use result::{Diagnostics, FeatureArrays, TessellationResult};
pub use sa_packing::{
    PackingConfig, PackingEngine, PackingFailure, PackingFailureKind, PackingMoveKind,
    PackingReport, SizeHistogram, UnplacedPolicy,
};
pub use shape::{ShapeEvaluator, ShapeOps, ShapeType};
pub use stats::{
    Ensemble, Odf, PhaseInfo, PhaseStatistics, ShapeDistribution, SizeDistribution, StatsData,
    TextureComponent,
};
pub use tessellator::Tessellator;
pub use twins::{TwinConfig, TwinMerge, TwinMerger, TwinPair};
pub use voxelize::{ContainmentPriority, VoxelAssignmentEngine};
pub use farfield_core::{CrystalStructure, Error, EulerAngles, Result, TwinLaw};
