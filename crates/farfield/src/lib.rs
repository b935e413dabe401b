//! # farfield
//!
//! Synthetic polycrystalline microstructures matched to grain statistics.
//!
//! This crate provides:
//! - **Grain generation**: sizes, shapes and orientations drawn per phase
//! - **Packing**: simulated-annealing placement of grains in a voxel domain
//! - **Voxelization**: rasterization, gap filling and twin merging
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use farfield::synth::{Domain, PhaseStatistics, SizeDistribution, StatsData, Tessellator};
//! use farfield::core::CrystalStructure;
//!
//! let domain = Domain::uniform([64, 64, 64], 1.0);
//! let stats = StatsData::new(vec![PhaseStatistics::new(
//!     CrystalStructure::CubicHigh,
//!     SizeDistribution::new(1.6, 0.2),
//! )]);
//! let result = Tessellator::default_config().run(&domain, &stats)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `synth` (default): the tessellation pipeline
//! - `serde`: Serialization support

/// Shared types: errors, annealing, rotations, crystal symmetry.
pub use farfield_core as core;

/// The tessellation pipeline.
#[cfg(feature = "synth")]
pub use farfield_synth as synth;

// Re-export commonly used types at root level
pub use farfield_core::{CrystalStructure, Error, EulerAngles, Result};

#[cfg(feature = "synth")]
pub use farfield_synth::{Domain, StatsData, TessellationConfig, TessellationResult, Tessellator};
