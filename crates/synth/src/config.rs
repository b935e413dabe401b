//! Top-level pipeline configuration.

use crate::generator::GeneratorConfig;
use crate::sa_packing::PackingConfig;
use crate::twins::TwinConfig;
use crate::voxelize::ContainmentPriority;
use farfield_core::{Error, Result};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of a full tessellation run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TessellationConfig {
    /// Seed of every random stream in the run.
    pub seed: u64,
    /// Grain generation limits.
    pub generator: GeneratorConfig,
    /// Annealing and packing grid settings.
    pub packing: PackingConfig,
    /// Owner selection for voxels inside several grains.
    pub priority: ContainmentPriority,
    /// Twin merging.
    pub twins: TwinConfig,
    /// Whether feature orientations are reduced to the fundamental zone.
    pub reduce_orientations: bool,
}

impl Default for TessellationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            generator: GeneratorConfig::default(),
            packing: PackingConfig::default(),
            priority: ContainmentPriority::default(),
            twins: TwinConfig::default(),
            reduce_orientations: true,
        }
    }
}

impl TessellationConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the generator limits.
    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    /// Sets the packing configuration.
    pub fn with_packing(mut self, packing: PackingConfig) -> Self {
        self.packing = packing;
        self
    }

    /// Sets the containment priority.
    pub fn with_priority(mut self, priority: ContainmentPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the twin configuration.
    pub fn with_twins(mut self, twins: TwinConfig) -> Self {
        self.twins = twins;
        self
    }

    /// Enables or disables fundamental-zone reduction.
    pub fn with_reduce_orientations(mut self, reduce: bool) -> Self {
        self.reduce_orientations = reduce;
        self
    }

    /// Limits the annealing wall time.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.packing.sa = self.packing.sa.with_time_limit(limit);
        self
    }

    /// Checks every nested configuration.
    pub fn validate(&self) -> Result<()> {
        if self.generator.max_features == 0 {
            return Err(Error::ConfigError("max_features must be at least 1".into()));
        }
        if self.generator.max_rejections == 0 {
            return Err(Error::ConfigError("max_rejections must be at least 1".into()));
        }
        self.packing.validate()?;
        self.twins.validate()
    }
}
