//! JSON run description types.

use farfield_synth::{
    Odf, ShapeDistribution, ShapeType, SizeDistribution, TessellationConfig,
};
use serde::{Deserialize, Serialize};

/// A complete run: domain, grain statistics or an explicit feature list, and
/// pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpec {
    /// Run name, echoed in the report.
    #[serde(default = "default_name")]
    pub name: String,
    /// Voxel domain.
    pub domain: DomainSpec,
    /// Phase statistics, in phase-id order (phase 1 first).
    pub phases: Vec<PhaseSpec>,
    /// Explicit grains; when present, statistics are only used for the phase table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FeatureSpec>,
    /// Pipeline configuration.
    #[serde(default)]
    pub config: TessellationConfig,
}

/// Domain geometry and mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSpec {
    /// Voxel counts along x, y, z.
    pub dims: [usize; 3],
    /// Voxel edge lengths.
    #[serde(default = "unit_resolution")]
    pub resolution: [f64; 3],
    /// Position of the minimum corner.
    #[serde(default)]
    pub origin: [f64; 3],
    /// Number of z-slabs (0 = none).
    #[serde(default)]
    pub slabs: usize,
    /// Packable voxels as run-length pairs in x-fastest order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Vec<MaskRun>>,
}

/// `count` consecutive voxels with the same mask value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskRun {
    pub value: bool,
    pub count: usize,
}

/// Statistics of one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Crystal structure name: "cubic", "hexagonal", "orthorhombic" or "triclinic".
    pub structure: String,
    /// Relative volume fraction.
    #[serde(default = "unit_fraction")]
    pub fraction: f64,
    /// Lattice constants (a, b, c, alpha, beta, gamma).
    #[serde(default = "default_lattice")]
    pub lattice_constants: [f64; 6],
    #[serde(default)]
    pub shape: ShapeType,
    /// Log-normal equivalent-diameter distribution.
    pub size: SizeDistribution,
    #[serde(default)]
    pub b_over_a: ShapeDistribution,
    #[serde(default)]
    pub c_over_a: ShapeDistribution,
    #[serde(default)]
    pub omega3: ShapeDistribution,
    #[serde(default)]
    pub odf: Odf,
    #[serde(default)]
    pub axis_odf: Odf,
}

/// An explicit grain. Angles are in degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub phase: u32,
    /// Semi-axes, a ≥ b ≥ c.
    pub axis_lengths: [f64; 3],
    #[serde(default)]
    pub axis_euler_deg: [f64; 3],
    #[serde(default = "unit_fraction")]
    pub omega3: f64,
    /// Preset centroid; the packer draws one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<[f64; 3]>,
    #[serde(default)]
    pub slab: u32,
    #[serde(default)]
    pub orientation_deg: [f64; 3],
}

fn default_name() -> String {
    "farfield".to_string()
}

fn unit_resolution() -> [f64; 3] {
    [1.0; 3]
}

fn unit_fraction() -> f64 {
    1.0
}

fn default_lattice() -> [f64; 6] {
    [1.0, 1.0, 1.0, 90.0, 90.0, 90.0]
}

impl RunSpec {
    /// A small two-phase run used by `farfield example`.
    pub fn example() -> Self {
        Self {
            name: "two-phase-example".to_string(),
            domain: DomainSpec {
                dims: [32, 32, 16],
                resolution: [1.0; 3],
                origin: [0.0; 3],
                slabs: 0,
                mask: None,
            },
            phases: vec![
                PhaseSpec {
                    structure: "cubic".to_string(),
                    fraction: 0.8,
                    lattice_constants: [3.6, 3.6, 3.6, 90.0, 90.0, 90.0],
                    shape: ShapeType::Ellipsoid,
                    size: SizeDistribution::new(1.6, 0.2),
                    b_over_a: ShapeDistribution::Beta {
                        alpha: 15.0,
                        beta: 1.5,
                    },
                    c_over_a: ShapeDistribution::Beta {
                        alpha: 15.0,
                        beta: 2.0,
                    },
                    omega3: ShapeDistribution::Constant(1.0),
                    odf: Odf::Random,
                    axis_odf: Odf::Random,
                },
                PhaseSpec {
                    structure: "hexagonal".to_string(),
                    fraction: 0.2,
                    lattice_constants: [2.95, 2.95, 4.68, 90.0, 90.0, 120.0],
                    shape: ShapeType::SuperEllipsoid,
                    size: SizeDistribution::new(1.3, 0.15),
                    b_over_a: ShapeDistribution::Constant(0.8),
                    c_over_a: ShapeDistribution::Constant(0.5),
                    omega3: ShapeDistribution::Constant(0.8),
                    odf: Odf::Random,
                    axis_odf: Odf::Random,
                },
            ],
            features: Vec::new(),
            config: TessellationConfig::default().with_seed(1),
        }
    }
}
