//! Run-spec parsing and conversion to pipeline inputs.

use crate::spec::{DomainSpec, FeatureSpec, MaskRun, PhaseSpec, RunSpec};
use farfield_core::{CrystalStructure, EulerAngles};
use log::{debug, info};
use farfield_synth::{
    Domain, Ensemble, Feature, PhaseStatistics, StatsData, TessellationConfig,
    TessellationResult, Tessellator,
};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur when reading a run spec.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid run spec: {0}")]
    InvalidFormat(String),
}

/// Pipeline inputs built from a [`RunSpec`].
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub name: String,
    pub domain: Domain,
    pub stats: StatsData,
    /// Explicit grains, if the spec lists any.
    pub features: Option<Vec<Feature>>,
    pub config: TessellationConfig,
}

impl PreparedRun {
    /// Runs the pipeline.
    pub fn execute(&self) -> farfield_core::Result<TessellationResult> {
        info!(
            "Executing run '{}' on {} voxels (seed {})",
            self.name,
            self.domain.voxel_count(),
            self.config.seed
        );
        let tessellator = Tessellator::new(self.config.clone());
        match &self.features {
            Some(features) => tessellator.run_with_features(
                &self.domain,
                Ensemble::from_stats(&self.stats),
                features.clone(),
            ),
            None => tessellator.run(&self.domain, &self.stats),
        }
    }
}

/// Reader for JSON run specs.
#[derive(Debug, Default)]
pub struct SpecParser;

impl SpecParser {
    /// Creates a new parser.
    pub fn new() -> Self {
        Self
    }

    /// Parses a run spec from a JSON file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<RunSpec, ParseError> {
        let content = fs::read_to_string(path)?;
        self.parse_json(&content)
    }

    /// Parses a run spec from a JSON string.
    pub fn parse_json(&self, json: &str) -> Result<RunSpec, ParseError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Converts a spec into pipeline inputs.
    pub fn prepare(&self, spec: RunSpec) -> Result<PreparedRun, ParseError> {
        if spec.phases.is_empty() {
            return Err(ParseError::InvalidFormat("no phases given".into()));
        }
        let domain = self.convert_domain(&spec.domain)?;
        let phases: Result<Vec<PhaseStatistics>, ParseError> =
            spec.phases.iter().map(|p| self.convert_phase(p)).collect();
        let features = if spec.features.is_empty() {
            None
        } else {
            Some(spec.features.iter().map(convert_feature).collect())
        };

        debug!(
            "Prepared run '{}': {} phases, {} input features",
            spec.name,
            spec.phases.len(),
            spec.features.len()
        );
        Ok(PreparedRun {
            name: spec.name,
            domain,
            stats: StatsData::new(phases?),
            features,
            config: spec.config,
        })
    }

    fn convert_domain(&self, raw: &DomainSpec) -> Result<Domain, ParseError> {
        let mut domain = Domain::new(raw.dims, raw.resolution)
            .with_origin(raw.origin)
            .with_slabs(raw.slabs);
        if let Some(runs) = &raw.mask {
            domain = domain.with_mask(expand_mask(runs));
        }
        Ok(domain)
    }

    fn convert_phase(&self, raw: &PhaseSpec) -> Result<PhaseStatistics, ParseError> {
        let structure = structure_from_name(&raw.structure)?;
        Ok(PhaseStatistics::new(structure, raw.size)
            .with_phase_fraction(raw.fraction)
            .with_lattice_constants(raw.lattice_constants)
            .with_shape(raw.shape)
            .with_axis_ratios(raw.b_over_a, raw.c_over_a)
            .with_omega3(raw.omega3)
            .with_odf(raw.odf.clone())
            .with_axis_odf(raw.axis_odf.clone()))
    }
}

/// Resolves a crystal structure by name.
pub fn structure_from_name(name: &str) -> Result<CrystalStructure, ParseError> {
    match name.to_ascii_lowercase().as_str() {
        "cubic" | "cubic_high" | "m-3m" => Ok(CrystalStructure::CubicHigh),
        "hexagonal" | "hexagonal_high" | "6/mmm" => Ok(CrystalStructure::HexagonalHigh),
        "orthorhombic" | "mmm" => Ok(CrystalStructure::Orthorhombic),
        "triclinic" | "-1" => Ok(CrystalStructure::Triclinic),
        other => Err(ParseError::InvalidFormat(format!(
            "unknown crystal structure '{}'",
            other
        ))),
    }
}

/// Expands run-length mask pairs. The length is checked when the domain is
/// validated.
pub fn expand_mask(runs: &[MaskRun]) -> Vec<bool> {
    let total = runs.iter().map(|r| r.count).sum();
    let mut mask = Vec::with_capacity(total);
    for run in runs {
        mask.extend(std::iter::repeat(run.value).take(run.count));
    }
    mask
}

/// Compresses a mask into run-length pairs.
pub fn compress_mask(mask: &[bool]) -> Vec<MaskRun> {
    let mut runs: Vec<MaskRun> = Vec::new();
    for &value in mask {
        match runs.last_mut() {
            Some(run) if run.value == value => run.count += 1,
            _ => runs.push(MaskRun { value, count: 1 }),
        }
    }
    runs
}

fn convert_feature(raw: &FeatureSpec) -> Feature {
    let [a, b, c] = raw.axis_lengths;
    let [e1, e2, e3] = raw.axis_euler_deg;
    let [o1, o2, o3] = raw.orientation_deg;
    let mut feature = Feature::new(raw.phase)
        .with_axis_lengths(a, b, c)
        .with_axis_euler(EulerAngles::from_degrees(e1, e2, e3))
        .with_omega3(raw.omega3)
        .with_slab(raw.slab)
        .with_orientation(EulerAngles::from_degrees(o1, o2, o3));
    if let Some([x, y, z]) = raw.centroid {
        feature = feature.with_centroid(x, y, z);
    }
    feature
}
