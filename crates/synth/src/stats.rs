//! Per-phase grain statistics and the ensemble (phase) table.

use crate::shape::ShapeType;
use farfield_core::{CrystalStructure, Error, EulerAngles, Result};
use nalgebra::{Unit, UnitQuaternion, Vector3};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand_distr::{Beta, LogNormal, Normal, UnitSphere};
use std::f64::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Log-normal equivalent-diameter distribution with sigma cutoffs.
///
/// Diameters are drawn from `exp(N(mu, sigma))` and redrawn outside
/// `[exp(mu − min_cutoff·sigma), exp(mu + max_cutoff·sigma)]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SizeDistribution {
    /// Mean of ln(diameter).
    pub mu: f64,
    /// Standard deviation of ln(diameter).
    pub sigma: f64,
    /// Lower cutoff in sigmas.
    pub min_cutoff: f64,
    /// Upper cutoff in sigmas.
    pub max_cutoff: f64,
}

impl SizeDistribution {
    /// Creates a distribution with symmetric 5-sigma cutoffs.
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self {
            mu,
            sigma,
            min_cutoff: 5.0,
            max_cutoff: 5.0,
        }
    }

    /// Sets the cutoffs in sigmas.
    pub fn with_cutoffs(mut self, min: f64, max: f64) -> Self {
        self.min_cutoff = min;
        self.max_cutoff = max;
        self
    }

    /// Smallest admissible diameter.
    pub fn min_diameter(&self) -> f64 {
        (self.mu - self.min_cutoff * self.sigma).exp()
    }

    /// Largest admissible diameter.
    pub fn max_diameter(&self) -> f64 {
        (self.mu + self.max_cutoff * self.sigma).exp()
    }

    /// Whether a diameter lies inside the cutoffs.
    pub fn admits(&self, d: f64) -> bool {
        // Relative slack so a sigma = 0 distribution admits exp(mu).
        let slack = 1e-12;
        d >= self.min_diameter() * (1.0 - slack) && d <= self.max_diameter() * (1.0 + slack)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !self.mu.is_finite() {
            return Err(format!("mu {} is not finite", self.mu));
        }
        if !(self.sigma.is_finite() && self.sigma >= 0.0) {
            return Err(format!("sigma {} must be non-negative", self.sigma));
        }
        if !(self.min_cutoff >= 0.0 && self.max_cutoff >= 0.0) {
            return Err("cutoffs must be non-negative".into());
        }
        Ok(())
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.sigma == 0.0 {
            return self.mu.exp();
        }
        match LogNormal::new(self.mu, self.sigma) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.mu.exp(),
        }
    }
}

/// Distribution of a dimensionless shape parameter (axis ratio, omega3).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeDistribution {
    /// Always the same value.
    Constant(f64),
    /// Beta(alpha, beta) on (0, 1).
    Beta {
        /// First shape parameter.
        alpha: f64,
        /// Second shape parameter.
        beta: f64,
    },
    /// Uniform on `[min, max]`.
    Uniform {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

impl Default for ShapeDistribution {
    fn default() -> Self {
        ShapeDistribution::Constant(1.0)
    }
}

impl ShapeDistribution {
    fn validate(&self, name: &str) -> std::result::Result<(), String> {
        match *self {
            ShapeDistribution::Constant(v) if !(0.0..=1.0).contains(&v) => {
                Err(format!("{} constant {} must be in [0, 1]", name, v))
            }
            ShapeDistribution::Beta { alpha, beta }
                if !(alpha.is_finite() && beta.is_finite() && alpha > 0.0 && beta > 0.0) =>
            {
                Err(format!(
                    "{} beta parameters ({}, {}) must be positive",
                    name, alpha, beta
                ))
            }
            ShapeDistribution::Uniform { min, max } if !(0.0 <= min && min <= max && max <= 1.0) => {
                Err(format!("{} uniform range [{}, {}] must lie in [0, 1]", name, min, max))
            }
            _ => Ok(()),
        }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match *self {
            ShapeDistribution::Constant(v) => v,
            ShapeDistribution::Beta { alpha, beta } => match Beta::new(alpha, beta) {
                Ok(dist) => dist.sample(rng),
                Err(_) => 0.0,
            },
            ShapeDistribution::Uniform { min, max } => rng.gen_range(min..=max),
        }
    }
}

/// A preferred orientation with Gaussian angular spread.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TextureComponent {
    /// Centre of the component.
    pub orientation: EulerAngles,
    /// Relative weight.
    pub weight: f64,
    /// Standard deviation of the misorientation angle from the centre (radians).
    pub spread: f64,
}

/// Orientation distribution function.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Odf {
    /// Uniformly random orientations.
    #[default]
    Random,
    /// Weighted texture components.
    Components(Vec<TextureComponent>),
}

impl Odf {
    fn validate(&self, name: &str) -> std::result::Result<(), String> {
        let Odf::Components(components) = self else {
            return Ok(());
        };
        if components.is_empty() {
            return Err(format!("{} has no texture components", name));
        }
        for c in components {
            if !(c.weight.is_finite() && c.weight >= 0.0) {
                return Err(format!("{} weight {} is invalid", name, c.weight));
            }
            if !(c.spread.is_finite() && c.spread >= 0.0) {
                return Err(format!("{} spread {} is invalid", name, c.spread));
            }
        }
        if components.iter().all(|c| c.weight == 0.0) {
            return Err(format!("{} weights are all zero", name));
        }
        Ok(())
    }

    /// Draws an orientation.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> EulerAngles {
        match self {
            Odf::Random => random_orientation(rng),
            Odf::Components(components) => {
                let weights = components.iter().map(|c| c.weight);
                let Ok(index) = WeightedIndex::new(weights) else {
                    return random_orientation(rng);
                };
                let component = &components[index.sample(rng)];
                let angle = match Normal::new(0.0, component.spread) {
                    Ok(dist) => dist.sample(rng).abs(),
                    Err(_) => 0.0,
                };
                let axis: [f64; 3] = UnitSphere.sample(rng);
                let spread = UnitQuaternion::from_axis_angle(
                    &Unit::new_normalize(Vector3::from(axis)),
                    angle,
                );
                EulerAngles::from_quaternion(&(spread * component.orientation.to_quaternion()))
            }
        }
    }
}

/// Uniform random orientation: φ1, φ2 ~ U[0, 2π), Φ = acos(U[−1, 1]).
pub fn random_orientation<R: Rng>(rng: &mut R) -> EulerAngles {
    let phi1 = rng.gen::<f64>() * TAU;
    let phi = rng.gen_range(-1.0f64..=1.0).acos();
    let phi2 = rng.gen::<f64>() * TAU;
    EulerAngles::new(phi1, phi, phi2)
}

/// Target statistics of one phase.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseStatistics {
    /// Relative volume fraction.
    pub phase_fraction: f64,
    /// Crystal symmetry class.
    pub crystal_structure: CrystalStructure,
    /// Lattice constants a, b, c (length) and alpha, beta, gamma (degrees).
    pub lattice_constants: [f64; 6],
    /// Shape family.
    pub shape: ShapeType,
    /// Equivalent-diameter distribution.
    pub size: SizeDistribution,
    /// b/a distribution.
    pub b_over_a: ShapeDistribution,
    /// c/a distribution.
    pub c_over_a: ShapeDistribution,
    /// omega3 distribution.
    pub omega3: ShapeDistribution,
    /// Crystallographic orientation distribution.
    pub odf: Odf,
    /// Shape-axis orientation distribution.
    pub axis_odf: Odf,
}

impl PhaseStatistics {
    /// Creates statistics for an equiaxed, randomly textured phase.
    pub fn new(crystal_structure: CrystalStructure, size: SizeDistribution) -> Self {
        Self {
            phase_fraction: 1.0,
            crystal_structure,
            lattice_constants: [1.0, 1.0, 1.0, 90.0, 90.0, 90.0],
            shape: ShapeType::Ellipsoid,
            size,
            b_over_a: ShapeDistribution::Constant(1.0),
            c_over_a: ShapeDistribution::Constant(1.0),
            omega3: ShapeDistribution::Constant(1.0),
            odf: Odf::Random,
            axis_odf: Odf::Random,
        }
    }

    /// Sets the phase fraction.
    pub fn with_phase_fraction(mut self, fraction: f64) -> Self {
        self.phase_fraction = fraction;
        self
    }

    /// Sets the lattice constants.
    pub fn with_lattice_constants(mut self, constants: [f64; 6]) -> Self {
        self.lattice_constants = constants;
        self
    }

    /// Sets the shape family.
    pub fn with_shape(mut self, shape: ShapeType) -> Self {
        self.shape = shape;
        self
    }

    /// Sets the axis-ratio distributions.
    pub fn with_axis_ratios(mut self, b_over_a: ShapeDistribution, c_over_a: ShapeDistribution) -> Self {
        self.b_over_a = b_over_a;
        self.c_over_a = c_over_a;
        self
    }

    /// Sets the omega3 distribution.
    pub fn with_omega3(mut self, omega3: ShapeDistribution) -> Self {
        self.omega3 = omega3;
        self
    }

    /// Sets the crystallographic ODF.
    pub fn with_odf(mut self, odf: Odf) -> Self {
        self.odf = odf;
        self
    }

    /// Sets the axis ODF.
    pub fn with_axis_odf(mut self, odf: Odf) -> Self {
        self.axis_odf = odf;
        self
    }

    /// Validates the statistics of phase `phase`.
    pub fn validate(&self, phase: u32) -> Result<()> {
        let invalid = |reason: String| Error::InvalidStatistics { phase, reason };

        if !(self.phase_fraction.is_finite() && self.phase_fraction > 0.0) {
            return Err(invalid(format!(
                "phase fraction {} must be positive",
                self.phase_fraction
            )));
        }
        if self.crystal_structure == CrystalStructure::Unknown {
            return Err(invalid("unknown crystal structure".into()));
        }
        self.size.validate().map_err(invalid)?;
        self.b_over_a.validate("b/a").map_err(invalid)?;
        self.c_over_a.validate("c/a").map_err(invalid)?;
        self.omega3.validate("omega3").map_err(invalid)?;
        self.odf.validate("ODF").map_err(invalid)?;
        self.axis_odf.validate("axis ODF").map_err(invalid)?;
        Ok(())
    }

    /// Draws an equivalent diameter inside the cutoffs, or `None` when the draw
    /// falls outside them.
    pub fn sample_diameter<R: Rng>(&self, rng: &mut R) -> Option<f64> {
        let d = self.size.sample(rng);
        self.size.admits(d).then_some(d)
    }

    /// Draws (b/a, c/a) with c/a ≤ b/a.
    pub fn sample_axis_ratios<R: Rng>(&self, rng: &mut R) -> (f64, f64) {
        let b = self.b_over_a.sample(rng);
        let c = self.c_over_a.sample(rng);
        if c > b {
            (c, b)
        } else {
            (b, c)
        }
    }

    /// Draws omega3.
    pub fn sample_omega3<R: Rng>(&self, rng: &mut R) -> f64 {
        self.omega3.sample(rng)
    }
}

/// Statistics for every phase; phase ids are 1-based (index + 1).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatsData {
    /// Per-phase statistics.
    pub phases: Vec<PhaseStatistics>,
}

impl StatsData {
    /// Creates statistics from a list of phases.
    pub fn new(phases: Vec<PhaseStatistics>) -> Self {
        Self { phases }
    }

    /// Iterates `(phase_id, statistics)`.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &PhaseStatistics)> {
        self.phases
            .iter()
            .enumerate()
            .map(|(i, p)| (i as u32 + 1, p))
    }
}

/// One row of the ensemble table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseInfo {
    /// Crystal symmetry class.
    pub crystal_structure: CrystalStructure,
    /// Lattice constants.
    pub lattice_constants: [f64; 6],
    /// Shape family.
    pub shape: ShapeType,
    /// Relative volume fraction.
    pub phase_fraction: f64,
    /// Admissible equivalent-diameter range, when known.
    pub size_range: Option<(f64, f64)>,
}

impl PhaseInfo {
    /// Ensemble row without size statistics.
    pub fn new(crystal_structure: CrystalStructure, shape: ShapeType) -> Self {
        Self {
            crystal_structure,
            lattice_constants: [1.0, 1.0, 1.0, 90.0, 90.0, 90.0],
            shape,
            phase_fraction: 1.0,
            size_range: None,
        }
    }

    fn unknown() -> Self {
        Self {
            phase_fraction: 0.0,
            ..Self::new(CrystalStructure::Unknown, ShapeType::Ellipsoid)
        }
    }
}

/// Phase table; index 0 is the reserved unknown phase.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ensemble {
    phases: Vec<PhaseInfo>,
}

impl Default for Ensemble {
    fn default() -> Self {
        Self {
            phases: vec![PhaseInfo::unknown()],
        }
    }
}

impl Ensemble {
    /// Creates an ensemble from rows for phases 1, 2, ….
    pub fn new(phases: Vec<PhaseInfo>) -> Self {
        let mut ensemble = Self::default();
        ensemble.phases.extend(phases);
        ensemble
    }

    /// Builds the ensemble described by phase statistics.
    pub fn from_stats(stats: &StatsData) -> Self {
        Self::new(
            stats
                .phases
                .iter()
                .map(|p| PhaseInfo {
                    crystal_structure: p.crystal_structure,
                    lattice_constants: p.lattice_constants,
                    shape: p.shape,
                    phase_fraction: p.phase_fraction,
                    size_range: Some((p.size.min_diameter(), p.size.max_diameter())),
                })
                .collect(),
        )
    }

    /// Number of rows including the reserved row 0.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Returns true if only the reserved row exists.
    pub fn is_empty(&self) -> bool {
        self.phases.len() <= 1
    }

    /// Row of a phase (0 = reserved unknown row).
    pub fn phase(&self, id: u32) -> Option<&PhaseInfo> {
        self.phases.get(id as usize)
    }

    /// Whether `id` names a real phase.
    pub fn is_valid_phase(&self, id: u32) -> bool {
        id > 0 && (id as usize) < self.phases.len()
    }

    /// Crystal structure of a phase (Unknown for invalid ids).
    pub fn crystal_structure(&self, id: u32) -> CrystalStructure {
        self.phase(id)
            .map_or(CrystalStructure::Unknown, |p| p.crystal_structure)
    }

    /// Shape family of a phase (ellipsoid for invalid ids).
    pub fn shape(&self, id: u32) -> ShapeType {
        self.phase(id).map_or(ShapeType::Ellipsoid, |p| p.shape)
    }

    /// Crystal structure codes per row, row 0 = unknown.
    pub fn crystal_structure_codes(&self) -> Vec<u32> {
        self.phases
            .iter()
            .map(|p| p.crystal_structure.code())
            .collect()
    }

    /// Rows in phase order, including row 0.
    pub fn rows(&self) -> &[PhaseInfo] {
        &self.phases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn cubic(mu: f64, sigma: f64) -> PhaseStatistics {
        PhaseStatistics::new(CrystalStructure::CubicHigh, SizeDistribution::new(mu, sigma))
    }

    #[test]
    fn test_size_cutoffs() {
        let size = SizeDistribution::new(2.0, 0.5).with_cutoffs(1.0, 2.0);
        assert_relative_eq!(size.min_diameter(), 1.5f64.exp());
        assert_relative_eq!(size.max_diameter(), 3.0f64.exp());
        assert!(size.admits(2.0f64.exp()));
        assert!(!size.admits(1.0));
    }

    #[test]
    fn test_zero_sigma_is_deterministic() {
        let stats = cubic(2.0, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..5 {
            assert_relative_eq!(
                stats.sample_diameter(&mut rng).unwrap_or_default(),
                2.0f64.exp()
            );
        }
    }

    #[test]
    fn test_axis_ratios_are_ordered() {
        let stats = cubic(1.0, 0.1).with_axis_ratios(
            ShapeDistribution::Beta {
                alpha: 2.0,
                beta: 5.0,
            },
            ShapeDistribution::Beta {
                alpha: 5.0,
                beta: 2.0,
            },
        );
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..100 {
            let (b, c) = stats.sample_axis_ratios(&mut rng);
            assert!(c <= b && b <= 1.0 && c > 0.0);
        }
    }

    #[test]
    fn test_uniform_shape_parameter() {
        let uniform = ShapeDistribution::Uniform { min: 0.4, max: 0.7 };
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        for _ in 0..100 {
            let v = uniform.sample(&mut rng);
            assert!((0.4..=0.7).contains(&v), "sample {}", v);
        }
        let point = ShapeDistribution::Uniform { min: 0.5, max: 0.5 };
        assert_eq!(point.sample(&mut rng), 0.5);

        assert!(uniform.validate("b/a").is_ok());
        assert!(ShapeDistribution::Uniform { min: 0.8, max: 0.2 }.validate("b/a").is_err());
        assert!(ShapeDistribution::Uniform { min: 0.2, max: 1.5 }.validate("c/a").is_err());
        assert!(ShapeDistribution::Uniform { min: f64::NAN, max: 0.5 }.validate("omega3").is_err());
    }

    #[test]
    fn test_validation() {
        assert!(cubic(1.0, 0.2).validate(1).is_ok());
        assert!(cubic(1.0, -0.2).validate(1).is_err());
        assert!(cubic(1.0, 0.2).with_phase_fraction(0.0).validate(1).is_err());
        assert!(PhaseStatistics::new(CrystalStructure::Unknown, SizeDistribution::new(1.0, 0.1))
            .validate(3)
            .is_err());
        let err = cubic(1.0, 0.2)
            .with_omega3(ShapeDistribution::Beta {
                alpha: 0.0,
                beta: 1.0,
            })
            .validate(2)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStatistics { phase: 2, .. }));
        assert!(cubic(1.0, 0.2)
            .with_odf(Odf::Components(Vec::new()))
            .validate(1)
            .is_err());
    }

    #[test]
    fn test_random_orientation_ranges() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for _ in 0..200 {
            let e = random_orientation(&mut rng);
            assert!((0.0..TAU).contains(&e.phi1));
            assert!((0.0..=std::f64::consts::PI).contains(&e.phi));
            assert!((0.0..TAU).contains(&e.phi2));
        }
    }

    #[test]
    fn test_texture_component_concentrates() {
        let center = EulerAngles::from_degrees(30.0, 40.0, 50.0);
        let odf = Odf::Components(vec![TextureComponent {
            orientation: center,
            weight: 1.0,
            spread: 2f64.to_radians(),
        }]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..50 {
            let e = odf.sample(&mut rng);
            let d = farfield_core::rotation_angle(
                &(e.to_quaternion() * center.to_quaternion().inverse()),
            );
            assert!(d < 12f64.to_radians(), "deviation {}", d.to_degrees());
        }
    }

    #[test]
    fn test_ensemble_rows() {
        let stats = StatsData::new(vec![
            cubic(1.0, 0.1),
            PhaseStatistics::new(CrystalStructure::Orthorhombic, SizeDistribution::new(1.0, 0.1))
                .with_shape(ShapeType::SuperEllipsoid),
        ]);
        let ensemble = Ensemble::from_stats(&stats);
        assert_eq!(ensemble.len(), 3);
        assert_eq!(ensemble.crystal_structure_codes(), vec![999, 1, 6]);
        assert_eq!(ensemble.shape(2), ShapeType::SuperEllipsoid);
        assert!(!ensemble.is_valid_phase(0));
        assert!(ensemble.is_valid_phase(2));
        assert!(!ensemble.is_valid_phase(3));
        assert_eq!(ensemble.crystal_structure(7), CrystalStructure::Unknown);
    }
}
