//! Candidate grain generation from per-phase statistics.

use crate::domain::Domain;
use crate::feature::{sphere_volume, Feature, FeatureTable};
use crate::stats::{Ensemble, PhaseStatistics, StatsData};
use farfield_core::{Error, Result};
use log::{debug, info, warn};
use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Limits applied while drawing grains.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeneratorConfig {
    /// Hard cap on the number of generated features.
    pub max_features: usize,
    /// Consecutive rejected draws tolerated for one grain.
    pub max_rejections: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_features: 100_000,
            max_rejections: 10_000,
        }
    }
}

impl GeneratorConfig {
    /// Sets the feature cap.
    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = n;
        self
    }

    /// Sets the rejection limit.
    pub fn with_max_rejections(mut self, n: usize) -> Self {
        self.max_rejections = n.max(1);
        self
    }
}

/// Output of [`FeatureGenerator::generate`].
#[derive(Debug, Clone)]
pub struct Generation {
    /// Unplaced features in generation order.
    pub features: FeatureTable,
    /// Phase table.
    pub ensemble: Ensemble,
    /// Phases skipped because their statistics are invalid.
    pub skipped_phases: Vec<u32>,
    /// Whether generation stopped at `max_features`.
    pub capped: bool,
}

/// An input feature refused by [`FeatureGenerator::admit`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RejectedFeature {
    /// Position in the input list.
    pub index: usize,
    /// Why it was refused.
    pub reason: String,
}

/// Output of [`FeatureGenerator::admit`].
#[derive(Debug, Clone)]
pub struct Admission {
    /// Accepted features, renumbered 1..=n in input order.
    pub features: FeatureTable,
    /// Refused inputs.
    pub rejected: Vec<RejectedFeature>,
}

/// Draws grains phase by phase until each phase reaches its volume share.
pub struct FeatureGenerator<'a> {
    stats: &'a StatsData,
    config: GeneratorConfig,
}

impl<'a> FeatureGenerator<'a> {
    /// Creates a generator over the given statistics.
    pub fn new(stats: &'a StatsData, config: GeneratorConfig) -> Self {
        Self { stats, config }
    }

    /// Generates unplaced features whose volumes add up to `total_volume`.
    ///
    /// Phases with invalid statistics are skipped with a warning; if none is
    /// usable the run fails with [`Error::NoFeatureStatistics`].
    pub fn generate<R: Rng>(&self, total_volume: f64, rng: &mut R) -> Result<Generation> {
        if !(total_volume.is_finite() && total_volume > 0.0) {
            return Err(Error::ConfigError(format!(
                "target volume {} must be positive",
                total_volume
            )));
        }

        let mut skipped_phases = Vec::new();
        let valid: Vec<(u32, &PhaseStatistics)> = self
            .stats
            .iter()
            .filter(|(id, phase)| match phase.validate(*id) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Skipping phase {}: {}", id, e);
                    skipped_phases.push(*id);
                    false
                }
            })
            .collect();

        if valid.is_empty() {
            return Err(Error::NoFeatureStatistics(format!(
                "none of {} phases has usable statistics",
                self.stats.phases.len()
            )));
        }

        let fraction_sum: f64 = valid.iter().map(|(_, p)| p.phase_fraction).sum();
        let mut features = FeatureTable::new();
        let mut generated = 0.0;
        let mut capped = false;

        'phases: for (phase, stats) in valid {
            let target = total_volume * stats.phase_fraction / fraction_sum;
            let mut phase_volume = 0.0;
            let mut count = 0usize;

            while phase_volume < target && generated < total_volume {
                if features.len() >= self.config.max_features {
                    warn!(
                        "Feature cap {} reached, generated volume {:.3} of {:.3}",
                        self.config.max_features, generated, total_volume
                    );
                    capped = true;
                    break 'phases;
                }
                let feature = self.sample_feature(phase, stats, rng)?;
                phase_volume += feature.volume;
                generated += feature.volume;
                count += 1;
                features.push(feature);
            }

            debug!(
                "Phase {}: {} features, volume {:.3} (target {:.3})",
                phase, count, phase_volume, target
            );
        }

        info!(
            "Generated {} features, volume {:.3} of {:.3}",
            features.len(),
            generated,
            total_volume
        );

        Ok(Generation {
            features,
            ensemble: Ensemble::from_stats(self.stats),
            skipped_phases,
            capped,
        })
    }

    /// Draws one grain of `phase`, redrawing candidates with a non-positive axis
    /// or zero volume.
    pub fn sample_feature<R: Rng>(
        &self,
        phase: u32,
        stats: &PhaseStatistics,
        rng: &mut R,
    ) -> Result<Feature> {
        let shape = stats.shape.ops();

        for _ in 0..self.config.max_rejections {
            let Some(diameter) = stats.sample_diameter(rng) else {
                continue;
            };
            let (b_over_a, c_over_a) = stats.sample_axis_ratios(rng);
            let omega3 = stats.sample_omega3(rng);

            let k = shape.volume_coefficient(omega3);
            let a = (sphere_volume(diameter) / (k * b_over_a * c_over_a)).cbrt();

            let mut feature = Feature::new(phase)
                .with_axis_lengths(a, a * b_over_a, a * c_over_a)
                .with_omega3(omega3);
            feature.set_volume(shape.volume(&feature.axis_lengths, omega3));
            if feature.check_size().is_err() {
                continue;
            }

            feature.axis_euler = stats.axis_odf.sample(rng);
            feature.orientation = stats.odf.sample(rng);
            return Ok(feature);
        }

        Err(Error::InvalidStatistics {
            phase,
            reason: format!(
                "no valid grain after {} draws",
                self.config.max_rejections
            ),
        })
    }

    /// Validates externally supplied features.
    ///
    /// Missing volumes are computed from the axes and the phase's shape family.
    /// Features with an unknown phase, an unusable size or a slab the domain
    /// does not have are refused and reported.
    pub fn admit(features: Vec<Feature>, ensemble: &Ensemble, domain: &Domain) -> Result<Admission> {
        let mut table = FeatureTable::new();
        let mut rejected = Vec::new();

        for (index, mut feature) in features.into_iter().enumerate() {
            if !ensemble.is_valid_phase(feature.phase) {
                rejected.push(RejectedFeature {
                    index,
                    reason: format!("unknown phase {}", feature.phase),
                });
                continue;
            }
            if domain.slab_z_range(feature.slab_id).is_none() {
                rejected.push(RejectedFeature {
                    index,
                    reason: format!("unknown slab {}", feature.slab_id),
                });
                continue;
            }
            if !(feature.volume > 0.0) {
                let shape = ensemble.shape(feature.phase).ops();
                let volume = shape.volume(&feature.axis_lengths, feature.omega3);
                feature.set_volume(volume);
            } else if !(feature.equivalent_diameter > 0.0) {
                feature.set_volume(feature.volume);
            }
            if let Err(e) = feature.check_size() {
                rejected.push(RejectedFeature {
                    index,
                    reason: e.to_string(),
                });
                continue;
            }
            feature.measured = true;
            table.push(feature);
        }

        for r in &rejected {
            warn!("Rejected input feature {}: {}", r.index, r.reason);
        }

        if table.is_empty() {
            return Err(Error::NoFeatureStatistics(format!(
                "all {} input features were rejected",
                rejected.len()
            )));
        }

        Ok(Admission {
            features: table,
            rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeType;
    use crate::stats::{ShapeDistribution, SizeDistribution};
    use approx::assert_relative_eq;
    use farfield_core::CrystalStructure;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn phase(mu: f64, sigma: f64) -> PhaseStatistics {
        PhaseStatistics::new(CrystalStructure::CubicHigh, SizeDistribution::new(mu, sigma))
    }

    #[test]
    fn test_generation_reaches_target_volume() {
        let stats = StatsData::new(vec![phase(1.0, 0.2)]);
        let generator = FeatureGenerator::new(&stats, GeneratorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let generation = generator.generate(1000.0, &mut rng).unwrap();
        let total: f64 = generation.features.iter().map(|f| f.volume).sum();
        let largest = generation
            .features
            .iter()
            .map(|f| f.volume)
            .fold(0.0, f64::max);

        assert!(total >= 1000.0);
        assert!(total < 1000.0 + largest + 1e-9);
        assert!(generation.features.iter().all(|f| f.centroid.is_none()));
        assert_eq!(generation.ensemble.len(), 2);
    }

    #[test]
    fn test_generated_axes_are_ordered() {
        let stats = StatsData::new(vec![phase(1.0, 0.2)
            .with_shape(ShapeType::SuperEllipsoid)
            .with_axis_ratios(
                ShapeDistribution::Beta {
                    alpha: 15.0,
                    beta: 2.0,
                },
                ShapeDistribution::Beta {
                    alpha: 10.0,
                    beta: 4.0,
                },
            )
            .with_omega3(ShapeDistribution::Beta {
                alpha: 10.0,
                beta: 1.5,
            })]);
        let generator = FeatureGenerator::new(&stats, GeneratorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let generation = generator.generate(500.0, &mut rng).unwrap();
        for f in generation.features.iter() {
            let [a, b, c] = f.axis_lengths;
            assert!(a >= b && b >= c && c > 0.0, "{:?}", f.axis_lengths);
            assert_relative_eq!(sphere_volume(f.equivalent_diameter), f.volume, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let stats = StatsData::new(vec![phase(1.0, 0.3)]);
        let generator = FeatureGenerator::new(&stats, GeneratorConfig::default());

        let a = generator
            .generate(300.0, &mut ChaCha8Rng::seed_from_u64(7))
            .unwrap();
        let b = generator
            .generate(300.0, &mut ChaCha8Rng::seed_from_u64(7))
            .unwrap();
        assert_eq!(a.features, b.features);
    }

    #[test]
    fn test_phase_fractions_split_volume() {
        let stats = StatsData::new(vec![
            phase(0.5, 0.0).with_phase_fraction(3.0),
            phase(0.5, 0.0).with_phase_fraction(1.0),
        ]);
        let generator = FeatureGenerator::new(&stats, GeneratorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let generation = generator.generate(400.0, &mut rng).unwrap();
        let volume = |p: u32| -> f64 {
            generation
                .features
                .iter()
                .filter(|f| f.phase == p)
                .map(|f| f.volume)
                .sum()
        };
        let grain = sphere_volume(0.5f64.exp());
        assert!((volume(1) - 300.0).abs() <= grain + 1e-9);
        assert!((volume(2) - 100.0).abs() <= grain + 1e-9);
    }

    #[test]
    fn test_invalid_phase_is_skipped() {
        let stats = StatsData::new(vec![phase(1.0, -1.0), phase(1.0, 0.1)]);
        let generator = FeatureGenerator::new(&stats, GeneratorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let generation = generator.generate(100.0, &mut rng).unwrap();
        assert_eq!(generation.skipped_phases, vec![1]);
        assert!(generation.features.iter().all(|f| f.phase == 2));
    }

    #[test]
    fn test_no_valid_phase_fails() {
        let stats = StatsData::new(vec![phase(f64::NAN, 0.1)]);
        let generator = FeatureGenerator::new(&stats, GeneratorConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert!(matches!(
            generator.generate(100.0, &mut rng),
            Err(Error::NoFeatureStatistics(_))
        ));

        let empty = StatsData::default();
        let generator = FeatureGenerator::new(&empty, GeneratorConfig::default());
        assert!(matches!(
            generator.generate(100.0, &mut rng),
            Err(Error::NoFeatureStatistics(_))
        ));
    }

    #[test]
    fn test_zero_axis_ratio_is_rejected() {
        let stats = StatsData::new(vec![phase(1.0, 0.1).with_axis_ratios(
            ShapeDistribution::Constant(0.0),
            ShapeDistribution::Constant(0.0),
        )]);
        let config = GeneratorConfig::default().with_max_rejections(50);
        let generator = FeatureGenerator::new(&stats, config);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        assert!(matches!(
            generator.generate(100.0, &mut rng),
            Err(Error::InvalidStatistics { phase: 1, .. })
        ));
    }

    #[test]
    fn test_feature_cap() {
        let stats = StatsData::new(vec![phase(0.0, 0.1)]);
        let config = GeneratorConfig::default().with_max_features(10);
        let generator = FeatureGenerator::new(&stats, config);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let generation = generator.generate(1.0e6, &mut rng).unwrap();
        assert_eq!(generation.features.len(), 10);
        assert!(generation.capped);
    }

    #[test]
    fn test_admit_rejects_zero_axis() {
        let ensemble = Ensemble::from_stats(&StatsData::new(vec![phase(1.0, 0.1)]));
        let domain = Domain::uniform([10, 10, 10], 1.0).with_slabs(2);
        let inputs = vec![
            Feature::new(1).with_axis_lengths(0.0, 1.0, 1.0),
            Feature::new(1).with_axis_lengths(2.0, 1.5, 1.0),
            Feature::new(4).with_axis_lengths(2.0, 1.5, 1.0),
            Feature::new(1).with_axis_lengths(2.0, 1.5, 1.0).with_slab(3),
        ];

        let admission = FeatureGenerator::admit(inputs, &ensemble, &domain).unwrap();
        assert_eq!(admission.features.len(), 1);
        let kept = admission.features.get(1).unwrap();
        assert_eq!(kept.id, 1);
        assert!(kept.measured);
        assert_relative_eq!(kept.volume, 4.0 / 3.0 * std::f64::consts::PI * 3.0, epsilon = 1e-12);

        let rejected: Vec<usize> = admission.rejected.iter().map(|r| r.index).collect();
        assert_eq!(rejected, vec![0, 2, 3]);
    }

    #[test]
    fn test_admit_rejects_slab_on_unpartitioned_domain() {
        let ensemble = Ensemble::from_stats(&StatsData::new(vec![phase(1.0, 0.1)]));
        let domain = Domain::uniform([10, 10, 10], 1.0);
        let inputs = vec![
            Feature::new(1).with_axis_lengths(2.0, 1.5, 1.0),
            Feature::new(1).with_axis_lengths(2.0, 1.5, 1.0).with_slab(1),
        ];

        let admission = FeatureGenerator::admit(inputs, &ensemble, &domain).unwrap();
        assert_eq!(admission.features.len(), 1);
        assert_eq!(admission.rejected.len(), 1);
        assert_eq!(admission.rejected[0].index, 1);
        assert!(admission.rejected[0].reason.contains("slab 1"));
    }

    #[test]
    fn test_admit_all_rejected_fails() {
        let ensemble = Ensemble::from_stats(&StatsData::new(vec![phase(1.0, 0.1)]));
        let domain = Domain::uniform([4, 4, 4], 1.0);
        let inputs = vec![Feature::new(1).with_axis_lengths(1.0, 0.0, 1.0)];
        assert!(matches!(
            FeatureGenerator::admit(inputs, &ensemble, &domain),
            Err(Error::NoFeatureStatistics(_))
        ));
    }
}
