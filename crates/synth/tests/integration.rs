//! End-to-end tests of the tessellation pipeline.
//!
//! Covers: statistics → Tessellator::run() → cell arrays, plus the individual
//! stages chained by hand where a property concerns one of them.

use farfield_core::{CrystalStructure, Error, EulerAngles, SaConfig};
use farfield_synth::{
    CellData, Domain, Ensemble, Feature, FeatureGenerator, FeatureTable, GapFiller,
    GeneratorConfig, OrientationAssigner, PackingConfig, PackingEngine, PackingMoveKind,
    PhaseInfo, PhaseStatistics, ShapeDistribution, ShapeType, SizeDistribution, StatsData,
    TessellationConfig, TessellationResult, Tessellator, TwinMerger, VoxelAssignmentEngine,
};
use nalgebra::{Unit, UnitQuaternion, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn quick_config(seed: u64) -> TessellationConfig {
    let mut config = TessellationConfig::new().with_seed(seed);
    config.packing.sa = SaConfig::new().with_max_iterations(3_000);
    config
}

fn cubic_stats(mu: f64, sigma: f64) -> StatsData {
    StatsData::new(vec![PhaseStatistics::new(
        CrystalStructure::CubicHigh,
        SizeDistribution::new(mu, sigma),
    )])
}

fn two_phase_stats() -> StatsData {
    StatsData::new(vec![
        PhaseStatistics::new(CrystalStructure::CubicHigh, SizeDistribution::new(1.1, 0.15))
            .with_phase_fraction(0.7),
        PhaseStatistics::new(CrystalStructure::HexagonalHigh, SizeDistribution::new(1.0, 0.1))
            .with_phase_fraction(0.3)
            .with_axis_ratios(
                ShapeDistribution::Beta {
                    alpha: 15.0,
                    beta: 2.0,
                },
                ShapeDistribution::Constant(0.6),
            ),
    ])
}

fn corner_mask() -> Vec<bool> {
    let mut mask = vec![true; 100];
    for y in 0..2 {
        for x in 0..2 {
            mask[y * 10 + x] = false;
        }
    }
    mask
}

fn assert_ids_in_range(result: &TessellationResult) {
    let n = result.feature_count() as u32;
    for &id in &result.cells.feature_ids {
        assert!(id <= n, "voxel id {} beyond feature count {}", id, n);
    }
}

#[test]
fn test_ids_stay_in_range() {
    let domain = Domain::uniform([14, 12, 10], 1.0);
    for seed in [1, 2, 3] {
        let result = Tessellator::new(quick_config(seed))
            .run(&domain, &two_phase_stats())
            .unwrap();
        assert_ids_in_range(&result);
        for (&id, &phase) in result.cells.feature_ids.iter().zip(&result.cells.phases) {
            if id != 0 {
                assert_ne!(phase, 0);
            }
        }
    }
}

#[test]
fn test_orientation_assignment_is_idempotent() {
    let domain = Domain::uniform([12, 12, 6], 1.0);
    let result = Tessellator::new(quick_config(8))
        .run(&domain, &two_phase_stats())
        .unwrap();

    let mut cells = result.cells.clone();
    OrientationAssigner::assign(&mut cells, &result.features, &result.new_names).unwrap();
    assert_eq!(cells.orientations, result.cells.orientations);
    OrientationAssigner::assign(&mut cells, &result.features, &result.new_names).unwrap();
    assert_eq!(cells, result.cells);
}

#[test]
fn test_masked_voxels_stay_empty() {
    // A sphere-shaped sample inside a 16³ box.
    let dims = [16, 16, 16];
    let domain = Domain::uniform(dims, 1.0);
    let mask: Vec<bool> = (0..domain.voxel_count())
        .map(|v| {
            let p = domain.voxel_center(v);
            (p - nalgebra::Point3::new(8.0, 8.0, 8.0)).norm() < 7.0
        })
        .collect();
    let domain = domain.with_mask(mask.clone());

    let result = Tessellator::new(quick_config(4))
        .run(&domain, &cubic_stats(1.2, 0.2))
        .unwrap();
    for (v, &included) in mask.iter().enumerate() {
        if included {
            assert_ne!(result.cells.feature_ids[v], 0);
        } else {
            assert_eq!(result.cells.feature_ids[v], 0);
            assert_eq!(result.cells.orientations[v], [0.0; 3]);
            assert_eq!(result.cells.phases[v], 0);
            assert!(!result.cells.boundary[v]);
        }
    }
}

#[test]
fn test_same_seed_is_bit_identical() {
    let domain = Domain::uniform([12, 10, 8], 1.0);
    let a = Tessellator::new(quick_config(42))
        .run(&domain, &two_phase_stats())
        .unwrap();

    let single = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap();
    let b = single.install(|| {
        Tessellator::new(quick_config(42))
            .run(&domain, &two_phase_stats())
            .unwrap()
    });

    assert_eq!(a.features, b.features);
    assert_eq!(a.cells, b.cells);
    assert_eq!(a.new_names, b.new_names);
    assert_eq!(a.packing.qualities, b.packing.qualities);

    let c = Tessellator::new(quick_config(43))
        .run(&domain, &two_phase_stats())
        .unwrap();
    assert_ne!(a.features, c.features);
}

#[test]
fn test_gap_fill_closes_unmasked_domain() {
    let domain = Domain::uniform([12, 12, 12], 1.0);
    let stats = cubic_stats(0.9, 0.1);
    let mut rng = ChaCha8Rng::seed_from_u64(6);
    let generation = FeatureGenerator::new(&stats, GeneratorConfig::default())
        .generate(domain.packable_volume() * 0.3, &mut rng)
        .unwrap();
    let ensemble = generation.ensemble;
    let mut features = generation.features;

    let packing = PackingConfig::new().with_sa(SaConfig::new().with_max_iterations(500));
    PackingEngine::new(packing)
        .pack(&domain, &ensemble, &mut features, 6)
        .unwrap();
    assert!(features.placed_count() > 0);

    let mut ids = VoxelAssignmentEngine::default().assign(&domain, &features, &ensemble).unwrap();
    assert!(ids.iter().any(|&id| id == 0));
    let report = GapFiller::new().fill(&domain, &mut ids).unwrap();
    assert_eq!(report.unreachable, 0);
    assert!(ids.iter().all(|&id| id != 0));
}

#[test]
fn test_twin_remap_resolves_to_canonical_grain() {
    let domain = Domain::uniform([10, 10, 1], 1.0);
    let ensemble = Ensemble::new(vec![PhaseInfo::new(
        CrystalStructure::CubicHigh,
        ShapeType::Ellipsoid,
    )]);

    let base = EulerAngles::from_degrees(20.0, 35.0, 60.0);
    let axis = Unit::new_normalize(Vector3::new(1.0, 1.0, 1.0));
    let twin = UnitQuaternion::from_axis_angle(&axis, 60f64.to_radians()) * base.to_quaternion();

    let mut features = FeatureTable::new();
    for (volume, orientation) in [(40.0, base), (60.0, EulerAngles::from_quaternion(&twin))] {
        let mut f = Feature::new(1).with_orientation(orientation);
        f.set_volume(volume);
        features.push(f);
    }
    let ids: Vec<u32> = (0..100).map(|v| if v % 10 < 4 { 1 } else { 2 }).collect();

    let merge = TwinMerger::default()
        .merge(&domain, &ids, &mut features, &ensemble)
        .unwrap();
    assert_eq!(merge.new_names, vec![0, 2, 2]);

    let mut cells = CellData::new(100);
    cells.feature_ids = ids.clone();
    OrientationAssigner::assign(&mut cells, &features, &merge.new_names).unwrap();

    let canonical = features.get(2).unwrap();
    for v in 0..100 {
        assert_eq!(cells.orientations[v], canonical.orientation.to_f32());
        assert_eq!(cells.phases[v], canonical.phase);
    }
    // Voxel ids are not rewritten.
    assert_eq!(cells.feature_ids, ids);
}

#[test]
fn test_pipeline_voxels_follow_new_names() {
    let domain = Domain::uniform([12, 12, 8], 1.0);
    let result = Tessellator::new(quick_config(17))
        .run(&domain, &two_phase_stats())
        .unwrap();

    for (v, &id) in result.cells.feature_ids.iter().enumerate() {
        if id == 0 {
            continue;
        }
        let owner = result.features.get(result.new_names[id as usize]).unwrap();
        assert_eq!(result.cells.orientations[v], owner.orientation.to_f32());
        assert_eq!(result.cells.phases[v], owner.phase);
    }
}

#[test]
fn test_single_grain_fills_thin_domain() {
    let domain = Domain::uniform([10, 10, 1], 1.0);
    // sigma = 0: every grain has a 12-voxel diameter, more than the domain volume.
    let result = Tessellator::new(quick_config(0))
        .run(&domain, &cubic_stats(12f64.ln(), 0.0))
        .unwrap();

    assert_eq!(result.feature_count(), 1);
    let phase = result.features.get(1).unwrap().phase;
    assert!(result.cells.feature_ids.iter().all(|&id| id == 1));
    assert!(result.cells.phases.iter().all(|&p| p == phase));
    assert!(result.cells.boundary.iter().all(|&b| b));
    assert_eq!(result.diagnostics.gap_fill.unreachable, 0);
    assert_eq!(result.cells.unassigned_count(&domain), 0);
}

#[test]
fn test_masked_corner_stays_empty() {
    let domain = Domain::uniform([10, 10, 1], 1.0).with_mask(corner_mask());
    for seed in [0, 1, 2] {
        let result = Tessellator::new(quick_config(seed))
            .run(&domain, &cubic_stats(1.0, 0.2))
            .unwrap();
        for v in [0, 1, 10, 11] {
            assert_eq!(result.cells.feature_ids[v], 0);
        }
        let owned = result.cells.feature_ids.iter().filter(|&&id| id != 0).count();
        assert_eq!(owned, 96);
    }
}

#[test]
fn test_zero_axis_never_reaches_packing() {
    let domain = Domain::uniform([8, 8, 8], 1.0);
    let ensemble = Ensemble::new(vec![PhaseInfo::new(
        CrystalStructure::Orthorhombic,
        ShapeType::Ellipsoid,
    )]);
    let features = vec![
        Feature::new(1).with_axis_lengths(0.0, 1.5, 1.0),
        Feature::new(1).with_axis_lengths(3.0, 2.0, 2.0),
    ];
    let result = Tessellator::new(quick_config(2))
        .run_with_features(&domain, ensemble, features)
        .unwrap();
    assert_eq!(result.feature_count(), 1);
    assert_eq!(result.diagnostics.rejected_input_features[0].index, 0);
    assert!(result.features.iter().all(|f| f.axis_lengths[0] > 0.0));

    // A generator whose statistics can only produce flat grains fails outright.
    let flat = StatsData::new(vec![PhaseStatistics::new(
        CrystalStructure::CubicHigh,
        SizeDistribution::new(1.0, 0.1),
    )
    .with_axis_ratios(ShapeDistribution::Constant(1.0), ShapeDistribution::Constant(0.0))]);
    let config = quick_config(2).with_generator(GeneratorConfig::default().with_max_rejections(20));
    let err = Tessellator::new(config).run(&domain, &flat).unwrap_err();
    assert!(matches!(err, Error::InvalidStatistics { phase: 1, .. }));
}

#[test]
fn test_translate_only_packing_keeps_preset_slabs() {
    let domain = Domain::uniform([8, 8, 8], 1.0).with_slabs(2);
    let ensemble = Ensemble::new(vec![PhaseInfo::new(
        CrystalStructure::CubicHigh,
        ShapeType::Ellipsoid,
    )]);
    let features: Vec<Feature> = (0..6)
        .map(|i| {
            Feature::new(1)
                .with_axis_lengths(1.5, 1.5, 1.5)
                .with_slab(1 + i % 2)
        })
        .collect();

    let mut config = quick_config(9);
    config.packing = config
        .packing
        .with_moves(vec![PackingMoveKind::Translate]);
    let result = Tessellator::new(config)
        .run_with_features(&domain, ensemble, features)
        .unwrap();

    // Radius 1.5 covers a voxel centre wherever the centroid lands.
    assert!(result.diagnostics.packing_failures.is_empty());
    assert_eq!(result.feature_count(), 6);
    for f in result.features.iter() {
        let c = f.centroid.expect("every grain is placed");
        assert!(
            domain.point_in_slab(&c, f.slab_id),
            "feature {} at {:?} left slab {}",
            f.id,
            c,
            f.slab_id
        );
        assert_eq!(f.axis_lengths, [1.5; 3]);
    }
    assert_ids_in_range(&result);
}
