//! Monte-Carlo packing of grains by simulated annealing.
//!
//! Every feature is a (super)ellipsoid with a movable centroid and a scalable
//! size. The annealer minimizes the [`PackingGrid`] cost, so grains spread out
//! to cover the packable region once and avoid the masked-out region.
//!
//! # Moves
//!
//! - **Translate**: Gaussian step scaled by the grain radius
//! - **Relocate**: jump to a random packable voxel of the grain's slab
//! - **Rescale**: scale all semi-axes within the phase's size cutoffs
//!
//! Proposals that would put a centroid outside the domain, the mask or the
//! grain's slab are discarded (counted as rejections).

use crate::domain::Domain;
use crate::feature::FeatureTable;
use crate::packing_utils::PackingGrid;
use crate::shape::ShapeEvaluator;
use crate::stats::Ensemble;
use farfield_core::sa::{SaConfig, SaProblem, SaResult, SaRunner};
use farfield_core::{Error, Result};
use log::{debug, info, warn};
use nalgebra::{Point3, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What happens to features that end the anneal in an invalid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnplacedPolicy {
    /// Clear the centroid; the feature keeps its id but owns no voxels.
    Drop,
    /// Keep the best-effort position.
    #[default]
    KeepBestEffort,
}

/// Perturbation kinds available to the annealer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PackingMoveKind {
    /// Gaussian translation.
    Translate,
    /// Jump to a random packable voxel.
    Relocate,
    /// Uniform rescale.
    Rescale,
}

/// Configuration of the packing stage.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PackingConfig {
    /// Annealing schedule and budget.
    pub sa: SaConfig,
    /// Voxels per packing cell along each axis.
    pub grid_factor: usize,
    /// Cost per grain covering a non-packable cell.
    pub mask_penalty: f64,
    /// Stop once cost / packable cells falls to this value.
    pub convergence_threshold: f64,
    /// Enabled moves (drawn uniformly).
    pub moves: Vec<PackingMoveKind>,
    /// Translation standard deviation as a fraction of the largest semi-axis.
    pub translate_step: f64,
    /// Maximum relative size change of one rescale move.
    pub rescale_step: f64,
    /// Relative size limit for unmeasured features without size statistics.
    pub input_rescale_limit: f64,
    /// Failure policy.
    pub unplaced_policy: UnplacedPolicy,
    /// Bins per phase in the size histogram.
    pub histogram_bins: usize,
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            sa: SaConfig::default(),
            grid_factor: 2,
            mask_penalty: 4.0,
            convergence_threshold: 0.05,
            moves: vec![
                PackingMoveKind::Translate,
                PackingMoveKind::Relocate,
                PackingMoveKind::Rescale,
            ],
            translate_step: 0.5,
            rescale_step: 0.1,
            input_rescale_limit: 0.2,
            unplaced_policy: UnplacedPolicy::KeepBestEffort,
            histogram_bins: 10,
        }
    }
}

impl PackingConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the annealing schedule.
    pub fn with_sa(mut self, sa: SaConfig) -> Self {
        self.sa = sa;
        self
    }

    /// Sets the packing cell size in voxels.
    pub fn with_grid_factor(mut self, factor: usize) -> Self {
        self.grid_factor = factor.max(1);
        self
    }

    /// Sets the mask penalty.
    pub fn with_mask_penalty(mut self, penalty: f64) -> Self {
        self.mask_penalty = penalty;
        self
    }

    /// Sets the convergence threshold.
    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Restricts the move set.
    pub fn with_moves(mut self, moves: Vec<PackingMoveKind>) -> Self {
        self.moves = moves;
        self
    }

    /// Sets the failure policy.
    pub fn with_unplaced_policy(mut self, policy: UnplacedPolicy) -> Self {
        self.unplaced_policy = policy;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.sa.validate()?;
        if self.moves.is_empty() {
            return Err(Error::ConfigError("no packing moves enabled".into()));
        }
        if !(self.mask_penalty.is_finite() && self.mask_penalty >= 0.0) {
            return Err(Error::ConfigError(format!(
                "mask penalty {} must be non-negative",
                self.mask_penalty
            )));
        }
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold >= 0.0) {
            return Err(Error::ConfigError(format!(
                "convergence threshold {} must be non-negative",
                self.convergence_threshold
            )));
        }
        if !(self.translate_step > 0.0 && self.rescale_step >= 0.0 && self.input_rescale_limit >= 0.0)
        {
            return Err(Error::ConfigError("invalid move step sizes".into()));
        }
        if self.grid_factor == 0 || self.histogram_bins == 0 {
            return Err(Error::ConfigError(
                "grid factor and histogram bins must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Why a feature is reported as not properly packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PackingFailureKind {
    /// Centroid outside the domain bounds.
    OutsideDomain,
    /// Centroid on a masked-out voxel or outside the feature's slab.
    OutsideMask,
    /// The shape contains no packable voxel centre.
    NoCoverage,
}

/// A per-feature packing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PackingFailure {
    /// Feature id.
    pub feature_id: u32,
    /// Failure kind.
    pub kind: PackingFailureKind,
}

/// Equivalent-diameter histogram of one phase.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SizeHistogram {
    /// Phase id.
    pub phase: u32,
    /// Lower edge of the first bin.
    pub min: f64,
    /// Bin width (0 when all grains have the same size).
    pub bin_width: f64,
    /// Grains per bin.
    pub counts: Vec<usize>,
}

/// Everything the packing stage reports besides the moved features.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PackingReport {
    /// Annealing statistics.
    pub anneal: SaResult,
    /// Packing quality per feature id; index 0 is reserved.
    pub qualities: Vec<f64>,
    /// Size histograms per phase.
    pub size_histograms: Vec<SizeHistogram>,
    /// Features not properly packed.
    pub failures: Vec<PackingFailure>,
    /// Final cost divided by the number of packable cells.
    pub normalized_cost: f64,
    /// Number of packable cells in the packing grid.
    pub packable_cells: usize,
}

/// Per-feature data that does not change during the anneal.
struct Template {
    evaluator: ShapeEvaluator,
    base_radii: [f64; 3],
    scale_bounds: (f64, f64),
    slab: u32,
}

/// Mutable position and size of one feature.
#[derive(Debug, Clone)]
struct Slot {
    centroid: Point3<f64>,
    radii: [f64; 3],
    cells: Vec<usize>,
}

/// Annealing state: grid counts plus per-feature slots.
pub struct PackingState {
    grid: PackingGrid,
    slots: Vec<Slot>,
}

impl PackingState {
    /// Current cost of the packing.
    pub fn cost(&self) -> f64 {
        self.grid.cost()
    }
}

/// A proposed placement. After `apply` it holds the previous placement.
pub struct PackingMove {
    index: usize,
    centroid: Point3<f64>,
    radii: [f64; 3],
    cells: Vec<usize>,
}

struct PackingProblem<'a> {
    domain: &'a Domain,
    config: &'a PackingConfig,
    templates: Vec<Template>,
    voxels_by_slab: Vec<Vec<usize>>,
    /// Indices of the features the anneal may move.
    movable: Vec<usize>,
}

impl PackingProblem<'_> {
    fn random_position<R: Rng>(&self, slab: u32, rng: &mut R) -> Option<Point3<f64>> {
        let voxels = self.voxels_by_slab.get(slab as usize)?;
        if voxels.is_empty() {
            return None;
        }
        let v = voxels[rng.gen_range(0..voxels.len())];
        let res = self.domain.resolution();
        let jitter = Vector3::new(
            rng.gen_range(-0.5..0.5) * res[0],
            rng.gen_range(-0.5..0.5) * res[1],
            rng.gen_range(-0.5..0.5) * res[2],
        );
        Some(self.domain.voxel_center(v) + jitter)
    }

    fn swap(&self, state: &mut PackingState, mv: &mut PackingMove) -> f64 {
        let PackingState { grid, slots } = state;
        let slot = &mut slots[mv.index];
        let mut delta = grid.remove(&slot.cells);
        std::mem::swap(&mut slot.centroid, &mut mv.centroid);
        std::mem::swap(&mut slot.radii, &mut mv.radii);
        std::mem::swap(&mut slot.cells, &mut mv.cells);
        delta += grid.add(&slot.cells);
        delta
    }
}

impl SaProblem for PackingProblem<'_> {
    type State = PackingState;
    type Move = PackingMove;

    fn cost(&self, state: &PackingState) -> f64 {
        state.cost()
    }

    fn propose<R: Rng>(&self, state: &PackingState, rng: &mut R) -> Option<PackingMove> {
        if self.movable.is_empty() {
            return None;
        }
        let index = self.movable[rng.gen_range(0..self.movable.len())];
        let kind = self.config.moves[rng.gen_range(0..self.config.moves.len())];
        let slot = &state.slots[index];
        let template = &self.templates[index];

        let (centroid, radii) = match kind {
            PackingMoveKind::Translate => {
                let sigma = self.config.translate_step * slot.radii[0];
                let step = Vector3::new(
                    rng.sample::<f64, _>(StandardNormal),
                    rng.sample::<f64, _>(StandardNormal),
                    rng.sample::<f64, _>(StandardNormal),
                ) * sigma;
                (slot.centroid + step, slot.radii)
            }
            PackingMoveKind::Relocate => (self.random_position(template.slab, rng)?, slot.radii),
            PackingMoveKind::Rescale => {
                let scale = slot.radii[0] / template.base_radii[0];
                let step = self.config.rescale_step;
                let factor = 1.0 + rng.gen_range(-step..=step);
                let (lo, hi) = template.scale_bounds;
                let scale = (scale * factor).clamp(lo, hi);
                let b = template.base_radii;
                (slot.centroid, [b[0] * scale, b[1] * scale, b[2] * scale])
            }
        };

        if !self.domain.accepts_centroid(&centroid, template.slab) {
            return None;
        }

        let cells = state
            .grid
            .coverage(&template.evaluator.with_placement(centroid, radii));
        Some(PackingMove {
            index,
            centroid,
            radii,
            cells,
        })
    }

    fn apply(&self, state: &mut PackingState, mv: &mut PackingMove) -> f64 {
        self.swap(state, mv)
    }

    fn revert(&self, state: &mut PackingState, mv: &mut PackingMove) {
        self.swap(state, mv);
    }

    fn on_temperature_change(&self, temperature: f64, iteration: u64, cost: f64) {
        debug!(
            "Packing T={:.4} iteration={} cost={:.3}",
            temperature, iteration, cost
        );
    }
}

/// Packs features into a domain by simulated annealing.
pub struct PackingEngine {
    config: PackingConfig,
    cancelled: Arc<AtomicBool>,
}

impl PackingEngine {
    /// Creates a packing engine.
    pub fn new(config: PackingConfig) -> Self {
        Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an external cancellation flag.
    pub fn with_cancel_handle(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Returns the cancellation flag.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PackingConfig {
        &self.config
    }

    /// Places every feature, updating centroids, semi-axes and volumes in place.
    ///
    /// Initial positions are drawn from `seed + 2`; the anneal runs on
    /// `seed + 1`. Measured grains keep their size, and a measured grain with
    /// a packable preset centroid stays where it is.
    pub fn pack(
        &self,
        domain: &Domain,
        ensemble: &Ensemble,
        features: &mut FeatureTable,
        seed: u64,
    ) -> Result<PackingReport> {
        self.config.validate()?;
        domain.validate()?;

        let mut grid = PackingGrid::new(domain, self.config.grid_factor, self.config.mask_penalty);
        let packable_cells = grid.packable_count();

        if features.is_empty() {
            return Ok(PackingReport {
                qualities: vec![0.0],
                packable_cells,
                ..PackingReport::default()
            });
        }

        let voxels_by_slab: Vec<Vec<usize>> = (0..=domain.slab_count() as u32)
            .map(|slab| domain.packable_voxels(slab))
            .collect();

        let presets: Vec<Option<Point3<f64>>> = features
            .iter()
            .map(|f| {
                let preset = f.centroid.filter(|c| domain.accepts_centroid(c, f.slab_id));
                if f.centroid.is_some() && preset.is_none() {
                    warn!("Feature {}: preset centroid is not packable, re-placing", f.id);
                }
                preset
            })
            .collect();
        let movable: Vec<usize> = features
            .iter()
            .zip(&presets)
            .enumerate()
            .filter(|(_, (f, preset))| !(f.measured && preset.is_some()))
            .map(|(i, _)| i)
            .collect();
        if movable.len() < features.len() {
            debug!(
                "{} measured features pinned at their preset centroids",
                features.len() - movable.len()
            );
        }

        let templates: Vec<Template> = features
            .iter()
            .map(|f| {
                let shape = ensemble.shape(f.phase);
                let size_range = ensemble.phase(f.phase).and_then(|p| p.size_range);
                let scale_bounds = match size_range {
                    _ if f.measured => (1.0, 1.0),
                    Some((dmin, dmax)) if f.equivalent_diameter > 0.0 => (
                        (dmin / f.equivalent_diameter).min(1.0),
                        (dmax / f.equivalent_diameter).max(1.0),
                    ),
                    _ => (
                        (1.0 - self.config.input_rescale_limit).max(0.01),
                        1.0 + self.config.input_rescale_limit,
                    ),
                };
                Template {
                    evaluator: ShapeEvaluator::new(
                        shape,
                        Point3::origin(),
                        f.axis_lengths,
                        &f.axis_euler,
                        f.omega3,
                    ),
                    base_radii: f.axis_lengths,
                    scale_bounds,
                    slab: f.slab_id,
                }
            })
            .collect();

        let mut problem = PackingProblem {
            domain,
            config: &self.config,
            templates,
            voxels_by_slab,
            movable,
        };

        // Initial placement.
        let mut place_rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(2));
        let mut positions = Vec::with_capacity(features.len());
        for (preset, template) in presets.into_iter().zip(&problem.templates) {
            let position = preset
                .or_else(|| problem.random_position(template.slab, &mut place_rng))
                .or_else(|| problem.random_position(0, &mut place_rng))
                .unwrap_or_else(|| domain.voxel_center(0));
            positions.push(position);
        }

        let coverages: Vec<Vec<usize>> = problem
            .templates
            .par_iter()
            .zip(positions.par_iter())
            .map(|(t, c)| grid.coverage(&t.evaluator.with_placement(*c, t.base_radii)))
            .collect();

        let mut slots = Vec::with_capacity(features.len());
        for ((centroid, cells), t) in positions.into_iter().zip(coverages).zip(&problem.templates) {
            grid.add(&cells);
            slots.push(Slot {
                centroid,
                radii: t.base_radii,
                cells,
            });
        }

        let mut state = PackingState { grid, slots };

        let target = self.config.convergence_threshold * packable_cells as f64;
        let sa = self.config.sa.clone().with_target_cost(target);
        let anneal = if problem.movable.is_empty() {
            let cost = state.cost();
            SaResult {
                initial_cost: cost,
                final_cost: cost,
                best_cost: cost,
                converged: cost <= target,
                ..SaResult::default()
            }
        } else {
            let runner = SaRunner::new(sa, problem).with_cancel_handle(self.cancelled.clone());
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
            let anneal = runner.run(&mut state, &mut rng);
            problem = runner.into_problem();
            anneal
        };

        // Write the final placement back. Measured grains keep their volume.
        for (f, slot) in features.iter_mut().zip(&state.slots) {
            f.centroid = Some(slot.centroid);
            if !f.measured {
                let shape = ensemble.shape(f.phase).ops();
                f.axis_lengths = slot.radii;
                f.set_volume(shape.volume(&slot.radii, f.omega3));
            }
        }

        let grid = &state.grid;
        let qualities: Vec<f64> = std::iter::once(0.0)
            .chain(
                state
                    .slots
                    .par_iter()
                    .map(|s| grid.quality(&s.cells))
                    .collect::<Vec<_>>(),
            )
            .collect();

        let failure_kinds: Vec<Option<PackingFailureKind>> = state
            .slots
            .par_iter()
            .zip(problem.templates.par_iter())
            .map(|(slot, t)| {
                let shape = t.evaluator.with_placement(slot.centroid, slot.radii);
                classify_placement(domain, &shape, t.slab)
            })
            .collect();

        let mut failures = Vec::new();
        for (f, kind) in features.iter_mut().zip(failure_kinds) {
            let Some(kind) = kind else { continue };
            failures.push(PackingFailure {
                feature_id: f.id,
                kind,
            });
            if self.config.unplaced_policy == UnplacedPolicy::Drop {
                f.centroid = None;
            }
        }
        if !failures.is_empty() {
            warn!(
                "{} of {} features not properly packed ({:?})",
                failures.len(),
                features.len(),
                self.config.unplaced_policy
            );
        }

        let normalized_cost = if packable_cells > 0 {
            anneal.final_cost / packable_cells as f64
        } else {
            0.0
        };

        info!(
            "Packed {} features: cost {:.3} -> {:.3} (normalized {:.4}), {} iterations, acceptance {:.2}",
            features.len(),
            anneal.initial_cost,
            anneal.final_cost,
            normalized_cost,
            anneal.iterations,
            anneal.acceptance_rate()
        );

        Ok(PackingReport {
            size_histograms: size_histograms(features, self.config.histogram_bins),
            anneal,
            qualities,
            failures,
            normalized_cost,
            packable_cells,
        })
    }
}

/// Checks a final placement: centroid in the domain, on a packable voxel of the
/// slab, and at least one packable voxel centre inside the shape.
fn classify_placement(domain: &Domain, shape: &ShapeEvaluator, slab: u32) -> Option<PackingFailureKind> {
    let centroid = shape.centroid();
    if !domain.contains_point(centroid) {
        return Some(PackingFailureKind::OutsideDomain);
    }
    if !domain.accepts_centroid(centroid, slab) {
        return Some(PackingFailureKind::OutsideMask);
    }
    let Some((lo, hi)) = domain.voxel_range(&shape.aabb()) else {
        return Some(PackingFailureKind::NoCoverage);
    };
    for z in lo[2]..=hi[2] {
        for y in lo[1]..=hi[1] {
            for x in lo[0]..=hi[0] {
                let v = domain.index(x, y, z);
                if domain.is_included(v) && shape.contains(&domain.voxel_center(v)) {
                    return None;
                }
            }
        }
    }
    Some(PackingFailureKind::NoCoverage)
}

/// Per-phase equivalent-diameter histograms of the features with a centroid.
pub fn size_histograms(features: &FeatureTable, bins: usize) -> Vec<SizeHistogram> {
    let bins = bins.max(1);
    let mut by_phase: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for f in features.iter().filter(|f| f.centroid.is_some()) {
        by_phase.entry(f.phase).or_default().push(f.equivalent_diameter);
    }

    by_phase
        .into_iter()
        .map(|(phase, sizes)| {
            let min = sizes.iter().copied().fold(f64::INFINITY, f64::min);
            let max = sizes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let bin_width = (max - min) / bins as f64;
            let mut counts = vec![0usize; if bin_width > 0.0 { bins } else { 1 }];
            for d in sizes {
                let bin = if bin_width > 0.0 {
                    (((d - min) / bin_width) as usize).min(bins - 1)
                } else {
                    0
                };
                counts[bin] += 1;
            }
            SizeHistogram {
                phase,
                min,
                bin_width: bin_width.max(0.0),
                counts,
            }
        })
        .collect()
}
