//! Run reports: JSON export and console summary.

use crate::parser::ParseError;
use farfield_synth::{
    CellData, Diagnostics, Domain, FeatureArrays, SizeHistogram, TessellationResult,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Headline numbers of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub dims: [usize; 3],
    pub voxel_count: usize,
    pub packable_voxels: usize,
    pub feature_count: usize,
    /// Distinct grains after twin merging.
    pub merged_grain_count: usize,
    pub twin_pairs: usize,
    pub packing_failures: usize,
    pub rejected_input_features: usize,
    pub unassigned_after_raster: usize,
    pub gap_fill_layers: usize,
    pub unreachable_voxels: usize,
    pub anneal_iterations: u64,
    pub acceptance_rate: f64,
    pub initial_cost: f64,
    pub best_cost: f64,
    pub normalized_cost: f64,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

/// Everything a run produces, ready for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    /// Crystal-structure code per phase (index 0 = unknown).
    pub crystal_structures: Vec<u32>,
    pub new_names: Vec<u32>,
    pub pack_qualities: Vec<f64>,
    pub size_histograms: Vec<SizeHistogram>,
    pub features: FeatureArrays,
    pub diagnostics: Diagnostics,
    /// Per-voxel arrays; omitted with `--summary-only`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cells: Option<CellData>,
}

impl RunReport {
    /// Builds a report from a finished run.
    pub fn new(name: &str, domain: &Domain, result: &TessellationResult, include_cells: bool) -> Self {
        let d = &result.diagnostics;
        let anneal = &result.packing.anneal;
        let summary = RunSummary {
            name: name.to_string(),
            dims: domain.dims(),
            voxel_count: domain.voxel_count(),
            packable_voxels: domain.packable_voxel_count(),
            feature_count: result.feature_count(),
            merged_grain_count: result.merged_grain_count(),
            twin_pairs: d.twin_pairs.len(),
            packing_failures: d.packing_failures.len(),
            rejected_input_features: d.rejected_input_features.len(),
            unassigned_after_raster: d.unassigned_after_raster,
            gap_fill_layers: d.gap_fill.layers,
            unreachable_voxels: d.gap_fill.unreachable,
            anneal_iterations: anneal.iterations,
            acceptance_rate: anneal.acceptance_rate(),
            initial_cost: anneal.initial_cost,
            best_cost: anneal.best_cost,
            normalized_cost: result.packing.normalized_cost,
            cancelled: d.cancelled,
            elapsed_ms: d.elapsed.as_millis() as u64,
        };

        Self {
            summary,
            crystal_structures: result.crystal_structure_codes(),
            new_names: result.new_names.clone(),
            pack_qualities: result.pack_qualities().to_vec(),
            size_histograms: result.size_histograms().to_vec(),
            features: result.feature_arrays(),
            diagnostics: d.clone(),
            cells: include_cells.then(|| result.cells.clone()),
        }
    }

    /// Writes the report as pretty-printed JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ParseError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Prints a human-readable summary.
    pub fn print_summary(&self) {
        let s = &self.summary;
        println!("\n{}", "=".repeat(60));
        println!("Run: {}", s.name);
        println!("{}", "=".repeat(60));
        println!(
            "Domain:           {} x {} x {} ({} voxels, {} packable)",
            s.dims[0], s.dims[1], s.dims[2], s.voxel_count, s.packable_voxels
        );
        println!(
            "Features:         {} ({} after twin merge, {} twin pairs)",
            s.feature_count, s.merged_grain_count, s.twin_pairs
        );
        println!(
            "Anneal:           {} iterations, acceptance {:.1}%, cost {:.1} -> {:.1} (normalized {:.3})",
            s.anneal_iterations,
            s.acceptance_rate * 100.0,
            s.initial_cost,
            s.best_cost,
            s.normalized_cost
        );
        println!(
            "Gaps:             {} after raster, filled in {} layers, {} unreachable",
            s.unassigned_after_raster, s.gap_fill_layers, s.unreachable_voxels
        );
        if s.packing_failures > 0 || s.rejected_input_features > 0 {
            println!(
                "Warnings:         {} packing failures, {} rejected input features",
                s.packing_failures, s.rejected_input_features
            );
        }
        if s.cancelled {
            println!("Run was cancelled; result is valid but not converged");
        }
        println!("Elapsed:          {} ms", s.elapsed_ms);

        for h in &self.size_histograms {
            println!(
                "Phase {} sizes:    min {:.2}, bin {:.2}, counts {:?}",
                h.phase, h.min, h.bin_width, h.counts
            );
        }
    }
}
