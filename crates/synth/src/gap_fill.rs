//! Filling of unassigned packable voxels by layered majority dilation.

use crate::domain::Domain;
use farfield_core::Result;
use log::{debug, warn};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outcome of a gap fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GapFillReport {
    /// Voxels that received an owner.
    pub filled: usize,
    /// Dilation layers applied.
    pub layers: usize,
    /// Packable voxels no assigned voxel can reach; they stay 0.
    pub unreachable: usize,
}

/// Grows assigned regions into gaps one layer at a time.
///
/// Every layer labels each gap voxel touching the assigned region with the
/// most common id among its assigned 6-neighbors (ties to the smallest id).
/// Labels are computed from the previous layer only, so the result does not
/// depend on traversal order.
#[derive(Debug, Clone, Copy, Default)]
pub struct GapFiller;

impl GapFiller {
    /// Creates a gap filler.
    pub fn new() -> Self {
        Self
    }

    /// Majority id among the assigned, included neighbors of `v`.
    fn majority(domain: &Domain, ids: &[u32], v: usize) -> Option<u32> {
        let mut seen = [0u32; 6];
        let mut n = 0;
        for nb in domain.neighbors(v).into_iter().flatten() {
            if ids[nb] != 0 && domain.is_included(nb) {
                seen[n] = ids[nb];
                n += 1;
            }
        }
        let seen = &mut seen[..n];
        seen.sort_unstable();

        let mut best: Option<(usize, u32)> = None;
        let mut start = 0;
        while start < seen.len() {
            let id = seen[start];
            let run = seen[start..].iter().take_while(|&&s| s == id).count();
            // Ascending ids: strict `>` keeps the smallest on ties.
            if best.map_or(true, |(count, _)| run > count) {
                best = Some((run, id));
            }
            start += run;
        }
        best.map(|(_, id)| id)
    }

    /// Fills gaps in place. Masked-out voxels are never written.
    pub fn fill(&self, domain: &Domain, ids: &mut [u32]) -> Result<GapFillReport> {
        domain.check_voxel_array(ids.len())?;

        let mut gaps: Vec<usize> = (0..ids.len())
            .filter(|&v| ids[v] == 0 && domain.is_included(v))
            .collect();
        let mut report = GapFillReport::default();

        while !gaps.is_empty() {
            let snapshot: &[u32] = ids;
            let labels: Vec<(usize, u32)> = gaps
                .par_iter()
                .filter_map(|&v| Self::majority(domain, snapshot, v).map(|id| (v, id)))
                .collect();
            if labels.is_empty() {
                break;
            }
            for &(v, id) in &labels {
                ids[v] = id;
            }
            report.filled += labels.len();
            report.layers += 1;
            gaps.retain(|&v| ids[v] == 0);
        }

        report.unreachable = gaps.len();
        if report.unreachable > 0 {
            warn!(
                "{} packable voxels are unreachable from any grain",
                report.unreachable
            );
        }
        debug!(
            "Gap fill: {} voxels in {} layers",
            report.filled, report.layers
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farfield_core::Error;

    #[test]
    fn test_tie_goes_to_smallest_id() {
        let domain = Domain::uniform([3, 1, 1], 1.0);
        let mut ids = vec![2, 0, 1];
        let report = GapFiller::new().fill(&domain, &mut ids).unwrap();
        assert_eq!(ids, vec![2, 1, 1]);
        assert_eq!(report.filled, 1);
        assert_eq!(report.layers, 1);
    }

    #[test]
    fn test_majority_wins() {
        let domain = Domain::uniform([3, 3, 1], 1.0);
        #[rustfmt::skip]
        let mut ids = vec![
            0, 2, 0,
            1, 0, 2,
            0, 3, 0,
        ];
        GapFiller::new().fill(&domain, &mut ids).unwrap();
        assert_eq!(ids[4], 2);
        // Corner (0,0) touches 2 and 1.
        assert_eq!(ids[0], 1);
    }

    #[test]
    fn test_fills_everything_reachable() {
        let domain = Domain::uniform([8, 8, 4], 1.0);
        let mut ids = vec![0u32; domain.voxel_count()];
        ids[domain.index(0, 0, 0)] = 1;
        ids[domain.index(7, 7, 3)] = 2;
        let report = GapFiller::new().fill(&domain, &mut ids).unwrap();

        assert!(ids.iter().all(|&id| id != 0));
        assert_eq!(report.unreachable, 0);
        assert_eq!(report.filled, domain.voxel_count() - 2);
        // Seeds are 17 steps apart, so the last voxel is reached in layer 8.
        assert_eq!(report.layers, 8);
        assert_eq!(ids[domain.index(1, 1, 1)], 1);
        assert_eq!(ids[domain.index(6, 6, 2)], 2);
    }

    #[test]
    fn test_masked_voxels_are_walls() {
        // Column x = 2 is masked out, splitting the slab in two.
        let mask: Vec<bool> = (0..25).map(|v| v % 5 != 2).collect();
        let domain = Domain::uniform([5, 5, 1], 1.0).with_mask(mask);
        let mut ids = vec![0u32; 25];
        ids[0] = 4;

        let report = GapFiller::new().fill(&domain, &mut ids).unwrap();
        for y in 0..5 {
            assert_eq!(ids[y * 5], 4);
            assert_eq!(ids[y * 5 + 1], 4);
            assert_eq!(ids[y * 5 + 2], 0);
            assert_eq!(ids[y * 5 + 3], 0);
        }
        assert_eq!(report.unreachable, 10);
    }

    #[test]
    fn test_empty_grid_is_all_unreachable() {
        let domain = Domain::uniform([2, 2, 2], 1.0);
        let mut ids = vec![0u32; 8];
        let report = GapFiller::new().fill(&domain, &mut ids).unwrap();
        assert_eq!(report.layers, 0);
        assert_eq!(report.unreachable, 8);
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let domain = Domain::uniform([2, 2, 2], 1.0);
        let mut ids = vec![0u32; 7];
        assert!(matches!(
            GapFiller::new().fill(&domain, &mut ids),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_short_mask_is_rejected_before_filling() {
        let domain = Domain::uniform([4, 4, 1], 1.0).with_mask(vec![true; 5]);
        let mut ids = vec![0u32; 16];
        ids[0] = 1;
        assert!(matches!(
            GapFiller::new().fill(&domain, &mut ids),
            Err(Error::InvalidMask {
                expected: 16,
                found: 5
            })
        ));
        assert_eq!(ids[1], 0);
    }
}
