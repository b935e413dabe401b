//! Twin detection and merging of adjacent grains.

use crate::domain::Domain;
use crate::feature::FeatureTable;
use crate::stats::Ensemble;
use farfield_core::{Error, Result, TwinLaw};
use log::{debug, info};
use rayon::prelude::*;
use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Twin merging settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TwinConfig {
    /// Whether merging runs at all.
    pub enabled: bool,
    /// Allowed deviation from a twin law, in degrees.
    pub tolerance_deg: f64,
    /// Laws applied to every structure; `None` uses each structure's defaults.
    pub laws: Option<Vec<TwinLaw>>,
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance_deg: 2.0,
            laws: None,
        }
    }
}

impl TwinConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns merging off; every feature keeps its own id.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Sets the tolerance in degrees.
    pub fn with_tolerance_deg(mut self, tolerance: f64) -> Self {
        self.tolerance_deg = tolerance;
        self
    }

    /// Overrides the twin laws.
    pub fn with_laws(mut self, laws: Vec<TwinLaw>) -> Self {
        self.laws = Some(laws);
        self
    }

    /// Checks the tolerance.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance_deg.is_finite() && self.tolerance_deg >= 0.0 && self.tolerance_deg <= 180.0) {
            return Err(Error::ConfigError(format!(
                "twin tolerance must be within [0, 180] degrees, got {}",
                self.tolerance_deg
            )));
        }
        Ok(())
    }
}

/// A matched pair of grains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TwinPair {
    /// Lower feature id.
    pub a: u32,
    /// Higher feature id.
    pub b: u32,
    /// Index of the matched law.
    pub law: usize,
}

/// Result of twin merging.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TwinMerge {
    /// Canonical id per feature id (index 0 maps to 0).
    pub new_names: Vec<u32>,
    /// Pairs that matched a twin law.
    pub pairs: Vec<TwinPair>,
}

impl TwinMerge {
    /// Number of distinct canonical ids.
    pub fn group_count(&self) -> usize {
        self.new_names
            .iter()
            .skip(1)
            .copied()
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Disjoint sets over feature ids.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Groups adjacent same-phase grains related by a twin law.
#[derive(Debug, Clone, Default)]
pub struct TwinMerger {
    config: TwinConfig,
}

impl TwinMerger {
    /// Creates a merger.
    pub fn new(config: TwinConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TwinConfig {
        &self.config
    }

    /// Distinct pairs `(lo, hi)` of ids sharing a voxel face.
    pub fn contacts(domain: &Domain, ids: &[u32]) -> Result<BTreeSet<(u32, u32)>> {
        domain.check_voxel_array(ids.len())?;
        let slice = domain.slice_len();
        let contacts = (0..domain.dims()[2])
            .into_par_iter()
            .map(|z| {
                let mut set = BTreeSet::new();
                for v in z * slice..(z + 1) * slice {
                    let a = ids[v];
                    if a == 0 || !domain.is_included(v) {
                        continue;
                    }
                    // +x, +y, +z neighbors cover every face once.
                    let nb = domain.neighbors(v);
                    for n in [nb[1], nb[3], nb[5]].into_iter().flatten() {
                        let b = ids[n];
                        if b != 0 && b != a && domain.is_included(n) {
                            set.insert((a.min(b), a.max(b)));
                        }
                    }
                }
                set
            })
            .reduce(BTreeSet::new, |mut acc, set| {
                acc.extend(set);
                acc
            });
        Ok(contacts)
    }

    /// Computes canonical ids and writes them to `Feature::new_name`.
    ///
    /// The voxel ids are only read. Within a group the canonical id is the
    /// largest-volume member, ties to the lower id.
    pub fn merge(
        &self,
        domain: &Domain,
        ids: &[u32],
        features: &mut FeatureTable,
        ensemble: &Ensemble,
    ) -> Result<TwinMerge> {
        let n = features.len();
        domain.check_voxel_array(ids.len())?;
        if let Some(&bad) = ids.iter().find(|&&id| id as usize > n) {
            return Err(Error::InvariantViolation(format!(
                "voxel references feature {} but only {} exist",
                bad, n
            )));
        }

        let mut sets = UnionFind::new(n + 1);
        let mut pairs = Vec::new();

        if self.config.enabled {
            let tolerance = self.config.tolerance_deg.to_radians();
            for (a, b) in Self::contacts(domain, ids)? {
                let (Some(fa), Some(fb)) = (features.get(a), features.get(b)) else {
                    continue;
                };
                if fa.phase != fb.phase {
                    continue;
                }
                let Some(ops) = ensemble.crystal_structure(fa.phase).laue_ops() else {
                    continue;
                };
                let laws = match &self.config.laws {
                    Some(laws) => laws.clone(),
                    None => ops.default_twin_laws(),
                };
                let qa = fa.orientation.to_quaternion();
                let qb = fb.orientation.to_quaternion();
                if let Some(law) = ops.match_twin(&qa, &qb, &laws, tolerance) {
                    debug!("Features {} and {} are twins (law {})", a, b, law);
                    sets.union(a as usize, b as usize);
                    pairs.push(TwinPair { a, b, law });
                }
            }
        }

        let mut canonical = vec![0u32; n + 1];
        for f in features.iter() {
            let root = sets.find(f.id as usize);
            let current = canonical[root];
            let better = current == 0
                || features
                    .get(current)
                    .map_or(true, |c| f.volume > c.volume || (f.volume == c.volume && f.id < c.id));
            if better {
                canonical[root] = f.id;
            }
        }

        let mut new_names = vec![0u32; n + 1];
        for f in features.iter_mut() {
            let name = canonical[sets.find(f.id as usize)];
            f.new_name = name;
            new_names[f.id as usize] = name;
        }

        let merge = TwinMerge { new_names, pairs };
        info!(
            "Twin merge: {} pairs, {} groups from {} features",
            merge.pairs.len(),
            merge.group_count(),
            n
        );
        Ok(merge)
    }
}
