//! Feature (grain) records and the feature table.

use farfield_core::{Error, EulerAngles, Result};
use nalgebra::Point3;
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single grain.
///
/// Ids are 1-based; id 0 means "no grain" everywhere in the voxel arrays.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Feature {
    /// Feature id (assigned by [`FeatureTable::push`]).
    pub id: u32,
    /// Phase id (1-based; 0 = unknown).
    pub phase: u32,
    /// Diameter of the sphere with the same volume.
    pub equivalent_diameter: f64,
    /// Semi-axis lengths, `a ≥ b ≥ c`.
    pub axis_lengths: [f64; 3],
    /// Orientation of the shape axes.
    pub axis_euler: EulerAngles,
    /// Shape factor (1 = ellipsoid).
    pub omega3: f64,
    /// Packed centroid; `None` until placed (or after a dropped placement).
    pub centroid: Option<Point3<f64>>,
    /// Shape volume.
    pub volume: f64,
    /// Elastic strain placeholder (Voigt notation).
    pub elastic_strains: [f64; 6],
    /// Slab the grain must be packed in (0 = anywhere).
    pub slab_id: u32,
    /// Crystallographic orientation.
    pub orientation: EulerAngles,
    /// Canonical id after twin merging.
    pub new_name: u32,
    /// Grain taken from an input list: packing keeps its size, and its
    /// centroid when a packable one is given.
    pub measured: bool,
}

impl Default for Feature {
    fn default() -> Self {
        Self {
            id: 0,
            phase: 1,
            equivalent_diameter: 0.0,
            axis_lengths: [0.0; 3],
            axis_euler: EulerAngles::zero(),
            omega3: 1.0,
            centroid: None,
            volume: 0.0,
            elastic_strains: [0.0; 6],
            slab_id: 0,
            orientation: EulerAngles::zero(),
            new_name: 0,
            measured: false,
        }
    }
}

impl Feature {
    /// Creates an unplaced feature of the given phase.
    pub fn new(phase: u32) -> Self {
        Self {
            phase,
            ..Self::default()
        }
    }

    /// Sets the semi-axis lengths.
    pub fn with_axis_lengths(mut self, a: f64, b: f64, c: f64) -> Self {
        self.axis_lengths = [a, b, c];
        self
    }

    /// Sets the axis orientation.
    pub fn with_axis_euler(mut self, euler: EulerAngles) -> Self {
        self.axis_euler = euler;
        self
    }

    /// Sets the shape factor.
    pub fn with_omega3(mut self, omega3: f64) -> Self {
        self.omega3 = omega3;
        self
    }

    /// Sets a preset centroid.
    pub fn with_centroid(mut self, x: f64, y: f64, z: f64) -> Self {
        self.centroid = Some(Point3::new(x, y, z));
        self
    }

    /// Constrains the feature to a slab.
    pub fn with_slab(mut self, slab: u32) -> Self {
        self.slab_id = slab;
        self
    }

    /// Sets the crystallographic orientation.
    pub fn with_orientation(mut self, orientation: EulerAngles) -> Self {
        self.orientation = orientation;
        self
    }

    /// Sets volume and equivalent diameter together.
    pub fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
        self.equivalent_diameter = equivalent_diameter(volume);
    }

    /// Checks that the grain has a usable size.
    pub fn check_size(&self) -> Result<()> {
        if let Some(axis) = self
            .axis_lengths
            .iter()
            .find(|a| !(a.is_finite() && **a > 0.0))
        {
            return Err(Error::InvalidFeature {
                id: self.id,
                reason: format!("non-positive axis length {}", axis),
            });
        }
        if !(self.volume.is_finite() && self.volume > 0.0) {
            return Err(Error::InvalidFeature {
                id: self.id,
                reason: format!("volume {} is not positive", self.volume),
            });
        }
        Ok(())
    }
}

/// Volume of a sphere with diameter `d`.
pub fn sphere_volume(d: f64) -> f64 {
    PI / 6.0 * d * d * d
}

/// Diameter of the sphere with volume `v`.
pub fn equivalent_diameter(v: f64) -> f64 {
    (6.0 * v / PI).cbrt()
}

/// Ordered feature storage; the feature at index `i` has id `i + 1`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeatureTable {
    features: Vec<Feature>,
}

impl FeatureTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a feature, assigning the next id. Returns the id.
    pub fn push(&mut self, mut feature: Feature) -> u32 {
        let id = self.features.len() as u32 + 1;
        feature.id = id;
        feature.new_name = id;
        self.features.push(feature);
        id
    }

    /// Number of features (the largest valid id).
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Feature by id (id 0 has no feature).
    pub fn get(&self, id: u32) -> Option<&Feature> {
        (id as usize).checked_sub(1).and_then(|i| self.features.get(i))
    }

    /// Mutable feature by id.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut Feature> {
        (id as usize)
            .checked_sub(1)
            .and_then(move |i| self.features.get_mut(i))
    }

    /// Features in id order.
    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    /// Mutable features in id order.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Feature> {
        self.features.iter_mut()
    }

    /// Features as a slice (index = id − 1).
    pub fn as_slice(&self) -> &[Feature] {
        &self.features
    }

    /// Number of features that currently have a centroid.
    pub fn placed_count(&self) -> usize {
        self.features.iter().filter(|f| f.centroid.is_some()).count()
    }

    /// Checks that `id` addresses the table (0 is always valid).
    pub fn check_id(&self, id: u32) -> Result<()> {
        if id as usize > self.features.len() {
            return Err(Error::InvariantViolation(format!(
                "feature id {} exceeds feature count {}",
                id,
                self.features.len()
            )));
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FeatureTable {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}
