//! Grain shape families and the containment predicates used by packing and
//! voxel assignment.
//!
//! A grain is a (super)ellipsoid with semi-axes `a ≥ b ≥ c`, oriented by its
//! axis Euler angles. Predicates are evaluated in the grain's local frame:
//! `local = g · (p − centroid)` with `g` the passive Bunge rotation.

use crate::feature::Feature;
use farfield_core::{EulerAngles, AABB3D};
use nalgebra::{Matrix3, Point3, Vector3};
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shape family of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ShapeType {
    /// Plain ellipsoid (omega3 ignored).
    #[default]
    Ellipsoid,
    /// Superellipsoid whose exponent follows from omega3.
    SuperEllipsoid,
}

impl ShapeType {
    /// Shape operations for this family.
    pub fn ops(self) -> &'static dyn ShapeOps {
        match self {
            ShapeType::Ellipsoid => &EllipsoidOps,
            ShapeType::SuperEllipsoid => &SuperEllipsoidOps,
        }
    }
}

/// Containment and distance operations of a shape family.
pub trait ShapeOps: Send + Sync {
    /// The family implemented.
    fn shape_type(&self) -> ShapeType;

    /// Ratio of the shape volume to `a·b·c`.
    fn volume_coefficient(&self, omega3: f64) -> f64;

    /// Normalized radial distance of a local-frame point: ≤ 1 inside, 1 on the surface.
    fn radial_distance(&self, local: &Vector3<f64>, radii: &[f64; 3], omega3: f64) -> f64;

    /// Whether a local-frame point lies inside the shape.
    fn inside(&self, local: &Vector3<f64>, radii: &[f64; 3], omega3: f64) -> bool {
        self.radial_distance(local, radii, omega3) <= 1.0
    }

    /// Shape volume for the given semi-axes.
    fn volume(&self, radii: &[f64; 3], omega3: f64) -> f64 {
        self.volume_coefficient(omega3) * radii[0] * radii[1] * radii[2]
    }
}

/// Ellipsoid: (x/a)² + (y/b)² + (z/c)² ≤ 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct EllipsoidOps;

impl ShapeOps for EllipsoidOps {
    fn shape_type(&self) -> ShapeType {
        ShapeType::Ellipsoid
    }

    fn volume_coefficient(&self, _omega3: f64) -> f64 {
        4.0 / 3.0 * PI
    }

    fn radial_distance(&self, local: &Vector3<f64>, radii: &[f64; 3], _omega3: f64) -> f64 {
        let x = local.x / radii[0];
        let y = local.y / radii[1];
        let z = local.z / radii[2];
        (x * x + y * y + z * z).sqrt()
    }
}

/// Superellipsoid: |x/a|ⁿ + |y/b|ⁿ + |z/c|ⁿ ≤ 1 with n = 2 / omega3.
///
/// omega3 = 1 is the ellipsoid; smaller values give boxier grains.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuperEllipsoidOps;

impl SuperEllipsoidOps {
    /// Exponent for a given omega3, clamped to n ∈ [2, 20].
    pub fn exponent(omega3: f64) -> f64 {
        let omega3 = if omega3.is_finite() { omega3 } else { 1.0 };
        2.0 / omega3.clamp(0.1, 1.0)
    }
}

impl ShapeOps for SuperEllipsoidOps {
    fn shape_type(&self) -> ShapeType {
        ShapeType::SuperEllipsoid
    }

    fn volume_coefficient(&self, omega3: f64) -> f64 {
        let n = Self::exponent(omega3);
        8.0 * gamma(1.0 + 1.0 / n).powi(3) / gamma(1.0 + 3.0 / n)
    }

    fn radial_distance(&self, local: &Vector3<f64>, radii: &[f64; 3], omega3: f64) -> f64 {
        let n = Self::exponent(omega3);
        let sum = (local.x / radii[0]).abs().powf(n)
            + (local.y / radii[1]).abs().powf(n)
            + (local.z / radii[2]).abs().powf(n);
        sum.powf(1.0 / n)
    }
}

/// Lanczos approximation of Γ(x) for x ≥ 0.5.
fn gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    let x = x - 1.0;
    let mut sum = COEFFS[0];
    for (i, c) in COEFFS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + G + 0.5;
    (2.0 * PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * sum
}

/// A shape bound to a position, size and orientation.
#[derive(Clone, Copy)]
pub struct ShapeEvaluator {
    ops: &'static dyn ShapeOps,
    rotation: Matrix3<f64>,
    centroid: Point3<f64>,
    radii: [f64; 3],
    omega3: f64,
}

impl std::fmt::Debug for ShapeEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeEvaluator")
            .field("shape", &self.ops.shape_type())
            .field("centroid", &self.centroid)
            .field("radii", &self.radii)
            .field("omega3", &self.omega3)
            .finish()
    }
}

impl ShapeEvaluator {
    /// Creates an evaluator for an explicit placement.
    pub fn new(
        shape: ShapeType,
        centroid: Point3<f64>,
        radii: [f64; 3],
        axis_euler: &EulerAngles,
        omega3: f64,
    ) -> Self {
        Self {
            ops: shape.ops(),
            rotation: axis_euler.to_matrix(),
            centroid,
            radii,
            omega3,
        }
    }

    /// Creates an evaluator for a placed feature; `None` while it has no centroid.
    pub fn for_feature(feature: &Feature, shape: ShapeType) -> Option<Self> {
        feature.centroid.map(|c| {
            Self::new(
                shape,
                c,
                feature.axis_lengths,
                &feature.axis_euler,
                feature.omega3,
            )
        })
    }

    /// Returns the same shape moved and resized.
    pub fn with_placement(mut self, centroid: Point3<f64>, radii: [f64; 3]) -> Self {
        self.centroid = centroid;
        self.radii = radii;
        self
    }

    /// Returns the centroid.
    pub fn centroid(&self) -> &Point3<f64> {
        &self.centroid
    }

    /// Returns the semi-axes.
    pub fn radii(&self) -> [f64; 3] {
        self.radii
    }

    /// Maps a world point into the grain's local axis frame.
    #[inline]
    pub fn to_local(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.rotation * (p.coords - self.centroid.coords)
    }

    /// Normalized radial distance of a world point (≤ 1 inside).
    #[inline]
    pub fn radial_distance(&self, p: &Point3<f64>) -> f64 {
        self.ops
            .radial_distance(&self.to_local(p), &self.radii, self.omega3)
    }

    /// Whether a world point lies inside the grain.
    #[inline]
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        self.ops.inside(&self.to_local(p), &self.radii, self.omega3)
    }

    /// Volume of the bound shape.
    pub fn volume(&self) -> f64 {
        self.ops.volume(&self.radii, self.omega3)
    }

    /// World-axis half extents of the oriented bounding box.
    ///
    /// Both families fit inside the local box `[-r, r]`, so along world axis k
    /// the extent is `Σ_j |g_jk| · r_j`.
    pub fn half_extents(&self) -> [f64; 3] {
        let mut half = [0.0; 3];
        for (k, h) in half.iter_mut().enumerate() {
            *h = (0..3)
                .map(|j| self.rotation[(j, k)].abs() * self.radii[j])
                .sum();
        }
        half
    }

    /// World-aligned bounding box.
    pub fn aabb(&self) -> AABB3D<f64> {
        AABB3D::from_center(
            [self.centroid.x, self.centroid.y, self.centroid.z],
            self.half_extents(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_gamma_known_values() {
        assert_relative_eq!(gamma(1.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(gamma(5.0), 24.0, epsilon = 1e-9);
        assert_relative_eq!(gamma(0.5), PI.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(gamma(1.5), PI.sqrt() / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_superellipsoid_reduces_to_ellipsoid() {
        let e = EllipsoidOps;
        let s = SuperEllipsoidOps;
        assert_relative_eq!(
            s.volume_coefficient(1.0),
            e.volume_coefficient(1.0),
            epsilon = 1e-10
        );
        let p = Vector3::new(0.3, -0.2, 0.5);
        let r = [1.0, 0.8, 0.6];
        assert_relative_eq!(
            s.radial_distance(&p, &r, 1.0),
            e.radial_distance(&p, &r, 1.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_superellipsoid_volume_approaches_box() {
        // n = 20 is close to the bounding box (coefficient 8).
        let k = SuperEllipsoidOps.volume_coefficient(0.1);
        assert!(k > 7.0 && k < 8.0, "k = {}", k);
        // Boxier grains hold more volume than the ellipsoid.
        assert!(SuperEllipsoidOps.volume_coefficient(0.5) > 4.0 / 3.0 * PI);
    }

    #[test]
    fn test_exponent_clamped() {
        assert_relative_eq!(SuperEllipsoidOps::exponent(1.0), 2.0);
        assert_relative_eq!(SuperEllipsoidOps::exponent(5.0), 2.0);
        assert_relative_eq!(SuperEllipsoidOps::exponent(0.0), 20.0);
        assert_relative_eq!(SuperEllipsoidOps::exponent(f64::NAN), 2.0);
    }

    #[test]
    fn test_contains_in_local_frame() {
        // Long axis rotated from x onto y.
        let eval = ShapeEvaluator::new(
            ShapeType::Ellipsoid,
            Point3::new(5.0, 5.0, 5.0),
            [3.0, 1.0, 1.0],
            &EulerAngles::new(FRAC_PI_2, 0.0, 0.0),
            1.0,
        );
        assert!(eval.contains(&Point3::new(5.0, 7.5, 5.0)));
        assert!(!eval.contains(&Point3::new(7.5, 5.0, 5.0)));
        assert_relative_eq!(eval.radial_distance(&Point3::new(5.0, 5.0, 5.0)), 0.0);
        assert_relative_eq!(
            eval.radial_distance(&Point3::new(5.0, 5.0, 6.0)),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_aabb_follows_rotation() {
        let eval = ShapeEvaluator::new(
            ShapeType::Ellipsoid,
            Point3::origin(),
            [3.0, 1.0, 0.5],
            &EulerAngles::new(FRAC_PI_2, 0.0, 0.0),
            1.0,
        );
        let [hx, hy, hz] = eval.half_extents();
        assert_relative_eq!(hx, 1.0, epsilon = 1e-12);
        assert_relative_eq!(hy, 3.0, epsilon = 1e-12);
        assert_relative_eq!(hz, 0.5, epsilon = 1e-12);

        let aabb = eval.aabb();
        assert_relative_eq!(aabb.min_y, -3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_volume() {
        let eval = ShapeEvaluator::new(
            ShapeType::Ellipsoid,
            Point3::origin(),
            [2.0, 1.0, 1.0],
            &EulerAngles::zero(),
            1.0,
        );
        assert_relative_eq!(eval.volume(), 8.0 / 3.0 * PI, epsilon = 1e-12);
    }
}
