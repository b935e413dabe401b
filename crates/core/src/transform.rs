//! Orientation and bounding-box types.
//!
//! Orientations use the Bunge (ZXZ) Euler convention in radians with the passive
//! matrix `g`, which maps sample-frame vectors into the crystal (or grain-axis)
//! frame. Composition of quaternions follows matrix order: `q(S * g) = q(S) * q(g)`.

use nalgebra::{Matrix3, RealField, Rotation3, UnitQuaternion, Vector3};
use std::f64::consts::TAU;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bunge Euler angles (phi1, Phi, phi2) in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EulerAngles {
    /// First rotation about Z.
    pub phi1: f64,
    /// Rotation about the rotated X axis (capital Phi).
    pub phi: f64,
    /// Second rotation about the rotated Z axis.
    pub phi2: f64,
}

impl EulerAngles {
    /// Creates a new Euler triple.
    pub const fn new(phi1: f64, phi: f64, phi2: f64) -> Self {
        Self { phi1, phi, phi2 }
    }

    /// The identity orientation.
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Creates an Euler triple from angles given in degrees.
    pub fn from_degrees(phi1: f64, phi: f64, phi2: f64) -> Self {
        Self::new(phi1.to_radians(), phi.to_radians(), phi2.to_radians())
    }

    /// Returns the angles as an array.
    pub fn to_array(self) -> [f64; 3] {
        [self.phi1, self.phi, self.phi2]
    }

    /// Returns the angles as single-precision values (cell array layout).
    pub fn to_f32(self) -> [f32; 3] {
        [self.phi1 as f32, self.phi as f32, self.phi2 as f32]
    }

    /// Passive orientation matrix (sample → crystal).
    pub fn to_matrix(&self) -> Matrix3<f64> {
        let (s1, c1) = self.phi1.sin_cos();
        let (s, c) = self.phi.sin_cos();
        let (s2, c2) = self.phi2.sin_cos();

        Matrix3::new(
            c1 * c2 - s1 * s2 * c,
            s1 * c2 + c1 * s2 * c,
            s2 * s,
            -c1 * s2 - s1 * c2 * c,
            -s1 * s2 + c1 * c2 * c,
            c2 * s,
            s1 * s,
            -c1 * s,
            c,
        )
    }

    /// Recovers Bunge angles from a passive orientation matrix.
    ///
    /// phi1 and phi2 are wrapped to [0, 2π); when Phi is degenerate (0 or π) the
    /// whole in-plane rotation is carried by phi1.
    pub fn from_matrix(g: &Matrix3<f64>) -> Self {
        let phi = g[(2, 2)].clamp(-1.0, 1.0).acos();
        let (phi1, phi2) = if phi.sin().abs() > 1e-9 {
            (g[(2, 0)].atan2(-g[(2, 1)]), g[(0, 2)].atan2(g[(1, 2)]))
        } else {
            (g[(0, 1)].atan2(g[(0, 0)]), 0.0)
        };
        Self::new(wrap_angle(phi1), phi, wrap_angle(phi2))
    }

    /// Unit quaternion of the passive orientation matrix.
    pub fn to_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(self.to_matrix()))
    }

    /// Recovers Bunge angles from a unit quaternion.
    pub fn from_quaternion(q: &UnitQuaternion<f64>) -> Self {
        Self::from_matrix(q.to_rotation_matrix().matrix())
    }

    /// Rotates a sample-frame vector into the local frame.
    pub fn sample_to_local(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.to_matrix() * v
    }
}

impl From<[f64; 3]> for EulerAngles {
    fn from(a: [f64; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

/// Wraps an angle into [0, 2π).
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Rotation angle of a unit quaternion in [0, π], treating q and -q as equal.
pub fn rotation_angle(q: &UnitQuaternion<f64>) -> f64 {
    2.0 * q.w.abs().clamp(0.0, 1.0).acos()
}

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AABB3D<S> {
    /// Minimum x coordinate.
    pub min_x: S,
    /// Minimum y coordinate.
    pub min_y: S,
    /// Minimum z coordinate.
    pub min_z: S,
    /// Maximum x coordinate.
    pub max_x: S,
    /// Maximum y coordinate.
    pub max_y: S,
    /// Maximum z coordinate.
    pub max_z: S,
}

impl<S: RealField + Copy> AABB3D<S> {
    /// Creates a new AABB from min/max coordinates.
    pub fn new(min_x: S, min_y: S, min_z: S, max_x: S, max_y: S, max_z: S) -> Self {
        Self {
            min_x,
            min_y,
            min_z,
            max_x,
            max_y,
            max_z,
        }
    }

    /// Creates an AABB centered on a point with the given half extents.
    pub fn from_center(center: [S; 3], half: [S; 3]) -> Self {
        Self::new(
            center[0] - half[0],
            center[1] - half[1],
            center[2] - half[2],
            center[0] + half[0],
            center[1] + half[1],
            center[2] + half[2],
        )
    }

    /// Returns the minimum corner.
    pub fn min(&self) -> [S; 3] {
        [self.min_x, self.min_y, self.min_z]
    }

    /// Returns the maximum corner.
    pub fn max(&self) -> [S; 3] {
        [self.max_x, self.max_y, self.max_z]
    }

    /// Returns the edge lengths along x, y, z.
    pub fn extent(&self) -> [S; 3] {
        [
            self.max_x - self.min_x,
            self.max_y - self.min_y,
            self.max_z - self.min_z,
        ]
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains(&self, p: [S; 3]) -> bool {
        let (lo, hi) = (self.min(), self.max());
        (0..3).all(|k| lo[k] <= p[k] && p[k] <= hi[k])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_identity_matrix() {
        let g = EulerAngles::zero().to_matrix();
        assert_relative_eq!(g, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_is_orthonormal() {
        let g = EulerAngles::new(0.3, 1.1, 2.4).to_matrix();
        assert_relative_eq!(g * g.transpose(), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(g.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_euler_matrix_roundtrip() {
        let e = EulerAngles::new(0.7, 0.9, 4.0);
        let back = EulerAngles::from_matrix(&e.to_matrix());
        assert_relative_eq!(back.phi1, e.phi1, epsilon = 1e-9);
        assert_relative_eq!(back.phi, e.phi, epsilon = 1e-9);
        assert_relative_eq!(back.phi2, e.phi2, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_phi_folds_into_phi1() {
        let e = EulerAngles::new(0.5, 0.0, 0.25);
        let back = EulerAngles::from_matrix(&e.to_matrix());
        assert_relative_eq!(back.phi1, 0.75, epsilon = 1e-9);
        assert_relative_eq!(back.phi2, 0.0, epsilon = 1e-12);
        assert_relative_eq!(back.to_matrix(), e.to_matrix(), epsilon = 1e-9);
    }

    #[test]
    fn test_quaternion_roundtrip() {
        let e = EulerAngles::new(2.0, 0.4, 5.5);
        let back = EulerAngles::from_quaternion(&e.to_quaternion());
        assert_relative_eq!(back.to_matrix(), e.to_matrix(), epsilon = 1e-9);
    }

    #[test]
    fn test_quaternion_composition_follows_matrices() {
        let a = EulerAngles::new(0.2, 0.3, 0.4);
        let b = EulerAngles::new(1.2, 0.8, 0.1);
        let q = b.to_quaternion() * a.to_quaternion();
        let m = b.to_matrix() * a.to_matrix();
        assert_relative_eq!(*q.to_rotation_matrix().matrix(), m, epsilon = 1e-9);
    }

    #[test]
    fn test_sample_to_local_rotation() {
        // phi1 = 90°: the sample x axis becomes local -y.
        let e = EulerAngles::new(FRAC_PI_2, 0.0, 0.0);
        let v = e.sample_to_local(&Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(v, Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_angle() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 3.0);
        assert_relative_eq!(rotation_angle(&q), PI / 3.0, epsilon = 1e-12);
        let neg = UnitQuaternion::new_unchecked(-q.into_inner());
        assert_relative_eq!(rotation_angle(&neg), PI / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(-FRAC_PI_2), 1.5 * PI, epsilon = 1e-12);
        assert_relative_eq!(wrap_angle(TAU + 0.5), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_aabb3d_from_center() {
        let aabb = AABB3D::from_center([5.0, 5.0, 5.0], [1.0, 2.0, 3.0]);
        assert_eq!(aabb.min(), [4.0, 3.0, 2.0]);
        assert_eq!(aabb.max(), [6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_aabb3d_contains_boundary() {
        let a = AABB3D::new(0.0, 0.0, 0.0, 10.0, 4.0, 2.0);
        assert_eq!(a.extent(), [10.0, 4.0, 2.0]);
        assert!(a.contains([10.0, 0.0, 1.0]));
        assert!(!a.contains([10.5, 0.0, 1.0]));
    }
}
