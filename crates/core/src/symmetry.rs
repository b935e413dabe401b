//! Crystal symmetry (Laue group) operations.
//!
//! Each supported crystal structure implements [`LaueOps`]: a list of proper
//! rotational symmetry operators plus derived operations (fundamental-zone
//! reduction, misorientation, twin-law matching). Callers select the
//! implementation through [`CrystalStructure::laue_ops`], so new symmetry classes
//! are added here without touching packing or merge logic.

use crate::transform::{rotation_angle, EulerAngles};
use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};
use std::f64::consts::{FRAC_1_SQRT_2, PI};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Crystal structure of a phase, with the conventional numeric codes used in
/// ensemble arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CrystalStructure {
    /// Hexagonal 6/mmm.
    HexagonalHigh,
    /// Cubic m-3m.
    CubicHigh,
    /// Triclinic -1.
    Triclinic,
    /// Orthorhombic mmm.
    Orthorhombic,
    /// Unknown or invalid phase.
    #[default]
    Unknown,
}

impl CrystalStructure {
    /// Numeric code stored in the ensemble crystal-structure array.
    pub fn code(self) -> u32 {
        match self {
            CrystalStructure::HexagonalHigh => 0,
            CrystalStructure::CubicHigh => 1,
            CrystalStructure::Triclinic => 4,
            CrystalStructure::Orthorhombic => 6,
            CrystalStructure::Unknown => 999,
        }
    }

    /// Parses a numeric ensemble code.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => CrystalStructure::HexagonalHigh,
            1 => CrystalStructure::CubicHigh,
            4 => CrystalStructure::Triclinic,
            6 => CrystalStructure::Orthorhombic,
            _ => CrystalStructure::Unknown,
        }
    }

    /// Symmetry operations for this structure, if it is a known one.
    pub fn laue_ops(self) -> Option<&'static dyn LaueOps> {
        match self {
            CrystalStructure::HexagonalHigh => Some(&HexagonalOps),
            CrystalStructure::CubicHigh => Some(&CubicOps),
            CrystalStructure::Triclinic => Some(&TriclinicOps),
            CrystalStructure::Orthorhombic => Some(&OrthorhombicOps),
            CrystalStructure::Unknown => None,
        }
    }
}

/// A twin relationship: rotation by `angle` (radians) about a crystal-frame `axis`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TwinLaw {
    /// Misorientation angle in radians.
    pub angle: f64,
    /// Rotation axis in the crystal frame (need not be normalized).
    pub axis: [f64; 3],
}

impl TwinLaw {
    /// Creates a twin law from an angle in degrees and an axis.
    pub fn from_degrees(angle: f64, axis: [f64; 3]) -> Self {
        Self {
            angle: angle.to_radians(),
            axis,
        }
    }

    /// The twin rotation as a unit quaternion.
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        let axis = Unit::new_normalize(Vector3::from(self.axis));
        UnitQuaternion::from_axis_angle(&axis, self.angle)
    }
}

/// Symmetry-operation capability of a Laue group.
pub trait LaueOps: Send + Sync {
    /// Crystal structure this implementation serves.
    fn structure(&self) -> CrystalStructure;

    /// Proper rotational symmetry operators, identity first.
    fn operators(&self) -> Vec<UnitQuaternion<f64>>;

    /// Twin laws recognized by default for this structure.
    fn default_twin_laws(&self) -> Vec<TwinLaw> {
        Vec::new()
    }

    /// Reduces an orientation to its fundamental-zone representative: the
    /// symmetric equivalent with the smallest rotation angle, with w ≥ 0.
    fn to_fundamental_zone(&self, q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
        let mut best = *q;
        let mut best_w = q.w.abs();
        for op in self.operators().iter().skip(1) {
            let candidate = op * q;
            if candidate.w.abs() > best_w + 1e-12 {
                best_w = candidate.w.abs();
                best = candidate;
            }
        }
        if best.w < 0.0 {
            best = UnitQuaternion::new_unchecked(-best.into_inner());
        }
        best
    }

    /// Fundamental-zone representative of a Bunge Euler orientation.
    fn reduce_euler(&self, euler: &EulerAngles) -> EulerAngles {
        EulerAngles::from_quaternion(&self.to_fundamental_zone(&euler.to_quaternion()))
    }

    /// Disorientation angle (radians) between two orientations.
    fn misorientation(&self, a: &UnitQuaternion<f64>, b: &UnitQuaternion<f64>) -> f64 {
        let delta = b * a.inverse();
        let ops = self.operators();
        let mut angle = PI;
        for si in &ops {
            let left = si * delta;
            for sj in &ops {
                angle = angle.min(rotation_angle(&(left * sj)));
            }
        }
        angle
    }

    /// Smallest angular deviation (radians) between the misorientation of `a`
    /// and `b` and the given twin law, over all symmetric equivalents.
    fn twin_deviation(&self, a: &UnitQuaternion<f64>, b: &UnitQuaternion<f64>, law: &TwinLaw) -> f64 {
        let delta = b * a.inverse();
        let twin = law.rotation();
        let twin_inv = twin.inverse();
        let ops = self.operators();

        let mut deviation = PI;
        for si in &ops {
            let left = si * delta;
            for sj in &ops {
                let equivalent = left * sj;
                deviation = deviation
                    .min(rotation_angle(&(twin_inv * equivalent)))
                    .min(rotation_angle(&(twin * equivalent)));
            }
        }
        deviation
    }

    /// Returns the index of the first twin law matched within `tolerance` radians.
    fn match_twin(
        &self,
        a: &UnitQuaternion<f64>,
        b: &UnitQuaternion<f64>,
        laws: &[TwinLaw],
        tolerance: f64,
    ) -> Option<usize> {
        laws.iter()
            .position(|law| self.twin_deviation(a, b, law) <= tolerance)
    }
}

fn quat(w: f64, x: f64, y: f64, z: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize(Quaternion::new(w, x, y, z))
}

/// Triclinic -1: identity only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriclinicOps;

impl LaueOps for TriclinicOps {
    fn structure(&self) -> CrystalStructure {
        CrystalStructure::Triclinic
    }

    fn operators(&self) -> Vec<UnitQuaternion<f64>> {
        vec![UnitQuaternion::identity()]
    }
}

/// Orthorhombic mmm: identity and the three 2-fold axes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrthorhombicOps;

impl LaueOps for OrthorhombicOps {
    fn structure(&self) -> CrystalStructure {
        CrystalStructure::Orthorhombic
    }

    fn operators(&self) -> Vec<UnitQuaternion<f64>> {
        vec![
            quat(1.0, 0.0, 0.0, 0.0),
            quat(0.0, 1.0, 0.0, 0.0),
            quat(0.0, 0.0, 1.0, 0.0),
            quat(0.0, 0.0, 0.0, 1.0),
        ]
    }

    /// {110} pseudo-twins of near-tetragonal orthorhombic lattices: 90° about [001].
    fn default_twin_laws(&self) -> Vec<TwinLaw> {
        vec![TwinLaw::from_degrees(90.0, [0.0, 0.0, 1.0])]
    }
}

/// Hexagonal 6/mmm: six rotations about c and six 2-fold axes in the basal plane.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexagonalOps;

impl LaueOps for HexagonalOps {
    fn structure(&self) -> CrystalStructure {
        CrystalStructure::HexagonalHigh
    }

    fn operators(&self) -> Vec<UnitQuaternion<f64>> {
        let mut ops = Vec::with_capacity(12);
        for k in 0..6 {
            let half = (k as f64) * PI / 6.0;
            ops.push(quat(half.cos(), 0.0, 0.0, half.sin()));
        }
        for k in 0..6 {
            let theta = (k as f64) * PI / 6.0;
            ops.push(quat(0.0, theta.cos(), theta.sin(), 0.0));
        }
        ops
    }

    /// {10-12} tensile twin: 86.3° about <11-20> (the Cartesian x axis).
    fn default_twin_laws(&self) -> Vec<TwinLaw> {
        vec![TwinLaw::from_degrees(86.3, [1.0, 0.0, 0.0])]
    }
}

/// Cubic m-3m: the 24 proper rotations of the cube.
#[derive(Debug, Clone, Copy, Default)]
pub struct CubicOps;

impl LaueOps for CubicOps {
    fn structure(&self) -> CrystalStructure {
        CrystalStructure::CubicHigh
    }

    fn operators(&self) -> Vec<UnitQuaternion<f64>> {
        let r = FRAC_1_SQRT_2;
        vec![
            quat(1.0, 0.0, 0.0, 0.0),
            quat(0.0, 1.0, 0.0, 0.0),
            quat(0.0, 0.0, 1.0, 0.0),
            quat(0.0, 0.0, 0.0, 1.0),
            quat(r, r, 0.0, 0.0),
            quat(r, 0.0, r, 0.0),
            quat(r, 0.0, 0.0, r),
            quat(r, -r, 0.0, 0.0),
            quat(r, 0.0, -r, 0.0),
            quat(r, 0.0, 0.0, -r),
            quat(0.0, r, r, 0.0),
            quat(0.0, -r, r, 0.0),
            quat(0.0, 0.0, r, r),
            quat(0.0, 0.0, -r, r),
            quat(0.0, r, 0.0, r),
            quat(0.0, -r, 0.0, r),
            quat(0.5, 0.5, 0.5, 0.5),
            quat(0.5, -0.5, -0.5, -0.5),
            quat(0.5, 0.5, -0.5, 0.5),
            quat(0.5, -0.5, 0.5, -0.5),
            quat(0.5, -0.5, 0.5, 0.5),
            quat(0.5, 0.5, -0.5, -0.5),
            quat(0.5, -0.5, -0.5, 0.5),
            quat(0.5, 0.5, 0.5, -0.5),
        ]
    }

    /// Σ3 annealing twin: 60° about <111>.
    fn default_twin_laws(&self) -> Vec<TwinLaw> {
        vec![TwinLaw::from_degrees(60.0, [1.0, 1.0, 1.0])]
    }
}
