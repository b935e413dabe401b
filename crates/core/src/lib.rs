//! # farfield core
//!
//! Core types shared by the farfield microstructure builder.
//!
//! ## Core Components
//!
//! - **Error type**: `Error` and the `Result` alias used across the workspace
//! - **SA framework**: generic simulated-annealing runner used by the packer
//! - **Transform types**: Bunge Euler angles, rotation helpers, 3D AABBs
//! - **Symmetry**: Laue-group operators, fundamental zones, twin laws
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization support

pub mod error;
pub mod sa;
pub mod symmetry;
pub mod transform;

// Re-exports
pub use error::{Error, Result};
pub use sa::{CoolingSchedule, SaConfig, SaProblem, SaResult, SaRunner};
pub use symmetry::{
    CrystalStructure, CubicOps, HexagonalOps, LaueOps, OrthorhombicOps, TriclinicOps, TwinLaw,
};
pub use transform::{rotation_angle, wrap_angle, EulerAngles, AABB3D};
