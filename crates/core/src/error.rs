//! Error types for farfield.

use thiserror::Error;

/// Result type alias for farfield operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures that prevent a microstructure from being produced.
///
/// Recoverable conditions (features that could not be packed, gap voxels with no
/// reachable owner) are not errors; they are reported as diagnostics next to the
/// primary output.
#[derive(Debug, Error)]
pub enum Error {
    /// No phase carries usable feature statistics.
    #[error("No feature statistics: {0}")]
    NoFeatureStatistics(String),

    /// A phase's statistics cannot produce valid features.
    #[error("Invalid statistics for phase {phase}: {reason}")]
    InvalidStatistics {
        /// Phase the statistics belong to.
        phase: u32,
        /// What is wrong with them.
        reason: String,
    },

    /// Invalid domain geometry (dimensions, resolution, slabs).
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    /// Mask length does not match the voxel count.
    #[error("Invalid mask: expected {expected} entries, found {found}")]
    InvalidMask {
        /// Number of voxels in the domain.
        expected: usize,
        /// Number of mask entries supplied.
        found: usize,
    },

    /// An externally supplied feature is malformed.
    #[error("Invalid feature {id}: {reason}")]
    InvalidFeature {
        /// Feature id.
        id: u32,
        /// What is wrong with it.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal consistency check failed (programming error).
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl Error {
    /// Returns true for configuration-class errors, detected before any stage runs.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Error::InvariantViolation(_))
    }
}
