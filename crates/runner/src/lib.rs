//! Command line runner for farfield.
//!
//! This crate provides:
//! - JSON run specs describing a domain, phase statistics and configuration
//! - Conversion of run specs into pipeline inputs
//! - Run reports with JSON export and a console summary

mod parser;
mod report;
mod spec;

pub use parser::{compress_mask, expand_mask, structure_from_name, ParseError, PreparedRun, SpecParser};
pub use report::{RunReport, RunSummary};
pub use spec::{DomainSpec, FeatureSpec, MaskRun, PhaseSpec, RunSpec};
