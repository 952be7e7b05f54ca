//! Displacement field: a square grid of 2-D vectors warped by pointer motion.
//!
//! # Invariants
//! - Grid resolution is fixed at construction.
//! - Absent input every sample decays geometrically toward zero.
//! - Given the same config and input sequence, trajectories are bit-identical.

pub mod config;
pub mod field;

pub use config::{FieldConfig, FieldError, FieldSeed};
pub use field::{DisplacementField, FieldSnapshot};
