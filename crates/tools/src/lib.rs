//! Developer tooling: field inspector and frame timing.
//!
//! # Invariants
//! - Tools only read simulation state; they never mutate it.

mod inspector;
mod timer;

pub use inspector::{FieldInspector, FieldSummary};
pub use timer::FrameTimer;
