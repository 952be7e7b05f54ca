//! Pointer input mapped into container space.
//!
//! # Invariants
//! - The tracker is the only writer of `PointerState`.
//! - Positions are normalized with the origin at the bottom-left corner.
//! - A move outside the container is treated as a leave; stored move
//!   positions always lie in the unit square.

pub mod tracker;

pub use tracker::{
    FAR_AWAY, LeavePolicy, PointerConfig, PointerConfigError, PointerEvent, PointerTracker,
};
