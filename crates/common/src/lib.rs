//! Shared value types for the liquid grid effect.
//!
//! # Invariants
//! - Geometry is expressed in device-independent (logical) pixels.
//! - Pointer positions are normalized to the container, origin bottom-left.

mod types;

pub use types::{
    ContainerRect, ContainerSize, FALLBACK_ASPECT, LoadTicket, PointerState, ViewportGeometry,
};
