//! Activation controller: decides whether the warp pipeline exists at all.
//!
//! # Invariants
//! - At most one pipeline instance is alive per controller; reactivation
//!   tears the old one down before building the next.
//! - No pipeline resource is allocated before the first intersection.
//! - Disposal is idempotent and cancels the pending frame, both
//!   subscriptions and any in-flight image load.
//! - Within a frame the field is ticked before the renderer reads it.

pub mod config;
pub mod controller;
pub mod visibility;

pub use config::{ActivationConfig, ConfigError, WarpConfig};
pub use controller::{
    ActivationController, ActivationState, FrameHandle, LoadStatus, Presentation, Transition,
    TransitionReason,
};
pub use visibility::{Subscription, SubscriptionKind, intersects_with_margin};
