//! Warp renderer contract: backend-agnostic interface.
//!
//! # Invariants
//! - A surface never samples the image before `configure` succeeded.
//! - Animation time advances by a fixed step per rendered frame, never by
//!   wall-clock time.
//! - After `release` a surface holds no backend resources and refuses to
//!   render.
//!
//! The GPU backend lives in `liquidgrid-render-wgpu`; this crate also
//! ships a recording backend that counts pipeline lifetimes for headless
//! hosts and tests.

mod config;
mod layout;
mod recording;
mod surface;

pub use config::{AnimationClock, RenderConfig};
pub use layout::{Projection, SurfaceLayout};
pub use recording::{PipelineLedger, RecordingFactory, RecordingSurface};
pub use surface::{PipelineFactory, RenderError, WarpSurface};
