//! wgpu render backend for the liquid grid warp.
//!
//! The warp pass samples the source image at `uv - k * field(uv)`, with the
//! displacement field uploaded every frame as a two-channel float texture.
//! A separate blit pass draws the image unmodified for the suspended state.
//!
//! # Invariants
//! - Every texture and buffer a renderer creates is destroyed by `release`
//!   or, failing that, on drop.
//! - Field texels are fetched unfiltered (nearest cell).
//! - Renderers never mutate the field.

mod blit;
mod gpu;
mod quad;
mod shaders;
mod warp;

pub use blit::StaticImageRenderer;
pub use gpu::{GpuHost, viewport_in_pixels};
pub use warp::{WgpuPipelineFactory, WgpuWarpRenderer};
