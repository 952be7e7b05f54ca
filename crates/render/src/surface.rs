use liquidgrid_assets::SourceImage;
use liquidgrid_common::ViewportGeometry;
use liquidgrid_field::FieldSnapshot;
use std::sync::Arc;

use crate::layout::SurfaceLayout;

/// Errors from renderer setup and frame submission.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("surface has no image configured")]
    NotConfigured,
    #[error("surface was released")]
    Released,
    #[error("field grid is {actual}x{actual}, surface expects {expected}x{expected}")]
    GridSizeMismatch { expected: usize, actual: usize },
    #[error("invalid render parameter {name} = {value}")]
    InvalidParameter { name: &'static str, value: f32 },
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("device request failed: {0}")]
    Device(String),
    #[error("surface error: {0}")]
    Surface(String),
}

/// One warp pipeline instance: the image texture, the field texture, the
/// sampling program and its projection.
///
/// `Frame` is whatever the host draws into (a texture view for the GPU
/// backend, `()` for headless backends).
pub trait WarpSurface {
    type Frame;

    /// Take the loaded image. Returns its natural aspect ratio; from here on
    /// the surface is ready to draw.
    fn configure(&mut self, image: Arc<SourceImage>) -> Result<f32, RenderError>;

    /// Refit the projection to the container. Returns `None` and keeps the
    /// previous layout when the surface would have zero area.
    fn resize(&mut self, geometry: &ViewportGeometry) -> Option<SurfaceLayout>;

    /// Advance animation time, upload `field` and draw once.
    fn render_frame(
        &mut self,
        frame: &Self::Frame,
        field: &FieldSnapshot<'_>,
    ) -> Result<(), RenderError>;

    /// Drop every backend resource. Safe to call more than once.
    fn release(&mut self);

    fn is_ready(&self) -> bool;

    fn layout(&self) -> Option<SurfaceLayout>;

    /// Animation time reached by the last rendered frame.
    fn time(&self) -> f32;
}

/// Builds fresh pipeline instances. Each call must return an instance that
/// shares nothing with earlier ones.
pub trait PipelineFactory {
    type Surface: WarpSurface;

    fn build(&mut self, geometry: &ViewportGeometry) -> Result<Self::Surface, RenderError>;
}
