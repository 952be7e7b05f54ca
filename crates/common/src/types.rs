use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Fallback image aspect ratio used until the real dimensions are known.
pub const FALLBACK_ASPECT: f32 = 16.0 / 9.0;

/// Size of the hosting surface in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f32,
    pub height: f32,
}

impl ContainerSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero, negative or not finite.
    pub fn is_empty(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Width over height, or `None` for a zero-area container.
    pub fn aspect(&self) -> Option<f32> {
        if self.is_empty() {
            None
        } else {
            Some(self.width / self.height)
        }
    }
}

/// Bounding box of the container in client (window) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ContainerRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// A rect anchored at the client origin.
    pub fn from_size(size: ContainerSize) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    pub fn size(&self) -> ContainerSize {
        ContainerSize::new(self.width, self.height)
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

/// Container size plus the aspect ratio of the source image.
///
/// The surface is sized to match the image, never the other way round:
/// `surface_size()` always has aspect `image_aspect`, whatever the
/// container's own proportions are.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportGeometry {
    container: ContainerSize,
    image_aspect: f32,
    image_loaded: bool,
}

impl Default for ViewportGeometry {
    fn default() -> Self {
        Self::with_fallback_aspect(FALLBACK_ASPECT)
    }
}

impl ViewportGeometry {
    /// Geometry with an empty container and the given placeholder aspect.
    ///
    /// A non-finite or non-positive fallback is replaced by 16:9.
    pub fn with_fallback_aspect(aspect: f32) -> Self {
        let image_aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            FALLBACK_ASPECT
        };
        Self {
            container: ContainerSize::default(),
            image_aspect,
            image_loaded: false,
        }
    }

    pub fn container(&self) -> ContainerSize {
        self.container
    }

    pub fn set_container(&mut self, size: ContainerSize) {
        self.container = size;
    }

    pub fn image_aspect(&self) -> f32 {
        self.image_aspect
    }

    pub fn image_loaded(&self) -> bool {
        self.image_loaded
    }

    /// Record the natural size of the loaded image. Returns the new aspect,
    /// or `None` (leaving the geometry untouched) for a degenerate size.
    pub fn set_image_size(&mut self, width: u32, height: u32) -> Option<f32> {
        if width == 0 || height == 0 {
            return None;
        }
        self.image_aspect = width as f32 / height as f32;
        self.image_loaded = true;
        Some(self.image_aspect)
    }

    /// Size of the drawing surface: full container width, height derived
    /// from the image aspect ratio.
    pub fn surface_size(&self) -> ContainerSize {
        let width = self.container.width.max(0.0);
        ContainerSize::new(width, width / self.image_aspect)
    }
}

/// Last observed pointer position and per-frame velocity.
///
/// `position` is normalized to the container with the origin at the
/// bottom-left corner; `velocity` is the delta between the last two
/// observed positions, damped every frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointerState {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Identifies one asynchronous image load.
///
/// Completions carrying a ticket from an older generation are stale and
/// must be discarded by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoadTicket(pub u64);
