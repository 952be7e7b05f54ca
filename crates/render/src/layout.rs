use glam::{Mat4, Vec2, Vec3};
use liquidgrid_common::{ContainerRect, ContainerSize, ViewportGeometry};

/// Orthographic projection of the image plane.
///
/// The plane is a unit quad centred on the origin, scaled by
/// `plane_scale = (image_aspect, 1)`. The frustum is one unit tall and
/// `surface aspect` units wide, so the image keeps its proportions whatever
/// the surface aspect turns out to be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub plane_scale: Vec2,
}

impl Projection {
    pub fn view_proj(&self) -> Mat4 {
        let ortho = Mat4::orthographic_rh(self.left, self.right, self.bottom, self.top, -1.0, 1.0);
        ortho * Mat4::from_scale(Vec3::new(self.plane_scale.x, self.plane_scale.y, 1.0))
    }
}

/// Where and how the warp is drawn inside its container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceLayout {
    /// Full drawing surface: container width, height from the image aspect.
    pub surface: ContainerSize,
    /// Part of the surface that is actually drawn, relative to the
    /// container's top-left corner. Shorter than `surface` when clipped.
    pub viewport: ContainerRect,
    pub projection: Projection,
}

impl SurfaceLayout {
    /// Fit the surface to `geometry`, optionally clipped to `clip_height`
    /// logical pixels. `None` for a zero-area result.
    pub fn fit(geometry: &ViewportGeometry, clip_height: Option<f32>) -> Option<Self> {
        let surface = geometry.surface_size();
        if surface.is_empty() {
            return None;
        }
        let visible = match clip_height {
            Some(clip) if clip.is_finite() => clip.min(surface.height),
            _ => surface.height,
        };
        if visible <= 0.0 {
            return None;
        }

        let display_aspect = surface.width / surface.height;
        let half_w = display_aspect * 0.5;
        let projection = Projection {
            left: -half_w,
            right: half_w,
            top: 0.5,
            // Top aligned: clipping cuts the bottom of the plane.
            bottom: 0.5 - visible / surface.height,
            plane_scale: Vec2::new(geometry.image_aspect(), 1.0),
        };
        Some(Self {
            surface,
            viewport: ContainerRect::new(0.0, 0.0, surface.width, visible),
            projection,
        })
    }

    /// Aspect ratio the image appears with on screen, in pixels.
    pub fn displayed_aspect(&self) -> f32 {
        let p = &self.projection;
        let px_per_unit_x = self.viewport.width / (p.right - p.left);
        let px_per_unit_y = self.viewport.height / (p.top - p.bottom);
        (p.plane_scale.x * px_per_unit_x) / (p.plane_scale.y * px_per_unit_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn geometry(width: f32, height: f32, image: (u32, u32)) -> ViewportGeometry {
        let mut g = ViewportGeometry::default();
        g.set_container(ContainerSize::new(width, height));
        g.set_image_size(image.0, image.1);
        g
    }

    #[test]
    fn zero_area_container_yields_no_layout() {
        let g = geometry(0.0, 500.0, (1600, 900));
        assert!(SurfaceLayout::fit(&g, None).is_none());
        let g = geometry(800.0, 500.0, (1600, 900));
        assert!(SurfaceLayout::fit(&g, Some(0.0)).is_none());
    }

    #[test]
    fn surface_follows_image_aspect() {
        let g = geometry(800.0, 1000.0, (1600, 900));
        let layout = SurfaceLayout::fit(&g, None).unwrap();
        assert_eq!(layout.surface.width, 800.0);
        assert!((layout.surface.height - 450.0).abs() < 1e-3);
        assert!((layout.displayed_aspect() - 1600.0 / 900.0).abs() < 1e-4);
    }

    #[test]
    fn clipping_keeps_image_proportions() {
        let g = geometry(800.0, 1000.0, (1600, 900));
        let layout = SurfaceLayout::fit(&g, Some(300.0)).unwrap();
        assert_eq!(layout.viewport.height, 300.0);
        assert!((layout.displayed_aspect() - 1600.0 / 900.0).abs() < 1e-4);
    }

    #[test]
    fn fit_is_idempotent() {
        let g = geometry(640.0, 480.0, (1000, 1000));
        assert_eq!(SurfaceLayout::fit(&g, None), SurfaceLayout::fit(&g, None));
    }

    #[test]
    fn plane_corners_fill_unclipped_viewport() {
        let g = geometry(900.0, 900.0, (1600, 900));
        let vp = SurfaceLayout::fit(&g, None).unwrap().projection.view_proj();
        let top_right = vp * Vec4::new(0.5, 0.5, 0.0, 1.0);
        let bottom_left = vp * Vec4::new(-0.5, -0.5, 0.0, 1.0);
        assert!((top_right.x - 1.0).abs() < 1e-4 && (top_right.y - 1.0).abs() < 1e-4);
        assert!((bottom_left.x + 1.0).abs() < 1e-4 && (bottom_left.y + 1.0).abs() < 1e-4);
    }
}
