use liquidgrid_common::ContainerRect;
use liquidgrid_render::RenderError;
use std::cell::{Cell, RefCell};

/// Device, queue and presentation surface shared by every renderer drawing
/// into one window.
///
/// Renderers hold it behind an `Rc`; the host stays the only party that
/// reconfigures the surface.
pub struct GpuHost {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Option<wgpu::Surface<'static>>,
    config: RefCell<wgpu::SurfaceConfiguration>,
    scale_factor: Cell<f64>,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuHost {
    /// Create a host presenting to `target` (typically an `Arc<Window>`).
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        scale_factor: f64,
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        let (device, queue) = request_device(&adapter).await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = surface_config(format, alpha_mode, width, height);
        surface.configure(&device, &config);

        let adapter_info = adapter.get_info();
        tracing::info!(
            backend = adapter_info.backend.to_str(),
            adapter = %adapter_info.name,
            ?format,
            "GPU initialized"
        );

        Ok(Self {
            device,
            queue,
            surface: Some(surface),
            config: RefCell::new(config),
            scale_factor: Cell::new(scale_factor),
            adapter_info,
        })
    }

    /// A host without a presentation surface. Renderers draw into texture
    /// views supplied by the caller.
    pub async fn headless(width: u32, height: u32) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or(RenderError::NoAdapter)?;
        let (device, queue) = request_device(&adapter).await?;
        let config = surface_config(
            wgpu::TextureFormat::Rgba8UnormSrgb,
            wgpu::CompositeAlphaMode::Auto,
            width,
            height,
        );
        Ok(Self {
            device,
            queue,
            surface: None,
            config: RefCell::new(config),
            scale_factor: Cell::new(1.0),
            adapter_info: adapter.get_info(),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.borrow().format
    }

    /// Render target size in physical pixels.
    pub fn target_size(&self) -> (u32, u32) {
        let config = self.config.borrow();
        (config.width, config.height)
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor.get()
    }

    pub fn set_scale_factor(&self, scale_factor: f64) {
        self.scale_factor.set(scale_factor);
    }

    /// Target height in logical pixels.
    pub fn logical_height(&self) -> f32 {
        (self.target_size().1 as f64 / self.scale_factor()) as f32
    }

    pub fn adapter_summary(&self) -> String {
        format!(
            "{} ({})",
            self.adapter_info.name,
            self.adapter_info.backend.to_str()
        )
    }

    /// Resize the render target (physical pixels) and reconfigure.
    pub fn resize(&self, width: u32, height: u32) {
        let mut config = self.config.borrow_mut();
        config.width = width.max(1);
        config.height = height.max(1);
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &config);
        }
    }

    /// Next swapchain texture. `Ok(None)` when the surface was lost or
    /// outdated and has been reconfigured; the caller skips this frame.
    pub fn acquire(&self) -> Result<Option<wgpu::SurfaceTexture>, RenderError> {
        let Some(surface) = &self.surface else {
            return Err(RenderError::Surface("headless host has no surface".into()));
        };
        match surface.get_current_texture() {
            Ok(texture) => Ok(Some(texture)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                surface.configure(&self.device, &self.config.borrow());
                tracing::debug!("surface reconfigured");
                Ok(None)
            }
            Err(e) => Err(RenderError::Surface(e.to_string())),
        }
    }

    /// Fill the whole target with `color`.
    pub fn clear(&self, view: &wgpu::TextureView, color: [f32; 4]) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear_encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(to_wgpu_color(color)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// `rect` (logical pixels) as a physical viewport clamped to the target.
    pub fn physical_viewport(&self, rect: &ContainerRect) -> Option<[f32; 4]> {
        viewport_in_pixels(rect, self.scale_factor(), self.target_size())
    }
}

/// Convert a logical rect into a physical `[x, y, w, h]` viewport inside a
/// `target` of the given size. `None` when less than a pixel remains.
pub fn viewport_in_pixels(
    rect: &ContainerRect,
    scale_factor: f64,
    target: (u32, u32),
) -> Option<[f32; 4]> {
    let s = scale_factor as f32;
    let (tw, th) = (target.0 as f32, target.1 as f32);
    let x = (rect.left * s).clamp(0.0, tw);
    let y = (rect.top * s).clamp(0.0, th);
    let w = (rect.width * s).min(tw - x);
    let h = (rect.height * s).min(th - y);
    if w < 1.0 || h < 1.0 {
        return None;
    }
    Some([x, y, w, h])
}

pub(crate) fn to_wgpu_color(c: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: c[0] as f64,
        g: c[1] as f64,
        b: c[2] as f64,
        a: c[3] as f64,
    }
}

async fn request_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue), RenderError> {
    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("liquidgrid_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .map_err(|e| RenderError::Device(e.to_string()))
}

fn surface_config(
    format: wgpu::TextureFormat,
    alpha_mode: wgpu::CompositeAlphaMode,
    width: u32,
    height: u32,
) -> wgpu::SurfaceConfiguration {
    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_scales_logical_to_physical() {
        let rect = ContainerRect::new(0.0, 0.0, 400.0, 225.0);
        assert_eq!(
            viewport_in_pixels(&rect, 2.0, (800, 600)),
            Some([0.0, 0.0, 800.0, 450.0])
        );
    }

    #[test]
    fn viewport_is_clamped_to_target() {
        let rect = ContainerRect::new(0.0, 0.0, 1000.0, 800.0);
        assert_eq!(
            viewport_in_pixels(&rect, 1.0, (1000, 600)),
            Some([0.0, 0.0, 1000.0, 600.0])
        );
    }

    #[test]
    fn sub_pixel_viewport_is_dropped() {
        let rect = ContainerRect::new(0.0, 0.0, 0.4, 100.0);
        assert_eq!(viewport_in_pixels(&rect, 1.0, (100, 100)), None);
    }
}
