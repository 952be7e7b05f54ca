use glam::Mat4;
use liquidgrid_assets::SourceImage;
use liquidgrid_common::ViewportGeometry;
use liquidgrid_field::FieldSnapshot;
use liquidgrid_render::{
    AnimationClock, PipelineFactory, RenderConfig, RenderError, SurfaceLayout, WarpSurface,
};
use std::rc::Rc;
use std::sync::Arc;

use crate::gpu::{GpuHost, to_wgpu_color};
use crate::quad::{self, QuadBuffers, Uniforms};
use crate::shaders;

struct ImageBinding {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// GPU objects owned by one warp pipeline instance.
struct WarpResources {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    buffers: QuadBuffers,
    sampler: wgpu::Sampler,
    field_texture: wgpu::Texture,
    field_view: wgpu::TextureView,
    image: Option<ImageBinding>,
}

impl WarpResources {
    fn destroy(self) {
        self.buffers.destroy();
        self.field_texture.destroy();
        if let Some(image) = self.image {
            image.texture.destroy();
        }
    }
}

/// wgpu implementation of the warp pass.
pub struct WgpuWarpRenderer {
    host: Rc<GpuHost>,
    config: RenderConfig,
    grid_size: u32,
    clock: AnimationClock,
    geometry: ViewportGeometry,
    layout: Option<SurfaceLayout>,
    resources: Option<WarpResources>,
}

impl WgpuWarpRenderer {
    pub fn new(
        host: Rc<GpuHost>,
        config: RenderConfig,
        grid_size: usize,
        geometry: &ViewportGeometry,
    ) -> Result<Self, RenderError> {
        let grid_size = u32::try_from(grid_size)
            .ok()
            .filter(|&n| n > 0)
            .ok_or(RenderError::InvalidParameter {
                name: "grid_size",
                value: grid_size as f32,
            })?;
        let device = host.device();

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("warp_bind_group_layout"),
            entries: &[
                quad::uniform_entry(0),
                quad::texture_entry(1, true),
                quad::sampler_entry(2),
                quad::texture_entry(3, false),
            ],
        });
        let pipeline = quad::quad_pipeline(
            device,
            "warp",
            shaders::WARP_SHADER,
            &bind_group_layout,
            host.format(),
        );
        let buffers = QuadBuffers::new(device, "warp");
        let field_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("field_texture"),
            size: field_extent(grid_size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rg32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let field_view = field_texture.create_view(&Default::default());
        let sampler = quad::linear_sampler(device);

        let mut renderer = Self {
            host,
            config,
            grid_size,
            clock: AnimationClock::new(config.time_step),
            geometry: *geometry,
            layout: None,
            resources: Some(WarpResources {
                pipeline,
                bind_group_layout,
                buffers,
                sampler,
                field_texture,
                field_view,
                image: None,
            }),
        };
        renderer.resize(geometry);
        tracing::debug!(grid_size, "warp pipeline built");
        Ok(renderer)
    }

    fn clip_height(&self) -> f32 {
        self.host.logical_height()
    }
}

impl WarpSurface for WgpuWarpRenderer {
    type Frame = wgpu::TextureView;

    fn configure(&mut self, image: Arc<SourceImage>) -> Result<f32, RenderError> {
        let resources = self.resources.as_mut().ok_or(RenderError::Released)?;
        let device = self.host.device();
        let texture = quad::upload_image(device, self.host.queue(), &image);
        let image_view = texture.create_view(&Default::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("warp_bind_group"),
            layout: &resources.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: resources.buffers.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&image_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&resources.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&resources.field_view),
                },
            ],
        });
        if let Some(old) = resources.image.replace(ImageBinding {
            texture,
            bind_group,
        }) {
            old.texture.destroy();
        }

        self.geometry.set_image_size(image.width(), image.height());
        let geometry = self.geometry;
        self.resize(&geometry);
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "warp image configured"
        );
        Ok(image.aspect())
    }

    fn resize(&mut self, geometry: &ViewportGeometry) -> Option<SurfaceLayout> {
        self.geometry = *geometry;
        let layout = SurfaceLayout::fit(geometry, Some(self.clip_height()))?;
        self.layout = Some(layout);
        Some(layout)
    }

    fn render_frame(
        &mut self,
        view: &wgpu::TextureView,
        field: &FieldSnapshot<'_>,
    ) -> Result<(), RenderError> {
        let resources = self.resources.as_ref().ok_or(RenderError::Released)?;
        let image = resources.image.as_ref().ok_or(RenderError::NotConfigured)?;
        if field.size != self.grid_size as usize {
            return Err(RenderError::GridSizeMismatch {
                expected: self.grid_size as usize,
                actual: field.size,
            });
        }

        let time = self.clock.advance();
        let _span = tracing::trace_span!("warp_frame", time).entered();
        let queue = self.host.queue();
        let view_proj = self
            .layout
            .map(|l| l.projection.view_proj())
            .unwrap_or(Mat4::IDENTITY);
        queue.write_buffer(
            &resources.buffers.uniform,
            0,
            bytemuck::bytes_of(&Uniforms::new(
                view_proj,
                [time, self.config.warp_scale, self.grid_size as f32, 0.0],
            )),
        );

        let texels = field.to_rg32();
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &resources.field_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.grid_size * 8),
                rows_per_image: Some(self.grid_size),
            },
            field_extent(self.grid_size),
        );

        let viewport = self
            .layout
            .and_then(|l| self.host.physical_viewport(&l.viewport));
        let mut encoder = self
            .host
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("warp_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("warp_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(to_wgpu_color(self.config.placeholder_color)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
            if let Some([x, y, w, h]) = viewport {
                pass.set_viewport(x, y, w, h, 0.0, 1.0);
                pass.set_pipeline(&resources.pipeline);
                pass.set_bind_group(0, &image.bind_group, &[]);
                resources.buffers.draw(&mut pass);
            }
        }
        queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn release(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.destroy();
            tracing::debug!("warp pipeline released");
        }
    }

    fn is_ready(&self) -> bool {
        self.resources
            .as_ref()
            .is_some_and(|r| r.image.is_some())
    }

    fn layout(&self) -> Option<SurfaceLayout> {
        self.layout
    }

    fn time(&self) -> f32 {
        self.clock.time()
    }
}

impl Drop for WgpuWarpRenderer {
    fn drop(&mut self) {
        self.release();
    }
}

fn field_extent(grid_size: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: grid_size,
        height: grid_size,
        depth_or_array_layers: 1,
    }
}

/// Builds a fresh [`WgpuWarpRenderer`] on the shared host for every
/// activation.
pub struct WgpuPipelineFactory {
    host: Rc<GpuHost>,
    config: RenderConfig,
    grid_size: usize,
}

impl WgpuPipelineFactory {
    pub fn new(host: Rc<GpuHost>, config: RenderConfig, grid_size: usize) -> Self {
        Self {
            host,
            config,
            grid_size,
        }
    }

    pub fn host(&self) -> &Rc<GpuHost> {
        &self.host
    }
}

impl PipelineFactory for WgpuPipelineFactory {
    type Surface = WgpuWarpRenderer;

    fn build(&mut self, geometry: &ViewportGeometry) -> Result<WgpuWarpRenderer, RenderError> {
        WgpuWarpRenderer::new(Rc::clone(&self.host), self.config, self.grid_size, geometry)
    }
}
