use liquidgrid_assets::SourceImage;
use liquidgrid_common::ViewportGeometry;
use liquidgrid_render::{RenderConfig, SurfaceLayout};
use std::rc::Rc;
use std::sync::Arc;

use crate::gpu::{GpuHost, to_wgpu_color};
use crate::quad::{self, QuadBuffers, Uniforms};
use crate::shaders;

struct BlitResources {
    pipeline: wgpu::RenderPipeline,
    buffers: QuadBuffers,
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    source: Arc<SourceImage>,
}

/// Draws the source image unmodified, with the same fit as the warp pass.
/// No field, no animation; used while the warp is suspended.
pub struct StaticImageRenderer {
    host: Rc<GpuHost>,
    config: RenderConfig,
    resources: Option<BlitResources>,
}

impl StaticImageRenderer {
    pub fn new(host: Rc<GpuHost>, config: RenderConfig) -> Self {
        Self {
            host,
            config,
            resources: None,
        }
    }

    /// Upload `image` unless it is already the one being shown.
    pub fn set_image(&mut self, image: &Arc<SourceImage>) {
        if self
            .resources
            .as_ref()
            .is_some_and(|r| Arc::ptr_eq(&r.source, image))
        {
            return;
        }
        self.release();

        let device = self.host.device();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit_bind_group_layout"),
            entries: &[
                quad::uniform_entry(0),
                quad::texture_entry(1, true),
                quad::sampler_entry(2),
            ],
        });
        let pipeline = quad::quad_pipeline(
            device,
            "blit",
            shaders::BLIT_SHADER,
            &bind_group_layout,
            self.host.format(),
        );
        let buffers = QuadBuffers::new(device, "blit");
        let texture = quad::upload_image(device, self.host.queue(), image);
        let view = texture.create_view(&Default::default());
        let sampler = quad::linear_sampler(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });
        self.resources = Some(BlitResources {
            pipeline,
            buffers,
            texture,
            bind_group,
            source: Arc::clone(image),
        });
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "static image uploaded"
        );
    }

    /// Draw into `view`. Returns false when there is nothing to draw.
    pub fn render(&self, view: &wgpu::TextureView, geometry: &ViewportGeometry) -> bool {
        let Some(resources) = &self.resources else {
            return false;
        };
        let Some(layout) = SurfaceLayout::fit(geometry, Some(self.host.logical_height())) else {
            return false;
        };
        let queue = self.host.queue();
        queue.write_buffer(
            &resources.buffers.uniform,
            0,
            bytemuck::bytes_of(&Uniforms::new(layout.projection.view_proj(), [0.0; 4])),
        );

        let mut encoder = self
            .host
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("blit_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("blit_pass"),
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
            if let Some([x, y, w, h]) = self.host.physical_viewport(&layout.viewport) {
                pass.set_viewport(x, y, w, h, 0.0, 1.0);
                pass.set_pipeline(&resources.pipeline);
                pass.set_bind_group(0, &resources.bind_group, &[]);
                resources.buffers.draw(&mut pass);
            }
        }
        queue.submit(std::iter::once(encoder.finish()));
        true
    }

    pub fn release(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.buffers.destroy();
            resources.texture.destroy();
            tracing::debug!("static image released");
        }
    }
}

impl Drop for StaticImageRenderer {
    fn drop(&mut self) {
        self.release();
    }
}
