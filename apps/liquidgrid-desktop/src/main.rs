use anyhow::Result;
use clap::Parser;
use egui::Context as EguiContext;
use glam::Vec2;
use liquidgrid_activation::{
    ActivationController, Presentation, WarpConfig, intersects_with_margin,
};
use liquidgrid_assets::{ImageSource, LoadCompletion, SourceImage, ThreadedImageLoader};
use liquidgrid_common::{ContainerRect, ContainerSize};
use liquidgrid_input::PointerEvent;
use liquidgrid_render_wgpu::{GpuHost, StaticImageRenderer, WgpuPipelineFactory};
use liquidgrid_tools::{FieldInspector, FrameTimer};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "liquidgrid-desktop", about = "Liquid grid image warp")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML or JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Image to warp; a generated checkerboard is used when omitted
    image: Option<PathBuf>,
}

/// Events delivered to the event loop from other threads.
#[derive(Debug)]
enum HostEvent {
    ImageLoaded(LoadCompletion),
}

type Controller = ActivationController<WgpuPipelineFactory, ThreadedImageLoader>;

/// GPU-side state that exists once the window does.
struct Gpu {
    window: Arc<Window>,
    host: Rc<GpuHost>,
    controller: Controller,
    static_image: Option<StaticImageRenderer>,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

struct App {
    config: WarpConfig,
    source: ImageSource,
    proxy: EventLoopProxy<HostEvent>,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
    show_overlay: bool,
    timer: FrameTimer,
    dirty: bool,
}

impl App {
    fn new(config: WarpConfig, source: ImageSource, proxy: EventLoopProxy<HostEvent>) -> Self {
        Self {
            config,
            source,
            proxy,
            gpu: None,
            egui_ctx: EguiContext::default(),
            show_overlay: false,
            timer: FrameTimer::new(120),
            dirty: true,
        }
    }

    fn init_gpu(&self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let attrs = Window::default_attributes()
            .with_title("Liquid Grid")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(event_loop.create_window(attrs)?);
        let size = window.inner_size();
        let host = Rc::new(pollster::block_on(GpuHost::new(
            window.clone(),
            size.width,
            size.height,
            window.scale_factor(),
        ))?);

        let factory = WgpuPipelineFactory::new(
            Rc::clone(&host),
            self.config.render,
            self.config.field.grid_size,
        );
        let proxy = Mutex::new(self.proxy.clone());
        let loader = ThreadedImageLoader::new(self.source.clone(), move |done| {
            if let Ok(proxy) = proxy.lock() {
                // Fails only once the event loop is gone.
                let _ = proxy.send_event(HostEvent::ImageLoaded(done));
            }
        });
        let mut controller = ActivationController::new(&self.config, factory, loader)?;
        controller.mount();

        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(host.device(), host.format(), None, 1, false);

        Ok(Gpu {
            window,
            host,
            controller,
            static_image: None,
            egui_winit,
            egui_renderer,
        })
    }

    /// Report the window area as the container and check it against the
    /// viewport (which, for a window, is the same rectangle).
    fn sync_container(gpu: &mut Gpu, size: PhysicalSize<u32>) {
        let logical = size.to_logical::<f32>(gpu.window.scale_factor());
        let container = ContainerSize::new(logical.width, logical.height);
        gpu.controller.on_resize(container);
        if gpu.controller.visibility_subscription().is_active() {
            let rect = ContainerRect::from_size(container);
            let margin = gpu.controller.config().root_margin;
            gpu.controller
                .on_visibility(intersects_with_margin(&rect, &rect, margin));
        }
    }

    fn redraw(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        self.timer.mark(Instant::now());

        let output = match gpu.host.acquire() {
            Ok(Some(texture)) => texture,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let presentation = gpu.controller.presentation();
        match presentation {
            Presentation::Warp => {
                let drawn = match gpu.controller.pending_frame() {
                    Some(handle) => gpu.controller.run_frame(handle, &view).unwrap_or_else(|e| {
                        tracing::warn!("warp frame failed: {e}");
                        false
                    }),
                    None => false,
                };
                if !drawn {
                    gpu.host.clear(&view, self.config.render.placeholder_color);
                }
            }
            Presentation::StaticImage { .. } => {
                let renderer = gpu.static_image.get_or_insert_with(|| {
                    StaticImageRenderer::new(Rc::clone(&gpu.host), self.config.render)
                });
                if let Some(image) = gpu.controller.image() {
                    renderer.set_image(image);
                }
                if !renderer.render(&view, gpu.controller.geometry()) {
                    gpu.host.clear(&view, self.config.render.placeholder_color);
                }
            }
            Presentation::Placeholder | Presentation::Hidden => {
                gpu.host.clear(&view, self.config.render.placeholder_color);
            }
        }
        if !matches!(presentation, Presentation::StaticImage { .. }) {
            if let Some(mut renderer) = gpu.static_image.take() {
                renderer.release();
            }
        }

        if self.show_overlay {
            Self::draw_overlay(gpu, &self.egui_ctx, &self.timer, &view);
        }

        output.present();
        self.dirty = false;
    }

    fn draw_overlay(
        gpu: &mut Gpu,
        ctx: &EguiContext,
        timer: &FrameTimer,
        view: &wgpu::TextureView,
    ) {
        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let full_output = ctx.run(raw_input, |ctx| {
            overlay_ui(ctx, &gpu.controller, &gpu.host, timer);
        });
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = ctx.tessellate(full_output.shapes, full_output.pixels_per_point);
        let (width, height) = gpu.host.target_size();
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [width, height],
            pixels_per_point: full_output.pixels_per_point,
        };

        let device = gpu.host.device();
        let queue = gpu.host.queue();
        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("egui_encoder"),
        });
        gpu.egui_renderer.update_buffers(
            device,
            queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }
    }
}

fn overlay_ui(ctx: &EguiContext, controller: &Controller, host: &GpuHost, timer: &FrameTimer) {
    egui::SidePanel::left("overlay")
        .default_width(280.0)
        .show(ctx, |ui| {
            ui.heading("Liquid Grid");
            ui.separator();
            ui.label(format!("State: {}", controller.state()));
            ui.label(format!(
                "Image: {:?} ({})",
                controller.load_status(),
                controller.loader().source().describe()
            ));
            ui.label(format!("Presentation: {:?}", controller.presentation()));
            let geometry = controller.geometry();
            let container = geometry.container();
            let surface = geometry.surface_size();
            ui.label(format!(
                "Container: {:.0} x {:.0}",
                container.width, container.height
            ));
            ui.label(format!(
                "Surface: {:.0} x {:.0} (aspect {:.3})",
                surface.width,
                surface.height,
                geometry.image_aspect()
            ));
            ui.separator();

            ui.heading("Field");
            match controller.field() {
                Some(field) => {
                    let s = FieldInspector::summary(field);
                    ui.label(format!("Grid: {n} x {n}  Ticks: {}", s.ticks, n = s.size));
                    ui.label(format!("Max: {:.4}  Mean: {:.5}", s.max_magnitude, s.mean_magnitude));
                    ui.label(format!("Energy: {:.4}  Active: {}", s.energy, s.active_cells));
                }
                None => {
                    ui.label("No pipeline");
                }
            }
            if let Some(pointer) = controller.pointer() {
                ui.label(format!(
                    "Pointer: ({:.3}, {:.3}) v=({:.4}, {:.4})",
                    pointer.position.x, pointer.position.y, pointer.velocity.x, pointer.velocity.y
                ));
            }
            ui.separator();

            ui.heading("Timing");
            ui.label(format!("FPS: {:.1}", timer.fps()));
            ui.label(format!(
                "Frame: avg {:.2} ms, max {:.2} ms",
                timer.average().as_secs_f64() * 1000.0,
                timer.max().as_secs_f64() * 1000.0
            ));
            ui.label(format!("Adapter: {}", host.adapter_summary()));
            if let Some(error) = controller.last_error() {
                ui.separator();
                ui.colored_label(egui::Color32::LIGHT_RED, error);
            }

            ui.separator();
            ui.heading("Transitions");
            for t in controller.history().iter().rev().take(8) {
                ui.small(format!("{} -> {} ({:?}, h={:.0})", t.from, t.to, t.reason, t.height));
            }
            ui.separator();
            ui.small("F1: Toggle overlay | Esc: Quit");
        });
}

impl ApplicationHandler<HostEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match self.init_gpu(event_loop) {
            Ok(mut gpu) => {
                let size = gpu.window.inner_size();
                Self::sync_container(&mut gpu, size);
                tracing::info!(adapter = %gpu.host.adapter_summary(), "window ready");
                self.gpu = Some(gpu);
                self.dirty = true;
            }
            Err(e) => {
                tracing::error!("failed to initialize: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: HostEvent) {
        let HostEvent::ImageLoaded(done) = event;
        if let Some(gpu) = &mut self.gpu {
            gpu.controller.on_image_loaded(done.ticket, done.result);
            self.dirty = true;
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        if self.show_overlay {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.repaint {
                self.dirty = true;
            }
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                gpu.controller.dispose();
                if let Some(mut renderer) = gpu.static_image.take() {
                    renderer.release();
                }
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::F1),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.show_overlay = !self.show_overlay;
                self.dirty = true;
            }
            WindowEvent::Resized(size) => {
                gpu.host.resize(size.width, size.height);
                Self::sync_container(gpu, size);
                self.dirty = true;
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                gpu.host.set_scale_factor(scale_factor);
                self.dirty = true;
            }
            WindowEvent::Occluded(occluded) => {
                if !occluded {
                    let size = gpu.window.inner_size();
                    Self::sync_container(gpu, size);
                    self.dirty = true;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let logical = position.to_logical::<f32>(gpu.window.scale_factor());
                let client = Vec2::new(logical.x, logical.y);
                let rect = gpu.controller.surface_rect();
                gpu.controller
                    .on_pointer(PointerEvent::Moved { client }, &rect);
            }
            WindowEvent::CursorLeft { .. } => {
                let rect = gpu.controller.surface_rect();
                gpu.controller.on_pointer(PointerEvent::Left, &rect);
            }
            WindowEvent::RedrawRequested => {
                self.redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        if self.dirty || gpu.controller.pending_frame().is_some() {
            gpu.window.request_redraw();
        }
        event_loop.set_control_flow(ControlFlow::Wait);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("liquidgrid-desktop starting");

    let config = WarpConfig::load_or_default(cli.config.as_deref())?;
    let source = match cli.image {
        Some(path) => ImageSource::File(path),
        None => ImageSource::Memory(Arc::new(SourceImage::checkerboard(1600, 900, 80)?)),
    };

    let event_loop = EventLoop::<HostEvent>::with_user_event().build()?;
    let proxy = event_loop.create_proxy();

    let mut app = App::new(config, source, proxy);
    event_loop.run_app(&mut app)?;

    Ok(())
}
