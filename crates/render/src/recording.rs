use liquidgrid_assets::SourceImage;
use liquidgrid_common::ViewportGeometry;
use liquidgrid_field::FieldSnapshot;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::config::{AnimationClock, RenderConfig};
use crate::layout::SurfaceLayout;
use crate::surface::{PipelineFactory, RenderError, WarpSurface};

/// Shared counters describing every pipeline a [`RecordingFactory`] built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineLedger {
    pub built: usize,
    pub released: usize,
    /// Highest number of simultaneously live instances ever observed.
    pub max_live: usize,
    pub frames: u64,
    pub configured_aspect: Option<f32>,
    pub last_layout: Option<SurfaceLayout>,
    /// Largest sample magnitude in the first field each instance rendered.
    pub first_frame_peaks: Vec<f32>,
}

impl PipelineLedger {
    pub fn live(&self) -> usize {
        self.built - self.released
    }
}

/// Headless pipeline instance. Draws nothing; records what it was asked
/// to do.
#[derive(Debug)]
pub struct RecordingSurface {
    id: usize,
    ledger: Rc<RefCell<PipelineLedger>>,
    clock: AnimationClock,
    image: Option<Arc<SourceImage>>,
    layout: Option<SurfaceLayout>,
    rendered: bool,
    released: bool,
    fail_frames: Rc<Cell<bool>>,
}

impl RecordingSurface {
    /// Build order within its factory, starting at 1.
    pub fn id(&self) -> usize {
        self.id
    }
}

impl WarpSurface for RecordingSurface {
    type Frame = ();

    fn configure(&mut self, image: Arc<SourceImage>) -> Result<f32, RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        let aspect = image.aspect();
        self.image = Some(image);
        self.ledger.borrow_mut().configured_aspect = Some(aspect);
        Ok(aspect)
    }

    fn resize(&mut self, geometry: &ViewportGeometry) -> Option<SurfaceLayout> {
        let layout = SurfaceLayout::fit(geometry, None)?;
        self.layout = Some(layout);
        self.ledger.borrow_mut().last_layout = Some(layout);
        Some(layout)
    }

    fn render_frame(&mut self, _frame: &(), field: &FieldSnapshot<'_>) -> Result<(), RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        if self.image.is_none() {
            return Err(RenderError::NotConfigured);
        }
        if self.fail_frames.get() {
            return Err(RenderError::Device("recording frame set to fail".into()));
        }
        self.clock.advance();
        let mut ledger = self.ledger.borrow_mut();
        ledger.frames += 1;
        if !self.rendered {
            let peak = field
                .samples
                .iter()
                .map(|v| v.length())
                .fold(0.0_f32, f32::max);
            ledger.first_frame_peaks.push(peak);
            self.rendered = true;
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.image = None;
        self.ledger.borrow_mut().released += 1;
        tracing::debug!(id = self.id, "recording pipeline released");
    }

    fn is_ready(&self) -> bool {
        !self.released && self.image.is_some()
    }

    fn layout(&self) -> Option<SurfaceLayout> {
        self.layout
    }

    fn time(&self) -> f32 {
        self.clock.time()
    }
}

impl Drop for RecordingSurface {
    fn drop(&mut self) {
        self.release();
    }
}

/// Builds [`RecordingSurface`]s that all report into one ledger.
#[derive(Debug, Default)]
pub struct RecordingFactory {
    config: RenderConfig,
    ledger: Rc<RefCell<PipelineLedger>>,
    fail_builds: bool,
    fail_frames: Rc<Cell<bool>>,
}

impl RecordingFactory {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Handle to the shared ledger.
    pub fn ledger(&self) -> Rc<RefCell<PipelineLedger>> {
        Rc::clone(&self.ledger)
    }

    /// Make every subsequent build fail, as a lost device would.
    pub fn set_fail_builds(&mut self, fail: bool) {
        self.fail_builds = fail;
    }

    /// Make every frame rendered by any of this factory's surfaces fail.
    pub fn set_fail_frames(&mut self, fail: bool) {
        self.fail_frames.set(fail);
    }
}

impl PipelineFactory for RecordingFactory {
    type Surface = RecordingSurface;

    fn build(&mut self, geometry: &ViewportGeometry) -> Result<RecordingSurface, RenderError> {
        if self.fail_builds {
            return Err(RenderError::Device("recording factory set to fail".into()));
        }
        let id = {
            let mut ledger = self.ledger.borrow_mut();
            ledger.built += 1;
            let live = ledger.live();
            ledger.max_live = ledger.max_live.max(live);
            ledger.built
        };
        let mut surface = RecordingSurface {
            id,
            ledger: Rc::clone(&self.ledger),
            clock: AnimationClock::new(self.config.time_step),
            image: None,
            layout: None,
            rendered: false,
            released: false,
            fail_frames: Rc::clone(&self.fail_frames),
        };
        surface.resize(geometry);
        tracing::debug!(id, "recording pipeline built");
        Ok(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidgrid_common::ContainerSize;
    use liquidgrid_field::{DisplacementField, FieldConfig};

    fn geometry() -> ViewportGeometry {
        let mut g = ViewportGeometry::default();
        g.set_container(ContainerSize::new(800.0, 600.0));
        g
    }

    fn image() -> Arc<SourceImage> {
        Arc::new(SourceImage::from_rgba(4, 2, vec![255; 32]).unwrap())
    }

    #[test]
    fn render_before_configure_is_refused() {
        let mut factory = RecordingFactory::default();
        let mut s = factory.build(&geometry()).unwrap();
        let field = DisplacementField::new(FieldConfig::default()).unwrap();
        assert!(matches!(
            s.render_frame(&(), &field.read()),
            Err(RenderError::NotConfigured)
        ));
        assert!(!s.is_ready());
    }

    #[test]
    fn frames_advance_time_by_fixed_step() {
        let mut factory = RecordingFactory::default();
        let mut s = factory.build(&geometry()).unwrap();
        assert_eq!(s.configure(image()).unwrap(), 2.0);
        let field = DisplacementField::new(FieldConfig::default()).unwrap();
        for _ in 0..4 {
            s.render_frame(&(), &field.read()).unwrap();
        }
        assert!((s.time() - 0.2).abs() < 1e-6);
        assert_eq!(factory.ledger().borrow().frames, 4);
    }

    #[test]
    fn release_is_idempotent_and_drop_releases() {
        let mut factory = RecordingFactory::default();
        let ledger = factory.ledger();
        let mut a = factory.build(&geometry()).unwrap();
        a.release();
        a.release();
        assert_eq!(ledger.borrow().released, 1);
        {
            let _b = factory.build(&geometry()).unwrap();
            assert_eq!(ledger.borrow().live(), 1);
        }
        assert_eq!(ledger.borrow().live(), 0);
        assert_eq!(ledger.borrow().released, 2);
    }

    #[test]
    fn failing_frames_do_not_advance_time() {
        let mut factory = RecordingFactory::default();
        let mut s = factory.build(&geometry()).unwrap();
        s.configure(image()).unwrap();
        factory.set_fail_frames(true);
        let field = DisplacementField::new(FieldConfig::default()).unwrap();
        assert!(matches!(
            s.render_frame(&(), &field.read()),
            Err(RenderError::Device(_))
        ));
        assert_eq!(s.time(), 0.0);
        factory.set_fail_frames(false);
        assert!(s.render_frame(&(), &field.read()).is_ok());
    }

    #[test]
    fn repeated_resize_gives_same_layout() {
        let mut factory = RecordingFactory::default();
        let mut s = factory.build(&geometry()).unwrap();
        let once = s.resize(&geometry());
        let twice = s.resize(&geometry());
        assert_eq!(once, twice);
        assert_eq!(s.layout(), twice);
    }

    #[test]
    fn zero_area_resize_keeps_previous_layout() {
        let mut factory = RecordingFactory::default();
        let mut s = factory.build(&geometry()).unwrap();
        let before = s.layout();
        assert!(s.resize(&ViewportGeometry::default()).is_none());
        assert_eq!(s.layout(), before);
    }
}
