use glam::Vec2;
use liquidgrid_assets::{ImageLoader, LoadError, SourceImage};
use liquidgrid_common::{ContainerRect, ContainerSize, LoadTicket, PointerState, ViewportGeometry};
use liquidgrid_field::{DisplacementField, FieldConfig};
use liquidgrid_input::{PointerConfig, PointerEvent, PointerTracker};
use liquidgrid_render::{PipelineFactory, RenderError, WarpSurface};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::config::{ActivationConfig, ConfigError, WarpConfig};
use crate::visibility::{Subscription, SubscriptionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActivationState {
    Dormant,
    Observing,
    Active,
    Suspended,
    Disposed,
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivationState::Dormant => "dormant",
            ActivationState::Observing => "observing",
            ActivationState::Active => "active",
            ActivationState::Suspended => "suspended",
            ActivationState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionReason {
    Mounted,
    Intersected,
    HeightOverLimit,
    HeightUnderLimit,
    Unmounted,
}

/// One recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    pub from: ActivationState,
    pub to: ActivationState,
    pub reason: TransitionReason,
    /// Container height at the time of the change.
    pub height: f32,
}

/// Image loading sub-state, surfaced to the host for placeholder display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// What the host should draw for the current state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presentation {
    /// Nothing ready yet: flat placeholder background.
    Placeholder,
    /// The warp pipeline is ready; draw it via `run_frame`.
    Warp,
    /// Suspended with the image loaded: draw it unmodified.
    StaticImage { aspect: f32 },
    Hidden,
}

/// Identifies one scheduled animation frame. A handle that is no longer
/// the pending one is stale and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

#[derive(Debug)]
enum ImageSlot {
    Idle,
    Loading(LoadTicket),
    Ready(Arc<SourceImage>),
    Failed,
}

/// Everything that exists only while the controller is active.
struct Pipeline<S> {
    surface: S,
    field: DisplacementField,
    tracker: PointerTracker,
}

/// State machine owning the warp pipeline's lifecycle.
///
/// The host feeds it notifications (`mount`, `on_visibility`, `on_resize`,
/// pointer events, image completions, `dispose`) and draws according to
/// [`presentation`](Self::presentation). While a frame is pending the host
/// schedules a redraw and calls [`run_frame`](Self::run_frame) with it.
pub struct ActivationController<F: PipelineFactory, L: ImageLoader> {
    config: ActivationConfig,
    field_config: FieldConfig,
    pointer_config: PointerConfig,
    factory: F,
    loader: L,
    state: ActivationState,
    geometry: ViewportGeometry,
    image: ImageSlot,
    next_ticket: u64,
    pipeline: Option<Pipeline<F::Surface>>,
    visibility: Subscription,
    size: Subscription,
    pending_frame: Option<FrameHandle>,
    next_frame: u64,
    policy_height: Option<f32>,
    history: Vec<Transition>,
    last_error: Option<String>,
}

impl<F: PipelineFactory, L: ImageLoader> ActivationController<F, L> {
    pub fn new(config: &WarpConfig, factory: F, loader: L) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: config.activation,
            field_config: config.field,
            pointer_config: config.pointer,
            factory,
            loader,
            state: ActivationState::Dormant,
            geometry: ViewportGeometry::with_fallback_aspect(config.render.fallback_aspect),
            image: ImageSlot::Idle,
            next_ticket: 0,
            pipeline: None,
            visibility: Subscription::new(SubscriptionKind::Visibility),
            size: Subscription::new(SubscriptionKind::Size),
            pending_frame: None,
            next_frame: 0,
            policy_height: None,
            history: Vec::new(),
            last_error: None,
        })
    }

    // --- host notifications ---

    /// Start observing visibility and size. Allocates nothing.
    pub fn mount(&mut self) {
        if self.state != ActivationState::Dormant {
            tracing::debug!(state = %self.state, "mount ignored");
            return;
        }
        self.visibility.subscribe();
        self.size.subscribe();
        self.transition(ActivationState::Observing, TransitionReason::Mounted);
    }

    /// Visibility notification. The first intersecting report activates
    /// (or suspends, if the container is already too tall) and ends the
    /// visibility subscription.
    pub fn on_visibility(&mut self, intersecting: bool) {
        if !self.visibility.accept() {
            tracing::trace!(intersecting, "visibility notification after unsubscribe");
            return;
        }
        if !intersecting || self.state != ActivationState::Observing {
            return;
        }
        self.cancel_subscription(SubscriptionKind::Visibility);
        self.request_image();

        let height = self.geometry.container().height;
        self.policy_height = Some(height);
        if self.config.exceeds_max_height(height) {
            self.transition(ActivationState::Suspended, TransitionReason::HeightOverLimit);
        } else {
            self.activate(TransitionReason::Intersected);
        }
    }

    /// Container resize notification.
    pub fn on_resize(&mut self, size: ContainerSize) {
        if !self.size.accept() {
            return;
        }
        self.geometry.set_container(size);
        if let Some(pipeline) = &mut self.pipeline {
            if pipeline.surface.resize(&self.geometry).is_none() {
                tracing::trace!(?size, "projection update skipped for empty container");
            }
        }
        if matches!(
            self.state,
            ActivationState::Active | ActivationState::Suspended
        ) {
            self.apply_height_policy(size.height);
        }
    }

    /// Pointer notification over a container at `rect`. Moves outside
    /// `rect` count as leaving it. Ignored while no pipeline exists.
    pub fn on_pointer(&mut self, event: PointerEvent, rect: &ContainerRect) -> bool {
        match &mut self.pipeline {
            Some(pipeline) => pipeline.tracker.handle(event, rect),
            None => false,
        }
    }

    /// Pointer moved to `client` (logical pixels) over a container at `rect`.
    pub fn on_pointer_move(&mut self, client: Vec2, rect: &ContainerRect) -> bool {
        self.on_pointer(PointerEvent::Moved { client }, rect)
    }

    pub fn on_pointer_leave(&mut self) -> bool {
        let rect = self.surface_rect();
        self.on_pointer(PointerEvent::Left, &rect)
    }

    /// Image load completion. Returns false when the completion was stale
    /// (older ticket, or the controller was disposed) and got discarded.
    pub fn on_image_loaded(
        &mut self,
        ticket: LoadTicket,
        result: Result<Arc<SourceImage>, LoadError>,
    ) -> bool {
        let current = matches!(self.image, ImageSlot::Loading(t) if t == ticket);
        if !current || self.state == ActivationState::Disposed {
            tracing::debug!(ticket = ticket.0, "stale image completion discarded");
            return false;
        }
        match result {
            Ok(image) => {
                if self
                    .geometry
                    .set_image_size(image.width(), image.height())
                    .is_none()
                {
                    tracing::warn!("loaded image has zero area");
                }
                tracing::info!(
                    width = image.width(),
                    height = image.height(),
                    aspect = self.geometry.image_aspect(),
                    "source image ready"
                );
                self.image = ImageSlot::Ready(image);
                self.configure_pipeline();
            }
            Err(e) => {
                tracing::warn!(ticket = ticket.0, error = %e, "source image failed to load");
                self.last_error = Some(e.to_string());
                self.image = ImageSlot::Failed;
            }
        }
        true
    }

    /// Tear everything down. Safe from any state, safe to repeat.
    pub fn dispose(&mut self) -> bool {
        if self.state == ActivationState::Disposed {
            return false;
        }
        self.cancel_subscription(SubscriptionKind::Visibility);
        self.cancel_subscription(SubscriptionKind::Size);
        self.teardown_pipeline();
        // A load still in flight becomes stale.
        self.image = ImageSlot::Idle;
        self.transition(ActivationState::Disposed, TransitionReason::Unmounted);
        true
    }

    // --- animation ---

    pub fn pending_frame(&self) -> Option<FrameHandle> {
        self.pending_frame
    }

    /// Run one scheduled frame: tick the field, damp pointer velocity, then
    /// render. Returns `Ok(false)` for a stale handle. On success the next
    /// frame is scheduled; a render error tears the pipeline down and the
    /// host falls back to the placeholder until the next activation.
    pub fn run_frame(
        &mut self,
        handle: FrameHandle,
        frame: &<F::Surface as WarpSurface>::Frame,
    ) -> Result<bool, RenderError> {
        if self.pending_frame != Some(handle) {
            tracing::trace!(?handle, "stale frame handle ignored");
            return Ok(false);
        }
        self.pending_frame = None;
        let Some(pipeline) = &mut self.pipeline else {
            return Ok(false);
        };
        let _span = tracing::trace_span!("frame", n = handle.0).entered();

        pipeline.field.tick(&pipeline.tracker.state());
        pipeline.tracker.damp();
        let rendered = pipeline.surface.render_frame(frame, &pipeline.field.read());
        if let Err(e) = rendered {
            tracing::warn!(error = %e, "frame failed, dropping pipeline");
            self.last_error = Some(e.to_string());
            self.teardown_pipeline();
            return Err(e);
        }
        self.schedule_frame();
        Ok(true)
    }

    // --- queries ---

    pub fn state(&self) -> ActivationState {
        self.state
    }

    pub fn presentation(&self) -> Presentation {
        match self.state {
            ActivationState::Disposed => Presentation::Hidden,
            ActivationState::Active
                if self
                    .pipeline
                    .as_ref()
                    .is_some_and(|p| p.surface.is_ready()) =>
            {
                Presentation::Warp
            }
            ActivationState::Suspended if matches!(self.image, ImageSlot::Ready(_)) => {
                Presentation::StaticImage {
                    aspect: self.geometry.image_aspect(),
                }
            }
            _ => Presentation::Placeholder,
        }
    }

    pub fn load_status(&self) -> LoadStatus {
        match self.image {
            ImageSlot::Idle => LoadStatus::Idle,
            ImageSlot::Loading(_) => LoadStatus::Loading,
            ImageSlot::Ready(_) => LoadStatus::Ready,
            ImageSlot::Failed => LoadStatus::Failed,
        }
    }

    /// Decoded image, once loaded. Kept across suspensions.
    pub fn image(&self) -> Option<&Arc<SourceImage>> {
        match &self.image {
            ImageSlot::Ready(image) => Some(image),
            _ => None,
        }
    }

    pub fn geometry(&self) -> &ViewportGeometry {
        &self.geometry
    }

    /// Rectangle of the drawing surface relative to the container origin.
    pub fn surface_rect(&self) -> ContainerRect {
        ContainerRect::from_size(self.geometry.surface_size())
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn field(&self) -> Option<&DisplacementField> {
        self.pipeline.as_ref().map(|p| &p.field)
    }

    pub fn pointer(&self) -> Option<PointerState> {
        self.pipeline.as_ref().map(|p| p.tracker.state())
    }

    pub fn surface(&self) -> Option<&F::Surface> {
        self.pipeline.as_ref().map(|p| &p.surface)
    }

    pub fn visibility_subscription(&self) -> &Subscription {
        &self.visibility
    }

    pub fn size_subscription(&self) -> &Subscription {
        &self.size
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn config(&self) -> &ActivationConfig {
        &self.config
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    // --- internals ---

    fn transition(&mut self, to: ActivationState, reason: TransitionReason) {
        let from = self.state;
        let height = self.geometry.container().height;
        self.state = to;
        self.history.push(Transition {
            from,
            to,
            reason,
            height,
        });
        tracing::info!(%from, %to, ?reason, height, "activation state changed");
    }

    /// Filtered size gate. Changes under `height_epsilon` are ignored so a
    /// surface resize cannot feed back into the policy.
    fn apply_height_policy(&mut self, height: f32) {
        if let Some(previous) = self.policy_height {
            if (height - previous).abs() < self.config.height_epsilon {
                tracing::trace!(height, previous, "height change below epsilon");
                return;
            }
        }
        self.policy_height = Some(height);
        let too_tall = self.config.exceeds_max_height(height);
        match self.state {
            ActivationState::Active if too_tall => {
                self.teardown_pipeline();
                self.transition(ActivationState::Suspended, TransitionReason::HeightOverLimit);
            }
            ActivationState::Suspended if !too_tall => {
                self.activate(TransitionReason::HeightUnderLimit);
            }
            _ => {}
        }
    }

    /// Build a fresh pipeline and enter `Active`. Any previous instance is
    /// torn down first.
    fn activate(&mut self, reason: TransitionReason) {
        self.teardown_pipeline();
        self.transition(ActivationState::Active, reason);

        let field = match DisplacementField::new(self.field_config) {
            Ok(field) => field,
            Err(e) => {
                tracing::warn!(error = %e, "field allocation failed");
                self.last_error = Some(e.to_string());
                return;
            }
        };
        let surface = match self.factory.build(&self.geometry) {
            Ok(surface) => surface,
            Err(e) => {
                tracing::warn!(error = %e, "pipeline build failed");
                self.last_error = Some(e.to_string());
                return;
            }
        };
        self.pipeline = Some(Pipeline {
            surface,
            field,
            tracker: PointerTracker::new(self.pointer_config),
        });
        tracing::debug!("pipeline built");
        self.configure_pipeline();
    }

    /// Hand the loaded image to a pipeline that does not have it yet and
    /// start the frame loop.
    fn configure_pipeline(&mut self) {
        let (Some(pipeline), ImageSlot::Ready(image)) = (&mut self.pipeline, &self.image) else {
            return;
        };
        if pipeline.surface.is_ready() {
            return;
        }
        match pipeline.surface.configure(Arc::clone(image)) {
            Ok(aspect) => {
                pipeline.surface.resize(&self.geometry);
                tracing::debug!(aspect, "pipeline ready");
                self.schedule_frame();
            }
            Err(e) => {
                tracing::warn!(error = %e, "pipeline configure failed");
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn teardown_pipeline(&mut self) {
        self.pending_frame = None;
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.surface.release();
            tracing::debug!(ticks = pipeline.field.ticks(), "pipeline torn down");
        }
    }

    fn cancel_subscription(&mut self, kind: SubscriptionKind) {
        let subscription = match kind {
            SubscriptionKind::Visibility => &mut self.visibility,
            SubscriptionKind::Size => &mut self.size,
        };
        if subscription.cancel() {
            tracing::debug!(kind = ?subscription.kind(), "subscription cancelled");
        }
    }

    fn request_image(&mut self) {
        if !matches!(self.image, ImageSlot::Idle) {
            return;
        }
        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        self.image = ImageSlot::Loading(ticket);
        self.loader.request(ticket);
    }

    fn schedule_frame(&mut self) {
        self.next_frame += 1;
        self.pending_frame = Some(FrameHandle(self.next_frame));
    }
}

impl<F: PipelineFactory, L: ImageLoader> Drop for ActivationController<F, L> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquidgrid_assets::QueuedImageLoader;
    use liquidgrid_input::{FAR_AWAY, LeavePolicy};
    use liquidgrid_render::{PipelineLedger, RecordingFactory};
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestController = ActivationController<RecordingFactory, QueuedImageLoader>;

    fn controller() -> (TestController, Rc<RefCell<PipelineLedger>>) {
        controller_with(&WarpConfig::default())
    }

    fn controller_with(config: &WarpConfig) -> (TestController, Rc<RefCell<PipelineLedger>>) {
        let factory = RecordingFactory::default();
        let ledger = factory.ledger();
        let c = ActivationController::new(config, factory, QueuedImageLoader::new()).unwrap();
        (c, ledger)
    }

    fn reset_far_config() -> WarpConfig {
        let mut config = WarpConfig::default();
        config.pointer.leave_policy = LeavePolicy::ResetFar;
        config
    }

    fn image(width: u32, height: u32) -> Arc<SourceImage> {
        let pixels = vec![0; (width * height * 4) as usize];
        Arc::new(SourceImage::from_rgba(width, height, pixels).unwrap())
    }

    fn complete_loads(c: &mut TestController, img: &Arc<SourceImage>) {
        for ticket in c.loader_mut().take_pending() {
            assert!(c.on_image_loaded(ticket, Ok(Arc::clone(img))));
        }
    }

    /// Mounted, sized and visible at `height`, with a 1600x900 image loaded.
    fn running(height: f32) -> (TestController, Rc<RefCell<PipelineLedger>>) {
        running_with(&WarpConfig::default(), height)
    }

    fn running_with(
        config: &WarpConfig,
        height: f32,
    ) -> (TestController, Rc<RefCell<PipelineLedger>>) {
        let (mut c, ledger) = controller_with(config);
        c.mount();
        c.on_resize(ContainerSize::new(800.0, height));
        c.on_visibility(true);
        complete_loads(&mut c, &image(1600, 900));
        (c, ledger)
    }

    fn stir(c: &mut TestController) {
        let rect = ContainerRect::new(0.0, 0.0, 800.0, 450.0);
        c.on_pointer_move(Vec2::new(400.0, 225.0), &rect);
        c.on_pointer_move(Vec2::new(440.0, 225.0), &rect);
        for _ in 0..3 {
            let handle = c.pending_frame().unwrap();
            assert!(c.run_frame(handle, &()).unwrap());
        }
    }

    #[test]
    fn mount_observes_without_allocating() {
        let (mut c, ledger) = controller();
        assert_eq!(c.state(), ActivationState::Dormant);
        c.mount();
        assert_eq!(c.state(), ActivationState::Observing);
        assert!(c.visibility_subscription().is_active());
        assert!(c.size_subscription().is_active());
        c.on_resize(ContainerSize::new(800.0, 600.0));
        c.on_visibility(false);
        assert_eq!(c.state(), ActivationState::Observing);
        assert_eq!(ledger.borrow().built, 0);
        assert_eq!(c.loader().requested(), 0);
        assert_eq!(c.presentation(), Presentation::Placeholder);
    }

    #[test]
    fn first_intersection_activates_exactly_once() {
        let (mut c, ledger) = controller();
        c.mount();
        c.on_resize(ContainerSize::new(800.0, 600.0));
        c.on_visibility(true);
        assert_eq!(c.state(), ActivationState::Active);
        assert!(!c.visibility_subscription().is_active());
        c.on_visibility(true);
        c.on_visibility(false);
        assert_eq!(c.state(), ActivationState::Active);
        assert_eq!(ledger.borrow().built, 1);
        assert_eq!(c.loader().requested(), 1);
        assert_eq!(c.load_status(), LoadStatus::Loading);
        // Loading sub-state: pipeline exists but shows the placeholder.
        assert_eq!(c.presentation(), Presentation::Placeholder);
        assert_eq!(c.pending_frame(), None);
    }

    #[test]
    fn tall_container_suspends_with_static_image_at_natural_aspect() {
        let (mut c, ledger) = controller();
        c.mount();
        c.on_resize(ContainerSize::new(800.0, 1200.0));
        c.on_visibility(true);
        assert_eq!(c.state(), ActivationState::Suspended);
        assert_eq!(ledger.borrow().built, 0);
        // Straight from Observing: no pipeline is built just to be released.
        let last = c.history().last().unwrap();
        assert_eq!(last.from, ActivationState::Observing);
        assert_eq!(last.reason, TransitionReason::HeightOverLimit);

        complete_loads(&mut c, &image(1600, 900));
        match c.presentation() {
            Presentation::StaticImage { aspect } => {
                assert!((aspect - 1600.0 / 900.0).abs() < 1e-5)
            }
            other => panic!("expected static image, got {other:?}"),
        }
        assert_eq!(c.pending_frame(), None);
    }

    #[test]
    fn growing_past_threshold_tears_pipeline_down() {
        let (mut c, ledger) = running(600.0);
        stir(&mut c);
        c.on_resize(ContainerSize::new(800.0, 1200.0));
        assert_eq!(c.state(), ActivationState::Suspended);
        assert!(!c.has_pipeline());
        assert_eq!(ledger.borrow().live(), 0);
        assert_eq!(c.pending_frame(), None);
        assert!(matches!(c.presentation(), Presentation::StaticImage { .. }));
        let last = c.history().last().unwrap();
        assert_eq!(last.reason, TransitionReason::HeightOverLimit);
        assert_eq!(last.height, 1200.0);
    }

    #[test]
    fn shrinking_back_rebuilds_a_fresh_pipeline() {
        let (mut c, ledger) = running(600.0);
        stir(&mut c);
        assert!(c.field().unwrap().max_magnitude() > 0.0);
        assert_eq!(c.surface().unwrap().id(), 1);

        c.on_resize(ContainerSize::new(800.0, 1200.0));
        c.on_resize(ContainerSize::new(800.0, 400.0));
        assert_eq!(c.state(), ActivationState::Active);
        assert_eq!(ledger.borrow().built, 2);
        assert_eq!(ledger.borrow().live(), 1);
        assert_eq!(ledger.borrow().max_live, 1);

        assert_eq!(c.surface().unwrap().id(), 2);
        let field = c.field().unwrap();
        assert_eq!(field.ticks(), 0);
        assert_eq!(field.max_magnitude(), 0.0);
        assert_eq!(c.pointer().unwrap(), PointerState::default());

        // The cached image configures the new instance without a reload.
        assert_eq!(c.loader().requested(), 1);
        assert_eq!(c.presentation(), Presentation::Warp);
        let handle = c.pending_frame().unwrap();
        assert!(c.run_frame(handle, &()).unwrap());
        assert_eq!(ledger.borrow().first_frame_peaks.last(), Some(&0.0));
        assert!((c.surface().unwrap().time() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn small_height_jitter_is_ignored() {
        let (mut c, ledger) = running(948.0);
        c.on_resize(ContainerSize::new(800.0, 952.0));
        assert_eq!(c.state(), ActivationState::Active);
        c.on_resize(ContainerSize::new(800.0, 956.0));
        assert_eq!(c.state(), ActivationState::Suspended);
        assert_eq!(ledger.borrow().built, 1);
    }

    #[test]
    fn loaded_image_drives_surface_aspect() {
        let (c, ledger) = running(600.0);
        assert!((c.geometry().image_aspect() - 1.777_777_8).abs() < 1e-5);
        let layout = c.surface().unwrap().layout().unwrap();
        assert!((layout.displayed_aspect() - 1.777_777_8).abs() < 1e-4);
        assert!((layout.surface.height - 450.0).abs() < 1e-3);
        assert_eq!(ledger.borrow().configured_aspect, Some(1600.0 / 900.0));
        assert_eq!(c.surface_rect(), ContainerRect::new(0.0, 0.0, 800.0, 450.0));
    }

    #[test]
    fn repeated_resize_keeps_projection() {
        let (mut c, _ledger) = running(600.0);
        c.on_resize(ContainerSize::new(700.0, 600.0));
        let once = c.surface().unwrap().layout();
        c.on_resize(ContainerSize::new(700.0, 600.0));
        assert_eq!(c.surface().unwrap().layout(), once);
    }

    #[test]
    fn dispose_while_loading_is_safe_and_idempotent() {
        let (mut c, ledger) = controller();
        c.mount();
        c.on_resize(ContainerSize::new(800.0, 600.0));
        c.on_visibility(true);
        let pending = c.loader_mut().take_pending();
        assert_eq!(pending.len(), 1);

        assert!(c.dispose());
        assert!(!c.dispose());
        assert_eq!(c.state(), ActivationState::Disposed);
        assert_eq!(ledger.borrow().live(), 0);
        assert!(!c.size_subscription().is_active());

        assert!(!c.on_image_loaded(pending[0], Ok(image(4, 4))));
        assert_eq!(c.state(), ActivationState::Disposed);
        assert_eq!(c.presentation(), Presentation::Hidden);
        assert_eq!(c.pending_frame(), None);
        assert_eq!(ledger.borrow().built, 1);
    }

    #[test]
    fn dispose_from_dormant() {
        let (mut c, ledger) = controller();
        assert!(c.dispose());
        c.mount();
        c.on_visibility(true);
        assert_eq!(c.state(), ActivationState::Disposed);
        assert_eq!(ledger.borrow().built, 0);
    }

    #[test]
    fn stale_ticket_is_discarded() {
        let (mut c, _ledger) = controller();
        c.mount();
        c.on_resize(ContainerSize::new(800.0, 600.0));
        c.on_visibility(true);
        assert!(!c.on_image_loaded(LoadTicket(99), Ok(image(4, 4))));
        assert_eq!(c.load_status(), LoadStatus::Loading);
    }

    #[test]
    fn frames_are_scheduled_only_once_ready_and_stale_handles_ignored() {
        let (mut c, ledger) = running(600.0);
        let first = c.pending_frame().unwrap();
        assert!(c.run_frame(first, &()).unwrap());
        assert!(!c.run_frame(first, &()).unwrap());
        let second = c.pending_frame().unwrap();
        assert_ne!(first, second);
        assert_eq!(ledger.borrow().frames, 1);
    }

    #[test]
    fn field_ticks_before_render_and_velocity_damps_after() {
        let (mut c, _ledger) = running(600.0);
        let rect = c.surface_rect();
        c.on_pointer_move(Vec2::new(400.0, 225.0), &rect);
        c.on_pointer_move(Vec2::new(408.0, 225.0), &rect);
        let v = c.pointer().unwrap().velocity;
        assert!((v.x - 0.01).abs() < 1e-6);

        let handle = c.pending_frame().unwrap();
        c.run_frame(handle, &()).unwrap();
        assert_eq!(c.field().unwrap().ticks(), 1);
        assert!(c.field().unwrap().max_magnitude() > 0.0);
        assert!((c.pointer().unwrap().velocity.x - 0.009).abs() < 1e-6);
    }

    #[test]
    fn failed_load_stays_pre_ready_without_retry() {
        let (mut c, ledger) = controller();
        c.mount();
        c.on_resize(ContainerSize::new(800.0, 600.0));
        c.on_visibility(true);
        let ticket = c.loader_mut().take_pending()[0];
        let err = LoadError::Empty {
            width: 0,
            height: 0,
        };
        assert!(c.on_image_loaded(ticket, Err(err)));
        assert_eq!(c.load_status(), LoadStatus::Failed);
        assert_eq!(c.presentation(), Presentation::Placeholder);
        assert_eq!(c.pending_frame(), None);
        assert!(c.last_error().is_some());

        c.on_resize(ContainerSize::new(800.0, 1200.0));
        c.on_resize(ContainerSize::new(800.0, 600.0));
        assert_eq!(c.loader().requested(), 1);
        assert_eq!(ledger.borrow().live(), 1);
        assert_eq!(c.presentation(), Presentation::Placeholder);
    }

    #[test]
    fn failed_build_leaves_active_without_pipeline() {
        let (mut c, _ledger) = controller();
        c.factory_mut().set_fail_builds(true);
        c.mount();
        c.on_resize(ContainerSize::new(800.0, 600.0));
        c.on_visibility(true);
        assert_eq!(c.state(), ActivationState::Active);
        assert!(!c.has_pipeline());
        assert!(c.last_error().is_some());
        assert!(!c.on_pointer_move(Vec2::ZERO, &c.surface_rect()));
        complete_loads(&mut c, &image(8, 8));
        assert_eq!(c.presentation(), Presentation::Placeholder);
    }

    #[test]
    fn toggling_never_exceeds_one_live_pipeline() {
        let (mut c, ledger) = running(600.0);
        for i in 0..10 {
            let h = if i % 2 == 0 { 1200.0 } else { 500.0 };
            c.on_resize(ContainerSize::new(800.0, h));
            if c.state() == ActivationState::Active {
                stir(&mut c);
            }
        }
        assert_eq!(ledger.borrow().max_live, 1);
        assert_eq!(ledger.borrow().built, 6);
        assert!(ledger.borrow().live() <= 1);
        c.dispose();
        assert_eq!(ledger.borrow().live(), 0);
    }

    #[test]
    fn move_below_surface_is_not_injected() {
        let (mut c, _ledger) = running(600.0);
        let rect = c.surface_rect();
        assert!(c.on_pointer_move(Vec2::new(400.0, 440.0), &rect));
        let inside = c.pointer().unwrap();
        assert!(!c.on_pointer_move(Vec2::new(410.0, 470.0), &rect));
        assert_eq!(c.pointer().unwrap(), inside);

        let handle = c.pending_frame().unwrap();
        c.run_frame(handle, &()).unwrap();
        let p = c.pointer().unwrap().position;
        assert!((0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y));
        // Only the in-bounds sample (zero velocity) was observed.
        assert_eq!(c.field().unwrap().max_magnitude(), 0.0);
    }

    #[test]
    fn reset_far_leave_lets_the_grid_settle() {
        let (mut c, _ledger) = running_with(&reset_far_config(), 600.0);
        stir(&mut c);
        assert!(c.on_pointer_leave());
        assert_eq!(c.pointer().unwrap().position, FAR_AWAY);
        assert_eq!(c.pointer().unwrap().velocity, Vec2::ZERO);

        let mut previous = c.field().unwrap().max_magnitude();
        assert!(previous > 0.0);
        for _ in 0..5 {
            let handle = c.pending_frame().unwrap();
            c.run_frame(handle, &()).unwrap();
            let now = c.field().unwrap().max_magnitude();
            assert!(now < previous);
            previous = now;
        }
    }

    #[test]
    fn reset_far_move_below_surface_counts_as_leave() {
        let (mut c, _ledger) = running_with(&reset_far_config(), 600.0);
        let rect = c.surface_rect();
        c.on_pointer_move(Vec2::new(400.0, 400.0), &rect);
        c.on_pointer_move(Vec2::new(400.0, 440.0), &rect);
        assert!(c.on_pointer_move(Vec2::new(400.0, 470.0), &rect));
        assert_eq!(c.pointer().unwrap().position, FAR_AWAY);
    }

    #[test]
    fn dispose_from_suspended_releases_everything() {
        let (mut c, ledger) = running(1200.0);
        assert_eq!(c.state(), ActivationState::Suspended);
        assert!(matches!(c.presentation(), Presentation::StaticImage { .. }));

        assert!(c.dispose());
        assert_eq!(c.state(), ActivationState::Disposed);
        assert_eq!(c.presentation(), Presentation::Hidden);
        assert!(!c.size_subscription().is_active());
        assert!(c.image().is_none());

        c.on_resize(ContainerSize::new(800.0, 400.0));
        assert_eq!(c.state(), ActivationState::Disposed);
        assert_eq!(ledger.borrow().built, 0);
        assert_eq!(ledger.borrow().live(), 0);
        let last = c.history().last().unwrap();
        assert_eq!(last.from, ActivationState::Suspended);
        assert_eq!(last.reason, TransitionReason::Unmounted);
    }

    #[test]
    fn render_failure_drops_pipeline_until_reactivation() {
        let (mut c, ledger) = running(600.0);
        c.factory_mut().set_fail_frames(true);
        let handle = c.pending_frame().unwrap();
        assert!(c.run_frame(handle, &()).is_err());
        assert_eq!(c.state(), ActivationState::Active);
        assert!(!c.has_pipeline());
        assert_eq!(c.pending_frame(), None);
        assert_eq!(c.presentation(), Presentation::Placeholder);
        assert!(c.last_error().is_some());
        assert_eq!(ledger.borrow().live(), 0);

        c.factory_mut().set_fail_frames(false);
        c.on_resize(ContainerSize::new(800.0, 1200.0));
        c.on_resize(ContainerSize::new(800.0, 600.0));
        assert_eq!(c.presentation(), Presentation::Warp);
        let handle = c.pending_frame().unwrap();
        assert!(c.run_frame(handle, &()).unwrap());
    }

    #[test]
    fn drop_disposes() {
        let (c, ledger) = running(600.0);
        drop(c);
        assert_eq!(ledger.borrow().live(), 0);
    }

    #[test]
    fn history_records_full_lifecycle() {
        let (mut c, _ledger) = running(600.0);
        c.on_resize(ContainerSize::new(800.0, 1000.0));
        c.dispose();
        let states: Vec<_> = c.history().iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                ActivationState::Observing,
                ActivationState::Active,
                ActivationState::Suspended,
                ActivationState::Disposed,
            ]
        );
    }
}
