use glam::Vec2;
use liquidgrid_common::{ContainerRect, PointerState};
use serde::{Deserialize, Serialize};

/// Effective pointer position used by `LeavePolicy::ResetFar`. Far enough
/// outside the unit square that no field cell is within reach.
pub const FAR_AWAY: Vec2 = Vec2::splat(-1.0e4);

/// What happens to the pointer state when the pointer leaves the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeavePolicy {
    /// Keep the last position; velocity keeps damping as usual.
    #[default]
    Retain,
    /// Move the pointer far away and zero its velocity so the grid rests.
    ResetFar,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PointerConfigError {
    #[error("velocity_damping must be in [0, 1), got {0}")]
    InvalidDamping(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    /// Per-frame velocity multiplier applied after each tick.
    pub velocity_damping: f32,
    pub leave_policy: LeavePolicy,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            velocity_damping: 0.9,
            leave_policy: LeavePolicy::Retain,
        }
    }
}

impl PointerConfig {
    pub fn validate(&self) -> Result<(), PointerConfigError> {
        let d = self.velocity_damping;
        if d.is_finite() && (0.0..1.0).contains(&d) {
            Ok(())
        } else {
            Err(PointerConfigError::InvalidDamping(d))
        }
    }
}

/// A raw pointer notification from the host, in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Moved { client: Vec2 },
    Left,
}

/// Converts pointer events inside the container into a normalized
/// [`PointerState`].
#[derive(Debug, Clone)]
pub struct PointerTracker {
    config: PointerConfig,
    state: PointerState,
    /// False until a position has been observed, and again after a
    /// far-away reset, so the next move does not register as a jump.
    has_sample: bool,
}

impl PointerTracker {
    pub fn new(config: PointerConfig) -> Self {
        Self {
            config,
            state: PointerState::default(),
            has_sample: false,
        }
    }

    /// Current pointer state (copy).
    pub fn state(&self) -> PointerState {
        self.state
    }

    pub fn config(&self) -> &PointerConfig {
        &self.config
    }

    /// Map client coordinates relative to the container, y inverted.
    /// Points inside `rect` land in the unit square. `None` for a
    /// zero-area container.
    pub fn normalize(client: Vec2, rect: &ContainerRect) -> Option<Vec2> {
        if rect.size().is_empty() {
            return None;
        }
        let x = (client.x - rect.left) / rect.width;
        let y = 1.0 - (client.y - rect.top) / rect.height;
        Some(Vec2::new(x, y))
    }

    /// Dispatch a host event. Returns whether the state changed.
    pub fn handle(&mut self, event: PointerEvent, rect: &ContainerRect) -> bool {
        match event {
            PointerEvent::Moved { client } => self.on_move(client, rect),
            PointerEvent::Left => self.on_leave(),
        }
    }

    /// Record a pointer-move. Velocity becomes the delta from the previous
    /// normalized position; the first sample has zero velocity.
    ///
    /// A move outside `rect` is never stored: it is handled as a leave.
    pub fn on_move(&mut self, client: Vec2, rect: &ContainerRect) -> bool {
        let Some(position) = Self::normalize(client, rect) else {
            tracing::trace!(?client, "pointer move ignored: empty container");
            return false;
        };
        if !in_unit_square(position) {
            tracing::trace!(?client, "pointer move outside container");
            return self.on_leave();
        }
        self.state.velocity = if self.has_sample {
            position - self.state.position
        } else {
            Vec2::ZERO
        };
        self.state.position = position;
        self.has_sample = true;
        true
    }

    /// Apply the configured leave policy.
    pub fn on_leave(&mut self) -> bool {
        match self.config.leave_policy {
            LeavePolicy::Retain => false,
            LeavePolicy::ResetFar => {
                if self.state.position == FAR_AWAY && self.state.velocity == Vec2::ZERO {
                    return false;
                }
                self.state = PointerState {
                    position: FAR_AWAY,
                    velocity: Vec2::ZERO,
                };
                self.has_sample = false;
                tracing::trace!("pointer left: reset far away");
                true
            }
        }
    }

    /// Damp velocity after a tick so a stopped pointer fades out over
    /// several frames.
    pub fn damp(&mut self) {
        self.state.velocity *= self.config.velocity_damping;
    }
}

fn in_unit_square(p: Vec2) -> bool {
    (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y)
}

impl Default for PointerTracker {
    fn default() -> Self {
        Self::new(PointerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rect() -> ContainerRect {
        ContainerRect::new(100.0, 50.0, 400.0, 200.0)
    }

    #[test]
    fn normalize_inverts_y() {
        let r = rect();
        assert_eq!(
            PointerTracker::normalize(Vec2::new(100.0, 50.0), &r),
            Some(Vec2::new(0.0, 1.0))
        );
        assert_eq!(
            PointerTracker::normalize(Vec2::new(500.0, 250.0), &r),
            Some(Vec2::new(1.0, 0.0))
        );
        assert_eq!(
            PointerTracker::normalize(Vec2::new(300.0, 150.0), &r),
            Some(Vec2::new(0.5, 0.5))
        );
    }

    #[test]
    fn zero_area_container_is_ignored() {
        let mut t = PointerTracker::default();
        let empty = ContainerRect::new(0.0, 0.0, 0.0, 100.0);
        assert!(!t.on_move(Vec2::new(10.0, 10.0), &empty));
        assert_eq!(t.state(), PointerState::default());
    }

    #[test]
    fn first_move_has_zero_velocity() {
        let mut t = PointerTracker::default();
        t.on_move(Vec2::new(300.0, 150.0), &rect());
        assert_eq!(t.state().velocity, Vec2::ZERO);
        assert_eq!(t.state().position, Vec2::new(0.5, 0.5));
    }

    #[test]
    fn velocity_is_delta_of_normalized_positions() {
        let mut t = PointerTracker::default();
        t.on_move(Vec2::new(300.0, 150.0), &rect());
        t.on_move(Vec2::new(340.0, 130.0), &rect());
        let v = t.state().velocity;
        assert!((v.x - 0.1).abs() < 1e-6);
        assert!((v.y - 0.1).abs() < 1e-6);
    }

    #[test]
    fn damping_fades_velocity() {
        let mut t = PointerTracker::default();
        t.on_move(Vec2::new(300.0, 150.0), &rect());
        t.on_move(Vec2::new(340.0, 150.0), &rect());
        t.damp();
        assert!((t.state().velocity.x - 0.09).abs() < 1e-6);
        for _ in 0..200 {
            t.damp();
        }
        assert!(t.state().velocity.length() < 1e-9);
    }

    #[test]
    fn retain_policy_keeps_position_on_leave() {
        let mut t = PointerTracker::default();
        t.on_move(Vec2::new(300.0, 150.0), &rect());
        assert!(!t.handle(PointerEvent::Left, &rect()));
        assert_eq!(t.state().position, Vec2::new(0.5, 0.5));
    }

    #[test]
    fn reset_far_policy_parks_pointer_and_suppresses_reentry_jump() {
        let mut t = PointerTracker::new(PointerConfig {
            leave_policy: LeavePolicy::ResetFar,
            ..PointerConfig::default()
        });
        t.on_move(Vec2::new(300.0, 150.0), &rect());
        t.on_move(Vec2::new(320.0, 150.0), &rect());
        assert!(t.on_leave());
        assert_eq!(t.state().position, FAR_AWAY);
        assert_eq!(t.state().velocity, Vec2::ZERO);

        t.on_move(Vec2::new(120.0, 60.0), &rect());
        assert_eq!(t.state().velocity, Vec2::ZERO);
    }

    #[test]
    fn move_below_container_is_not_stored() {
        let mut t = PointerTracker::default();
        let r = ContainerRect::new(0.0, 0.0, 800.0, 450.0);
        assert!(t.on_move(Vec2::new(400.0, 440.0), &r));
        let inside = t.state();
        assert!(!t.on_move(Vec2::new(410.0, 470.0), &r));
        assert_eq!(t.state(), inside);
        assert!(inside.position.y >= 0.0);
    }

    #[test]
    fn move_outside_with_reset_far_parks_pointer() {
        let mut t = PointerTracker::new(PointerConfig {
            leave_policy: LeavePolicy::ResetFar,
            ..PointerConfig::default()
        });
        let r = ContainerRect::new(0.0, 0.0, 800.0, 450.0);
        t.on_move(Vec2::new(400.0, 400.0), &r);
        t.on_move(Vec2::new(400.0, 440.0), &r);
        assert!(t.handle(PointerEvent::Moved { client: Vec2::new(400.0, 470.0) }, &r));
        assert_eq!(t.state().position, FAR_AWAY);
        assert_eq!(t.state().velocity, Vec2::ZERO);
        // Already parked: further outside moves and leaves change nothing.
        assert!(!t.on_move(Vec2::new(900.0, 100.0), &r));
        assert!(!t.on_leave());
    }

    #[test]
    fn damping_out_of_range_is_rejected() {
        let bad = PointerConfig {
            velocity_damping: 1.0,
            ..PointerConfig::default()
        };
        assert_eq!(bad.validate(), Err(PointerConfigError::InvalidDamping(1.0)));
        assert!(PointerConfig::default().validate().is_ok());
    }

    proptest! {
        #[test]
        fn moves_inside_rect_stay_in_unit_square(
            fx in 0.0f32..=1.0,
            fy in 0.0f32..=1.0,
            left in -500.0f32..500.0,
            top in -500.0f32..500.0,
            w in 1.0f32..2000.0,
            h in 1.0f32..2000.0,
        ) {
            let r = ContainerRect::new(left, top, w, h);
            let client = Vec2::new(left + fx * w, top + fy * h);
            let p = PointerTracker::normalize(client, &r).unwrap();
            prop_assert!((-1e-3..=1.0 + 1e-3).contains(&p.x));
            prop_assert!((-1e-3..=1.0 + 1e-3).contains(&p.y));
        }

        #[test]
        fn stored_position_never_leaves_unit_square(
            moves in proptest::collection::vec((-400.0f32..1200.0, -300.0f32..800.0), 1..40),
        ) {
            let r = ContainerRect::new(0.0, 0.0, 800.0, 450.0);
            let mut t = PointerTracker::default();
            for (x, y) in moves {
                t.on_move(Vec2::new(x, y), &r);
                let p = t.state().position;
                prop_assert!((0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y));
            }
        }
    }
}
