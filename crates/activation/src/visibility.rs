use liquidgrid_common::ContainerRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Fires once, on the first intersection with the viewport.
    Visibility,
    /// Delivers every container resize until disposal.
    Size,
}

/// One host notification subscription, cancellable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    kind: SubscriptionKind,
    active: bool,
    delivered: u64,
}

impl Subscription {
    pub fn new(kind: SubscriptionKind) -> Self {
        Self {
            kind,
            active: false,
            delivered: 0,
        }
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Notifications accepted so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn subscribe(&mut self) {
        self.active = true;
    }

    /// Returns whether the subscription was active.
    pub fn cancel(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }

    /// Accept one notification if still subscribed.
    pub(crate) fn accept(&mut self) -> bool {
        if self.active {
            self.delivered += 1;
        }
        self.active
    }
}

/// Whether `container` intersects `viewport` grown by `margin` on every
/// side. Touching edges do not count.
pub fn intersects_with_margin(
    container: &ContainerRect,
    viewport: &ContainerRect,
    margin: f32,
) -> bool {
    if container.size().is_empty() {
        return false;
    }
    let left = viewport.left - margin;
    let top = viewport.top - margin;
    let right = viewport.right() + margin;
    let bottom = viewport.bottom() + margin;
    container.left < right
        && container.right() > left
        && container.top < bottom
        && container.bottom() > top
}
