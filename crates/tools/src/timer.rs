use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling window of frame durations.
#[derive(Debug)]
pub struct FrameTimer {
    window: VecDeque<Duration>,
    capacity: usize,
    last: Option<Instant>,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            last: None,
        }
    }

    /// Mark a frame boundary at `now`, recording the time since the
    /// previous mark.
    pub fn mark(&mut self, now: Instant) {
        if let Some(last) = self.last.replace(now) {
            self.record(now.saturating_duration_since(last));
        }
    }

    pub fn record(&mut self, dt: Duration) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(dt);
    }

    pub fn count(&self) -> usize {
        self.window.len()
    }

    pub fn average(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        self.window.iter().sum::<Duration>() / self.window.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.window.iter().copied().max().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.window.iter().copied().min().unwrap_or_default()
    }

    /// Frames per second over the window; zero until a frame is recorded.
    pub fn fps(&self) -> f32 {
        let avg = self.average().as_secs_f32();
        if avg > 0.0 { 1.0 / avg } else { 0.0 }
    }
}
