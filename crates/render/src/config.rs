use liquidgrid_common::FALLBACK_ASPECT;
use serde::{Deserialize, Serialize};

use crate::surface::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Displacement scale `k`: the image is sampled at `uv - k * field(uv)`.
    pub warp_scale: f32,
    /// Animation time added per rendered frame.
    pub time_step: f32,
    /// Aspect ratio assumed until the image reports its natural size.
    pub fallback_aspect: f32,
    /// Background shown while the image is loading.
    pub placeholder_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            warp_scale: 0.02,
            time_step: 0.05,
            fallback_aspect: FALLBACK_ASPECT,
            placeholder_color: [0.08, 0.08, 0.1, 1.0],
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        let finite = |name, value: f32| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(RenderError::InvalidParameter { name, value })
            }
        };
        finite("warp_scale", self.warp_scale)?;
        finite("time_step", self.time_step)?;
        if self.time_step < 0.0 {
            return Err(RenderError::InvalidParameter {
                name: "time_step",
                value: self.time_step,
            });
        }
        if !(self.fallback_aspect.is_finite() && self.fallback_aspect > 0.0) {
            return Err(RenderError::InvalidParameter {
                name: "fallback_aspect",
                value: self.fallback_aspect,
            });
        }
        for c in self.placeholder_color {
            if !(0.0..=1.0).contains(&c) {
                return Err(RenderError::InvalidParameter {
                    name: "placeholder_color",
                    value: c,
                });
            }
        }
        Ok(())
    }
}

/// Frame-count animation clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationClock {
    step: f32,
    time: f32,
    frames: u64,
}

impl AnimationClock {
    pub fn new(step: f32) -> Self {
        Self {
            step,
            time: 0.0,
            frames: 0,
        }
    }

    /// Advance one frame and return the new time.
    pub fn advance(&mut self) -> f32 {
        self.frames += 1;
        self.time += self.step;
        self.time
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
