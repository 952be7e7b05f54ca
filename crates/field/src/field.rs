use glam::Vec2;
use liquidgrid_common::PointerState;

use crate::config::{FieldConfig, FieldError, FieldSeed};

/// Square grid of displacement vectors.
///
/// Samples are stored row-major: the sample for column `x` and row `y`
/// lives at `x + size * y`. Row 0 is the bottom of the image, matching
/// the bottom-left origin of pointer space.
#[derive(Debug, Clone)]
pub struct DisplacementField {
    size: usize,
    samples: Vec<Vec2>,
    config: FieldConfig,
    ticks: u64,
}

/// Read-only view of the grid handed to the renderer each frame.
#[derive(Debug, Clone, Copy)]
pub struct FieldSnapshot<'a> {
    pub size: usize,
    pub samples: &'a [Vec2],
}

impl FieldSnapshot<'_> {
    /// Interleaved `[dx, dy, dx, dy, ...]` texel data for a two-channel
    /// float texture, row 0 first.
    pub fn to_rg32(&self) -> Vec<f32> {
        self.samples.iter().flat_map(|v| [v.x, v.y]).collect()
    }
}

impl DisplacementField {
    /// Allocate a field and fill it from the configured seed.
    pub fn new(config: FieldConfig) -> Result<Self, FieldError> {
        config.validate()?;
        let size = config.grid_size;
        let len = size
            .checked_mul(size)
            .ok_or(FieldError::InvalidGridSize(size))?;
        let samples = match config.seed {
            FieldSeed::Zero => vec![Vec2::ZERO; len],
            FieldSeed::Noise { seed, amplitude } => noise_samples(len, seed, amplitude),
        };
        tracing::debug!(size, seed = ?config.seed, "displacement field allocated");
        Ok(Self {
            size,
            samples,
            config,
            ticks: 0,
        })
    }

    /// Grid resolution N.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of ticks applied since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Sample at column `x`, row `y`.
    pub fn get(&self, x: usize, y: usize) -> Option<Vec2> {
        if x >= self.size || y >= self.size {
            return None;
        }
        self.samples.get(x + self.size * y).copied()
    }

    /// Current grid for upload. Never mutates.
    pub fn read(&self) -> FieldSnapshot<'_> {
        FieldSnapshot {
            size: self.size,
            samples: &self.samples,
        }
    }

    /// Advance one tick: decay every sample, then inject pointer velocity
    /// into cells within `max_dist` of the pointer.
    pub fn tick(&mut self, pointer: &PointerState) {
        self.decay();
        self.inject(pointer);
        self.ticks += 1;
    }

    fn decay(&mut self) {
        let r = self.config.relaxation;
        for v in &mut self.samples {
            *v *= r;
        }
    }

    fn inject(&mut self, pointer: &PointerState) {
        let velocity = pointer.velocity;
        if !pointer.position.is_finite() || !velocity.is_finite() || velocity == Vec2::ZERO {
            return;
        }

        let size = self.size as f32;
        let grid_pos = pointer.position * size;
        let max_dist = self.config.max_dist();
        let max_dist_sq = max_dist * max_dist;
        let gain = self.config.strength * self.config.velocity_gain;

        // Only cells inside the bounding square of the radius can be reached.
        let Some((x0, x1)) = axis_range(grid_pos.x, max_dist, self.size) else {
            return;
        };
        let Some((y0, y1)) = axis_range(grid_pos.y, max_dist, self.size) else {
            return;
        };

        for y in y0..=y1 {
            for x in x0..=x1 {
                let d = grid_pos - Vec2::new(x as f32, y as f32);
                let dist_sq = d.length_squared();
                if dist_sq >= max_dist_sq {
                    continue;
                }
                let power = falloff(max_dist, dist_sq.sqrt(), self.config.max_power);
                let sample = &mut self.samples[x + self.size * y];
                sample.x += gain * velocity.x * power;
                // Texture space is y-up relative to the screen.
                sample.y -= gain * velocity.y * power;
            }
        }
    }

    /// Largest sample magnitude in the grid.
    pub fn max_magnitude(&self) -> f32 {
        self.samples
            .iter()
            .map(|v| v.length())
            .fold(0.0_f32, f32::max)
    }

    /// Deterministic hash of the grid contents, for replay comparison.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325; // FNV offset basis
        let mut mix = |bytes: &[u8]| {
            for &b in bytes {
                h ^= b as u64;
                h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        mix(&(self.size as u64).to_le_bytes());
        mix(&self.ticks.to_le_bytes());
        for v in &self.samples {
            mix(&v.x.to_bits().to_le_bytes());
            mix(&v.y.to_bits().to_le_bytes());
        }
        h
    }
}

/// Falloff `max_dist / distance`, capped at `max_power`. A pointer sitting
/// exactly on a cell gets the cap instead of a division by zero.
fn falloff(max_dist: f32, distance: f32, max_power: f32) -> f32 {
    if distance <= 0.0 {
        max_power
    } else {
        (max_dist / distance).min(max_power)
    }
}

/// Inclusive index range along one axis that may lie within `radius` of
/// `center`, clamped to the grid. `None` when the range misses the grid.
fn axis_range(center: f32, radius: f32, size: usize) -> Option<(usize, usize)> {
    let lo = (center - radius).ceil().max(0.0);
    let hi = (center + radius).floor().min(size as f32 - 1.0);
    if lo > hi {
        return None;
    }
    Some((lo as usize, hi as usize))
}

fn noise_samples(len: usize, seed: u64, amplitude: f32) -> Vec<Vec2> {
    let mut state = seed;
    let mut next = || {
        state = splitmix64(state);
        // Upper 24 bits give a uniform f32 in [0, 1).
        let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
        (unit * 2.0 - 1.0) * amplitude
    };
    (0..len).map(|_| Vec2::new(next(), next())).collect()
}

/// Splitmix64 step: advances the noise state reproducibly across platforms.
fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
