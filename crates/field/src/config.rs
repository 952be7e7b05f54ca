use serde::{Deserialize, Serialize};

/// Errors from field construction and config validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("grid size must be at least 1, got {0}")]
    InvalidGridSize(usize),
    #[error("invalid field parameter `{name}`: {value} ({expected})")]
    InvalidParameter {
        name: &'static str,
        value: f32,
        expected: &'static str,
    },
}

/// Initial contents of the grid.
///
/// The noise seed only breaks the visual symmetry of a perfectly flat
/// starting texture; it carries no meaning beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSeed {
    #[default]
    Zero,
    /// Uniform noise in `[-amplitude, amplitude]` per component, generated
    /// deterministically from `seed`.
    Noise { seed: u64, amplitude: f32 },
}

/// Tunable constants of the displacement field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Grid resolution N (the field has N x N samples).
    pub grid_size: usize,
    /// Injection radius as a fraction of the grid size.
    pub influence_radius: f32,
    /// Scale applied to injected pointer velocity.
    pub strength: f32,
    /// Per-tick multiplicative decay, in (0, 1).
    pub relaxation: f32,
    /// Converts normalized per-frame pointer deltas into field units.
    pub velocity_gain: f32,
    /// Cap on the distance falloff `max_dist / distance`.
    pub max_power: f32,
    pub seed: FieldSeed,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            grid_size: 15,
            influence_radius: 0.1,
            strength: 0.15,
            relaxation: 0.9,
            velocity_gain: 100.0,
            max_power: 10.0,
            seed: FieldSeed::Zero,
        }
    }
}

impl FieldConfig {
    /// Radius of influence in grid units.
    pub fn max_dist(&self) -> f32 {
        self.grid_size as f32 * self.influence_radius
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        if self.grid_size == 0 {
            return Err(FieldError::InvalidGridSize(self.grid_size));
        }
        check(
            "relaxation",
            self.relaxation,
            self.relaxation > 0.0 && self.relaxation < 1.0,
            "must be in (0, 1)",
        )?;
        check(
            "influence_radius",
            self.influence_radius,
            self.influence_radius >= 0.0,
            "must be non-negative",
        )?;
        check("strength", self.strength, true, "must be finite")?;
        check("velocity_gain", self.velocity_gain, true, "must be finite")?;
        check(
            "max_power",
            self.max_power,
            self.max_power > 0.0,
            "must be positive",
        )?;
        if let FieldSeed::Noise { amplitude, .. } = self.seed {
            check(
                "seed.amplitude",
                amplitude,
                amplitude >= 0.0,
                "must be non-negative",
            )?;
        }
        Ok(())
    }
}

fn check(
    name: &'static str,
    value: f32,
    ok: bool,
    expected: &'static str,
) -> Result<(), FieldError> {
    if value.is_finite() && ok {
        Ok(())
    } else {
        Err(FieldError::InvalidParameter {
            name,
            value,
            expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let c = FieldConfig::default();
        assert_eq!(c.grid_size, 15);
        assert_eq!(c.relaxation, 0.9);
        assert!((c.max_dist() - 1.5).abs() < 1e-6);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_grid_is_rejected() {
        let c = FieldConfig {
            grid_size: 0,
            ..FieldConfig::default()
        };
        assert_eq!(c.validate(), Err(FieldError::InvalidGridSize(0)));
    }

    #[test]
    fn relaxation_outside_unit_interval_is_rejected() {
        for r in [0.0, 1.0, 1.5, -0.1, f32::NAN] {
            let c = FieldConfig {
                relaxation: r,
                ..FieldConfig::default()
            };
            assert!(c.validate().is_err(), "relaxation {r} accepted");
        }
    }

    #[test]
    fn negative_noise_amplitude_is_rejected() {
        let c = FieldConfig {
            seed: FieldSeed::Noise {
                seed: 1,
                amplitude: -3.0,
            },
            ..FieldConfig::default()
        };
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("seed.amplitude"));
    }

    #[test]
    fn seed_deserializes_from_tagged_json() {
        let c: FieldConfig =
            serde_json::from_str(r#"{"seed":{"kind":"noise","seed":7,"amplitude":125.0}}"#)
                .unwrap();
        assert_eq!(
            c.seed,
            FieldSeed::Noise {
                seed: 7,
                amplitude: 125.0
            }
        );
        assert_eq!(c.grid_size, 15);
    }
}
