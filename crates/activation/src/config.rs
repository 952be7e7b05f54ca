use liquidgrid_field::{FieldConfig, FieldError};
use liquidgrid_input::{PointerConfig, PointerConfigError};
use liquidgrid_render::{RenderConfig, RenderError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format {0:?} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(String),
    #[error("field: {0}")]
    Field(#[from] FieldError),
    #[error("pointer: {0}")]
    Pointer(#[from] PointerConfigError),
    #[error("render: {0}")]
    Render(#[from] RenderError),
    #[error("activation: {name} = {value}, expected {expected}")]
    Activation {
        name: &'static str,
        value: f32,
        expected: &'static str,
    },
}

/// Policy gates for building the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivationConfig {
    /// Pre-trigger margin around the viewport, in logical pixels.
    pub root_margin: f32,
    /// Containers taller than this run the static image instead.
    pub max_height: f32,
    /// Height changes smaller than this are ignored by the size policy.
    pub height_epsilon: f32,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            root_margin: 200.0,
            max_height: 950.0,
            height_epsilon: 5.0,
        }
    }
}

impl ActivationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |name, value, expected| ConfigError::Activation {
            name,
            value,
            expected,
        };
        if !(self.root_margin.is_finite() && self.root_margin >= 0.0) {
            return Err(bad("root_margin", self.root_margin, "a finite value >= 0"));
        }
        if !(self.max_height.is_finite() && self.max_height > 0.0) {
            return Err(bad("max_height", self.max_height, "a finite value > 0"));
        }
        if !(self.height_epsilon.is_finite() && self.height_epsilon >= 0.0) {
            return Err(bad(
                "height_epsilon",
                self.height_epsilon,
                "a finite value >= 0",
            ));
        }
        Ok(())
    }

    /// Whether a container of this height is too large to simulate.
    pub fn exceeds_max_height(&self, height: f32) -> bool {
        height > self.max_height
    }
}

/// Every tunable of the effect in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    pub field: FieldConfig,
    pub pointer: PointerConfig,
    pub render: RenderConfig,
    pub activation: ActivationConfig,
}

impl WarpConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let config: Self = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            "json" => serde_json::from_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        config.validate()?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// `load(path)` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.field.validate()?;
        self.pointer.validate()?;
        self.render.validate()?;
        self.activation.validate()
    }
}
