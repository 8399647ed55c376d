//! Engine tuning knobs and grid scale.

use serde::{Deserialize, Serialize};

use crate::error::FogError;

/// Default pixels per grid cell for maps that do not state one.
pub const DEFAULT_PIXELS_PER_GRID: f64 = 70.0;
pub const DEFAULT_FEET_PER_GRID: f64 = 5.0;
/// Radius standing in for "sight not limited by distance".
pub const UNLIMITED_RADIUS: f64 = 100_000.0;
pub const MIN_CIRCLE_SAMPLES: usize = 32;
pub const CORNER_EPSILON: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    pub pixels_per_grid: f64,
    pub feet_per_grid: f64,
    /// Vision radii at or above this are clamped to it.
    pub unlimited_radius: f64,
    /// Evenly spaced rays cast around every observer.
    pub min_circle_samples: usize,
    /// Angular offset (radians) of the rays flanking each wall endpoint.
    pub corner_epsilon: f64,
    /// Build stale observers on the rayon pool.
    pub parallel: bool,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            pixels_per_grid: DEFAULT_PIXELS_PER_GRID,
            feet_per_grid: DEFAULT_FEET_PER_GRID,
            unlimited_radius: UNLIMITED_RADIUS,
            min_circle_samples: MIN_CIRCLE_SAMPLES,
            corner_epsilon: CORNER_EPSILON,
            parallel: false,
        }
    }
}

impl FogConfig {
    pub fn from_json(json: &str) -> Result<Self, FogError> {
        let config: FogConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_grid(mut self, pixels_per_grid: f64, feet_per_grid: f64) -> Self {
        self.pixels_per_grid = pixels_per_grid;
        self.feet_per_grid = feet_per_grid;
        self
    }

    pub fn validate(&self) -> Result<(), FogError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(FogError::InvalidConfig(format!("{name} must be positive, got {v}")))
            }
        };
        positive("pixels_per_grid", self.pixels_per_grid)?;
        positive("feet_per_grid", self.feet_per_grid)?;
        positive("unlimited_radius", self.unlimited_radius)?;
        if self.min_circle_samples < 3 {
            return Err(FogError::InvalidConfig(format!(
                "min_circle_samples must be at least 3, got {}",
                self.min_circle_samples
            )));
        }
        if !(self.corner_epsilon > 0.0 && self.corner_epsilon < 0.01) {
            return Err(FogError::InvalidConfig(format!(
                "corner_epsilon must be in (0, 0.01), got {}",
                self.corner_epsilon
            )));
        }
        Ok(())
    }

    /// Convert a distance in feet to map pixels at this grid scale.
    pub fn feet_to_pixels(&self, feet: f64) -> f64 {
        feet * self.pixels_per_grid / self.feet_per_grid
    }
}
