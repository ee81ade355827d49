//! Engine configuration
//!
//! All tunables live in [`LifeConfig`]. There is no CLI or config file; the
//! defaults below are the engine's constants and callers override them with
//! the `with_*` builders.

use std::time::Duration;

use crate::error::{LifeError, Result};
use crate::simulation::{LifePattern, TileSize};

/// Default grid extent along both axes.
pub const DEFAULT_GRID_SIZE: u32 = 1000;
/// Default parallel tile extent along both axes.
pub const DEFAULT_TILE_SIZE: u32 = 16;
/// Default wall-clock interval between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1);
/// Default probability that a seeded cell starts alive.
pub const DEFAULT_LIVE_PROBABILITY: f64 = 0.4;
/// Default quad size as a fraction of the full cell extent.
pub const DEFAULT_QUAD_SCALE: f32 = 0.8;
/// Default clear color (dark blue).
pub const DEFAULT_CLEAR_COLOR: [f64; 4] = [0.0, 0.0, 0.4, 1.0];

/// Simulation, render and window settings.
#[derive(Debug, Clone)]
pub struct LifeConfig {
    /// Grid width in cells.
    pub grid_width: u32,
    /// Grid height in cells.
    pub grid_height: u32,
    /// Cells covered by one unit of parallel work.
    pub tile_size: TileSize,
    /// Wall-clock time between ticks.
    pub tick_interval: Duration,
    /// Bernoulli probability used by [`LifePattern::Random`].
    pub live_probability: f64,
    /// Scale of the unit quad relative to a full cell.
    pub quad_scale: f32,
    /// Initial generation written into buffer A.
    pub pattern: LifePattern,
    /// Fixed RNG seed; `None` draws from the thread RNG.
    pub rng_seed: Option<u64>,
    /// Color the frame is cleared to before drawing cells.
    pub clear_color: [f64; 4],
    pub window_title: String,
    pub window_size: (u32, u32),
    /// Log tick statistics every this many generations (0 disables).
    pub stats_interval: u64,
}

impl Default for LifeConfig {
    fn default() -> Self {
        Self {
            grid_width: DEFAULT_GRID_SIZE,
            grid_height: DEFAULT_GRID_SIZE,
            tile_size: TileSize::square(DEFAULT_TILE_SIZE),
            tick_interval: DEFAULT_TICK_INTERVAL,
            live_probability: DEFAULT_LIVE_PROBABILITY,
            quad_scale: DEFAULT_QUAD_SCALE,
            pattern: LifePattern::Random,
            rng_seed: None,
            clear_color: DEFAULT_CLEAR_COLOR,
            window_title: "Game of Life".to_string(),
            window_size: (1000, 1000),
            stats_interval: 1000,
        }
    }
}

impl LifeConfig {
    pub fn with_grid_size(mut self, width: u32, height: u32) -> Self {
        self.grid_width = width;
        self.grid_height = height;
        self
    }

    pub fn with_tile_size(mut self, tile_size: TileSize) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_live_probability(mut self, probability: f64) -> Self {
        self.live_probability = probability;
        self
    }

    pub fn with_quad_scale(mut self, scale: f32) -> Self {
        self.quad_scale = scale;
        self
    }

    pub fn with_pattern(mut self, pattern: LifePattern) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_stats_interval(mut self, generations: u64) -> Self {
        self.stats_interval = generations;
        self
    }

    /// Total number of cells in the grid.
    #[inline]
    pub fn cell_count(&self) -> u64 {
        u64::from(self.grid_width) * u64::from(self.grid_height)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(LifeError::InvalidDimensions {
                width: self.grid_width,
                height: self.grid_height,
            });
        }
        if self.tile_size.x == 0 || self.tile_size.y == 0 {
            return Err(LifeError::InvalidConfig(format!(
                "tile size must be non-zero, got {}x{}",
                self.tile_size.x, self.tile_size.y
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(LifeError::InvalidConfig(
                "tick interval must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.live_probability) {
            return Err(LifeError::InvalidConfig(format!(
                "live probability must be within [0, 1], got {}",
                self.live_probability
            )));
        }
        if !self.quad_scale.is_finite() || self.quad_scale <= 0.0 {
            return Err(LifeError::InvalidConfig(format!(
                "quad scale must be positive, got {}",
                self.quad_scale
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LifeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid_width, 1000);
        assert_eq!(config.grid_height, 1000);
        assert_eq!(config.tile_size, TileSize::square(16));
        assert_eq!(config.cell_count(), 1_000_000);
        assert!((config.live_probability - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = LifeConfig::default()
            .with_grid_size(0, 10)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            LifeError::InvalidDimensions {
                width: 0,
                height: 10
            }
        ));
    }

    #[test]
    fn test_bad_parameters_rejected() {
        let base = LifeConfig::default();
        assert!(base
            .clone()
            .with_tile_size(TileSize::new(0, 16))
            .validate()
            .is_err());
        assert!(base
            .clone()
            .with_live_probability(1.5)
            .validate()
            .is_err());
        assert!(base
            .clone()
            .with_live_probability(f64::NAN)
            .validate()
            .is_err());
        assert!(base
            .clone()
            .with_tick_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(base.with_quad_scale(0.0).validate().is_err());
    }
}
