// src/lib.rs
//! Torus Life
//!
//! Conway's Game of Life on a toroidal grid, stepped by a parallel compute
//! kernel over two ping-pong cell buffers and drawn as one instanced quad per
//! cell, built on wgpu and winit.

pub mod app;
pub mod config;
pub mod error;
pub mod gfx;
pub mod performance;
pub mod scheduler;
pub mod simulation;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use app::LifeApp;
pub use config::LifeConfig;
pub use error::{DeviceError, LifeError, Result};
pub use scheduler::{FrameScheduler, SchedulerState};

/// Creates an application with the default configuration
pub fn default() -> LifeApp {
    LifeApp::new(LifeConfig::default())
}
