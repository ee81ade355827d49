//! # Graphics Module
//!
//! Everything between the simulation and a graphics API.
//!
//! ## Architecture Overview
//!
//! - **Device contract** ([`device`]) - buffers, kernel pipelines, binding sets
//!   and ordered command lists
//! - **Backends** - [`RenderEngine`] on wgpu and a window surface,
//!   [`HeadlessDevice`] on the CPU
//! - **Cell rendering** ([`cell_renderer`], [`quad`]) - one instanced quad per
//!   cell, scaled by its state
//!
//! ## Usage
//!
//! ```no_run
//! use torus_life::gfx::HeadlessDevice;
//! use torus_life::{FrameScheduler, LifeConfig};
//!
//! let config = LifeConfig::default().with_grid_size(64, 64);
//! let mut scheduler = FrameScheduler::new(HeadlessDevice::new(), &config)?;
//! scheduler.run(10)?;
//! # Ok::<(), torus_life::LifeError>(())
//! ```

pub mod cell_renderer;
pub mod device;
pub mod headless;
pub mod quad;
pub mod render_engine;

// Re-export commonly used types
pub use device::GraphicsDevice;
pub use headless::HeadlessDevice;
pub use render_engine::RenderEngine;
