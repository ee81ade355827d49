// src/simulation/mod.rs
//! Simulation system
//!
//! Grid state, the B3/S23 update rule and the compute stage that applies it
//! to the whole torus once per tick.

pub mod grid;
pub mod patterns;
pub mod rule;
pub mod stage;

pub use grid::{Dimensions, GridState};
pub use patterns::LifePattern;
pub use stage::{SimulationStage, TileSize};
