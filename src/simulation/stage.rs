//! Simulation stage
//!
//! Records the compute dispatch that advances the grid by one generation.

use crate::error::{LifeError, Result};
use crate::gfx::device::{
    Command, CommandList, ComputeKernel, ComputePipelineDescriptor, GraphicsDevice, PipelineHandle,
};

use super::grid::{Dimensions, GridState};

/// Extent of one unit of parallel work, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileSize {
    pub x: u32,
    pub y: u32,
}

impl TileSize {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub const fn square(size: u32) -> Self {
        Self { x: size, y: size }
    }

    /// Number of tiles needed to cover `dims`, rounding partial tiles up.
    pub fn tiles_for(&self, dims: Dimensions) -> [u32; 3] {
        [
            dims.width.div_ceil(self.x),
            dims.height.div_ceil(self.y),
            1,
        ]
    }
}

/// Issues one tile-partitioned compute dispatch per generation.
pub struct SimulationStage {
    pipeline: PipelineHandle,
    workgroups: [u32; 3],
}

impl SimulationStage {
    pub fn new<D>(device: &mut D, dims: Dimensions, tile: TileSize) -> Result<Self>
    where
        D: GraphicsDevice + ?Sized,
    {
        if tile.x == 0 || tile.y == 0 {
            return Err(LifeError::InvalidConfig(format!(
                "tile size must be non-zero, got {}x{}",
                tile.x, tile.y
            )));
        }

        let pipeline = device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: "Simulation pipeline",
                kernel: ComputeKernel::LifeStep { tile },
            })
            .map_err(LifeError::Initialization)?;
        let workgroups = tile.tiles_for(dims);

        log::debug!(
            "Simulation stage: {}x{} tiles of {}x{} cells",
            workgroups[0],
            workgroups[1],
            tile.x,
            tile.y
        );

        Ok(Self {
            pipeline,
            workgroups,
        })
    }

    /// Record the dispatch that reads generation `generation` and writes
    /// `generation + 1` into the inactive buffer.
    pub fn record(&self, grid: &GridState, generation: u64, commands: &mut CommandList) {
        commands.push(Command::Dispatch {
            pipeline: self.pipeline,
            bind_group: grid.bindings(generation),
            workgroups: self.workgroups,
        });
    }

    pub fn workgroups(&self) -> [u32; 3] {
        self.workgroups
    }
}
