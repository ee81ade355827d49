//! Graphics device contract
//!
//! The engine never talks to a graphics API directly. It allocates buffers,
//! builds pipelines from kernel contracts, wires buffers into binding sets
//! and submits ordered command lists through [`GraphicsDevice`]. The wgpu
//! backend ([`RenderEngine`](super::render_engine::RenderEngine)) and the CPU
//! backend ([`HeadlessDevice`](super::headless::HeadlessDevice)) both
//! implement it.
//!
//! # Binding layout
//!
//! Every pipeline shares one binding layout:
//!
//! | slot | contents                 | visible to        |
//! |------|--------------------------|-------------------|
//! | 0    | [`GridUniform`]          | vertex, compute   |
//! | 1    | cell state, read-only    | vertex, compute   |
//! | 2    | cell state, read-write   | compute           |
//!
//! Slots 1 and 2 must name different buffers.

use std::ops::Range;

use crate::error::DeviceError;
use crate::simulation::TileSize;

/// Binding slot of the grid size uniform.
pub const GRID_UNIFORM_SLOT: u32 = 0;
/// Binding slot of the cell state being read.
pub const CELL_STATE_IN_SLOT: u32 = 1;
/// Binding slot of the cell state being written.
pub const CELL_STATE_OUT_SLOT: u32 = 2;

/// Grid size as seen by the kernels.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GridUniform {
    pub width: u32,
    pub height: u32,
}

bitflags::bitflags! {
    /// Buffer usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsages: u8 {
        const VERTEX = 1 << 0;
        const UNIFORM = 1 << 1;
        const STORAGE = 1 << 2;
        const COPY_DST = 1 << 3;
        const COPY_SRC = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupHandle(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    pub label: &'a str,
    /// Size in bytes; must be a multiple of 4.
    pub size: u64,
    pub usage: BufferUsages,
}

/// Compute kernels the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeKernel {
    /// One Game of Life generation.
    ///
    /// Each work unit covers one `tile` of cells. For every cell inside the
    /// grid it counts the eight toroidal neighbors in slot 1 and writes the
    /// B3/S23 successor into the same index of slot 2. Cells of a partial
    /// tile that fall outside the grid are skipped.
    LifeStep { tile: TileSize },
}

/// Render kernels the engine knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKernel {
    /// One quad instance per cell.
    ///
    /// Vertices are [`QuadVertex`](super::quad::QuadVertex) values. Instance
    /// `i` reads its state from slot 1, scales the quad by it and places the
    /// quad over cell `(i % width, i / width)`.
    CellQuads,
}

#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor<'a> {
    pub label: &'a str,
    pub kernel: ComputeKernel,
}

#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    pub label: &'a str,
    pub kernel: RenderKernel,
}

#[derive(Debug, Clone, Copy)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub buffer: BufferHandle,
}

#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    pub label: &'a str,
    pub entries: &'a [BindGroupEntry],
}

/// A single operation inside a [`CommandList`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch {
        pipeline: PipelineHandle,
        bind_group: BindGroupHandle,
        workgroups: [u32; 3],
    },
    /// Clears the current frame target and draws `instances` copies of the
    /// geometry in `vertex_buffer`.
    DrawInstanced {
        pipeline: PipelineHandle,
        bind_group: BindGroupHandle,
        vertex_buffer: BufferHandle,
        vertices: Range<u32>,
        instances: Range<u32>,
        clear_color: [f64; 4],
    },
}

/// An ordered unit of work. Commands execute in the order they were pushed.
#[derive(Debug, Clone, Default)]
pub struct CommandList {
    label: String,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

/// Compute and render back end used by the engine.
///
/// # Ordering contract
///
/// Submissions execute in FIFO order relative to the device's single queue,
/// and commands inside one [`CommandList`] execute in order. The engine relies
/// on this to keep a compute dispatch from overwriting a buffer that an
/// earlier draw is still reading. A backend that cannot promise this returns
/// `false` from [`preserves_submission_order`](Self::preserves_submission_order)
/// and the scheduler fences every tick with [`wait_idle`](Self::wait_idle).
pub trait GraphicsDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<BufferHandle, DeviceError>;

    /// Queue a write of `data` into `buffer` at `offset` bytes.
    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError>;

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError>;

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError>;

    fn create_bind_group(
        &mut self,
        desc: &BindGroupDescriptor,
    ) -> Result<BindGroupHandle, DeviceError>;

    fn submit(&mut self, commands: CommandList) -> Result<(), DeviceError>;

    /// Present the frame drawn by the last submitted `DrawInstanced`.
    fn present(&mut self) -> Result<(), DeviceError>;

    /// Copy the contents of `buffer` back to the host, blocking until all
    /// previously submitted work has finished.
    fn read_buffer(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, DeviceError>;

    /// Block until all submitted work has completed.
    fn wait_idle(&mut self) -> Result<(), DeviceError>;

    fn preserves_submission_order(&self) -> bool {
        true
    }
}

pub(crate) fn validate_cell_bindings(entries: &[BindGroupEntry]) -> Result<(), DeviceError> {
    let slot = |binding| {
        entries
            .iter()
            .find(|entry| entry.binding == binding)
            .map(|entry| entry.buffer)
            .ok_or_else(|| DeviceError::Validation(format!("binding {binding} is missing")))
    };

    let _grid = slot(GRID_UNIFORM_SLOT)?;
    let cells_in = slot(CELL_STATE_IN_SLOT)?;
    let cells_out = slot(CELL_STATE_OUT_SLOT)?;
    if cells_in == cells_out {
        return Err(DeviceError::Validation(format!(
            "cell state buffer {} is bound for both reading and writing",
            cells_in.0
        )));
    }
    if let Some(extra) = entries.iter().find(|entry| entry.binding > CELL_STATE_OUT_SLOT) {
        return Err(DeviceError::Validation(format!(
            "binding {} is not part of the cell layout",
            extra.binding
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(grid: usize, cells_in: usize, cells_out: usize) -> [BindGroupEntry; 3] {
        [
            BindGroupEntry {
                binding: GRID_UNIFORM_SLOT,
                buffer: BufferHandle(grid),
            },
            BindGroupEntry {
                binding: CELL_STATE_IN_SLOT,
                buffer: BufferHandle(cells_in),
            },
            BindGroupEntry {
                binding: CELL_STATE_OUT_SLOT,
                buffer: BufferHandle(cells_out),
            },
        ]
    }

    #[test]
    fn test_usage_flags() {
        let usage = BufferUsages::STORAGE | BufferUsages::COPY_DST;
        assert!(usage.contains(BufferUsages::STORAGE));
        assert!(usage.contains(BufferUsages::COPY_DST));
        assert!(!usage.contains(BufferUsages::VERTEX));
        assert!(usage.contains(BufferUsages::empty()));
    }

    #[test]
    fn test_cell_bindings_accepts_distinct_buffers() {
        assert!(validate_cell_bindings(&entries(0, 1, 2)).is_ok());
    }

    #[test]
    fn test_cell_bindings_rejects_aliasing() {
        let err = validate_cell_bindings(&entries(0, 1, 1)).unwrap_err();
        assert!(matches!(err, DeviceError::Validation(_)));
    }

    #[test]
    fn test_cell_bindings_rejects_missing_slot() {
        let all = entries(0, 1, 2);
        assert!(validate_cell_bindings(&all[..2]).is_err());
    }
}
