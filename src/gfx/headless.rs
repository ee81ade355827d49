//! CPU graphics device
//!
//! [`HeadlessDevice`] runs the engine's kernel contracts on the host with
//! rayon instead of a GPU. Submissions execute synchronously and in order, so
//! every buffer read sees all previously submitted work. Presented frames are
//! kept as lists of per-cell quads so rendering can be inspected without a
//! window.

use rayon::prelude::*;

use crate::error::DeviceError;
use crate::gfx::cell_renderer::{cell_color, instance_cell, instance_vertex};
use crate::gfx::device::{
    validate_cell_bindings, BindGroupDescriptor, BindGroupHandle, BufferDescriptor, BufferHandle,
    BufferUsages, Command, CommandList, ComputeKernel, ComputePipelineDescriptor, GraphicsDevice,
    PipelineHandle, RenderKernel, RenderPipelineDescriptor, CELL_STATE_IN_SLOT,
    CELL_STATE_OUT_SLOT, GRID_UNIFORM_SLOT,
};
use crate::gfx::quad::QuadVertex;
use crate::simulation::rule::evolve_cell;
use crate::simulation::{Dimensions, TileSize};

struct CpuBuffer {
    label: String,
    usage: BufferUsages,
    words: Vec<u32>,
}

enum CpuPipeline {
    Compute(ComputeKernel),
    Render(RenderKernel),
}

#[derive(Clone, Copy)]
struct CpuBindGroup {
    grid: usize,
    cells_in: usize,
    cells_out: usize,
}

/// One drawn cell quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellInstance {
    pub cell: (u32, u32),
    pub state: u32,
    /// Bottom-left corner of the transformed quad in clip space.
    pub min: [f32; 2],
    /// Top-right corner of the transformed quad in clip space.
    pub max: [f32; 2],
    pub color: [f32; 4],
}

impl CellInstance {
    /// Whether the quad covers any area.
    pub fn is_visible(&self) -> bool {
        self.max[0] > self.min[0] && self.max[1] > self.min[1]
    }
}

/// The result of one `DrawInstanced`.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub clear_color: [f64; 4],
    pub instances: Vec<CellInstance>,
}

impl Frame {
    pub fn visible_instances(&self) -> usize {
        self.instances.iter().filter(|i| i.is_visible()).count()
    }
}

/// Host-side implementation of [`GraphicsDevice`].
#[derive(Default)]
pub struct HeadlessDevice {
    buffers: Vec<CpuBuffer>,
    pipelines: Vec<CpuPipeline>,
    bind_groups: Vec<CpuBindGroup>,
    pending_frame: Option<Frame>,
    last_frame: Option<Frame>,
    frames_presented: u64,
    submissions: u64,
    idle_waits: u64,
    unordered: bool,
    lost: Option<String>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report submissions as unordered, forcing callers to fence every tick.
    pub fn with_unordered_submissions(mut self) -> Self {
        self.unordered = true;
        self
    }

    /// Simulate device loss. Every later call fails with [`DeviceError::Lost`].
    pub fn lose(&mut self, reason: impl Into<String>) {
        self.lost = Some(reason.into());
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    pub fn idle_waits(&self) -> u64 {
        self.idle_waits
    }

    fn check_alive(&self) -> Result<(), DeviceError> {
        match &self.lost {
            Some(reason) => Err(DeviceError::Lost(reason.clone())),
            None => Ok(()),
        }
    }

    fn buffer(&self, handle: BufferHandle) -> Result<&CpuBuffer, DeviceError> {
        self.buffers.get(handle.0).ok_or(DeviceError::InvalidHandle {
            kind: "buffer",
            index: handle.0,
        })
    }

    fn bind_group(&self, handle: BindGroupHandle) -> Result<CpuBindGroup, DeviceError> {
        self.bind_groups
            .get(handle.0)
            .copied()
            .ok_or(DeviceError::InvalidHandle {
                kind: "bind group",
                index: handle.0,
            })
    }

    fn pipeline(&self, handle: PipelineHandle) -> Result<&CpuPipeline, DeviceError> {
        self.pipelines.get(handle.0).ok_or(DeviceError::InvalidHandle {
            kind: "pipeline",
            index: handle.0,
        })
    }

    fn grid_dims(&self, bindings: CpuBindGroup) -> Result<Dimensions, DeviceError> {
        let words = &self.buffers[bindings.grid].words;
        let (width, height) = match words.as_slice() {
            [width, height, ..] => (*width, *height),
            _ => {
                return Err(DeviceError::Validation(
                    "grid uniform buffer is too small".to_string(),
                ))
            }
        };
        let dims = Dimensions::new(width, height)
            .map_err(|err| DeviceError::Validation(err.to_string()))?;

        for slot in [bindings.cells_in, bindings.cells_out] {
            let buffer = &self.buffers[slot];
            if buffer.words.len() != dims.cell_count() {
                return Err(DeviceError::Validation(format!(
                    "{} holds {} cells, grid has {}",
                    buffer.label,
                    buffer.words.len(),
                    dims.cell_count()
                )));
            }
        }
        Ok(dims)
    }

    fn dispatch(
        &mut self,
        pipeline: PipelineHandle,
        bind_group: BindGroupHandle,
        workgroups: [u32; 3],
    ) -> Result<(), DeviceError> {
        let tile = match self.pipeline(pipeline)? {
            CpuPipeline::Compute(ComputeKernel::LifeStep { tile }) => *tile,
            CpuPipeline::Render(_) => {
                return Err(DeviceError::Validation(
                    "dispatch with a render pipeline".to_string(),
                ))
            }
        };
        let bindings = self.bind_group(bind_group)?;
        let dims = self.grid_dims(bindings)?;

        let mut cells_out = std::mem::take(&mut self.buffers[bindings.cells_out].words);
        run_life_step(
            &self.buffers[bindings.cells_in].words,
            &mut cells_out,
            dims,
            tile,
            workgroups,
        );
        self.buffers[bindings.cells_out].words = cells_out;
        Ok(())
    }

    fn draw(
        &mut self,
        pipeline: PipelineHandle,
        bind_group: BindGroupHandle,
        vertex_buffer: BufferHandle,
        vertices: std::ops::Range<u32>,
        instances: std::ops::Range<u32>,
        clear_color: [f64; 4],
    ) -> Result<(), DeviceError> {
        match self.pipeline(pipeline)? {
            CpuPipeline::Render(RenderKernel::CellQuads) => {}
            CpuPipeline::Compute(_) => {
                return Err(DeviceError::Validation(
                    "draw with a compute pipeline".to_string(),
                ))
            }
        }
        let bindings = self.bind_group(bind_group)?;
        let dims = self.grid_dims(bindings)?;

        let vertex_buffer = self.buffer(vertex_buffer)?;
        if !vertex_buffer.usage.contains(BufferUsages::VERTEX) {
            return Err(DeviceError::Validation(format!(
                "{} is not a vertex buffer",
                vertex_buffer.label
            )));
        }
        let quad: &[QuadVertex] = bytemuck::try_cast_slice(&vertex_buffer.words)
            .map_err(|err| DeviceError::Validation(format!("vertex buffer: {err}")))?;
        let quad = quad
            .get(vertices.start as usize..vertices.end as usize)
            .ok_or_else(|| DeviceError::Validation("vertex range out of bounds".to_string()))?;

        if instances.end as usize > dims.cell_count() {
            return Err(DeviceError::Validation(format!(
                "{} instances drawn over {} cells",
                instances.end,
                dims.cell_count()
            )));
        }

        let cells = &self.buffers[bindings.cells_in].words;
        let instances = instances
            .into_par_iter()
            .map(|index| {
                let cell = instance_cell(index, dims);
                let state = cells[index as usize];
                let mut min = [f32::INFINITY; 2];
                let mut max = [f32::NEG_INFINITY; 2];
                for vertex in quad {
                    let p = instance_vertex(vertex.position, cell, state, dims);
                    for axis in 0..2 {
                        min[axis] = min[axis].min(p[axis]);
                        max[axis] = max[axis].max(p[axis]);
                    }
                }
                CellInstance {
                    cell,
                    state,
                    min,
                    max,
                    color: cell_color(cell, dims),
                }
            })
            .collect();

        self.pending_frame = Some(Frame {
            clear_color,
            instances,
        });
        Ok(())
    }
}

/// Apply the update rule tile by tile. Each rayon task owns one band of tile
/// rows of `write` and walks the tiles inside it.
fn run_life_step(
    read: &[u32],
    write: &mut [u32],
    dims: Dimensions,
    tile: TileSize,
    workgroups: [u32; 3],
) {
    if workgroups.contains(&0) {
        return;
    }
    let width = dims.width as usize;
    let band_len = width * tile.y as usize;

    write
        .par_chunks_mut(band_len)
        .enumerate()
        .take(workgroups[1] as usize)
        .for_each(|(band, rows)| {
            let y0 = band as u64 * u64::from(tile.y);
            for tile_x in 0..u64::from(workgroups[0]) {
                let x0 = tile_x * u64::from(tile.x);
                for ly in 0..u64::from(tile.y) {
                    let y = y0 + ly;
                    if y >= u64::from(dims.height) {
                        break;
                    }
                    for lx in 0..u64::from(tile.x) {
                        let x = x0 + lx;
                        if x >= u64::from(dims.width) {
                            break;
                        }
                        rows[ly as usize * width + x as usize] =
                            evolve_cell(read, dims, x as u32, y as u32);
                    }
                }
            }
        });
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> Result<BufferHandle, DeviceError> {
        self.check_alive()?;
        if desc.size % 4 != 0 {
            return Err(DeviceError::Validation(format!(
                "{}: size {} is not a multiple of 4",
                desc.label, desc.size
            )));
        }
        let words = usize::try_from(desc.size / 4).map_err(|_| DeviceError::OutOfMemory)?;

        self.buffers.push(CpuBuffer {
            label: desc.label.to_string(),
            usage: desc.usage,
            words: vec![0; words],
        });
        Ok(BufferHandle(self.buffers.len() - 1))
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        self.check_alive()?;
        let target = self
            .buffers
            .get_mut(buffer.0)
            .ok_or(DeviceError::InvalidHandle {
                kind: "buffer",
                index: buffer.0,
            })?;
        if !target.usage.contains(BufferUsages::COPY_DST) {
            return Err(DeviceError::Validation(format!(
                "{} is not a copy destination",
                target.label
            )));
        }
        if offset % 4 != 0 || data.len() % 4 != 0 {
            return Err(DeviceError::Validation(format!(
                "{}: unaligned write of {} bytes at {}",
                target.label,
                data.len(),
                offset
            )));
        }

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut target.words);
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| {
                DeviceError::Validation(format!("{}: write out of bounds", target.label))
            })?;
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError> {
        self.check_alive()?;
        let ComputeKernel::LifeStep { tile } = desc.kernel;
        if tile.x == 0 || tile.y == 0 {
            return Err(DeviceError::Validation(format!(
                "{}: empty tile",
                desc.label
            )));
        }
        self.pipelines.push(CpuPipeline::Compute(desc.kernel));
        Ok(PipelineHandle(self.pipelines.len() - 1))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<PipelineHandle, DeviceError> {
        self.check_alive()?;
        self.pipelines.push(CpuPipeline::Render(desc.kernel));
        Ok(PipelineHandle(self.pipelines.len() - 1))
    }

    fn create_bind_group(
        &mut self,
        desc: &BindGroupDescriptor,
    ) -> Result<BindGroupHandle, DeviceError> {
        self.check_alive()?;
        validate_cell_bindings(desc.entries)?;

        let mut slots = [0usize; 3];
        for entry in desc.entries {
            let buffer = self.buffer(entry.buffer)?;
            let required = match entry.binding {
                GRID_UNIFORM_SLOT => BufferUsages::UNIFORM,
                CELL_STATE_IN_SLOT | CELL_STATE_OUT_SLOT => BufferUsages::STORAGE,
                _ => BufferUsages::empty(),
            };
            if !buffer.usage.contains(required) {
                return Err(DeviceError::Validation(format!(
                    "{}: {} cannot be bound at slot {}",
                    desc.label, buffer.label, entry.binding
                )));
            }
            slots[entry.binding as usize] = entry.buffer.0;
        }

        self.bind_groups.push(CpuBindGroup {
            grid: slots[GRID_UNIFORM_SLOT as usize],
            cells_in: slots[CELL_STATE_IN_SLOT as usize],
            cells_out: slots[CELL_STATE_OUT_SLOT as usize],
        });
        Ok(BindGroupHandle(self.bind_groups.len() - 1))
    }

    fn submit(&mut self, commands: CommandList) -> Result<(), DeviceError> {
        self.check_alive()?;
        for command in commands.commands() {
            match command {
                Command::Dispatch {
                    pipeline,
                    bind_group,
                    workgroups,
                } => self.dispatch(*pipeline, *bind_group, *workgroups)?,
                Command::DrawInstanced {
                    pipeline,
                    bind_group,
                    vertex_buffer,
                    vertices,
                    instances,
                    clear_color,
                } => self.draw(
                    *pipeline,
                    *bind_group,
                    *vertex_buffer,
                    vertices.clone(),
                    instances.clone(),
                    *clear_color,
                )?,
            }
        }
        self.submissions += 1;
        log::trace!("Executed '{}' on the host", commands.label());
        Ok(())
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        self.check_alive()?;
        let frame = self
            .pending_frame
            .take()
            .ok_or_else(|| DeviceError::Validation("no frame has been drawn".to_string()))?;
        self.last_frame = Some(frame);
        self.frames_presented += 1;
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle) -> Result<Vec<u8>, DeviceError> {
        self.check_alive()?;
        let source = self.buffer(buffer)?;
        if !source.usage.contains(BufferUsages::COPY_SRC) {
            return Err(DeviceError::Validation(format!(
                "{} is not a copy source",
                source.label
            )));
        }
        Ok(bytemuck::cast_slice(&source.words).to_vec())
    }

    fn wait_idle(&mut self) -> Result<(), DeviceError> {
        self.check_alive()?;
        self.idle_waits += 1;
        Ok(())
    }

    fn preserves_submission_order(&self) -> bool {
        !self.unordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::rule::step_reference;
    use crate::simulation::GridState;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_cells(dims: Dimensions, seed: u64) -> Vec<u32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..dims.cell_count())
            .map(|_| u32::from(rng.random_bool(0.35)))
            .collect()
    }

    #[test]
    fn test_tiled_step_matches_reference_for_any_partition() {
        let dims = Dimensions::new(37, 23).unwrap();
        let read = random_cells(dims, 3);
        let mut expected = vec![0u32; dims.cell_count()];
        step_reference(&read, &mut expected, dims);

        for tile in [
            TileSize::square(1),
            TileSize::square(16),
            TileSize::new(5, 3),
            TileSize::new(64, 64),
            TileSize::new(37, 1),
        ] {
            let mut write = vec![9u32; dims.cell_count()];
            run_life_step(&read, &mut write, dims, tile, tile.tiles_for(dims));
            assert_eq!(write, expected, "tile {tile:?}");
        }
    }

    #[test]
    fn test_write_rejects_out_of_bounds() {
        let mut device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: "small",
                size: 8,
                usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            })
            .unwrap();
        assert!(device.write_buffer(buffer, 4, &[0u8; 8]).is_err());
        assert!(device.write_buffer(buffer, 0, &[0u8; 3]).is_err());
        assert!(device.write_buffer(buffer, 4, &[1u8; 4]).is_ok());
    }

    #[test]
    fn test_read_requires_copy_src() {
        let mut device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: "vertices",
                size: 16,
                usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            })
            .unwrap();
        assert!(matches!(
            device.read_buffer(buffer),
            Err(DeviceError::Validation(_))
        ));
    }

    #[test]
    fn test_lost_device_fails_everything() {
        let mut device = HeadlessDevice::new();
        let grid = GridState::new(&mut device, Dimensions::new(4, 4).unwrap()).unwrap();
        device.lose("unplugged");

        assert!(matches!(
            device.submit(CommandList::new("after loss")),
            Err(DeviceError::Lost(_))
        ));
        assert!(matches!(
            device.read_buffer(grid.active_buffer(0)),
            Err(DeviceError::Lost(_))
        ));
        assert!(device.present().is_err());
    }

    #[test]
    fn test_present_without_draw_fails() {
        let mut device = HeadlessDevice::new();
        assert!(device.present().is_err());
        assert_eq!(device.frames_presented(), 0);
    }

    #[test]
    fn test_random_grid_matches_reference_on_thread_pool() {
        let dims = Dimensions::new(64, 48).unwrap();
        let read = random_cells(dims, 11);
        let mut expected = vec![0u32; dims.cell_count()];
        step_reference(&read, &mut expected, dims);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get().max(2))
            .build()
            .unwrap();
        let tile = TileSize::square(16);
        let mut write = vec![0u32; dims.cell_count()];
        pool.install(|| run_life_step(&read, &mut write, dims, tile, tile.tiles_for(dims)));
        assert_eq!(write, expected);
    }
}
