//! Instanced Cell Rendering
//!
//! Draws the whole grid with a single instanced draw call: one copy of the
//! shared quad per cell, dead cells included. A cell's state scales its quad,
//! so dead cells collapse to nothing while the instance count stays fixed at
//! `width * height`.
//!
//! The placement functions here are the host-side definition of the
//! `cell_quads.wgsl` vertex stage.

use cgmath::{ElementWise, Vector2};

use crate::error::{LifeError, Result};
use crate::gfx::device::{
    Command, CommandList, GraphicsDevice, PipelineHandle, RenderKernel, RenderPipelineDescriptor,
};
use crate::gfx::quad::QuadGeometry;
use crate::simulation::{Dimensions, GridState};

/// Cell coordinates of instance `index`.
#[inline]
pub fn instance_cell(index: u32, dims: Dimensions) -> (u32, u32) {
    (index % dims.width, index / dims.width)
}

/// Normalized device position of one quad vertex of `cell`.
///
/// The quad is scaled by `state` (so dead cells are degenerate) and then
/// placed so that cell `(0, 0)` sits in the bottom-left corner of clip space.
pub fn instance_vertex(vertex: [f32; 2], cell: (u32, u32), state: u32, dims: Dimensions) -> [f32; 2] {
    let grid = Vector2::new(dims.width as f32, dims.height as f32);
    let cell = Vector2::new(cell.0 as f32, cell.1 as f32);
    let one = Vector2::new(1.0, 1.0);

    let local = Vector2::from(vertex) * state as f32;
    let position = (local + one).div_element_wise(grid) - one + cell.div_element_wise(grid) * 2.0;
    position.into()
}

/// Fragment color of `cell`: a gradient over normalized cell coordinates.
pub fn cell_color(cell: (u32, u32), dims: Dimensions) -> [f32; 4] {
    let c = Vector2::new(
        cell.0 as f32 / dims.width as f32,
        cell.1 as f32 / dims.height as f32,
    );
    [c.x, c.y, 1.0 - c.x, 1.0]
}

/// Issues the per-frame instanced draw of the grid.
pub struct RenderStage {
    pipeline: PipelineHandle,
    geometry: QuadGeometry,
    instance_count: u32,
    clear_color: [f64; 4],
}

impl RenderStage {
    pub fn new<D>(
        device: &mut D,
        dims: Dimensions,
        quad_scale: f32,
        clear_color: [f64; 4],
    ) -> Result<Self>
    where
        D: GraphicsDevice + ?Sized,
    {
        let instance_count =
            u32::try_from(dims.cell_count()).map_err(|_| LifeError::InvalidDimensions {
                width: dims.width,
                height: dims.height,
            })?;

        let geometry = QuadGeometry::new(device, quad_scale)?;
        let pipeline = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: "Cell pipeline",
                kernel: RenderKernel::CellQuads,
            })
            .map_err(LifeError::Initialization)?;

        Ok(Self {
            pipeline,
            geometry,
            instance_count,
            clear_color,
        })
    }

    /// Record the draw of `generation`, reading `grid.active_buffer(generation)`.
    pub fn record(&self, grid: &GridState, generation: u64, commands: &mut CommandList) {
        commands.push(Command::DrawInstanced {
            pipeline: self.pipeline,
            bind_group: grid.bindings(generation),
            vertex_buffer: self.geometry.vertex_buffer(),
            vertices: 0..self.geometry.vertex_count(),
            instances: 0..self.instance_count,
            clear_color: self.clear_color,
        });
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::HeadlessDevice;

    fn approx(a: [f32; 2], b: [f32; 2]) -> bool {
        (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-5
    }

    #[test]
    fn test_instance_cell_is_row_major() {
        let dims = Dimensions::new(4, 3).unwrap();
        assert_eq!(instance_cell(0, dims), (0, 0));
        assert_eq!(instance_cell(3, dims), (3, 0));
        assert_eq!(instance_cell(4, dims), (0, 1));
        assert_eq!(instance_cell(11, dims), (3, 2));
    }

    #[test]
    fn test_live_cell_covers_its_slot() {
        let dims = Dimensions::new(4, 2).unwrap();
        let bottom_left = instance_vertex([-1.0, -1.0], (0, 0), 1, dims);
        let top_right = instance_vertex([1.0, 1.0], (0, 0), 1, dims);
        assert!(approx(bottom_left, [-1.0, -1.0]));
        assert!(approx(top_right, [-0.5, 0.0]));

        let top_right = instance_vertex([1.0, 1.0], (3, 1), 1, dims);
        assert!(approx(top_right, [1.0, 1.0]));
    }

    #[test]
    fn test_dead_cell_collapses() {
        let dims = Dimensions::new(10, 10).unwrap();
        let a = instance_vertex([-0.8, -0.8], (5, 5), 0, dims);
        let b = instance_vertex([0.8, 0.8], (5, 5), 0, dims);
        assert!(approx(a, b));
    }

    #[test]
    fn test_colors_distinguish_cells() {
        let dims = Dimensions::new(8, 8).unwrap();
        assert_eq!(cell_color((0, 0), dims), [0.0, 0.0, 1.0, 1.0]);
        assert_ne!(cell_color((1, 0), dims), cell_color((0, 1), dims));
    }

    #[test]
    fn test_record_draws_every_cell() {
        let mut device = HeadlessDevice::new();
        let dims = Dimensions::new(12, 5).unwrap();
        let grid = GridState::new(&mut device, dims).unwrap();
        let stage = RenderStage::new(&mut device, dims, 0.8, [0.0, 0.0, 0.4, 1.0]).unwrap();

        let mut commands = CommandList::new("test");
        stage.record(&grid, 1, &mut commands);

        match &commands.commands()[0] {
            Command::DrawInstanced {
                bind_group,
                vertices,
                instances,
                ..
            } => {
                assert_eq!(*bind_group, grid.bindings(1));
                assert_eq!(*vertices, 0..6);
                assert_eq!(*instances, 0..60);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(stage.instance_count(), 60);
    }
}
