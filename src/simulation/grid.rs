//! Double-buffered grid state
//!
//! [`GridState`] owns the two cell-state buffers and the binding sets that
//! wire them into the kernels. Which buffer is read and which is written is
//! never stored: it is derived from the generation's parity every time it is
//! asked for. Generation `g` reads buffer `g % 2` and writes the other one.

use rand::Rng;

use crate::error::{LifeError, Result};
use crate::gfx::device::{
    BindGroupDescriptor, BindGroupEntry, BindGroupHandle, BufferDescriptor, BufferHandle,
    BufferUsages, GraphicsDevice, GridUniform, CELL_STATE_IN_SLOT, CELL_STATE_OUT_SLOT,
    GRID_UNIFORM_SLOT,
};

const CELL_BYTES: u64 = std::mem::size_of::<u32>() as u64;

/// Immutable grid extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let invalid = LifeError::InvalidDimensions { width, height };
        if width == 0 || height == 0 {
            return Err(invalid);
        }
        let cells = u64::from(width) * u64::from(height);
        let bytes = cells.checked_mul(CELL_BYTES).ok_or(invalid)?;
        if usize::try_from(bytes).is_err() {
            return Err(LifeError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major linear index of `(x, y)`.
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        x as usize + y as usize * self.width as usize
    }

    /// Inverse of [`index`](Self::index).
    #[inline]
    pub fn coords(&self, index: usize) -> (u32, u32) {
        let width = self.width as usize;
        ((index % width) as u32, (index / width) as u32)
    }

    /// Size of one cell-state buffer in bytes.
    #[inline]
    pub fn state_bytes(&self) -> u64 {
        self.cell_count() as u64 * CELL_BYTES
    }

    pub fn uniform(&self) -> GridUniform {
        GridUniform {
            width: self.width,
            height: self.height,
        }
    }
}

/// The two cell-state buffers and their binding sets. The grid uniform is
/// only reachable through the bindings.
pub struct GridState {
    dims: Dimensions,
    buffers: [BufferHandle; 2],
    /// `bindings[i]` reads `buffers[i]` and writes `buffers[1 - i]`.
    bindings: [BindGroupHandle; 2],
}

impl GridState {
    /// Allocate both cell buffers and wire them into binding sets.
    ///
    /// Buffer A is left for [`seed`](Self::seed); buffer B starts zeroed.
    pub fn new<D>(device: &mut D, dims: Dimensions) -> Result<Self>
    where
        D: GraphicsDevice + ?Sized,
    {
        let uniform = device
            .create_buffer(&BufferDescriptor {
                label: "Grid Uniforms",
                size: std::mem::size_of::<GridUniform>() as u64,
                usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            })
            .map_err(LifeError::Initialization)?;
        device
            .write_buffer(uniform, 0, bytemuck::bytes_of(&dims.uniform()))
            .map_err(LifeError::Initialization)?;

        let state_usage = BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC;
        let mut create_state = |label: &str| {
            device
                .create_buffer(&BufferDescriptor {
                    label,
                    size: dims.state_bytes(),
                    usage: state_usage,
                })
                .map_err(LifeError::Initialization)
        };
        let buffers = [create_state("Cell State A")?, create_state("Cell State B")?];

        let mut create_bindings = |label: &str, read: BufferHandle, write: BufferHandle| {
            device
                .create_bind_group(&BindGroupDescriptor {
                    label,
                    entries: &[
                        BindGroupEntry {
                            binding: GRID_UNIFORM_SLOT,
                            buffer: uniform,
                        },
                        BindGroupEntry {
                            binding: CELL_STATE_IN_SLOT,
                            buffer: read,
                        },
                        BindGroupEntry {
                            binding: CELL_STATE_OUT_SLOT,
                            buffer: write,
                        },
                    ],
                })
                .map_err(LifeError::Initialization)
        };
        let bindings = [
            create_bindings("Cell Bind Group A->B", buffers[0], buffers[1])?,
            create_bindings("Cell Bind Group B->A", buffers[1], buffers[0])?,
        ];

        log::debug!(
            "Allocated {}x{} grid ({} bytes per buffer)",
            dims.width,
            dims.height,
            dims.state_bytes()
        );

        Ok(Self {
            dims,
            buffers,
            bindings,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.dims.width, self.dims.height)
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Index (0 = A, 1 = B) of the buffer holding `generation`.
    #[inline]
    pub const fn active_index(generation: u64) -> usize {
        (generation % 2) as usize
    }

    /// Buffer holding the fully written state of `generation`.
    #[inline]
    pub fn active_buffer(&self, generation: u64) -> BufferHandle {
        self.buffers[Self::active_index(generation)]
    }

    /// Buffer that generation `generation + 1` is written into.
    #[inline]
    pub fn inactive_buffer(&self, generation: u64) -> BufferHandle {
        self.buffers[1 - Self::active_index(generation)]
    }

    /// Binding set that reads `active_buffer(generation)` in slot 1 and
    /// writes `inactive_buffer(generation)` in slot 2.
    #[inline]
    pub fn bindings(&self, generation: u64) -> BindGroupHandle {
        self.bindings[Self::active_index(generation)]
    }

    /// Fill buffer A with independent Bernoulli(`live_probability`) draws.
    pub fn seed<D, R>(&self, device: &mut D, rng: &mut R, live_probability: f64) -> Result<()>
    where
        D: GraphicsDevice + ?Sized,
        R: Rng,
    {
        if !(0.0..=1.0).contains(&live_probability) {
            return Err(LifeError::InvalidConfig(format!(
                "live probability must be within [0, 1], got {live_probability}"
            )));
        }

        let cells: Vec<u32> = (0..self.dims.cell_count())
            .map(|_| u32::from(rng.random_bool(live_probability)))
            .collect();
        self.seed_cells(device, &cells)
    }

    /// Upload an explicit generation 0 into buffer A. Every cell must be 0 or 1.
    pub fn seed_cells<D>(&self, device: &mut D, cells: &[u32]) -> Result<()>
    where
        D: GraphicsDevice + ?Sized,
    {
        if cells.len() != self.dims.cell_count() {
            return Err(LifeError::InvalidConfig(format!(
                "seed has {} cells, grid has {}",
                cells.len(),
                self.dims.cell_count()
            )));
        }
        if let Some(index) = cells.iter().position(|&cell| cell > 1) {
            let (x, y) = self.dims.coords(index);
            return Err(LifeError::InvalidConfig(format!(
                "cell ({x}, {y}) has state {}, expected 0 or 1",
                cells[index]
            )));
        }

        device
            .write_buffer(self.active_buffer(0), 0, bytemuck::cast_slice(cells))
            .map_err(LifeError::Initialization)?;

        log::info!(
            "Seeded generation 0 with {} live cells",
            cells.iter().filter(|&&cell| cell != 0).count()
        );
        Ok(())
    }

    /// Read back the cell states of `generation`.
    pub fn read_generation<D>(&self, device: &mut D, generation: u64) -> Result<Vec<u32>>
    where
        D: GraphicsDevice + ?Sized,
    {
        let bytes = device
            .read_buffer(self.active_buffer(generation))
            .map_err(LifeError::DeviceLost)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }
}
