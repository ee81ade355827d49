//! # Quad Geometry
//!
//! The shared unit quad every cell instance is drawn with.

use crate::error::{LifeError, Result};
use crate::gfx::device::{BufferDescriptor, BufferHandle, BufferUsages, GraphicsDevice};

/// A 2D vertex of the cell quad.
///
/// # Memory Layout
///
/// The `#[repr(C)]` attribute ensures the struct has a C-compatible memory
/// layout, which is required for GPU buffer operations.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    /// Position relative to the cell center, in cell half-extents.
    pub position: [f32; 2],
}

impl QuadVertex {
    /// Returns the vertex buffer layout for wgpu rendering.
    ///
    /// - Attribute 0: Position (Float32x2) at shader location 0
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

/// Two triangles covering `[-1, 1]^2`, counter-clockwise.
const UNIT_QUAD: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
];

/// Unit quad scaled to `scale` of a full cell, uploaded once and shared
/// read-only by every instance.
pub struct QuadGeometry {
    vertex_buffer: BufferHandle,
    vertex_count: u32,
}

impl QuadGeometry {
    pub fn vertices(scale: f32) -> [QuadVertex; 6] {
        UNIT_QUAD.map(|[x, y]| QuadVertex {
            position: [x * scale, y * scale],
        })
    }

    pub fn new<D>(device: &mut D, scale: f32) -> Result<Self>
    where
        D: GraphicsDevice + ?Sized,
    {
        let vertices = Self::vertices(scale);
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);

        let vertex_buffer = device
            .create_buffer(&BufferDescriptor {
                label: "Cell vertices",
                size: bytes.len() as u64,
                usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            })
            .map_err(LifeError::Initialization)?;
        device
            .write_buffer(vertex_buffer, 0, bytes)
            .map_err(LifeError::Initialization)?;

        Ok(Self {
            vertex_buffer,
            vertex_count: vertices.len() as u32,
        })
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_is_two_triangles() {
        let vertices = QuadGeometry::vertices(1.0);
        assert_eq!(vertices.len(), 6);
        assert_eq!(std::mem::size_of::<QuadVertex>(), 8);
        let corners = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
        for corner in corners {
            assert!(vertices.iter().any(|v| v.position == corner));
        }
    }

    #[test]
    fn test_quad_scale() {
        let vertices = QuadGeometry::vertices(0.8);
        assert!(vertices
            .iter()
            .all(|v| v.position.iter().all(|c| (c.abs() - 0.8).abs() < 1e-6)));
    }
}
