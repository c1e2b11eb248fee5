//! Immutable vertex and index buffers for one drawable mesh.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::transfer::TransferBuffer;
use ash::vk;
use bytemuck::Pod;
use std::marker::PhantomData;

/// Device-local vertex buffer plus a `u32` index buffer.
pub struct GeometryBuffer<V> {
    vertices: TransferBuffer,
    indices: TransferBuffer,
    index_count: u32,
    _vertex: PhantomData<V>,
}

impl<V: Pod> GeometryBuffer<V> {
    /// Upload `vertices` and `indices`.
    pub fn new(gpu: &GpuContext, vertices: &[V], indices: &[u32], name: &str) -> Result<Self> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(GpuError::InvalidState(format!("{name}: empty geometry")));
        }
        let index_count = u32::try_from(indices.len())
            .map_err(|_| GpuError::InvalidState(format!("{name}: too many indices")))?;

        let vertices = TransferBuffer::with_data(
            gpu,
            bytemuck::cast_slice(vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &format!("{name}_vertices"),
        )?;
        let indices = match TransferBuffer::with_data(
            gpu,
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
            &format!("{name}_indices"),
        ) {
            Ok(indices) => indices,
            Err(e) => {
                let mut vertices = vertices;
                vertices.destroy(gpu)?;
                return Err(e);
            }
        };

        Ok(Self {
            vertices,
            indices,
            index_count,
            _vertex: PhantomData,
        })
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertices.handle()
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.indices.handle()
    }

    pub const fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        self.vertices.destroy(gpu)?;
        self.indices.destroy(gpu)
    }
}
