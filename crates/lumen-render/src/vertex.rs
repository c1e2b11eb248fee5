//! Vertex formats and their Vulkan input descriptions.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use lumen_gpu::GraphicsPipelineConfig;
use std::mem::{offset_of, size_of};

/// Full-attribute mesh vertex.
///
/// Locations: 0 position, 1 normal, 2 color, 3 uv.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0; 3],
            color: [1.0; 4],
            uv: [0.0; 2],
        }
    }
}

impl Vertex {
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(2, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Self, color)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
        ]
    }

    /// Pipeline config for opaque meshes.
    pub fn pipeline_config() -> GraphicsPipelineConfig {
        GraphicsPipelineConfig::with_vertex_input(
            Self::binding_descriptions(),
            Self::attribute_descriptions(),
        )
    }
}

/// Position-only vertex for camera-facing quads.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BillboardVertex {
    pub position: [f32; 2],
}

impl BillboardVertex {
    pub fn binding_descriptions() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![attribute(
            0,
            vk::Format::R32G32_SFLOAT,
            offset_of!(Self, position),
        )]
    }

    /// Pipeline config for billboards.
    pub fn pipeline_config() -> GraphicsPipelineConfig {
        GraphicsPipelineConfig::with_vertex_input(
            Self::binding_descriptions(),
            Self::attribute_descriptions(),
        )
    }
}

fn attribute(location: u32, format: vk::Format, offset: usize) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset: offset as u32,
    }
}

/// Unit quad in billboard space, counter-clockwise.
pub const BILLBOARD_VERTICES: [BillboardVertex; 4] = [
    BillboardVertex {
        position: [-1.0, 1.0],
    },
    BillboardVertex {
        position: [-1.0, -1.0],
    },
    BillboardVertex {
        position: [1.0, -1.0],
    },
    BillboardVertex {
        position: [1.0, 1.0],
    },
];

/// Two triangles covering [`BILLBOARD_VERTICES`].
pub const BILLBOARD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];
