//! Vulkan layer of the Lumen renderer.
//!
//! This crate provides:
//! - Instance, device, queue and swapchain bring-up ([`GraphicsDevice`])
//! - Memory allocation via gpu-allocator
//! - Blocking staging uploads, layout transitions and mip generation
//! - Descriptor layouts and per-frame descriptor sets
//! - Uniform and sampled resources, geometry buffers and graphics pipelines
//! - The frames-in-flight scheduler ([`Renderer`])

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod geometry;
pub mod instance;
pub mod layout;
pub mod memory;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod targets;
pub mod transfer;

pub use ash::vk;
pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder, QueueFamilyIndices};
pub use descriptors::{DescriptorBinding, DescriptorLayout, DescriptorLayoutBuilder, DescriptorSet};
pub use device::GraphicsDevice;
pub use error::{GpuError, Result};
pub use geometry::GeometryBuffer;
pub use layout::{mip_extents, mip_level_count, transition_masks, TransitionMasks};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig, ShaderModule, ShaderStage};
pub use renderer::{FrameRecorder, Renderer};
pub use resources::{PerFrame, SampledResource, UniformResource};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::FrameRing;
pub use targets::RenderTargets;
pub use transfer::{TransferBuffer, TransferImage, TEXTURE_FORMAT};
