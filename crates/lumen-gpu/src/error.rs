//! GPU error types.

use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or initialized.
    #[error("Failed to load Vulkan: {0}")]
    Loader(String),

    /// No physical device was enumerated, or it lacks a required feature.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// A required queue family does not exist on the selected device.
    #[error("No queue family supports {0}")]
    QueueFamilyNotFound(&'static str),

    /// The surface does not offer the required format/color space pair.
    #[error("Surface does not support format {format:?} with color space {color_space:?}")]
    SurfaceFormatUnsupported {
        format: vk::Format,
        color_space: vk::ColorSpaceKHR,
    },

    /// The surface does not offer the required present mode.
    #[error("Surface does not support present mode {0:?}")]
    PresentModeUnsupported(vk::PresentModeKHR),

    /// Layout transition outside the supported set.
    #[error("Unsupported image layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// Format lacks the optimal-tiling feature an operation needs.
    #[error("Format {format:?} does not support {feature:?}")]
    FormatFeatureUnsupported {
        format: vk::Format,
        feature: vk::FormatFeatureFlags,
    },

    /// None of the candidate depth formats is usable.
    #[error("No supported depth attachment format")]
    NoDepthFormat,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// A SPIR-V binary could not be read.
    #[error("Failed to load shader {path}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Descriptor set allocation failed (pool exhausted or fragmented).
    #[error("Descriptor set allocation failed: {0}")]
    DescriptorAllocation(vk::Result),

    /// A frame-in-flight index was outside `[0, frame_count)`.
    #[error("Frame index {index} out of range (frame count {frame_count})")]
    FrameIndexOutOfRange { index: usize, frame_count: usize },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
