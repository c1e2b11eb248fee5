//! Surface management for windowed rendering.
//!
//! The surface itself is created by [`GpuContextBuilder::build_windowed`]
//! because queue selection needs it; this module wraps it together with the
//! surface and swapchain extension loaders.
//!
//! [`GpuContextBuilder::build_windowed`]: crate::GpuContextBuilder::build_windowed

use crate::context::{GpuContext, QueueFamilyIndices};
use crate::error::Result;
use crate::swapchain::{calculate_extent, select_present_mode, select_surface_format, Swapchain};
use ash::vk;

/// Surface context for windowed rendering.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    pub swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    /// Query surface capabilities.
    pub fn capabilities(&self, gpu: &GpuContext) -> Result<SurfaceCapabilities> {
        // SAFETY: surface and physical device belong to the same instance
        unsafe {
            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(gpu.physical_device(), self.surface)?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(gpu.physical_device(), self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities: caps,
                formats,
                present_modes,
            })
        }
    }

    /// Create a swapchain for this surface.
    pub fn create_swapchain(&self, gpu: &GpuContext, width: u32, height: u32) -> Result<Swapchain> {
        let caps = self.capabilities(gpu)?;

        let surface_format = select_surface_format(&caps.formats)?;
        let present_mode = select_present_mode(&caps.present_modes)?;
        let extent = calculate_extent(&caps.capabilities, width, height);

        let families = QueueFamilyIndices {
            graphics: gpu.graphics_queue_family(),
            present: gpu.present_queue_family(),
        };

        // SAFETY: the surface was created for this context's instance
        unsafe {
            Swapchain::new(
                gpu.device(),
                &self.swapchain_loader,
                self.surface,
                &caps.capabilities,
                surface_format,
                present_mode,
                extent,
                families,
            )
        }
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use and every swapchain built on it must
    /// already be destroyed.
    pub unsafe fn destroy(&self) {
        // SAFETY: caller contract
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

/// Surface capabilities query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}
