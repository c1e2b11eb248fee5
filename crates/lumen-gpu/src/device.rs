//! The windowed graphics device: context, surface, swapchain and render targets.

use crate::context::{GpuContext, GpuContextBuilder};
use crate::error::Result;
use crate::surface::SurfaceContext;
use crate::swapchain::Swapchain;
use crate::targets::RenderTargets;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Everything needed to render into a window.
///
/// Field order is teardown order: targets, swapchain and surface are released
/// in `Drop`, the GPU context last.
pub struct GraphicsDevice {
    pub targets: RenderTargets,
    pub swapchain: Swapchain,
    pub surface: SurfaceContext,
    pub gpu: GpuContext,
}

impl GraphicsDevice {
    /// Bring up the context for `window` and build a swapchain of
    /// `width` x `height` (clamped to what the surface allows).
    pub fn new<W>(builder: GpuContextBuilder, window: &W, width: u32, height: u32) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let (gpu, surface) = builder.build_windowed(window)?;
        let swapchain = surface.create_swapchain(&gpu, width, height)?;
        let targets = RenderTargets::new(&gpu, &swapchain)?;

        Ok(Self {
            targets,
            swapchain,
            surface,
            gpu,
        })
    }

    /// Number of frames in flight (one per swapchain image).
    pub fn frame_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// The render pass every pipeline targets.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.targets.render_pass
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        self.gpu.wait_idle()
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            tracing::error!("Device wait failed during teardown: {e}");
        }

        // SAFETY: the device is idle and nothing outlives this struct
        unsafe {
            if let Err(e) = self.targets.destroy(&self.gpu) {
                tracing::error!("Failed to release render targets: {e}");
            }
            self.swapchain
                .destroy(self.gpu.device(), &self.surface.swapchain_loader);
            self.surface.destroy();
        }
    }
}
