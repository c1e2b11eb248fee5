//! Application context.

use std::sync::Arc;

use lumen_gpu::{vk, GraphicsDevice};
use winit::window::Window;

/// Window and graphics device shared with every [`RenderApp`](crate::RenderApp) method.
pub struct AppContext {
    /// Graphics device. Declared before `window` so the surface is torn
    /// down while the window still exists.
    pub device: GraphicsDevice,
    /// The window handle.
    pub window: Arc<Window>,
    exit_requested: bool,
}

impl AppContext {
    pub(crate) const fn new(window: Arc<Window>, device: GraphicsDevice) -> Self {
        Self {
            device,
            window,
            exit_requested: false,
        }
    }

    /// Get the swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.device.extent()
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        extent.width as f32 / extent.height.max(1) as f32
    }

    /// Number of frames in flight.
    pub fn frame_count(&self) -> usize {
        self.device.frame_count()
    }

    /// Ask the run loop to close the window after the current event.
    pub fn exit(&mut self) {
        self.exit_requested = true;
    }

    pub const fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Whether the window currently has a drawable area.
    pub fn is_drawable(&self) -> bool {
        let size = self.window.inner_size();
        size.width > 0 && size.height > 0
    }
}
