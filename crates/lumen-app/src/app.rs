//! `RenderApp` trait definition.

use crate::clock::FrameClock;
use crate::context::AppContext;
use lumen_gpu::FrameRecorder;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};

/// Trait for Lumen applications.
///
/// The framework owns the window, the graphics device and the frame
/// scheduler; an application owns its pipelines, geometry and shader
/// resources and records draws into the frame it is handed.
pub trait RenderApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window and graphics device exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every rendered frame before `draw()`, after the clock ticked.
    fn update(&mut self, ctx: &AppContext, clock: &FrameClock);

    /// Record draw commands.
    ///
    /// The render pass is already begun on `frame`; per-frame resources
    /// should be written for `frame.frame_index()`.
    fn draw(&mut self, ctx: &AppContext, frame: &mut FrameRecorder<'_>) -> anyhow::Result<()>;

    /// Handle window events.
    ///
    /// Return `true` if the event was handled and should not be processed
    /// further. Call [`AppContext::exit`] to close the application.
    ///
    /// Default implementation does nothing and returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, ctx: &mut AppContext, event: &WindowEvent) -> bool {
        false
    }

    /// Handle device events (raw input).
    ///
    /// Raw mouse motion arrives here, which is what a captured cursor
    /// produces.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_device_event(&mut self, device_id: DeviceId, event: &DeviceEvent) {}

    /// Release GPU resources before shutdown.
    ///
    /// The device is idle when this is called.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
