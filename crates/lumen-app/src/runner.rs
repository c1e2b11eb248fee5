//! Application runner and event loop.

use std::sync::Arc;

use lumen_gpu::{GpuContextBuilder, GraphicsDevice, Renderer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{CursorGrabMode, Fullscreen, Window, WindowId};

use crate::app::RenderApp;
use crate::clock::FrameClock;
use crate::config::AppConfig;
use crate::context::AppContext;

/// Run a `RenderApp` with the given configuration.
///
/// Initializes logging, creates the window and graphics device, and runs
/// the event loop until the window closes.
pub fn run_app<A: RenderApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        init_error: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.init_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: RenderApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    init_error: Option<anyhow::Error>,
}

/// Internal application state.
///
/// Teardown happens in [`AppState::shutdown`]; `ctx` drops last and takes
/// the device with it.
struct AppState<A: RenderApp> {
    app: A,
    renderer: Renderer,
    clock: FrameClock,
    ctx: AppContext,
    min_fps: f32,
    max_fps: f32,
}

impl<A: RenderApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.init_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        let handled = state.app.on_event(&mut state.ctx, &event);
        if state.ctx.exit_requested() {
            self.close(event_loop);
            return;
        }
        if handled {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.close(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = state.render_frame() {
                    error!("Render error: {e:#}");
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, device_id: DeviceId, event: DeviceEvent) {
        if let Some(state) = &mut self.state {
            state.app.on_device_event(device_id, &event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            state.shutdown();
        }
    }
}

impl<A: RenderApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        // Pipelines bake the viewport in, so the window never resizes.
        let mut window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(false);
        if self.config.fullscreen {
            window_attrs = window_attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        if self.config.mouse_capture {
            capture_cursor(&window);
        }

        let builder = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation);
        let size = window.inner_size();
        let device = GraphicsDevice::new(builder, window.as_ref(), size.width, size.height)?;

        let mut ctx = AppContext::new(window, device);
        let (app, renderer) = start_app(
            &mut ctx,
            A::init,
            |ctx| Ok(Renderer::new(&ctx.device)?),
            A::cleanup,
        )?;

        Ok(AppState {
            app,
            renderer,
            clock: FrameClock::new(),
            ctx,
            min_fps: f32::MAX,
            max_fps: 0.0,
        })
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(state) = self.state.take() {
            state.shutdown();
        }
        event_loop.exit();
    }
}

/// Initialize the app, then the renderer.
///
/// A failed init leaves nothing to tear down but the context. If the
/// renderer cannot be built the app releases its resources first, so the
/// context drops with no objects of the app still alive.
fn start_app<C, A, R>(
    ctx: &mut C,
    init: impl FnOnce(&mut C) -> anyhow::Result<A>,
    build_renderer: impl FnOnce(&C) -> anyhow::Result<R>,
    cleanup: impl FnOnce(&mut A, &mut C),
) -> anyhow::Result<(A, R)> {
    let mut app = init(ctx)?;
    match build_renderer(ctx) {
        Ok(renderer) => Ok((app, renderer)),
        Err(e) => {
            cleanup(&mut app, ctx);
            Err(e)
        }
    }
}

fn capture_cursor(window: &Window) {
    let grabbed = window
        .set_cursor_grab(CursorGrabMode::Locked)
        .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
    if let Err(e) = grabbed {
        warn!("Mouse capture unavailable: {e}");
    }
    window.set_cursor_visible(false);
}

impl<A: RenderApp> AppState<A> {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self) -> anyhow::Result<()> {
        // Minimized: nothing to present to.
        if !self.ctx.is_drawable() {
            return Ok(());
        }

        self.clock.tick();
        if self.clock.frame_number() > 1 {
            let fps = self.clock.fps();
            if fps > 0.0 {
                self.min_fps = self.min_fps.min(fps);
                self.max_fps = self.max_fps.max(fps);
            }
        }

        self.app.update(&self.ctx, &self.clock);

        let Self {
            app, renderer, ctx, ..
        } = self;
        let ctx: &AppContext = ctx;
        renderer.render_frame(&ctx.device, |frame| app.draw(ctx, frame))
    }

    fn shutdown(mut self) {
        if self.renderer.frames_rendered() > 0 {
            info!("Frame statistics:");
            if self.max_fps > 0.0 {
                info!("  Min FPS: {:.1}", self.min_fps);
                info!("  Max FPS: {:.1}", self.max_fps);
            }
            info!(
                "  Avg FPS: {:.1}",
                self.renderer.frames_rendered() as f32 / self.clock.elapsed().max(f32::EPSILON)
            );
            info!("  Total frames: {}", self.renderer.frames_rendered());
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.device.wait_idle() {
            error!("Failed to wait idle: {e}");
        }

        // Application resources first, then frame sync objects; the device
        // goes when `ctx` drops.
        self.app.cleanup(&mut self.ctx);
        // SAFETY: the device is idle and no submitted work references the renderer
        unsafe { self.renderer.destroy(&self.ctx.device.gpu) };

        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Vec<&'static str>;

    #[test]
    fn failed_init_builds_no_renderer() {
        let mut log = Log::new();
        let result = start_app(
            &mut log,
            |log: &mut Log| -> anyhow::Result<()> {
                log.push("init");
                anyhow::bail!("missing assets")
            },
            |log: &Log| -> anyhow::Result<usize> { Ok(log.len()) },
            |_: &mut (), log: &mut Log| log.push("cleanup"),
        );
        assert!(result.is_err());
        assert_eq!(log, vec!["init"]);
    }

    #[test]
    fn failed_renderer_cleans_up_app() {
        let mut log = Log::new();
        let result = start_app(
            &mut log,
            |log: &mut Log| -> anyhow::Result<()> {
                log.push("init");
                Ok(())
            },
            |_: &Log| -> anyhow::Result<usize> { anyhow::bail!("no command pool") },
            |_: &mut (), log: &mut Log| log.push("cleanup"),
        );
        assert!(result.is_err());
        assert_eq!(log, vec!["init", "cleanup"]);
    }

    #[test]
    fn successful_start_keeps_both() {
        let mut log = Log::new();
        let (app, renderer) = start_app(
            &mut log,
            |_: &mut Log| -> anyhow::Result<i32> { Ok(1) },
            |_: &Log| -> anyhow::Result<&'static str> { Ok("renderer") },
            |_: &mut i32, log: &mut Log| log.push("cleanup"),
        )
        .unwrap();
        assert_eq!((app, renderer), (1, "renderer"));
        assert!(log.is_empty());
    }
}
