//! Application framework for the Lumen renderer.
//!
//! This crate provides a trait-based application framework that handles:
//! - Window creation (fixed size, optional fullscreen and mouse capture)
//! - Graphics device and frame scheduler setup
//! - Frame timing through an explicit [`FrameClock`]
//! - Skipping frames while the window has no drawable area
//! - Ordered shutdown
//!
//! # Example
//!
//! ```no_run
//! use lumen_app::{run_app, AppConfig, AppContext, FrameClock, FrameRecorder, RenderApp};
//!
//! struct MyApp;
//!
//! impl RenderApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, clock: &FrameClock) {}
//!
//!     fn draw(&mut self, ctx: &AppContext, frame: &mut FrameRecorder<'_>) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::new("Example"))
//! }
//! ```

mod app;
mod clock;
mod config;
mod context;
mod runner;

pub use app::RenderApp;
pub use clock::FrameClock;
pub use config::AppConfig;
pub use context::AppContext;
pub use runner::run_app;

// Re-export commonly used types for convenience
pub use lumen_gpu::{FrameRecorder, GraphicsDevice};
pub use winit::event::{DeviceEvent, DeviceId, WindowEvent};
