//! Lumen demo viewer
//!
//! Renders a textured ground plane, a multi-part character and six colored
//! point lights orbiting the scene, each drawn as a billboard.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lumen-viewer
//! ```
//!
//! Run from a directory containing `assets/`:
//! - `assets/shaders/{model,billboard}.{vert,frag}.spv`
//! - `assets/models/pingmian.obj`, `assets/images/pingmian.png`
//! - `assets/models/xiaoluoli/` with the character OBJ and its textures
//!
//! Shader sources live in `apps/lumen-viewer/shaders/`; compile them with
//! `glslc <file> -o assets/shaders/<file>.spv`.
//!
//! ## Controls
//!
//! - Mouse: look around (cursor is captured)
//! - `W`/`S`: forward/back, `A`/`D`: strafe
//! - `Space`/`Left Shift`: up/down
//! - `Escape`: quit
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod assets;
mod controls;

use lumen_app::{run_app, AppConfig};

use crate::app::Viewer;

const WIDTH: u32 = 1600;
const HEIGHT: u32 = 900;

fn main() -> anyhow::Result<()> {
    run_app::<Viewer>(
        AppConfig::new("Lumen Viewer")
            .with_size(WIDTH, HEIGHT)
            .with_mouse_capture(true),
    )
}
