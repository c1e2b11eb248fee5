//! Scene-side data for the Lumen renderer.
//!
//! This crate provides:
//! - Vertex formats and the billboard quad
//! - Fly camera and camera/model uniform blocks
//! - Point lights and the illumination uniform block
//! - Mesh conversion from loader output
//! - Image decoding and per-mesh texture selection

pub mod camera;
pub mod error;
pub mod lights;
pub mod mesh;
pub mod texture;
pub mod vertex;

pub use camera::{Camera, CameraConfig, CameraSpace, ModelSpace, Movement};
pub use error::RenderError;
pub use lights::{Illumination, SpotLight, MAX_LIGHTS};
pub use mesh::{MeshData, MeshSource};
pub use texture::{select_texture, DecodedImage, TextureChoice};
pub use vertex::{BillboardVertex, Vertex, BILLBOARD_INDICES, BILLBOARD_VERTICES};
