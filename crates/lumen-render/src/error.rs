//! Render-side error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while preparing scene data for upload.
#[derive(Error, Debug)]
pub enum RenderError {
    /// An image file could not be opened or decoded.
    #[error("Failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A per-vertex attribute does not have one entry per position.
    #[error("Mesh {mesh}: {attribute} has {actual} entries, expected {expected}")]
    AttributeCount {
        mesh: String,
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A face references a vertex that does not exist.
    #[error("Mesh {mesh}: index {index} out of bounds for {vertex_count} vertices")]
    IndexOutOfBounds {
        mesh: String,
        index: u32,
        vertex_count: usize,
    },

    /// GPU upload failed.
    #[error(transparent)]
    Gpu(#[from] lumen_gpu::GpuError),
}
