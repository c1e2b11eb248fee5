//! Test harness for the Lumen renderer.
//!
//! Provides a GPU context without a surface plus helpers for comparing
//! readbacks, so the upload paths can be checked end to end.

pub mod harness;

#[cfg(test)]
mod roundtrip;

pub use harness::{mean_channel_difference, save_readback, HeadlessDevice, TEST_FRAME_COUNT};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("GPU error: {0}")]
    Gpu(#[from] lumen_gpu::GpuError),
    #[error("Image comparison failed: {0}")]
    ImageComparison(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, TestError>;
