//! Headless device and readback comparison helpers.

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgba};
use lumen_gpu::{GpuContext, GpuContextBuilder};

use crate::{Result, TestError};

/// Frames in flight used by tests that exercise per-frame resources.
pub const TEST_FRAME_COUNT: usize = 3;

/// Output directory for readbacks that failed a comparison.
const OUTPUT_DIR: &str = "target/test_output";

/// GPU context with validation and no presentation surface.
pub struct HeadlessDevice {
    gpu: GpuContext,
}

impl HeadlessDevice {
    pub fn new() -> Result<Self> {
        let gpu = GpuContextBuilder::new()
            .app_name("lumen-test")
            .validation(true)
            .build()?;
        tracing::info!("Headless device: {}", gpu.capabilities().summary());
        Ok(Self { gpu })
    }

    pub const fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Fail with a saved copy of `actual` when it differs from `expected`
    /// by more than `threshold` (mean absolute channel difference, 0..1).
    pub fn expect_pixels(
        &self,
        name: &str,
        width: u32,
        height: u32,
        actual: &[u8],
        expected: &[u8],
        threshold: f64,
    ) -> Result<()> {
        let diff = mean_channel_difference(actual, expected)?;
        if diff > threshold {
            let path = save_readback(Path::new(OUTPUT_DIR), name, width, height, actual)?;
            return Err(TestError::ImageComparison(format!(
                "Image difference {diff:.4} exceeds threshold {threshold:.4} (see {})",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Mean absolute difference over every byte, normalized to 0..1.
pub fn mean_channel_difference(a: &[u8], b: &[u8]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(TestError::ImageComparison(format!(
            "Size mismatch: {} vs {} bytes",
            a.len(),
            b.len()
        )));
    }
    if a.is_empty() {
        return Ok(0.0);
    }

    let total: u64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();
    Ok(total as f64 / (a.len() as f64 * 255.0))
}

/// Write RGBA8 `pixels` to `<dir>/<name>.png`.
pub fn save_readback(dir: &Path, name: &str, width: u32, height: u32, pixels: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let image: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_raw(width, height, pixels.to_vec())
        .ok_or_else(|| {
            TestError::ImageComparison(format!(
                "{} bytes do not form a {width}x{height} RGBA image",
                pixels.len()
            ))
        })?;
    let path = dir.join(format!("{name}.png"));
    image.save(&path)?;
    Ok(path)
}
