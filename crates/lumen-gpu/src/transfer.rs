//! Device-local buffers and images with a blocking staging upload path.
//!
//! Every write goes through a short-lived host-visible staging buffer: the
//! bytes are copied into it, a one-shot command copies them into the
//! device-local resource, the call waits for the queue to drain and the
//! staging buffer is freed. Reads use the mirror image of that path with a
//! GPU-to-CPU buffer.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::layout::{color_range, mip_level_count, record_transition};
use crate::memory::{GpuBuffer, GpuImage};
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Format of every sampled texture.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

const BYTES_PER_PIXEL: u64 = 4;

fn check_buffer_size(size: u64, name: &str) -> Result<()> {
    if size == 0 {
        return Err(GpuError::InvalidState(format!("buffer {name} has zero size")));
    }
    Ok(())
}

fn check_extent(width: u32, height: u32, name: &str) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(GpuError::InvalidState(format!(
            "image {name} has empty extent {width}x{height}"
        )));
    }
    Ok(())
}

/// An image-to-image copy needs two distinct images of the same extent.
fn check_image_copy(src: (vk::Image, u32, u32), dst: (vk::Image, u32, u32)) -> Result<()> {
    if src.0 == dst.0 {
        return Err(GpuError::InvalidState(
            "cannot copy an image onto itself".to_string(),
        ));
    }
    if (src.1, src.2) != (dst.1, dst.2) {
        return Err(GpuError::InvalidState(format!(
            "cannot copy a {}x{} image into a {}x{} image",
            src.1, src.2, dst.1, dst.2
        )));
    }
    Ok(())
}

fn staging_buffer(gpu: &GpuContext, data: &[u8], name: &str) -> Result<GpuBuffer> {
    let mut staging = gpu.create_buffer(
        data.len() as u64,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        name,
    )?;

    if let Err(e) = staging.write_bytes(data) {
        gpu.free_buffer(&mut staging)?;
        return Err(e);
    }
    Ok(staging)
}

fn readback_buffer(gpu: &GpuContext, size: u64, name: &str) -> Result<GpuBuffer> {
    gpu.create_buffer(
        size,
        vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuToCpu,
        name,
    )
}

/// Run `op` with a temporary buffer and free it whatever the outcome.
fn with_temporary<T>(
    gpu: &GpuContext,
    mut buffer: GpuBuffer,
    op: impl FnOnce(&GpuBuffer) -> Result<T>,
) -> Result<T> {
    let result = op(&buffer);
    gpu.free_buffer(&mut buffer)?;
    result
}

/// A device-local buffer.
pub struct TransferBuffer {
    buffer: GpuBuffer,
}

impl TransferBuffer {
    /// Create a device-local buffer of `size` bytes.
    ///
    /// `TRANSFER_DST` and `TRANSFER_SRC` are always added to `usage`.
    pub fn new(gpu: &GpuContext, size: u64, usage: vk::BufferUsageFlags, name: &str) -> Result<Self> {
        check_buffer_size(size, name)?;
        let buffer = gpu.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::GpuOnly,
            name,
        )?;
        Ok(Self { buffer })
    }

    /// Create a buffer sized to `data` and upload it.
    pub fn with_data(
        gpu: &GpuContext,
        data: &[u8],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Self> {
        let mut buffer = Self::new(gpu, data.len() as u64, usage, name)?;
        if let Err(e) = buffer.write_data(gpu, data) {
            buffer.destroy(gpu)?;
            return Err(e);
        }
        Ok(buffer)
    }

    /// Raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.buffer
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.buffer.size
    }

    /// Upload `data` to the start of the buffer and wait for completion.
    pub fn write_data(&self, gpu: &GpuContext, data: &[u8]) -> Result<()> {
        if data.len() as u64 > self.size() {
            return Err(GpuError::InvalidState(format!(
                "{} bytes do not fit a {} byte buffer",
                data.len(),
                self.size()
            )));
        }
        if data.is_empty() {
            return Ok(());
        }

        let staging = staging_buffer(gpu, data, "staging_buffer")?;
        let dst = self.handle();

        with_temporary(gpu, staging, |staging| {
            gpu.one_shot(|device, cmd| {
                let region = vk::BufferCopy::default().size(data.len() as u64);
                // SAFETY: both buffers are alive and large enough
                unsafe { device.cmd_copy_buffer(cmd, staging.buffer, dst, &[region]) };
                Ok(())
            })
        })
    }

    /// Copy the whole buffer back to the host.
    pub fn read_data(&self, gpu: &GpuContext) -> Result<Vec<u8>> {
        let readback = readback_buffer(gpu, self.size(), "readback_buffer")?;
        let src = self.handle();
        let size = self.size();

        with_temporary(gpu, readback, |readback| {
            gpu.one_shot(|device, cmd| {
                let region = vk::BufferCopy::default().size(size);
                // SAFETY: both buffers are alive and `size` bytes long
                unsafe { device.cmd_copy_buffer(cmd, src, readback.buffer, &[region]) };
                Ok(())
            })?;
            readback.read_bytes()
        })
    }

    /// Release the buffer.
    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        gpu.free_buffer(&mut self.buffer)
    }
}

/// A device-local RGBA8 texture with a full mip chain.
///
/// Between operations every mip is in `SHADER_READ_ONLY_OPTIMAL`.
pub struct TransferImage {
    image: GpuImage,
    view: vk::ImageView,
    width: u32,
    height: u32,
}

impl TransferImage {
    /// Create a `width` x `height` texture.
    ///
    /// The fresh image is moved to `TRANSFER_DST`, then run through mip
    /// generation so that it ends shader-readable.
    pub fn new(gpu: &GpuContext, width: u32, height: u32, name: &str) -> Result<Self> {
        check_extent(width, height, name)?;
        let mip_levels = mip_level_count(width, height);

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image = gpu.create_image(&create_info, MemoryLocation::GpuOnly, name)?;

        let prepared = gpu
            .transition_image_layout(
                image.image,
                mip_levels,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .and_then(|()| gpu.generate_mipmaps(image.image, TEXTURE_FORMAT, width, height, mip_levels))
            .and_then(|()| {
                gpu.create_image_view(
                    image.image,
                    TEXTURE_FORMAT,
                    vk::ImageAspectFlags::COLOR,
                    mip_levels,
                )
            });

        match prepared {
            Ok(view) => Ok(Self {
                image,
                view,
                width,
                height,
            }),
            Err(e) => {
                gpu.free_image(&mut image)?;
                Err(e)
            }
        }
    }

    /// Create a texture and upload `pixels` (tightly packed RGBA8).
    pub fn with_pixels(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        pixels: &[u8],
        name: &str,
    ) -> Result<Self> {
        let mut image = Self::new(gpu, width, height, name)?;
        if let Err(e) = image.write_data(gpu, pixels) {
            image.destroy(gpu)?;
            return Err(e);
        }
        Ok(image)
    }

    /// Raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.image.image
    }

    /// View over the whole mip chain.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of mip levels.
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels
    }

    /// Byte size of the base level.
    pub fn byte_size(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * BYTES_PER_PIXEL
    }

    /// Upload `pixels` into mip 0 and regenerate the chain.
    pub fn write_data(&self, gpu: &GpuContext, pixels: &[u8]) -> Result<()> {
        if pixels.len() as u64 != self.byte_size() {
            return Err(GpuError::InvalidState(format!(
                "expected {} bytes of RGBA8 pixels for {}x{}, got {}",
                self.byte_size(),
                self.width,
                self.height,
                pixels.len()
            )));
        }

        let staging = staging_buffer(gpu, pixels, "staging_image")?;
        with_temporary(gpu, staging, |staging| self.write_buffer(gpu, staging))
    }

    /// Copy `source` (tightly packed RGBA8) into mip 0 and regenerate the chain.
    pub fn write_buffer(&self, gpu: &GpuContext, source: &GpuBuffer) -> Result<()> {
        let image = self.handle();
        let levels = self.mip_levels();
        let region = self.base_level_copy();

        gpu.one_shot(|device, cmd| {
            // SAFETY: cmd is recording, image and buffer are alive
            unsafe {
                record_transition(
                    device,
                    cmd,
                    image,
                    color_range(0, levels),
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                )?;
                device.cmd_copy_buffer_to_image(
                    cmd,
                    source.buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            Ok(())
        })?;

        gpu.generate_mipmaps(image, TEXTURE_FORMAT, self.width, self.height, levels)
    }

    /// Copy the base level of `source` into this image and regenerate the chain.
    ///
    /// Both images stay on the GPU; they must be distinct and of equal extent.
    pub fn write_image(&self, gpu: &GpuContext, source: &Self) -> Result<()> {
        check_image_copy(
            (source.handle(), source.width, source.height),
            (self.handle(), self.width, self.height),
        )?;

        let src = source.handle();
        let src_levels = source.mip_levels();
        let dst = self.handle();
        let dst_levels = self.mip_levels();

        let base = vk::ImageSubresourceLayers::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1);
        let region = vk::ImageCopy::default()
            .src_subresource(base)
            .dst_subresource(base)
            .extent(self.image.extent);

        gpu.one_shot(|device, cmd| {
            // SAFETY: cmd is recording and both images are alive
            unsafe {
                record_transition(
                    device,
                    cmd,
                    src,
                    color_range(0, src_levels),
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                )?;
                record_transition(
                    device,
                    cmd,
                    dst,
                    color_range(0, dst_levels),
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                )?;
                device.cmd_copy_image(
                    cmd,
                    src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
                record_transition(
                    device,
                    cmd,
                    src,
                    color_range(0, src_levels),
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )?;
            }
            Ok(())
        })?;

        gpu.generate_mipmaps(dst, TEXTURE_FORMAT, self.width, self.height, dst_levels)
    }

    /// Copy mip 0 back to the host as tightly packed RGBA8.
    pub fn read_pixels(&self, gpu: &GpuContext) -> Result<Vec<u8>> {
        let readback = readback_buffer(gpu, self.byte_size(), "readback_image")?;
        let image = self.handle();
        let levels = self.mip_levels();
        let region = self.base_level_copy();

        with_temporary(gpu, readback, |readback| {
            gpu.one_shot(|device, cmd| {
                // SAFETY: cmd is recording, image and buffer are alive
                unsafe {
                    record_transition(
                        device,
                        cmd,
                        image,
                        color_range(0, levels),
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    )?;
                    device.cmd_copy_image_to_buffer(
                        cmd,
                        image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        readback.buffer,
                        &[region],
                    );
                    record_transition(
                        device,
                        cmd,
                        image,
                        color_range(0, levels),
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    )?;
                }
                Ok(())
            })?;
            readback.read_bytes()
        })
    }

    fn base_level_copy(&self) -> vk::BufferImageCopy {
        vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(self.image.extent)
    }

    /// Destroy the view, then the image and its memory.
    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        // SAFETY: caller guarantees the GPU no longer samples the image
        unsafe { gpu.device().destroy_image_view(self.view, None) };
        self.view = vk::ImageView::null();
        gpu.free_image(&mut self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn zero_sized_buffer_is_rejected() {
        assert!(matches!(
            check_buffer_size(0, "empty"),
            Err(GpuError::InvalidState(_))
        ));
        assert!(check_buffer_size(1, "byte").is_ok());
    }

    #[test]
    fn empty_extent_is_rejected() {
        assert!(check_extent(0, 16, "flat").is_err());
        assert!(check_extent(16, 0, "flat").is_err());
        assert!(check_extent(1, 1, "texel").is_ok());
    }

    #[test]
    fn self_copy_is_rejected() {
        let image = vk::Image::from_raw(7);
        assert!(matches!(
            check_image_copy((image, 8, 8), (image, 8, 8)),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn copy_between_distinct_images() {
        let src = vk::Image::from_raw(1);
        let dst = vk::Image::from_raw(2);
        assert!(check_image_copy((src, 8, 4), (dst, 8, 4)).is_ok());
        assert!(check_image_copy((src, 8, 4), (dst, 4, 8)).is_err());
    }
}
