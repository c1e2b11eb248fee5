//! Shader-visible resources bound through descriptor sets.
//!
//! A resource is either written per frame (one slot per frame in flight) or
//! shared (a single slot every frame reads). [`PerFrame`] hides the
//! difference behind [`PerFrame::resource_for`].

use crate::context::GpuContext;
use crate::descriptors::{write_combined_image_sampler, write_uniform_buffer, DescriptorSet};
use crate::error::{GpuError, Result};
use crate::transfer::{TransferBuffer, TransferImage};
use ash::vk;
use bytemuck::Pod;

/// Slot that frame `frame_index` reads.
pub const fn resource_index(frame_index: usize, per_frame: bool) -> usize {
    if per_frame {
        frame_index
    } else {
        0
    }
}

/// Slot bound to each frame index, in frame order.
pub fn binding_plan(frame_count: usize, per_frame: bool) -> Vec<usize> {
    (0..frame_count)
        .map(|frame| resource_index(frame, per_frame))
        .collect()
}

/// Either `frame_count` slots or a single shared slot.
#[derive(Debug)]
pub struct PerFrame<T> {
    slots: Vec<T>,
    frame_count: usize,
    per_frame: bool,
}

impl<T> PerFrame<T> {
    /// Build the slots with `make(slot_index)`.
    pub fn try_new(
        frame_count: usize,
        per_frame: bool,
        mut make: impl FnMut(usize) -> Result<T>,
    ) -> Result<Self> {
        if frame_count == 0 {
            return Err(GpuError::InvalidState(
                "Per-frame resource needs at least one frame".to_string(),
            ));
        }
        let slot_count = if per_frame { frame_count } else { 1 };
        let slots = (0..slot_count).map(&mut make).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            slots,
            frame_count,
            per_frame,
        })
    }

    /// The slot frame `frame_index` reads and writes.
    pub fn resource_for(&self, frame_index: usize) -> Result<&T> {
        if frame_index >= self.frame_count {
            return Err(GpuError::FrameIndexOutOfRange {
                index: frame_index,
                frame_count: self.frame_count,
            });
        }
        Ok(&self.slots[resource_index(frame_index, self.per_frame)])
    }

    pub const fn is_per_frame(&self) -> bool {
        self.per_frame
    }

    pub const fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Every distinct slot.
    pub fn slots(&self) -> &[T] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [T] {
        &mut self.slots
    }
}

/// A uniform buffer, per frame or shared.
pub struct UniformResource {
    buffers: PerFrame<TransferBuffer>,
    size: u64,
}

impl UniformResource {
    /// Create device-local uniform buffers of `size` bytes.
    pub fn new(
        gpu: &GpuContext,
        size: u64,
        per_frame: bool,
        frame_count: usize,
        name: &str,
    ) -> Result<Self> {
        let buffers = PerFrame::try_new(frame_count, per_frame, |slot| {
            TransferBuffer::new(
                gpu,
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                &format!("{name}[{slot}]"),
            )
        })?;
        Ok(Self { buffers, size })
    }

    /// Create a buffer sized for `T`.
    pub fn for_type<T: Pod>(
        gpu: &GpuContext,
        per_frame: bool,
        frame_count: usize,
        name: &str,
    ) -> Result<Self> {
        Self::new(
            gpu,
            std::mem::size_of::<T>() as u64,
            per_frame,
            frame_count,
            name,
        )
    }

    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Buffer read by frame `frame_index`.
    pub fn buffer(&self, frame_index: usize) -> Result<&TransferBuffer> {
        self.buffers.resource_for(frame_index)
    }

    /// Upload `data` into the slot of `frame_index` only.
    pub fn write_data(&self, gpu: &GpuContext, frame_index: usize, data: &[u8]) -> Result<()> {
        self.buffers.resource_for(frame_index)?.write_data(gpu, data)
    }

    /// Upload `value` into the slot of `frame_index` only.
    pub fn write<T: Pod>(&self, gpu: &GpuContext, frame_index: usize, value: &T) -> Result<()> {
        self.write_data(gpu, frame_index, bytemuck::bytes_of(value))
    }

    /// Upload the same `data` into every slot.
    pub fn write_all(&self, gpu: &GpuContext, data: &[u8]) -> Result<()> {
        self.buffers
            .slots()
            .iter()
            .try_for_each(|buffer| buffer.write_data(gpu, data))
    }

    /// Bind this resource at `binding` of every frame of every target set.
    ///
    /// Returns the `(set, buffer)` pairs written, target by target in frame
    /// order.
    pub fn write_descriptor(
        &self,
        gpu: &GpuContext,
        targets: &[&DescriptorSet],
        binding: u32,
    ) -> Result<Vec<(vk::DescriptorSet, vk::Buffer)>> {
        let mut written = Vec::new();
        for target in targets {
            for (frame, &set) in target.handles().iter().enumerate() {
                let buffer = self.buffers.resource_for(frame)?.handle();
                // SAFETY: the set is not in use while descriptors are written
                unsafe {
                    write_uniform_buffer(gpu.device(), set, binding, buffer, self.size);
                }
                written.push((set, buffer));
            }
        }
        Ok(written)
    }

    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        self.buffers
            .slots_mut()
            .iter_mut()
            .try_for_each(|buffer| buffer.destroy(gpu))
    }
}

/// A sampled texture with its sampler, per frame or shared.
pub struct SampledResource {
    images: PerFrame<TransferImage>,
    sampler: vk::Sampler,
}

impl SampledResource {
    /// Create `width` x `height` RGBA8 textures and one sampler for them.
    pub fn new(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        per_frame: bool,
        frame_count: usize,
        name: &str,
    ) -> Result<Self> {
        let images = PerFrame::try_new(frame_count, per_frame, |slot| {
            TransferImage::new(gpu, width, height, &format!("{name}[{slot}]"))
        })?;
        let mip_levels = images.slots()[0].mip_levels();
        let sampler = create_sampler(gpu, mip_levels)?;
        Ok(Self { images, sampler })
    }

    /// Create a shared texture and upload `pixels` into it.
    pub fn with_pixels(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        pixels: &[u8],
        frame_count: usize,
        name: &str,
    ) -> Result<Self> {
        let resource = Self::new(gpu, width, height, false, frame_count, name)?;
        resource.write_all(gpu, pixels)?;
        Ok(resource)
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Image read by frame `frame_index`.
    pub fn image(&self, frame_index: usize) -> Result<&TransferImage> {
        self.images.resource_for(frame_index)
    }

    /// Upload `pixels` into the slot of `frame_index` only.
    pub fn write_data(&self, gpu: &GpuContext, frame_index: usize, pixels: &[u8]) -> Result<()> {
        self.images.resource_for(frame_index)?.write_data(gpu, pixels)
    }

    /// Upload the same `pixels` into every slot.
    pub fn write_all(&self, gpu: &GpuContext, pixels: &[u8]) -> Result<()> {
        self.images
            .slots()
            .iter()
            .try_for_each(|image| image.write_data(gpu, pixels))
    }

    /// Bind this texture at `binding` of every frame of every target set.
    ///
    /// Returns the `(set, view)` pairs written.
    pub fn write_descriptor(
        &self,
        gpu: &GpuContext,
        targets: &[&DescriptorSet],
        binding: u32,
    ) -> Result<Vec<(vk::DescriptorSet, vk::ImageView)>> {
        let mut written = Vec::new();
        for target in targets {
            for (frame, &set) in target.handles().iter().enumerate() {
                let view = self.images.resource_for(frame)?.view();
                // SAFETY: the set is not in use while descriptors are written
                unsafe {
                    write_combined_image_sampler(gpu.device(), set, binding, view, self.sampler);
                }
                written.push((set, view));
            }
        }
        Ok(written)
    }

    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        // SAFETY: caller guarantees nothing samples with it anymore
        unsafe { gpu.device().destroy_sampler(self.sampler, None) };
        self.images
            .slots_mut()
            .iter_mut()
            .try_for_each(|image| image.destroy(gpu))
    }
}

fn create_sampler(gpu: &GpuContext, mip_levels: u32) -> Result<vk::Sampler> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(gpu.capabilities().max_sampler_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(mip_levels as f32);

    // SAFETY: device is valid and anisotropy was enabled at device creation
    let sampler = unsafe { gpu.device().create_sampler(&info, None)? };
    Ok(sampler)
}
