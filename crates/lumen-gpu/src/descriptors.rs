//! Descriptor layouts, pools and per-frame descriptor sets.
//!
//! A [`DescriptorLayout`] owns the set layout, a pool sized for
//! `frame_count * expected_sets` sets, and the pipeline layout that every
//! pipeline drawn with it uses (set 0, optional push constants). A
//! [`DescriptorSet`] is one set per frame in flight allocated from that pool.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use ash::vk;

/// One entry of the binding contract.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

/// Descriptor layout builder.
#[derive(Debug, Clone)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<DescriptorBinding>,
    expected_sets: u32,
    push_constants: Option<vk::PushConstantRange>,
}

impl Default for DescriptorLayoutBuilder {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            expected_sets: 1,
            push_constants: None,
        }
    }
}

impl DescriptorLayoutBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(DescriptorBinding {
            binding,
            descriptor_type,
            count,
            stages,
        });
        self
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stages)
    }

    /// Add a combined image sampler binding.
    pub fn combined_image_sampler(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            stages,
        )
    }

    /// Number of descriptor sets (drawable instances) the pool must serve.
    pub fn expected_sets(mut self, count: u32) -> Self {
        self.expected_sets = count.max(1);
        self
    }

    /// Push constant range exposed by the pipeline layout.
    pub fn push_constants(mut self, stages: vk::ShaderStageFlags, offset: u32, size: u32) -> Self {
        self.push_constants = Some(
            vk::PushConstantRange::default()
                .stage_flags(stages)
                .offset(offset)
                .size(size),
        );
        self
    }

    /// Create the set layout, pool and pipeline layout.
    pub fn build(self, gpu: &GpuContext, frame_count: usize) -> Result<DescriptorLayout> {
        let device = gpu.device();
        let frames = u32::try_from(frame_count)
            .map_err(|_| GpuError::InvalidState(format!("{frame_count} frames in flight")))?;

        let max_sets = frames.checked_mul(self.expected_sets).ok_or_else(|| {
            GpuError::InvalidState(format!(
                "{frames} frames x {} sets overflows u32",
                self.expected_sets
            ))
        })?;
        let sizes = pool_sizes(&self.bindings, frames, self.expected_sets)?;

        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect();

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        // SAFETY: device is valid
        let set_layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&sizes);
        // SAFETY: device is valid
        let pool = unsafe { device.create_descriptor_pool(&pool_info, None)? };

        let set_layouts = [set_layout];
        let push_ranges: Vec<vk::PushConstantRange> = self.push_constants.into_iter().collect();
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_ranges);
        // SAFETY: set_layout was just created on this device
        let pipeline_layout = unsafe { device.create_pipeline_layout(&pipeline_layout_info, None) }
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        Ok(DescriptorLayout {
            set_layout,
            pool,
            pipeline_layout,
            bindings: self.bindings,
            frame_count,
        })
    }
}

/// Pool sizes for `expected_sets` sets per frame, one entry per descriptor
/// type in first-seen order.
pub fn pool_sizes(
    bindings: &[DescriptorBinding],
    frame_count: u32,
    expected_sets: u32,
) -> Result<Vec<vk::DescriptorPoolSize>> {
    let overflow = || {
        GpuError::InvalidState(format!(
            "descriptor pool for {frame_count} frames x {expected_sets} sets overflows u32"
        ))
    };

    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        let count = binding
            .count
            .checked_mul(frame_count)
            .and_then(|n| n.checked_mul(expected_sets))
            .ok_or_else(overflow)?;
        match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
            Some(size) => {
                size.descriptor_count = size.descriptor_count.checked_add(count).ok_or_else(overflow)?;
            }
            None => sizes.push(
                vk::DescriptorPoolSize::default()
                    .ty(binding.descriptor_type)
                    .descriptor_count(count),
            ),
        }
    }
    Ok(sizes)
}

/// The binding contract shared by a family of pipelines and descriptor sets.
pub struct DescriptorLayout {
    set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pipeline_layout: vk::PipelineLayout,
    bindings: Vec<DescriptorBinding>,
    frame_count: usize,
}

impl DescriptorLayout {
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Frames in flight the layout was built for.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Destroy the pipeline layout, pool (and every set in it) and set layout.
    ///
    /// # Safety
    /// No pipeline or descriptor set built from this layout may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: caller contract
        unsafe {
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_pool(self.pool, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

/// One descriptor set per frame in flight.
pub struct DescriptorSet {
    sets: Vec<vk::DescriptorSet>,
}

impl DescriptorSet {
    /// Allocate `layout.frame_count()` sets from the layout's pool.
    ///
    /// Pool exhaustion is reported as [`GpuError::DescriptorAllocation`].
    pub fn new(gpu: &GpuContext, layout: &DescriptorLayout) -> Result<Self> {
        let layouts = vec![layout.set_layout; layout.frame_count];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(layout.pool)
            .set_layouts(&layouts);

        // SAFETY: pool and set layout belong to this device
        let sets = unsafe { gpu.device().allocate_descriptor_sets(&alloc_info) }
            .map_err(GpuError::DescriptorAllocation)?;
        Ok(Self { sets })
    }

    /// Set used by frame slot `frame_index`.
    pub fn get(&self, frame_index: usize) -> Result<vk::DescriptorSet> {
        self.sets
            .get(frame_index)
            .copied()
            .ok_or(GpuError::FrameIndexOutOfRange {
                index: frame_index,
                frame_count: self.sets.len(),
            })
    }

    /// All per-frame handles, indexed by frame slot.
    pub fn handles(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }

    pub fn frame_count(&self) -> usize {
        self.sets.len()
    }
}

/// Point `binding` of `dst_set` at a uniform buffer.
///
/// # Safety
/// Device, set and buffer must be valid and the set must not be in use.
pub unsafe fn write_uniform_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info));

    // SAFETY: caller contract
    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Point `binding` of `dst_set` at a shader-readable image and its sampler.
///
/// # Safety
/// Device, set, view and sampler must be valid and the set must not be in use.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .sampler(sampler)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(std::slice::from_ref(&image_info));

    // SAFETY: caller contract
    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes_as_tuples(sizes: &[vk::DescriptorPoolSize]) -> Vec<(vk::DescriptorType, u32)> {
        sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect()
    }

    fn scene_bindings() -> Vec<DescriptorBinding> {
        let vf = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        let builder = DescriptorLayoutBuilder::new()
            .uniform_buffer(10, vf)
            .uniform_buffer(11, vk::ShaderStageFlags::FRAGMENT)
            .uniform_buffer(12, vk::ShaderStageFlags::VERTEX)
            .uniform_buffer(13, vf)
            .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT);
        builder.bindings
    }

    #[test]
    fn pool_scales_with_frames_and_sets() {
        let sizes = pool_sizes(&scene_bindings(), 3, 100).unwrap();
        assert_eq!(
            sizes_as_tuples(&sizes),
            vec![
                (vk::DescriptorType::UNIFORM_BUFFER, 4 * 3 * 100),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 3 * 100),
            ]
        );
    }

    #[test]
    fn single_uniform_binding() {
        let bindings = DescriptorLayoutBuilder::new()
            .uniform_buffer(10, vk::ShaderStageFlags::VERTEX)
            .bindings;
        let sizes = pool_sizes(&bindings, 3, 1).unwrap();
        assert_eq!(
            sizes_as_tuples(&sizes),
            vec![(vk::DescriptorType::UNIFORM_BUFFER, 3)]
        );
    }

    #[test]
    fn array_bindings_count_every_element() {
        let bindings = DescriptorLayoutBuilder::new()
            .binding(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                4,
                vk::ShaderStageFlags::FRAGMENT,
            )
            .bindings;
        let sizes = pool_sizes(&bindings, 2, 5).unwrap();
        assert_eq!(sizes[0].descriptor_count, 4 * 2 * 5);
    }

    #[test]
    fn expected_sets_never_zero() {
        let builder = DescriptorLayoutBuilder::new().expected_sets(0);
        assert_eq!(builder.expected_sets, 1);
    }

    #[test]
    fn oversized_pool_is_an_error() {
        assert!(matches!(
            pool_sizes(&scene_bindings(), 3, u32::MAX / 2),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn summed_counts_that_overflow_are_an_error() {
        let bindings = DescriptorLayoutBuilder::new()
            .binding(1, vk::DescriptorType::UNIFORM_BUFFER, u32::MAX / 2 + 1, vk::ShaderStageFlags::VERTEX)
            .binding(2, vk::DescriptorType::UNIFORM_BUFFER, u32::MAX / 2 + 1, vk::ShaderStageFlags::VERTEX)
            .bindings;
        assert!(pool_sizes(&bindings, 1, 1).is_err());
    }
}
