//! Shader modules and graphics pipelines.

use crate::descriptors::DescriptorLayout;
use crate::device::GraphicsDevice;
use crate::error::{GpuError, Result};
use ash::vk;
use std::fs::File;
use std::path::Path;

/// Minimum fraction of samples shaded individually.
pub const MIN_SAMPLE_SHADING: f32 = 0.2;

/// Programmable stage a shader module feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub const fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// A SPIR-V module for one stage, entry point `main`.
pub struct ShaderModule {
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl ShaderModule {
    /// Load a compiled SPIR-V binary from disk.
    pub fn from_file(device: &ash::Device, path: impl AsRef<Path>, stage: ShaderStage) -> Result<Self> {
        let path = path.as_ref();
        let shader_load = |source| GpuError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(shader_load)?;
        let code = ash::util::read_spv(&mut file).map_err(shader_load)?;
        Self::from_spirv(device, &code, stage)
    }

    /// Wrap already-loaded SPIR-V words.
    pub fn from_spirv(device: &ash::Device, code: &[u32], stage: ShaderStage) -> Result<Self> {
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        // SAFETY: device is valid; the driver validates the code
        let module = unsafe { device.create_shader_module(&info, None) }
            .map_err(|e| GpuError::PipelineCreation(format!("{stage:?} shader module: {e}")))?;
        Ok(Self { module, stage })
    }

    pub const fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.flags())
            .module(self.module)
            .name(c"main")
    }

    /// Destroy the module. Pipelines built from it stay valid.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: caller contract
        unsafe { device.destroy_shader_module(self.module, None) };
    }
}

/// Graphics pipeline configuration.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub alpha_blend: bool,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            alpha_blend: true,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Config with the given vertex input layout and default fixed function.
    pub fn with_vertex_input(
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        Self {
            vertex_bindings: bindings,
            vertex_attributes: attributes,
            ..Self::default()
        }
    }
}

/// `src_alpha * src + (1 - src_alpha) * dst` on color, source alpha kept.
fn blend_attachment(enabled: bool) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(enabled)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// Viewport and scissor covering the whole extent.
pub fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

/// Graphics pipeline wrapper.
///
/// The viewport is baked in at creation; the layout handle is borrowed from
/// the [`DescriptorLayout`] and not destroyed here.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create a pipeline for subpass 0 of the device's render pass.
    pub fn new(
        device: &GraphicsDevice,
        layout: &DescriptorLayout,
        vertex: &ShaderModule,
        fragment: &ShaderModule,
        config: &GraphicsPipelineConfig,
    ) -> Result<Self> {
        let shader_stages = [vertex.stage_info(), fragment.stage_info()];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let (viewport, scissor) = full_viewport(device.extent());
        let viewports = [viewport];
        let scissors = [scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(device.targets.samples)
            .sample_shading_enable(true)
            .min_sample_shading(MIN_SAMPLE_SHADING);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [blend_attachment(config.alpha_blend)];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(layout.pipeline_layout())
            .render_pass(device.render_pass())
            .subpass(0);

        // SAFETY: every referenced handle is alive for the duration of the call
        let pipelines = unsafe {
            device.gpu.device().create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }
        .map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;

        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::PipelineCreation("driver returned no pipeline".to_string()))?;

        Ok(Self {
            pipeline,
            layout: layout.pipeline_layout(),
        })
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        // SAFETY: caller contract
        unsafe { device.destroy_pipeline(self.pipeline, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn viewport_covers_extent() {
        let (viewport, scissor) = full_viewport(vk::Extent2D {
            width: 1600,
            height: 900,
        });
        assert_relative_eq!(viewport.width, 1600.0);
        assert_relative_eq!(viewport.height, 900.0);
        assert_relative_eq!(viewport.max_depth, 1.0);
        assert_eq!(scissor.extent.width, 1600);
        assert_eq!(scissor.offset.x, 0);
    }

    #[test]
    fn default_fixed_function() {
        let config = GraphicsPipelineConfig::default();
        assert_eq!(config.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(config.cull_mode, vk::CullModeFlags::BACK);
        assert!(config.depth_test && config.depth_write && config.alpha_blend);
    }

    #[test]
    fn blending_is_source_over() {
        let blend = blend_attachment(true);
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            blend.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(blend.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
    }

    #[test]
    fn shader_stage_flags() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
    }
}
