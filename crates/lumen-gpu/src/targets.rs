//! Shared framebuffer attachments and the render pass.
//!
//! One multisampled color target and one multisampled depth target are shared
//! by every swapchain image; each framebuffer resolves into its own swapchain
//! view.

use crate::context::GpuContext;
use crate::error::Result;
use crate::memory::GpuImage;
use crate::swapchain::Swapchain;
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Attachment slots of the render pass.
pub mod attachment {
    pub const COLOR: u32 = 0;
    pub const DEPTH: u32 = 1;
    pub const RESOLVE: u32 = 2;
}

/// MSAA color + depth targets, render pass and per-image framebuffers.
pub struct RenderTargets {
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub color: GpuImage,
    pub color_view: vk::ImageView,
    pub depth: GpuImage,
    pub depth_view: vk::ImageView,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
}

impl RenderTargets {
    /// Build the targets for `swapchain`.
    pub fn new(gpu: &GpuContext, swapchain: &Swapchain) -> Result<Self> {
        let samples = gpu.msaa_samples();
        let depth_format = gpu.depth_format()?;
        let extent = swapchain.extent;

        tracing::info!("Render targets: {samples:?} MSAA, depth {depth_format:?}");

        let color = gpu.create_image(
            &attachment_info(
                swapchain.format,
                extent,
                samples,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            ),
            MemoryLocation::GpuOnly,
            "msaa_color",
        )?;
        let color_view = gpu.create_image_view(
            color.image,
            swapchain.format,
            vk::ImageAspectFlags::COLOR,
            1,
        )?;

        let depth = gpu.create_image(
            &attachment_info(
                depth_format,
                extent,
                samples,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ),
            MemoryLocation::GpuOnly,
            "msaa_depth",
        )?;
        let depth_view =
            gpu.create_image_view(depth.image, depth_format, vk::ImageAspectFlags::DEPTH, 1)?;

        // SAFETY: device is valid
        let render_pass =
            unsafe { create_render_pass(gpu.device(), swapchain.format, depth_format, samples)? };

        let framebuffers = swapchain
            .image_views
            .iter()
            .map(|&target| {
                let attachments = [color_view, depth_view, target];
                let info = vk::FramebufferCreateInfo::default()
                    .render_pass(render_pass)
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);
                // SAFETY: all views are alive and match the render pass
                unsafe { gpu.device().create_framebuffer(&info, None) }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            render_pass,
            framebuffers,
            color,
            color_view,
            depth,
            depth_view,
            depth_format,
            samples,
        })
    }

    /// Framebuffer that resolves into swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    /// Destroy framebuffers, render pass, views and images.
    ///
    /// # Safety
    /// Nothing may still reference the targets on the GPU.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let device = gpu.device();
        // SAFETY: caller guarantees the GPU is idle
        unsafe {
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_render_pass(self.render_pass, None);
            device.destroy_image_view(self.color_view, None);
            device.destroy_image_view(self.depth_view, None);
        }
        self.framebuffers.clear();

        gpu.free_image(&mut self.color)?;
        gpu.free_image(&mut self.depth)
    }
}

fn attachment_info(
    format: vk::Format,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    usage: vk::ImageUsageFlags,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(samples)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

/// Create the single-subpass render pass: MSAA color, MSAA depth, and a
/// single-sample resolve target that is handed to presentation.
///
/// # Safety
/// The device must be valid.
unsafe fn create_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> Result<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
    ];

    let color_refs = [vk::AttachmentReference::default()
        .attachment(attachment::COLOR)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(attachment::DEPTH)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    let resolve_refs = [vk::AttachmentReference::default()
        .attachment(attachment::RESOLVE)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)
        .resolve_attachments(&resolve_refs)];

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    // SAFETY: device is valid per caller contract
    let render_pass = unsafe { device.create_render_pass(&info, None)? };
    Ok(render_pass)
}
