//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::command::{execute_single_time_commands, CommandPool};
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::layout::{color_range, record_mip_chain, record_transition, transition_masks};
use crate::memory::{GpuAllocator, GpuBuffer, GpuImage};
use crate::surface::SurfaceContext;
use ash::vk;
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Main GPU context holding Vulkan resources.
///
/// Everything else in the crate borrows the context; it is dropped last.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,
    pub(crate) upload_pool: Mutex<CommandPool>,

    pub(crate) graphics_queue_family: u32,
    pub(crate) present_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Sample count used for multisampled render targets.
    pub fn msaa_samples(&self) -> vk::SampleCountFlags {
        self.capabilities.msaa_samples
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue (may be the graphics queue).
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the present queue family index.
    pub fn present_queue_family(&self) -> u32 {
        self.present_queue_family
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Create a buffer backed by memory at `location`.
    pub fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.allocator
            .lock()
            .create_buffer(size, usage, location, name)
    }

    /// Destroy a buffer and release its memory.
    pub fn free_buffer(&self, buffer: &mut GpuBuffer) -> Result<()> {
        self.allocator.lock().free_buffer(buffer)
    }

    /// Create an image backed by memory at `location`.
    pub fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        self.allocator
            .lock()
            .create_image(create_info, location, name)
    }

    /// Destroy an image and release its memory.
    pub fn free_image(&self, image: &mut GpuImage) -> Result<()> {
        self.allocator.lock().free_image(image)
    }

    /// Create a 2D view over `levels` mips of `image`.
    pub fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        levels: u32,
    ) -> Result<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(levels)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        // SAFETY: image belongs to this device
        let view = unsafe { self.device.create_image_view(&view_info, None)? };
        Ok(view)
    }

    /// Record commands into a throwaway buffer, submit them to the graphics
    /// queue and block until the queue is idle.
    pub fn one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let pool = self.upload_pool.lock();
        // SAFETY: the pool is locked for the duration of the submission
        unsafe {
            execute_single_time_commands(&self.device, &pool, self.graphics_queue, |cmd| {
                record(&self.device, cmd)
            })
        }
    }

    /// Move every mip of a color image from `old` to `new` layout.
    ///
    /// Pairs outside the supported transition table are rejected before any
    /// command is recorded.
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        mip_levels: u32,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<()> {
        transition_masks(old, new)?;

        self.one_shot(|device, cmd| {
            // SAFETY: cmd is recording and image belongs to this device
            unsafe { record_transition(device, cmd, image, color_range(0, mip_levels), old, new) }
        })
    }

    /// Fill mips `1..levels` from mip 0 with linear blits.
    ///
    /// Every level must be in `TRANSFER_DST_OPTIMAL`; on return the whole
    /// chain is in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn generate_mipmaps(
        &self,
        image: vk::Image,
        format: vk::Format,
        width: u32,
        height: u32,
        levels: u32,
    ) -> Result<()> {
        let feature = vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR;
        // SAFETY: instance and physical device are valid
        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        if !properties.optimal_tiling_features.contains(feature) {
            return Err(GpuError::FormatFeatureUnsupported { format, feature });
        }

        self.one_shot(|device, cmd| {
            // SAFETY: cmd is recording and image has `levels` mips
            unsafe { record_mip_chain(device, cmd, image, width, height, levels) };
            Ok(())
        })
    }

    /// First candidate whose `tiling` features include `features`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|&format| {
            // SAFETY: instance and physical device are valid
            let properties = unsafe {
                self.instance
                    .get_physical_device_format_properties(self.physical_device, format)
            };
            match tiling {
                vk::ImageTiling::LINEAR => properties.linear_tiling_features.contains(features),
                _ => properties.optimal_tiling_features.contains(features),
            }
        })
    }

    /// Depth attachment format for the render targets.
    pub fn depth_format(&self) -> Result<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
        .ok_or(GpuError::NoDepthFormat)
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: device is valid
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        // SAFETY: every object created from this device is destroyed by its
        // owner before the context goes away
        unsafe {
            let _ = self.device.device_wait_idle();

            self.upload_pool.lock().destroy(&self.device);

            // Shutdown allocator BEFORE destroying device
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Lumen".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build a context without a surface (present queue = graphics queue).
    pub fn build(self) -> Result<GpuContext> {
        // SAFETY: loading the system Vulkan library
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loader(e.to_string()))?;

        // SAFETY: entry was just loaded
        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation, &[]) }?;

        self.finish(entry, instance, None)
    }

    /// Build a context that can present to `window`.
    ///
    /// The surface is created before queue selection so that the present
    /// family can be queried against it.
    pub fn build_windowed<W>(self, window: &W) -> Result<(GpuContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        // SAFETY: loading the system Vulkan library
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loader(e.to_string()))?;

        let surface_extensions: &[*const c_char] =
            ash_window::enumerate_required_extensions(display.as_raw())
                .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        // SAFETY: entry was just loaded
        let instance = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                self.enable_validation,
                surface_extensions,
            )
        }?;

        // SAFETY: handles come from a live window and the instance enables
        // the extensions it needs
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let gpu = self.finish(entry, instance, Some((&surface_loader, surface)))?;
        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());

        Ok((
            gpu,
            SurfaceContext {
                surface,
                surface_loader,
                swapchain_loader,
            },
        ))
    }

    fn finish(
        self,
        entry: ash::Entry,
        instance: ash::Instance,
        surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
    ) -> Result<GpuContext> {
        // SAFETY: instance is valid
        let physical_device = unsafe { select_physical_device(&instance) }?;

        // SAFETY: physical device was enumerated from this instance
        let capabilities = unsafe { GpuCapabilities::query(&instance, physical_device) };

        if !capabilities.meets_requirements() {
            return Err(GpuError::NoSuitableDevice);
        }

        tracing::info!("Selected GPU: {}", capabilities.summary());

        // SAFETY: physical device was enumerated from this instance
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_families = pick_queue_families(&families, |index| match surface {
            // SAFETY: surface was created from this instance
            Some((loader, surface)) => unsafe {
                loader
                    .get_physical_device_surface_support(physical_device, index, surface)
                    .unwrap_or(false)
            },
            None => true,
        })?;

        let (device, graphics_queue, present_queue) = unsafe {
            // SAFETY: instance and physical device are valid
            create_device(
                &instance,
                physical_device,
                &queue_families,
                surface.is_some(),
            )?
        };

        let device = Arc::new(device);

        // SAFETY: device was just created from this instance
        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;

        // SAFETY: device is valid and the family exists
        let upload_pool = unsafe {
            CommandPool::new(
                &device,
                queue_families.graphics,
                vk::CommandPoolCreateFlags::TRANSIENT,
            )
        }?;

        Ok(GpuContext {
            entry,
            instance,
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            upload_pool: Mutex::new(upload_pool),
            graphics_queue_family: queue_families.graphics,
            present_queue_family: queue_families.present,
            graphics_queue,
            present_queue,
        })
    }
}

/// Queue family indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Distinct families, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Find the first graphics-capable family and the first family that can
/// present (they may coincide).
pub fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Result<QueueFamilyIndices> {
    let mut graphics = None;
    let mut present = None;

    for (index, family) in (0u32..).zip(families) {
        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }
        if present.is_none() && family.queue_count > 0 && supports_present(index) {
            present = Some(index);
        }
        if graphics.is_some() && present.is_some() {
            break;
        }
    }

    Ok(QueueFamilyIndices {
        graphics: graphics.ok_or(GpuError::QueueFamilyNotFound("graphics"))?,
        present: present.ok_or(GpuError::QueueFamilyNotFound("presentation"))?,
    })
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: &QueueFamilyIndices,
    presentable: bool,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extensions: Vec<&CStr> = if presentable {
        vec![ash::khr::swapchain::NAME]
    } else {
        vec![]
    };
    let extension_names: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(true)
        .sample_rate_shading(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    // SAFETY: pointers in device_create_info outlive this call
    let device = unsafe {
        instance
            .create_device(physical_device, &device_create_info, None)
            .map_err(GpuError::from)?
    };

    // SAFETY: one queue was requested per family
    let (graphics_queue, present_queue) = unsafe {
        (
            device.get_device_queue(queue_families.graphics, 0),
            device.get_device_queue(queue_families.present, 0),
        )
    };

    Ok((device, graphics_queue, present_queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn shared_family_when_graphics_can_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = pick_queue_families(&families, |_| true).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 0, present: 0 });
        assert_eq!(indices.unique(), vec![0]);
    }

    #[test]
    fn separate_present_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = pick_queue_families(&families, |index| index == 2).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 1, present: 2 });
        assert_eq!(indices.unique(), vec![1, 2]);
    }

    #[test]
    fn missing_graphics_family_is_fatal() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        assert!(matches!(
            pick_queue_families(&families, |_| true),
            Err(GpuError::QueueFamilyNotFound("graphics"))
        ));
    }

    #[test]
    fn missing_present_family_is_fatal() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(matches!(
            pick_queue_families(&families, |_| false),
            Err(GpuError::QueueFamilyNotFound("presentation"))
        ));
    }
}
