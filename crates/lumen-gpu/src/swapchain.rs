//! Swapchain management.
//!
//! Format and present-mode selection are strict: the swapchain is either
//! `B8G8R8A8_SRGB` / `SRGB_NONLINEAR` with `MAILBOX` presentation, or creation
//! fails.

use crate::context::QueueFamilyIndices;
use crate::error::{GpuError, Result};
use ash::vk;

/// Required surface format.
pub const SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Required present mode.
pub const PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::MAILBOX;

/// Swapchain wrapper.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain.
    ///
    /// # Safety
    /// All handles must be valid.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new(
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
        queue_families: QueueFamilyIndices,
    ) -> Result<Self> {
        let image_count = select_image_count(surface_capabilities);

        let family_indices = queue_families.unique();
        let sharing_mode = if family_indices.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        if sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&family_indices);
        }

        // SAFETY: surface and loader are valid per caller contract
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        // SAFETY: swapchain was just created
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

        let image_views = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                // SAFETY: image is owned by the swapchain
                unsafe { device.create_image_view(&view_info, None) }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::info!(
            "Created swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode
        );

        Ok(Self {
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    /// Number of swapchain images (the frame-in-flight count).
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire the next image, signalling `semaphore` once it is ready.
    ///
    /// Out-of-date is returned as an error; a suboptimal acquire still yields
    /// its image. The caller does not recreate the swapchain.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<u32> {
        // SAFETY: handles are valid per caller contract
        let (index, suboptimal) = unsafe {
            swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )?
        };

        if suboptimal {
            tracing::debug!("Acquired image {index} from a suboptimal swapchain");
        }
        Ok(index)
    }

    /// Present an image.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: handles are valid per caller contract
        unsafe { swapchain_loader.queue_present(queue, &present_info)? };
        Ok(())
    }

    /// Destroy the swapchain.
    ///
    /// # Safety
    /// All handles must be valid and swapchain must not be in use.
    pub unsafe fn destroy(
        &self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        // SAFETY: caller guarantees the swapchain is idle
        unsafe {
            for &view in &self.image_views {
                device.destroy_image_view(view, None);
            }
            swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Pick the sRGB BGRA format, or fail.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    available
        .iter()
        .copied()
        .find(|format| {
            format.format == SURFACE_FORMAT.format && format.color_space == SURFACE_FORMAT.color_space
        })
        .ok_or(GpuError::SurfaceFormatUnsupported {
            format: SURFACE_FORMAT.format,
            color_space: SURFACE_FORMAT.color_space,
        })
}

/// Pick mailbox presentation, or fail. There is no FIFO fallback.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> Result<vk::PresentModeKHR> {
    if available.contains(&PRESENT_MODE) {
        Ok(PRESENT_MODE)
    } else {
        Err(GpuError::PresentModeUnsupported(PRESENT_MODE))
    }
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Minimum image count, capped by the maximum when the surface has one.
pub const fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn srgb_format_is_found_among_others() {
        let available = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            SURFACE_FORMAT,
        ];
        let chosen = select_surface_format(&available).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn missing_srgb_format_is_an_error() {
        let available = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];
        assert!(matches!(
            select_surface_format(&available),
            Err(GpuError::SurfaceFormatUnsupported { .. })
        ));
        assert!(select_surface_format(&[]).is_err());
    }

    #[test]
    fn mailbox_required() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]).unwrap(),
            vk::PresentModeKHR::MAILBOX
        );
        assert!(matches!(
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]),
            Err(GpuError::PresentModeUnsupported(vk::PresentModeKHR::MAILBOX))
        ));
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let c = caps((1600, 900), (1, 1), (4096, 4096));
        let extent = calculate_extent(&c, 800, 600);
        assert_eq!((extent.width, extent.height), (1600, 900));
    }

    #[test]
    fn free_extent_is_clamped() {
        let c = caps((u32::MAX, u32::MAX), (64, 64), (1920, 1080));
        let extent = calculate_extent(&c, 4000, 10);
        assert_eq!((extent.width, extent.height), (1920, 64));
    }

    #[test]
    fn image_count_respects_maximum() {
        let mut c = caps((0, 0), (0, 0), (0, 0));
        c.min_image_count = 3;
        c.max_image_count = 0;
        assert_eq!(select_image_count(&c), 3);

        c.max_image_count = 2;
        assert_eq!(select_image_count(&c), 2);
    }
}
