//! GPU capability detection.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Anisotropic filtering support
    pub supports_sampler_anisotropy: bool,
    /// Per-sample shading support
    pub supports_sample_rate_shading: bool,
    /// Upper bound for `maxAnisotropy` in sampler creation
    pub max_sampler_anisotropy: f32,
    /// Highest sample count usable for both color and depth attachments
    pub msaa_samples: vk::SampleCountFlags,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        // SAFETY: caller guarantees both handles are valid
        let (properties, features) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_features(physical_device),
            )
        };

        // SAFETY: device_name is a NUL-terminated array filled in by the driver
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            supports_sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            supports_sample_rate_shading: features.sample_rate_shading == vk::TRUE,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
            msaa_samples: max_usable_sample_count(
                properties.limits.framebuffer_color_sample_counts,
                properties.limits.framebuffer_depth_sample_counts,
            ),
        }
    }

    /// Check if the GPU exposes the features the renderer enables.
    pub const fn meets_requirements(&self) -> bool {
        self.supports_sampler_anisotropy && self.supports_sample_rate_shading
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {:?} MSAA",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.msaa_samples,
        )
    }
}

/// Highest sample count supported by both the color and depth framebuffer limits.
pub fn max_usable_sample_count(
    color: vk::SampleCountFlags,
    depth: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let counts = color & depth;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&samples| counts.contains(samples))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x5143), GpuVendor::Other(0x5143));
    }

    #[test]
    fn sample_count_uses_common_maximum() {
        let color = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4
            | vk::SampleCountFlags::TYPE_8;
        let depth = vk::SampleCountFlags::TYPE_1
            | vk::SampleCountFlags::TYPE_2
            | vk::SampleCountFlags::TYPE_4;

        assert_eq!(
            max_usable_sample_count(color, depth),
            vk::SampleCountFlags::TYPE_4
        );
    }

    #[test]
    fn sample_count_falls_back_to_single() {
        assert_eq!(
            max_usable_sample_count(vk::SampleCountFlags::TYPE_1, vk::SampleCountFlags::TYPE_1),
            vk::SampleCountFlags::TYPE_1
        );
        assert_eq!(
            max_usable_sample_count(vk::SampleCountFlags::TYPE_8, vk::SampleCountFlags::TYPE_4),
            vk::SampleCountFlags::TYPE_1
        );
    }
}
