//! Image layout transitions and mip chain generation.
//!
//! Only the transitions the upload and mipmap protocol needs are supported:
//!
//! | old                  | new                  |
//! |----------------------|----------------------|
//! | UNDEFINED            | TRANSFER_DST         |
//! | TRANSFER_DST         | SHADER_READ_ONLY     |
//! | SHADER_READ_ONLY     | TRANSFER_DST         |
//! | SHADER_READ_ONLY     | TRANSFER_SRC         |
//! | TRANSFER_SRC         | SHADER_READ_ONLY     |
//!
//! Anything else is rejected with [`GpuError::UnsupportedLayoutTransition`].

use crate::error::{GpuError, Result};
use ash::vk;

/// Access and stage masks for one supported layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Look up the barrier masks for `old -> new`.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<TransitionMasks> {
    use vk::ImageLayout as L;

    let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => (
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => return Err(GpuError::UnsupportedLayoutTransition { old, new }),
    };

    Ok(TransitionMasks {
        src_access,
        dst_access,
        src_stage,
        dst_stage,
    })
}

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`.
pub const fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = if width > height { width } else { height };
    if largest == 0 {
        1
    } else {
        u32::BITS - largest.leading_zeros()
    }
}

/// Extent of the level after `extent`: halved with floor division, never below 1.
pub const fn next_mip_extent(width: u32, height: u32) -> (u32, u32) {
    (
        if width > 1 { width / 2 } else { 1 },
        if height > 1 { height / 2 } else { 1 },
    )
}

/// Extents of every level of the chain, base level first.
pub fn mip_extents(width: u32, height: u32) -> Vec<(u32, u32)> {
    let levels = mip_level_count(width, height);
    let mut extent = (width, height);
    (0..levels)
        .map(|_| {
            let current = extent;
            extent = next_mip_extent(extent.0, extent.1);
            current
        })
        .collect()
}

/// Subresource range covering `levels` color mips of a single-layer image.
pub fn color_range(base_level: u32, levels: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(base_level)
        .level_count(levels)
        .base_array_layer(0)
        .layer_count(1)
}

/// Record a layout transition barrier.
///
/// # Safety
/// `cmd` must be recording and `image` must be valid.
pub unsafe fn record_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<()> {
    let masks = transition_masks(old, new)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    // SAFETY: handles are valid per caller contract
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    Ok(())
}

fn mip_barrier(
    image: vk::Image,
    level: u32,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_range(level, 1))
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}

fn blit_corner(width: u32, height: u32) -> vk::Offset3D {
    // Vulkan caps image dimensions far below i32::MAX.
    vk::Offset3D {
        x: i32::try_from(width).unwrap_or(i32::MAX),
        y: i32::try_from(height).unwrap_or(i32::MAX),
        z: 1,
    }
}

/// Record the blit chain that fills levels `1..levels` from level 0.
///
/// Every level must be in `TRANSFER_DST_OPTIMAL` on entry. Level `i - 1` is
/// moved to `TRANSFER_SRC`, blitted (halved, linear filter) into level `i`, then
/// moved to `SHADER_READ_ONLY`. The last level is never a blit source and goes
/// straight from `TRANSFER_DST` to `SHADER_READ_ONLY`. On exit the whole chain
/// is shader-readable.
///
/// # Safety
/// `cmd` must be recording and `image` must be a valid color image with at
/// least `levels` mip levels.
pub unsafe fn record_mip_chain(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    width: u32,
    height: u32,
    levels: u32,
) {
    let mut extent = (width, height);

    for level in 1..levels {
        let to_src = mip_barrier(
            image,
            level - 1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
        );

        let next = next_mip_extent(extent.0, extent.1);
        let blit = vk::ImageBlit::default()
            .src_offsets([vk::Offset3D::default(), blit_corner(extent.0, extent.1)])
            .src_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(level - 1)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .dst_offsets([vk::Offset3D::default(), blit_corner(next.0, next.1)])
            .dst_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(level)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let to_read = mip_barrier(
            image,
            level - 1,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::SHADER_READ,
        );

        // SAFETY: handles are valid per caller contract
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_src],
            );
            device.cmd_blit_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_read],
            );
        }

        extent = next;
    }

    let last = mip_barrier(
        image,
        levels.saturating_sub(1),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::AccessFlags::SHADER_READ,
    );

    // SAFETY: handles are valid per caller contract
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[last],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    const SUPPORTED: [(vk::ImageLayout, vk::ImageLayout); 5] = [
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL),
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
    ];

    const LAYOUTS: [vk::ImageLayout; 8] = [
        L::UNDEFINED,
        L::GENERAL,
        L::COLOR_ATTACHMENT_OPTIMAL,
        L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        L::SHADER_READ_ONLY_OPTIMAL,
        L::TRANSFER_SRC_OPTIMAL,
        L::TRANSFER_DST_OPTIMAL,
        L::PRESENT_SRC_KHR,
    ];

    #[test]
    fn exactly_five_transitions_are_accepted() {
        let mut accepted = 0;
        for old in LAYOUTS {
            for new in LAYOUTS {
                let result = transition_masks(old, new);
                if SUPPORTED.contains(&(old, new)) {
                    assert!(result.is_ok(), "{old:?} -> {new:?} should be supported");
                    accepted += 1;
                } else {
                    assert!(
                        matches!(
                            result,
                            Err(GpuError::UnsupportedLayoutTransition { old: o, new: n })
                                if o == old && n == new
                        ),
                        "{old:?} -> {new:?} should be rejected"
                    );
                }
            }
        }
        assert_eq!(accepted, 5);
    }

    #[test]
    fn upload_transition_starts_at_top_of_pipe() {
        let masks = transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn readback_transitions_pair_up() {
        let out = transition_masks(L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL).unwrap();
        let back = transition_masks(L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(out.src_access, back.dst_access);
        assert_eq!(out.dst_access, back.src_access);
        assert_eq!(out.src_stage, back.dst_stage);
    }

    #[test]
    fn mip_levels_for_powers_of_two() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(1024, 16), 11);
    }

    #[test]
    fn mip_levels_for_odd_sizes() {
        assert_eq!(mip_level_count(257, 129), 9);
        assert_eq!(mip_level_count(3, 7), 3);
        assert_eq!(mip_level_count(1600, 900), 11);
    }

    #[test]
    fn non_power_of_two_chain_halves_down_to_one() {
        let extents = mip_extents(257, 129);
        assert_eq!(
            extents,
            vec![
                (257, 129),
                (128, 64),
                (64, 32),
                (32, 16),
                (16, 8),
                (8, 4),
                (4, 2),
                (2, 1),
                (1, 1),
            ]
        );
    }

    #[test]
    fn narrow_chain_clamps_short_side() {
        let extents = mip_extents(8, 1);
        assert_eq!(extents, vec![(8, 1), (4, 1), (2, 1), (1, 1)]);
    }
}
