//! Synchronization primitives and the frame-in-flight ring.

use crate::error::{GpuError, Result};
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    // SAFETY: device is valid per caller contract
    let semaphore = unsafe { device.create_semaphore(&create_info, None)? };
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    // SAFETY: device is valid per caller contract
    let fence = unsafe { device.create_fence(&create_info, None)? };
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    // SAFETY: handles are valid per caller contract
    unsafe { device.wait_for_fences(&[fence], true, timeout_ns)? };
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    // SAFETY: handles are valid per caller contract
    unsafe { device.reset_fences(&[fence])? };
    Ok(())
}

/// Round-robin ring of per-frame-in-flight state.
///
/// Slot `i` may only be reused once the caller has observed (through the
/// slot's fence) that the previous submission using it has retired. The ring
/// itself only tracks which slot is current.
#[derive(Debug)]
pub struct FrameRing<T> {
    slots: Vec<T>,
    current: usize,
}

impl<T> FrameRing<T> {
    /// Build a ring from one entry per frame in flight.
    pub fn new(slots: Vec<T>) -> Result<Self> {
        if slots.is_empty() {
            return Err(GpuError::InvalidState(
                "Frame ring needs at least one slot".to_string(),
            ));
        }
        Ok(Self { slots, current: 0 })
    }

    /// Number of frames in flight.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a ring holds at least one slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the current slot, in `[0, len)`.
    pub const fn current_index(&self) -> usize {
        self.current
    }

    /// State of the current slot.
    pub fn current(&self) -> &T {
        &self.slots[self.current]
    }

    /// Mutable state of the current slot.
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.current]
    }

    /// Move to the next slot, wrapping after the last one.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    /// Iterate over every slot (used for teardown).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    /// Consume the ring, yielding its slots.
    pub fn into_slots(self) -> Vec<T> {
        self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_is_rejected() {
        assert!(FrameRing::<u32>::new(Vec::new()).is_err());
    }

    #[test]
    fn current_index_stays_in_range() {
        let mut ring = FrameRing::new(vec![(), (), ()]).unwrap();
        let seen: Vec<usize> = (0..7)
            .map(|_| {
                let index = ring.current_index();
                ring.advance();
                index
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn current_follows_advance() {
        let mut ring = FrameRing::new(vec![10, 20]).unwrap();
        assert_eq!(*ring.current(), 10);
        ring.advance();
        *ring.current_mut() += 1;
        assert_eq!(ring.into_slots(), vec![10, 21]);
    }
}
