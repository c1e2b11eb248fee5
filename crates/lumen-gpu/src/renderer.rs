//! Frame scheduling: acquire, record, submit, present.
//!
//! Each frame in flight owns a command buffer, a "start render" semaphore
//! (signalled by acquire) and a fence (signalled by submit, created
//! signalled). "Render finished" semaphores are owned per swapchain image,
//! since presentation of an image is what consumes them.
//!
//! The fence wait at the top of [`Renderer::render_frame`] is the only
//! steady-state CPU block and is what keeps per-frame resources of slot `i`
//! untouched until the GPU retired the previous use of slot `i`. Every path
//! out of a frame leaves the slot's fence signalled or pending on a submit.

use crate::command::{begin_command_buffer, end_command_buffer, submit_command_buffers, CommandPool};
use crate::context::GpuContext;
use crate::descriptors::DescriptorSet;
use crate::device::GraphicsDevice;
use crate::error::{GpuError, Result};
use crate::geometry::GeometryBuffer;
use crate::pipeline::GraphicsPipeline;
use crate::sync::{create_fence, create_semaphore, reset_fence, wait_for_fence, FrameRing};
use ash::vk;
use bytemuck::Pod;
use std::marker::PhantomData;

/// Clear color of the resolved image.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
/// Clear depth.
pub const CLEAR_DEPTH: f32 = 1.0;

#[derive(Clone, Copy)]
struct FrameSlot {
    command_buffer: vk::CommandBuffer,
    start_render: vk::Semaphore,
    in_flight: vk::Fence,
}

/// Per-frame command recording and presentation.
pub struct Renderer {
    command_pool: CommandPool,
    frames: FrameRing<FrameSlot>,
    render_finished: Vec<vk::Semaphore>,
    frames_rendered: u64,
}

impl Renderer {
    /// Create one frame slot per swapchain image.
    pub fn new(device: &GraphicsDevice) -> Result<Self> {
        let gpu = &device.gpu;
        let vk_device = gpu.device();
        let frame_count = device.frame_count();
        let count = u32::try_from(frame_count)
            .map_err(|_| GpuError::InvalidState(format!("{frame_count} swapchain images")))?;

        // SAFETY: device is valid and the family exists
        let command_pool = unsafe {
            CommandPool::new(
                vk_device,
                gpu.graphics_queue_family(),
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };
        // SAFETY: pool was just created on this device
        let command_buffers = unsafe { command_pool.allocate_primary(vk_device, count)? };

        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| {
                // SAFETY: device is valid
                unsafe {
                    Ok(FrameSlot {
                        command_buffer,
                        start_render: create_semaphore(vk_device)?,
                        in_flight: create_fence(vk_device, true)?,
                    })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let render_finished = (0..frame_count)
            // SAFETY: device is valid
            .map(|_| unsafe { create_semaphore(vk_device) })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            command_pool,
            frames: FrameRing::new(slots)?,
            render_finished,
            frames_rendered: 0,
        })
    }

    /// Frame-in-flight slot the next call will use.
    pub fn current_frame(&self) -> usize {
        self.frames.current_index()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total frames submitted.
    pub const fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Render one frame.
    ///
    /// `draw` is called once with a recorder bound to the current slot,
    /// inside the render pass. The error type is the caller's; GPU failures
    /// convert into it. A failed draw still submits what was recorded.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn render_frame<E, F>(&mut self, device: &GraphicsDevice, draw: F) -> std::result::Result<(), E>
    where
        E: From<GpuError>,
        F: FnOnce(&mut FrameRecorder<'_>) -> std::result::Result<(), E>,
    {
        let render_finished = &self.render_finished;
        let drawn = advance_frame(&mut self.frames, |frame_index, slot| SlotFrame {
            device,
            slot,
            frame_index,
            render_finished,
            draw: Some(draw),
            _error: PhantomData,
        })?;
        self.frames_rendered += 1;
        drawn
    }

    /// Destroy sync objects and the command pool.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) {
        let device = gpu.device();
        // SAFETY: caller guarantees the device is idle
        unsafe {
            for slot in self.frames.iter() {
                device.destroy_semaphore(slot.start_render, None);
                device.destroy_fence(slot.in_flight, None);
            }
            for &semaphore in &self.render_finished {
                device.destroy_semaphore(semaphore, None);
            }
            self.command_pool.destroy(device);
        }
        self.render_finished.clear();
    }
}

/// The GPU-facing steps of one frame, in the order [`run_frame`] calls them.
trait FrameSteps {
    /// What recording produced besides GPU errors (the draw callback's result).
    type Recorded;

    fn wait(&mut self) -> Result<()>;
    fn acquire(&mut self) -> Result<u32>;
    fn record(&mut self, image_index: u32) -> Result<Self::Recorded>;
    fn reset_fence(&mut self) -> Result<()>;
    fn submit(&mut self, image_index: u32) -> Result<()>;
    /// Consume the acquire semaphore and leave the fence signalled without
    /// running any commands.
    fn retire(&mut self) -> Result<()>;
    fn present(&mut self, image_index: u32) -> Result<()>;
}

/// Wait, acquire, record, reset, submit, present.
///
/// The fence is reset only once recording succeeded, right before the
/// submit that signals it again. If recording or the submit fails the slot
/// is retired, so the next wait on its fence returns.
fn run_frame<S: FrameSteps>(steps: &mut S) -> Result<S::Recorded> {
    steps.wait()?;
    let image_index = steps.acquire()?;

    let recorded = match steps.record(image_index) {
        Ok(recorded) => recorded,
        Err(e) => {
            steps.retire()?;
            return Err(e);
        }
    };

    steps.reset_fence()?;
    if let Err(e) = steps.submit(image_index) {
        steps.retire()?;
        return Err(e);
    }
    steps.present(image_index)?;
    Ok(recorded)
}

/// Run one frame on the ring's current slot; the ring moves on only if the
/// frame was submitted.
fn advance_frame<T, S, M>(ring: &mut FrameRing<T>, make_steps: M) -> Result<S::Recorded>
where
    T: Copy,
    S: FrameSteps,
    M: FnOnce(usize, T) -> S,
{
    let mut steps = make_steps(ring.current_index(), *ring.current());
    let recorded = run_frame(&mut steps)?;
    ring.advance();
    Ok(recorded)
}

/// [`FrameSteps`] against the device for one frame slot.
struct SlotFrame<'a, F, E> {
    device: &'a GraphicsDevice,
    slot: FrameSlot,
    frame_index: usize,
    render_finished: &'a [vk::Semaphore],
    draw: Option<F>,
    _error: PhantomData<fn() -> E>,
}

impl<F, E> FrameSteps for SlotFrame<'_, F, E>
where
    F: FnOnce(&mut FrameRecorder<'_>) -> std::result::Result<(), E>,
{
    type Recorded = std::result::Result<(), E>;

    fn wait(&mut self) -> Result<()> {
        // SAFETY: the fence belongs to this device
        unsafe { wait_for_fence(self.device.gpu.device(), self.slot.in_flight, u64::MAX) }
    }

    fn acquire(&mut self) -> Result<u32> {
        // SAFETY: the semaphore belongs to this device and is unsignalled,
        // since every earlier acquire on this slot was consumed by a submit
        unsafe {
            self.device.swapchain.acquire_next_image(
                &self.device.surface.swapchain_loader,
                self.slot.start_render,
                u64::MAX,
            )
        }
    }

    fn record(&mut self, image_index: u32) -> Result<Self::Recorded> {
        let device = self.device;
        let vk_device = device.gpu.device();
        let cmd = self.slot.command_buffer;
        let framebuffer = device.targets.framebuffer(image_index).ok_or_else(|| {
            GpuError::InvalidState(format!("No framebuffer for swapchain image {image_index}"))
        })?;
        let draw = self
            .draw
            .take()
            .ok_or_else(|| GpuError::InvalidState("Frame recorded twice".to_string()))?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: CLEAR_COLOR,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: CLEAR_DEPTH,
                    stencil: 0,
                },
            },
        ];
        let pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(device.render_pass())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: device.extent(),
            })
            .clear_values(&clear_values);

        // SAFETY: the fence wait guarantees the command buffer is no longer
        // executing, and the pool allows per-buffer resets
        unsafe {
            vk_device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(GpuError::from)?;
            begin_command_buffer(vk_device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            vk_device.cmd_begin_render_pass(cmd, &pass_info, vk::SubpassContents::INLINE);
        }

        let mut recorder = FrameRecorder {
            device: vk_device,
            command_buffer: cmd,
            frame_index: self.frame_index,
            image_index,
        };
        let drawn = draw(&mut recorder);

        // SAFETY: the buffer is recording inside the render pass begun above
        unsafe {
            vk_device.cmd_end_render_pass(cmd);
            end_command_buffer(vk_device, cmd)?;
        }
        Ok(drawn)
    }

    fn reset_fence(&mut self) -> Result<()> {
        // SAFETY: the fence was waited on, so no pending submit uses it
        unsafe { reset_fence(self.device.gpu.device(), self.slot.in_flight) }
    }

    fn submit(&mut self, image_index: u32) -> Result<()> {
        let gpu = &self.device.gpu;
        let render_finished = self.render_finished_for(image_index)?;
        // SAFETY: the command buffer finished recording and every handle
        // belongs to this device
        unsafe {
            submit_command_buffers(
                gpu.device(),
                gpu.graphics_queue(),
                &[self.slot.command_buffer],
                &[self.slot.start_render],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[render_finished],
                self.slot.in_flight,
            )
        }
    }

    fn retire(&mut self) -> Result<()> {
        let gpu = &self.device.gpu;
        // SAFETY: the fence was waited on and is not referenced by a pending
        // submit; the empty batch only waits on this slot's semaphore
        unsafe {
            reset_fence(gpu.device(), self.slot.in_flight)?;
            submit_command_buffers(
                gpu.device(),
                gpu.graphics_queue(),
                &[],
                &[self.slot.start_render],
                &[vk::PipelineStageFlags::ALL_COMMANDS],
                &[],
                self.slot.in_flight,
            )
        }
    }

    fn present(&mut self, image_index: u32) -> Result<()> {
        let gpu = &self.device.gpu;
        let render_finished = self.render_finished_for(image_index)?;
        // SAFETY: the image was acquired this frame and the semaphore is
        // signalled by the submit above
        unsafe {
            self.device.swapchain.present(
                &self.device.surface.swapchain_loader,
                gpu.present_queue(),
                image_index,
                &[render_finished],
            )
        }
    }
}

impl<F, E> SlotFrame<'_, F, E> {
    fn render_finished_for(&self, image_index: u32) -> Result<vk::Semaphore> {
        self.render_finished
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| GpuError::InvalidState(format!("No semaphore for swapchain image {image_index}")))
    }
}

/// Records draws for one frame inside the render pass.
pub struct FrameRecorder<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
    frame_index: usize,
    image_index: u32,
}

impl FrameRecorder<'_> {
    /// Frame-in-flight slot being recorded.
    pub const fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Swapchain image the frame resolves into.
    pub const fn image_index(&self) -> u32 {
        self.image_index
    }

    pub const fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Bind pipeline, vertex buffer, index buffer and this frame's descriptor
    /// set, then issue one indexed draw.
    pub fn draw<V: Pod>(
        &mut self,
        geometry: &GeometryBuffer<V>,
        set: &DescriptorSet,
        pipeline: &GraphicsPipeline,
    ) -> Result<()> {
        let descriptor_set = set.get(self.frame_index)?;
        let cmd = self.command_buffer;

        // SAFETY: the command buffer is recording inside a render pass and
        // every bound object outlives the frame
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);
            self.device
                .cmd_bind_vertex_buffers(cmd, 0, &[geometry.vertex_buffer()], &[0]);
            self.device.cmd_bind_index_buffer(
                cmd,
                geometry.index_buffer(),
                0,
                vk::IndexType::UINT32,
            );
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[descriptor_set],
                &[],
            );
            self.device
                .cmd_draw_indexed(cmd, geometry.index_count(), 1, 0, 0, 0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Wait,
        Acquire,
        Record,
        Reset,
        Submit,
        Retire,
        Present,
    }

    #[derive(Debug)]
    struct Fence {
        signaled: bool,
        waits: u32,
        resets: u32,
    }

    /// Host-side model of the slot fences; submits complete immediately.
    #[derive(Debug)]
    struct FakeQueue {
        fences: Vec<Fence>,
        log: Vec<(usize, Step)>,
        frame: u64,
        fail_record_on: Option<u64>,
        fail_submit_on: Option<u64>,
    }

    impl FakeQueue {
        fn new(frame_count: usize) -> Self {
            let fences = (0..frame_count)
                .map(|_| Fence {
                    signaled: true,
                    waits: 0,
                    resets: 0,
                })
                .collect();
            Self {
                fences,
                log: Vec::new(),
                frame: 0,
                fail_record_on: None,
                fail_submit_on: None,
            }
        }
    }

    struct FakeFrame<'a> {
        queue: &'a mut FakeQueue,
        slot: usize,
        waited: bool,
    }

    impl FakeFrame<'_> {
        fn log(&mut self, step: Step) {
            self.queue.log.push((self.slot, step));
        }

        fn fence(&mut self) -> &mut Fence {
            &mut self.queue.fences[self.slot]
        }
    }

    impl FrameSteps for FakeFrame<'_> {
        type Recorded = ();

        fn wait(&mut self) -> Result<()> {
            self.log(Step::Wait);
            let fence = self.fence();
            if !fence.signaled {
                return Err(GpuError::InvalidState("fence would never signal".to_string()));
            }
            fence.waits += 1;
            self.waited = true;
            Ok(())
        }

        fn acquire(&mut self) -> Result<u32> {
            self.log(Step::Acquire);
            Ok(0)
        }

        fn record(&mut self, _image_index: u32) -> Result<()> {
            self.log(Step::Record);
            if self.queue.fail_record_on == Some(self.queue.frame) {
                return Err(GpuError::InvalidState("record failed".to_string()));
            }
            Ok(())
        }

        fn reset_fence(&mut self) -> Result<()> {
            assert!(self.waited, "slot {} reset before it was waited on", self.slot);
            self.log(Step::Reset);
            let fence = self.fence();
            fence.signaled = false;
            fence.resets += 1;
            Ok(())
        }

        fn submit(&mut self, _image_index: u32) -> Result<()> {
            self.log(Step::Submit);
            if self.queue.fail_submit_on == Some(self.queue.frame) {
                return Err(GpuError::InvalidState("submit failed".to_string()));
            }
            self.fence().signaled = true;
            Ok(())
        }

        fn retire(&mut self) -> Result<()> {
            assert!(self.waited, "slot {} retired before it was waited on", self.slot);
            self.log(Step::Retire);
            let fence = self.fence();
            fence.resets += 1;
            fence.signaled = true;
            Ok(())
        }

        fn present(&mut self, _image_index: u32) -> Result<()> {
            self.log(Step::Present);
            Ok(())
        }
    }

    fn run(queue: &mut FakeQueue, ring: &mut FrameRing<()>, frames: u64) -> Vec<bool> {
        (0..frames)
            .map(|frame| {
                queue.frame = frame;
                let queue_ref = &mut *queue;
                let result = advance_frame(&mut *ring, move |slot, ()| FakeFrame {
                    queue: queue_ref,
                    slot,
                    waited: false,
                });
                result.is_ok()
            })
            .collect()
    }

    fn ring(frame_count: usize) -> FrameRing<()> {
        FrameRing::new(vec![(); frame_count]).unwrap()
    }

    #[test]
    fn slot_zero_waited_again_after_wrap() {
        for frame_count in 2..=4 {
            let mut queue = FakeQueue::new(frame_count);
            let mut ring = ring(frame_count);

            let results = run(&mut queue, &mut ring, frame_count as u64 + 1);

            assert!(results.iter().all(|&ok| ok));
            assert_eq!(queue.fences[0].waits, 2);
            assert_eq!(queue.fences[0].resets, 2);
            assert!(queue.fences[1..].iter().all(|f| f.waits == 1 && f.resets == 1));
            assert_eq!(ring.current_index(), 1);
        }
    }

    #[test]
    fn fence_is_reset_after_recording() {
        let mut queue = FakeQueue::new(2);
        let mut ring = ring(2);
        run(&mut queue, &mut ring, 1);

        let steps: Vec<Step> = queue.log.iter().map(|&(_, step)| step).collect();
        assert_eq!(
            steps,
            vec![
                Step::Wait,
                Step::Acquire,
                Step::Record,
                Step::Reset,
                Step::Submit,
                Step::Present
            ]
        );
    }

    #[test]
    fn failed_submit_leaves_fence_waitable() {
        let mut queue = FakeQueue::new(3);
        queue.fail_submit_on = Some(1);
        let mut ring = ring(3);

        let results = run(&mut queue, &mut ring, 8);

        assert_eq!(results, vec![true, false, true, true, true, true, true, true]);
        assert!(queue.log.contains(&(1, Step::Retire)));
        assert!(queue.fences.iter().all(|f| f.signaled));
    }

    #[test]
    fn failed_record_retires_without_submitting() {
        let mut queue = FakeQueue::new(2);
        queue.fail_record_on = Some(0);
        let mut ring = ring(2);

        let results = run(&mut queue, &mut ring, 3);

        assert_eq!(results, vec![false, true, true]);
        let first: Vec<Step> = queue.log[..4].iter().map(|&(_, step)| step).collect();
        assert_eq!(first, vec![Step::Wait, Step::Acquire, Step::Record, Step::Retire]);
        assert_eq!(ring.current_index(), 0);
        assert!(queue.fences.iter().all(|f| f.signaled));
    }
}
