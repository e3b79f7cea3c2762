//! Frame synchronization ring.
//!
//! The ring owns N frame slots (the overlap factor), each with its own
//! command pool, primary command buffer, image-acquire semaphore,
//! completion fence, and a frame-local deletion queue. A slot moves
//! through Idle, Recording, and Submitted states each frame; it becomes reusable
//! only once its fence is observed signaled.
//!
//! # Slot selection
//!
//! Two policies are supported:
//!
//! - [`SlotPolicy::Blocking`] (default): strict round-robin
//!   `frame_number % N` with a blocking fence wait. A wait that exceeds the
//!   timeout is treated as device loss and is fatal.
//! - [`SlotPolicy::Polling`]: scan the slots for one whose fence is
//!   already signaled, capped at `max_scans` attempts; when none is ready
//!   the frame is skipped entirely, degrading gracefully under GPU
//!   backpressure instead of spinning unbounded.
//!
//! # Usage pattern
//!
//! ```text
//! 1. begin_frame()            - select a slot, wait/poll its fence,
//!                               flush the slot's deletion queue
//! 2. acquire swapchain image  - signals the slot's acquire semaphore
//! 3. record commands          - reset + begin + ... + end on the slot's buffer
//! 4. submit(present_sem)      - waits acquire sem, signals present sem,
//!                               fences the slot
//! 5. present, end_frame()     - advance the frame counter
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use kiln_core::SlotPolicyConfig;
use kiln_rhi::RhiResult;
use kiln_rhi::command::{CommandBuffer, CommandPool};
use kiln_rhi::deletion::DeletionQueue;
use kiln_rhi::device::Device;
use kiln_rhi::sync::{FENCE_TIMEOUT_NS, Fence, Semaphore};

/// Default overlap factor: double buffering.
pub const DEFAULT_FRAME_OVERLAP: usize = 2;

/// Upper bound on the overlap factor; more slots than this only adds
/// latency.
pub const MAX_FRAME_OVERLAP: usize = 4;

/// Default polling cap, from the non-blocking selection variant.
pub const DEFAULT_MAX_SCANS: u32 = 300;

/// Frame-slot selection policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotPolicy {
    /// Round-robin with a blocking, timeout-bounded fence wait.
    Blocking,
    /// Bounded scan for a signaled fence; skip the frame when none is
    /// ready within `max_scans` checks.
    Polling { max_scans: u32 },
}

impl Default for SlotPolicy {
    fn default() -> Self {
        SlotPolicy::Blocking
    }
}

impl From<SlotPolicyConfig> for SlotPolicy {
    fn from(config: SlotPolicyConfig) -> Self {
        match config {
            SlotPolicyConfig::Blocking => SlotPolicy::Blocking,
            SlotPolicyConfig::Polling { max_scans } => SlotPolicy::Polling { max_scans },
        }
    }
}

/// Per-frame resources.
///
/// Exactly one submission may be in flight per slot; the fence gates
/// reuse of the command buffer and the acquire semaphore.
pub struct FrameSlot {
    _command_pool: CommandPool,
    command_buffer: CommandBuffer,
    acquire_semaphore: Semaphore,
    render_fence: Fence,
    destroy_queue: DeletionQueue,
}

impl FrameSlot {
    fn new(device: Arc<Device>) -> RhiResult<Self> {
        let graphics_family = device.queue_families().graphics_family.unwrap();
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let acquire_semaphore = Semaphore::new(device.clone())?;
        // Signaled so the first wait on a never-used slot doesn't block
        let render_fence = Fence::new(device, true)?;

        Ok(Self {
            _command_pool: command_pool,
            command_buffer,
            acquire_semaphore,
            render_fence,
            destroy_queue: DeletionQueue::new(),
        })
    }

    /// The slot's command buffer.
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Semaphore signaled when a swapchain image is acquired for this slot.
    #[inline]
    pub fn acquire_semaphore(&self) -> &Semaphore {
        &self.acquire_semaphore
    }

    /// Fence signaled when this slot's submission completes.
    #[inline]
    pub fn render_fence(&self) -> &Fence {
        &self.render_fence
    }

    /// The slot's deletion queue, for resources that must outlive the
    /// slot's in-flight submission. Flushed at the top of the slot's next
    /// use, after the fence wait.
    #[inline]
    pub fn destroy_queue_mut(&mut self) -> &mut DeletionQueue {
        &mut self.destroy_queue
    }
}

/// The ring of frame slots.
pub struct FrameRing {
    device: Arc<Device>,
    slots: Vec<FrameSlot>,
    policy: SlotPolicy,
    frame_number: u64,
    current: usize,
}

impl FrameRing {
    /// Creates the ring with `overlap` slots (clamped to
    /// 1..=[`MAX_FRAME_OVERLAP`]).
    ///
    /// # Errors
    ///
    /// Returns an error if any slot resource creation fails.
    pub fn new(device: Arc<Device>, overlap: usize, policy: SlotPolicy) -> RhiResult<Self> {
        let overlap = overlap.clamp(1, MAX_FRAME_OVERLAP);

        let mut slots = Vec::with_capacity(overlap);
        for i in 0..overlap {
            slots.push(FrameSlot::new(device.clone())?);
            debug!("Created frame slot {}", i);
        }

        info!(
            "Frame ring created: {} slots, {:?} policy",
            overlap, policy
        );

        Ok(Self {
            device,
            slots,
            policy,
            frame_number: 0,
            current: 0,
        })
    }

    /// Selects and readies a slot for this frame.
    ///
    /// Under the blocking policy this waits on the round-robin slot's
    /// fence. Under the polling policy it returns `false` when no slot is
    /// ready within the scan cap, in which case the caller skips the frame.
    /// A `true` return means the selected slot's previous GPU work has
    /// completed and its deletion queue has been flushed.
    ///
    /// The fence is left signaled here and reset only at submit, so an
    /// abandoned frame (stale surface, failed acquire) cannot deadlock the
    /// slot's next wait.
    ///
    /// # Errors
    ///
    /// A fence wait timeout surfaces as
    /// [`kiln_rhi::RhiError::DeviceLost`] and is fatal.
    pub fn begin_frame(&mut self) -> RhiResult<bool> {
        let selected = match self.policy {
            SlotPolicy::Blocking => {
                let index = round_robin_slot(self.frame_number, self.slots.len());
                self.slots[index].render_fence.wait(FENCE_TIMEOUT_NS)?;
                index
            }
            SlotPolicy::Polling { max_scans } => {
                let found = poll_scan(self.slots.len(), max_scans, |i| {
                    self.slots[i].render_fence.is_signaled()
                });
                match found {
                    Some(index) => index,
                    None => {
                        debug!("No frame slot ready after {} scans, skipping frame", max_scans);
                        return Ok(false);
                    }
                }
            }
        };

        self.current = selected;

        // The slot's prior submission has completed; its deferred
        // resources are now safe to destroy.
        let slot = &mut self.slots[selected];
        slot.destroy_queue.flush(&self.device);

        Ok(true)
    }

    /// The slot selected by the last [`FrameRing::begin_frame`].
    #[inline]
    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    /// Mutable access to the current slot (for its deletion queue).
    #[inline]
    pub fn current_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[self.current]
    }

    /// Submits the current slot's command buffer to the graphics queue.
    ///
    /// Waits on the slot's acquire semaphore at the color-attachment-output
    /// stage, signals `present_semaphore` for the presentation engine, and
    /// fences the slot (the fence is reset immediately before the submit).
    ///
    /// # Errors
    ///
    /// A failed submit is fatal.
    pub fn submit(&self, present_semaphore: vk::Semaphore) -> RhiResult<()> {
        let slot = &self.slots[self.current];

        let wait_semaphores = [slot.acquire_semaphore.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [slot.command_buffer.handle()];
        let signal_semaphores = [present_semaphore];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        slot.render_fence.reset()?;
        unsafe {
            self.device
                .submit_graphics(&[submit_info], slot.render_fence.handle())?;
        }

        Ok(())
    }

    /// Advances the frame counter; call after presenting.
    #[inline]
    pub fn end_frame(&mut self) {
        self.frame_number += 1;
    }

    /// Waits for every slot's in-flight work to complete.
    ///
    /// Used before surface recreation and at shutdown.
    ///
    /// # Errors
    ///
    /// A wait timeout is fatal.
    pub fn wait_all(&self) -> RhiResult<()> {
        for slot in &self.slots {
            slot.render_fence.wait(FENCE_TIMEOUT_NS)?;
        }
        Ok(())
    }

    /// Flushes every slot's deletion queue.
    ///
    /// Caller must have idled the device (or waited all fences).
    pub fn flush_slot_queues(&mut self) {
        for slot in &mut self.slots {
            slot.destroy_queue.flush(&self.device);
        }
    }

    /// Number of slots in the ring.
    #[inline]
    pub fn overlap(&self) -> usize {
        self.slots.len()
    }

    /// Frames completed so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }
}

/// Round-robin slot index for the blocking policy.
#[inline]
fn round_robin_slot(frame_number: u64, overlap: usize) -> usize {
    (frame_number % overlap as u64) as usize
}

/// Scans slots round-robin for one whose fence reports signaled, giving up
/// after `max_scans` checks. Never returns an index without `signaled`
/// having confirmed it.
fn poll_scan(overlap: usize, max_scans: u32, signaled: impl Fn(usize) -> bool) -> Option<usize> {
    let mut index = 0;
    for _ in 0..max_scans {
        if signaled(index) {
            return Some(index);
        }
        index = (index + 1) % overlap;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_overlap_bounds() {
        assert!(DEFAULT_FRAME_OVERLAP >= 1);
        assert!(DEFAULT_FRAME_OVERLAP <= MAX_FRAME_OVERLAP);
    }

    #[test]
    fn test_round_robin_cycles() {
        assert_eq!(round_robin_slot(0, 2), 0);
        assert_eq!(round_robin_slot(1, 2), 1);
        assert_eq!(round_robin_slot(2, 2), 0);
        assert_eq!(round_robin_slot(7, 3), 1);
    }

    #[test]
    fn test_poll_scan_returns_only_signaled_slots() {
        let checked = RefCell::new(Vec::new());
        let found = poll_scan(3, 10, |i| {
            checked.borrow_mut().push(i);
            i == 2
        });

        assert_eq!(found, Some(2));
        // Every slot returned was checked, and slot 2 was the last check.
        assert_eq!(*checked.borrow().last().unwrap(), 2);
    }

    #[test]
    fn test_poll_scan_gives_up_after_cap() {
        let count = RefCell::new(0u32);
        let found = poll_scan(2, 7, |_| {
            *count.borrow_mut() += 1;
            false
        });

        assert_eq!(found, None);
        assert_eq!(*count.borrow(), 7);
    }

    #[test]
    fn test_poll_scan_zero_cap_skips_immediately() {
        let found = poll_scan(2, 0, |_| true);
        assert_eq!(found, None);
    }

    #[test]
    fn test_default_scan_cap() {
        assert_eq!(DEFAULT_MAX_SCANS, 300);
    }

    #[test]
    fn test_policy_from_config() {
        assert_eq!(
            SlotPolicy::from(SlotPolicyConfig::Blocking),
            SlotPolicy::Blocking
        );
        assert_eq!(
            SlotPolicy::from(SlotPolicyConfig::Polling { max_scans: 42 }),
            SlotPolicy::Polling { max_scans: 42 }
        );
    }

    #[test]
    fn test_frame_ring_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameRing>();
    }
}
