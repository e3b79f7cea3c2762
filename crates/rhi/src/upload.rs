//! One-shot synchronous command submission.
//!
//! Uploads (mesh data into the arenas, textures) run outside the per-frame
//! pipeline through a dedicated command buffer and fence: record, submit,
//! block until the fence signals. The mutable receiver makes the required
//! serialization explicit: two uploads can never race on the shared
//! command buffer, because both need `&mut ImmediateContext`.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::RhiResult;
use crate::sync::Fence;

/// Upload fence timeout: ten seconds, in nanoseconds.
///
/// Uploads copy at most an arena's worth of bytes; anything slower than
/// this is a lost device, not a slow transfer.
const UPLOAD_TIMEOUT_NS: u64 = 10_000_000_000;

/// Context for immediate, blocking command submission.
///
/// Owns a transient command pool on the graphics queue family, one primary
/// command buffer, and an unsignaled fence. All three are reused across
/// submissions.
pub struct ImmediateContext {
    device: Arc<Device>,
    _pool: CommandPool,
    buffer: CommandBuffer,
    fence: Fence,
}

impl ImmediateContext {
    /// Creates the immediate-submit context.
    ///
    /// # Errors
    ///
    /// Returns an error if pool, buffer, or fence creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let graphics_family = device.queue_families().graphics_family.unwrap();
        let pool = CommandPool::new_transient(device.clone(), graphics_family)?;
        let buffer = CommandBuffer::new(device.clone(), &pool)?;
        let fence = Fence::new(device.clone(), false)?;

        debug!("Immediate submit context created");

        Ok(Self {
            device,
            _pool: pool,
            buffer,
            fence,
        })
    }

    /// Records commands via `record` and submits them, blocking until the
    /// GPU has finished executing them.
    ///
    /// # Errors
    ///
    /// A failed submit or a fence timeout is fatal
    /// ([`crate::RhiError::DeviceLost`] for the latter).
    pub fn submit<F>(&mut self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        self.fence.reset()?;
        self.buffer.reset()?;

        self.buffer.begin()?;
        record(&self.buffer);
        self.buffer.end()?;

        let command_buffers = [self.buffer.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], self.fence.handle())?;
        }

        self.fence.wait(UPLOAD_TIMEOUT_NS)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_timeout_exceeds_frame_timeout() {
        assert!(UPLOAD_TIMEOUT_NS > crate::sync::FENCE_TIMEOUT_NS);
    }

    #[test]
    fn test_immediate_context_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ImmediateContext>();
    }
}
