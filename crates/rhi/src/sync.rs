//! Synchronization primitives.
//!
//! Wrappers for the two Vulkan synchronization objects the engine uses:
//! - [`Semaphore`] - GPU-to-GPU ordering (acquire before submit, submit
//!   before present)
//! - [`Fence`] - GPU-to-CPU completion signal (gates frame-slot reuse and
//!   the immediate-submit upload path)
//!
//! A fence wait that times out is treated as device loss and surfaces as
//! [`RhiError::DeviceLost`]; there is no recovery path for it.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default fence wait timeout: one second, in nanoseconds.
///
/// GPU work that has not completed within a second of being waited on is
/// assumed lost rather than slow.
pub const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Vulkan semaphore wrapper.
///
/// Semaphores order GPU work against other GPU work; they are never
/// observable from the CPU. The engine uses one per frame slot for image
/// acquisition and one per swapchain image for presentation.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
///
/// Fences let the CPU observe GPU completion. Frame-slot fences are created
/// signaled so the first wait on a never-submitted slot does not block.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Create the fence already signaled. Use this for
    ///   fences that are waited on before the first submission that would
    ///   signal them.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds ([`FENCE_TIMEOUT_NS`] is the
    ///   usual choice for frame fences).
    ///
    /// # Errors
    ///
    /// A timeout or a lost device surfaces as [`RhiError::DeviceLost`];
    /// anything else is passed through as a Vulkan error.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        let result = unsafe { self.device.handle().wait_for_fences(&fences, true, timeout) };

        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::DeviceLost(format!(
                "fence wait timed out after {} ns",
                timeout
            ))),
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                Err(RhiError::DeviceLost("device lost during fence wait".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue when this is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Checks if the fence is currently signaled, without blocking.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_timeout_is_one_second() {
        assert_eq!(FENCE_TIMEOUT_NS, 1_000_000_000);
    }

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }
}
