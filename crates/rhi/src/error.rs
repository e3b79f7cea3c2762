//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// The device stopped responding (fence wait timed out or the device
    /// was lost). There is no recovery path for this.
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// Invalid handle or argument error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

impl RhiError {
    /// Whether this error is in the unrecoverable category.
    ///
    /// Lost devices and failed submits have no recovery story; the caller
    /// should log the cause and terminate.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RhiError::DeviceLost(_)
                | RhiError::VulkanError(ash::vk::Result::ERROR_DEVICE_LOST)
                | RhiError::VulkanError(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_is_fatal() {
        assert!(RhiError::DeviceLost("timeout".into()).is_fatal());
        assert!(RhiError::VulkanError(ash::vk::Result::ERROR_DEVICE_LOST).is_fatal());
    }

    #[test]
    fn test_capacity_style_errors_are_not_fatal() {
        assert!(!RhiError::SwapchainError("out of date".into()).is_fatal());
        assert!(!RhiError::NoSuitableGpu.is_fatal());
    }
}
