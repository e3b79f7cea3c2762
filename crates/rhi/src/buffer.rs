//! GPU buffer management.
//!
//! Wraps VkBuffer with gpu-allocator managed memory. The usage enum is
//! shaped around the engine's actual buffer roles: the two shared arena
//! buffers (device-local, with or without a device-address layout), small
//! host-visible buffers for resident drawables, and transient staging
//! buffers for uploads.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage role.
///
/// Determines Vulkan usage flags and the memory location the allocation
/// comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Shared vertex arena with a device-address-capable layout
    /// (requires the bufferDeviceAddress capability).
    VertexArenaAddressed,
    /// Shared vertex arena with the classic vertex-binding layout.
    VertexArena,
    /// Shared index arena.
    IndexArena,
    /// Host-visible vertex buffer owned by a single drawable.
    HostVertex,
    /// Host-visible index buffer owned by a single drawable.
    HostIndex,
    /// CPU-writable staging buffer for one-shot uploads.
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::VertexArenaAddressed => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            }
            BufferUsage::VertexArena => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::IndexArena => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::HostVertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::HostIndex => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns the memory location for this buffer role.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::VertexArenaAddressed
            | BufferUsage::VertexArena
            | BufferUsage::IndexArena => MemoryLocation::GpuOnly,
            BufferUsage::HostVertex | BufferUsage::HostIndex | BufferUsage::Staging => {
                MemoryLocation::CpuToGpu
            }
        }
    }

    /// Returns a short name used for allocator bookkeeping and logs.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::VertexArenaAddressed => "vertex_arena_bda",
            BufferUsage::VertexArena => "vertex_arena",
            BufferUsage::IndexArena => "index_arena",
            BufferUsage::HostVertex => "host_vertex",
            BufferUsage::HostIndex => "host_index",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer with managed memory.
///
/// Ownership of the underlying handle/allocation pair is either held here
/// (freed on drop) or handed to a deletion queue via [`Buffer::into_parts`]
/// for deferred destruction.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a new buffer of the given size.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or buffer/memory creation
    /// fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location: usage.memory_location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer and fills it with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if creation or the write fails.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Writes data into the buffer at the given byte offset.
    ///
    /// The buffer must be host-visible (CpuToGpu memory).
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is not mapped or the write would
    /// exceed the buffer size.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;

        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped_ptr.as_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst as *mut u8, data.len());
        }

        Ok(())
    }

    /// Queries the buffer's device address.
    ///
    /// Only meaningful for buffers created with a device-address-capable
    /// usage on a device where the capability is enabled.
    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        unsafe { self.device.handle().get_buffer_device_address(&info) }
    }

    /// Dismantles the buffer into its raw handle/allocation pair.
    ///
    /// Used to hand ownership to a deletion queue; the returned parts must
    /// eventually be destroyed/freed there. `Drop` becomes a no-op.
    pub fn into_parts(mut self) -> (vk::Buffer, Allocation) {
        let buffer = self.buffer;
        let allocation = self.allocation.take().unwrap();
        self.buffer = vk::Buffer::null();
        (buffer, allocation)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage role.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free buffer allocation: {:?}", e);
            }
        }

        if self.buffer != vk::Buffer::null() {
            unsafe {
                self.device.handle().destroy_buffer(self.buffer, None);
            }
            debug!("Destroyed {} buffer", self.usage.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_usages_are_transfer_destinations() {
        for usage in [
            BufferUsage::VertexArenaAddressed,
            BufferUsage::VertexArena,
            BufferUsage::IndexArena,
        ] {
            assert!(
                usage
                    .to_vk_usage()
                    .contains(vk::BufferUsageFlags::TRANSFER_DST),
                "{:?} must accept staging copies",
                usage
            );
            assert_eq!(usage.memory_location(), MemoryLocation::GpuOnly);
        }
    }

    #[test]
    fn test_addressed_arena_has_device_address_flag() {
        assert!(
            BufferUsage::VertexArenaAddressed
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
        );
        assert!(
            !BufferUsage::VertexArena
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
        );
    }

    #[test]
    fn test_staging_is_host_visible_source() {
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
        assert_eq!(BufferUsage::Staging.memory_location(), MemoryLocation::CpuToGpu);
    }
}
