//! Shared GPU mesh arena.
//!
//! All loaded meshes live in two large device-local buffers: one vertex
//! arena, one index arena. Space is handed out by an aligned bump pointer;
//! nothing is ever freed piecemeal; only [`MeshArena::reset`] reclaims
//! space, wholesale. Uploads go through a transient staging buffer and one
//! blocking immediate submission, so a returned [`MeshAllocation`] is
//! already resident on the GPU.
//!
//! When the device supports buffer device addresses the vertex arena uses
//! a storage-buffer layout and each allocation carries the address of its
//! sub-range for shader fetch; otherwise the classic vertex/index binding
//! layout is used. This is a capability fallback decided once at init.

use std::sync::Arc;

use ash::vk;
use thiserror::Error;
use tracing::{debug, info};

use kiln_rhi::RhiError;
use kiln_rhi::buffer::{Buffer, BufferUsage};
use kiln_rhi::deletion::DeletionQueue;
use kiln_rhi::device::Device;
use kiln_rhi::upload::ImmediateContext;
use kiln_rhi::vertex::Vertex;

/// Vertex allocations start on 16-byte boundaries.
pub const VERTEX_ALIGNMENT: u64 = 16;

/// Index allocations start on 4-byte boundaries (u32 indices).
pub const INDEX_ALIGNMENT: u64 = 4;

/// Arena allocation failure.
#[derive(Error, Debug)]
pub enum ArenaError {
    /// The request does not fit in the remaining arena space. Recoverable:
    /// the heads are untouched and the caller may stop loading (and grow
    /// the configured capacity on the next run).
    #[error(
        "arena out of space: need {vertex_bytes}B vertex / {index_bytes}B index, \
         free {vertex_free}B / {index_free}B"
    )]
    OutOfSpace {
        vertex_bytes: u64,
        index_bytes: u64,
        vertex_free: u64,
        index_free: u64,
    },

    /// Device-side failure during buffer creation or upload.
    #[error(transparent)]
    Rhi(#[from] RhiError),
}

/// A contiguous run of indices within one mesh, named by the asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawRange {
    /// Label from the source asset (submesh/primitive name).
    pub name: String,
    /// First index, relative to the mesh's index range.
    pub first_index: u32,
    /// Number of indices in the run.
    pub index_count: u32,
}

/// CPU-side mesh data, as supplied by the asset-loading collaborator.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    /// Mesh name for diagnostics.
    pub name: String,
    /// Vertex array.
    pub vertices: Vec<Vertex>,
    /// Index array (u32).
    pub indices: Vec<u32>,
    /// Named draw ranges; empty means "draw everything".
    pub ranges: Vec<DrawRange>,
}

impl MeshData {
    /// Vertex payload size in bytes.
    #[inline]
    pub fn vertex_bytes(&self) -> u64 {
        (self.vertices.len() * Vertex::size()) as u64
    }

    /// Index payload size in bytes.
    #[inline]
    pub fn index_bytes(&self) -> u64 {
        (self.indices.len() * std::mem::size_of::<u32>()) as u64
    }
}

/// A mesh's reservation inside the shared arenas.
///
/// Plain value type: copying it never duplicates GPU resources, and
/// dropping it never frees them. Reclamation is the arena's job, via
/// [`MeshArena::reset`].
#[derive(Clone, Debug, Default)]
pub struct MeshAllocation {
    /// Byte offset of the vertex data in the vertex arena (16-aligned).
    pub vertex_offset: u64,
    /// Byte offset of the index data in the index arena (4-aligned).
    pub index_offset: u64,
    /// Total number of indices.
    pub index_count: u32,
    /// Draw ranges, relative to `index_offset`.
    pub ranges: Vec<DrawRange>,
    /// Device address of the vertex sub-range (device-address layout only).
    pub vertex_address: Option<vk::DeviceAddress>,
}

/// Aligns `value` up to `alignment`, which must be a power of two.
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// The arena's bump-pointer bookkeeping, separate from any device state.
///
/// Heads are stored already aligned, so a head value is always a valid
/// next offset and equal-sized allocations land at identical offsets after
/// a reset.
#[derive(Clone, Copy, Debug)]
pub struct ArenaLayout {
    vertex_head: u64,
    index_head: u64,
    vertex_capacity: u64,
    index_capacity: u64,
}

impl ArenaLayout {
    /// Creates an empty layout with the given byte capacities.
    pub fn new(vertex_capacity: u64, index_capacity: u64) -> Self {
        Self {
            vertex_head: 0,
            index_head: 0,
            vertex_capacity,
            index_capacity,
        }
    }

    /// Reserves space for one mesh, returning the aligned (vertex, index)
    /// offsets.
    ///
    /// On [`ArenaError::OutOfSpace`] neither head moves: no partial
    /// advance, regardless of which arena was short.
    pub fn reserve(&mut self, vertex_bytes: u64, index_bytes: u64) -> Result<(u64, u64), ArenaError> {
        let vertex_offset = align_up(self.vertex_head, VERTEX_ALIGNMENT);
        let index_offset = align_up(self.index_head, INDEX_ALIGNMENT);

        if vertex_offset + vertex_bytes > self.vertex_capacity
            || index_offset + index_bytes > self.index_capacity
        {
            return Err(ArenaError::OutOfSpace {
                vertex_bytes,
                index_bytes,
                vertex_free: self.vertex_capacity.saturating_sub(vertex_offset),
                index_free: self.index_capacity.saturating_sub(index_offset),
            });
        }

        self.vertex_head = align_up(vertex_offset + vertex_bytes, VERTEX_ALIGNMENT);
        self.index_head = align_up(index_offset + index_bytes, INDEX_ALIGNMENT);

        Ok((vertex_offset, index_offset))
    }

    /// Zeroes both heads.
    pub fn reset(&mut self) {
        self.vertex_head = 0;
        self.index_head = 0;
    }

    /// Current vertex head in bytes.
    #[inline]
    pub fn vertex_head(&self) -> u64 {
        self.vertex_head
    }

    /// Current index head in bytes.
    #[inline]
    pub fn index_head(&self) -> u64 {
        self.index_head
    }

    /// Configured vertex capacity in bytes.
    #[inline]
    pub fn vertex_capacity(&self) -> u64 {
        self.vertex_capacity
    }

    /// Configured index capacity in bytes.
    #[inline]
    pub fn index_capacity(&self) -> u64 {
        self.index_capacity
    }
}

/// The two arena buffers plus the layout metadata that depends on them.
struct ArenaBuffers {
    vertex: Buffer,
    index: Buffer,
    /// Base device address of the vertex arena, in the addressed layout.
    vertex_address: Option<vk::DeviceAddress>,
}

/// Shared GPU mesh arena. See the module docs.
pub struct MeshArena {
    device: Arc<Device>,
    /// Always `Some` outside of reset/teardown.
    buffers: Option<ArenaBuffers>,
    layout: ArenaLayout,
    destroy_queue: DeletionQueue,
}

impl MeshArena {
    /// Creates the arena buffers with the caller's byte budget.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation fails. Zero capacities are
    /// rejected by the buffer layer.
    pub fn new(
        device: Arc<Device>,
        vertex_capacity: u64,
        index_capacity: u64,
    ) -> Result<Self, ArenaError> {
        let buffers = Self::create_buffers(&device, vertex_capacity, index_capacity)?;

        info!(
            "Mesh arena created: {}B vertex / {}B index ({})",
            vertex_capacity,
            index_capacity,
            if buffers.vertex_address.is_some() {
                "device-address layout"
            } else {
                "classic binding layout"
            }
        );

        Ok(Self {
            device,
            buffers: Some(buffers),
            layout: ArenaLayout::new(vertex_capacity, index_capacity),
            destroy_queue: DeletionQueue::new(),
        })
    }

    fn create_buffers(
        device: &Arc<Device>,
        vertex_capacity: u64,
        index_capacity: u64,
    ) -> Result<ArenaBuffers, ArenaError> {
        let vertex_usage = if device.supports_buffer_device_address() {
            BufferUsage::VertexArenaAddressed
        } else {
            BufferUsage::VertexArena
        };

        let vertex = Buffer::new(device.clone(), vertex_usage, vertex_capacity)?;
        let index = Buffer::new(device.clone(), BufferUsage::IndexArena, index_capacity)?;

        let vertex_address = (vertex_usage == BufferUsage::VertexArenaAddressed)
            .then(|| vertex.device_address());

        Ok(ArenaBuffers {
            vertex,
            index,
            vertex_address,
        })
    }

    /// Uploads one mesh into the arenas.
    ///
    /// Reserves aligned space in both arenas (failing with
    /// [`ArenaError::OutOfSpace`] before any device-side work), stages the
    /// vertex and index payloads contiguously in one transient buffer, and
    /// copies both sub-ranges to their offsets in a single blocking
    /// immediate submission.
    ///
    /// # Errors
    ///
    /// `OutOfSpace` is recoverable and leaves the arena untouched. Device
    /// failures during staging or submission propagate as fatal RHI errors.
    pub fn allocate(
        &mut self,
        upload: &mut ImmediateContext,
        mesh: &MeshData,
    ) -> Result<MeshAllocation, ArenaError> {
        let vertex_bytes = mesh.vertex_bytes();
        let index_bytes = mesh.index_bytes();

        let (vertex_offset, index_offset) = self.layout.reserve(vertex_bytes, index_bytes)?;

        let buffers = self.buffers.as_ref().unwrap();

        // Stage vertices first, indices directly after.
        let staging = Buffer::new(
            self.device.clone(),
            BufferUsage::Staging,
            vertex_bytes + index_bytes,
        )?;
        staging.write_data(0, bytemuck::cast_slice(&mesh.vertices))?;
        staging.write_data(vertex_bytes, bytemuck::cast_slice(&mesh.indices))?;

        upload.submit(|cmd| {
            cmd.copy_buffer(
                staging.handle(),
                buffers.vertex.handle(),
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: vertex_offset,
                    size: vertex_bytes,
                }],
            );
            cmd.copy_buffer(
                staging.handle(),
                buffers.index.handle(),
                &[vk::BufferCopy {
                    src_offset: vertex_bytes,
                    dst_offset: index_offset,
                    size: index_bytes,
                }],
            );
        })?;
        // Staging buffer dropped here; the copy has completed.
        drop(staging);

        let index_count = mesh.indices.len() as u32;
        let ranges = if mesh.ranges.is_empty() {
            vec![DrawRange {
                name: mesh.name.clone(),
                first_index: 0,
                index_count,
            }]
        } else {
            mesh.ranges.clone()
        };

        debug!(
            "Arena allocation '{}': {}B vertex @ {}, {}B index @ {}",
            mesh.name, vertex_bytes, vertex_offset, index_bytes, index_offset
        );

        Ok(MeshAllocation {
            vertex_offset,
            index_offset,
            index_count,
            ranges,
            vertex_address: buffers
                .vertex_address
                .map(|base| base + vertex_offset),
        })
    }

    /// Resets the arena: retires both buffers through the deletion queue,
    /// recreates them, and zeroes both heads. Every previously returned
    /// [`MeshAllocation`] is invalid afterwards.
    ///
    /// The caller must have idled the device (or waited on every fence
    /// covering work that reads the arenas).
    ///
    /// # Errors
    ///
    /// Returns an error if recreating the buffers fails.
    pub fn reset(&mut self) -> Result<(), ArenaError> {
        self.retire_buffers();
        self.destroy_queue.flush(&self.device);

        self.buffers = Some(Self::create_buffers(
            &self.device,
            self.layout.vertex_capacity(),
            self.layout.index_capacity(),
        )?);
        self.layout.reset();

        info!("Mesh arena reset");
        Ok(())
    }

    /// Shutdown path: retires and flushes both buffers without
    /// recreating them. Idempotent; the arena is unusable afterwards.
    ///
    /// The caller must have idled the device.
    pub fn teardown(&mut self) {
        self.retire_buffers();
        self.destroy_queue.flush(&self.device);
    }

    /// Moves the current buffers into the deletion queue.
    fn retire_buffers(&mut self) {
        if let Some(buffers) = self.buffers.take() {
            let (handle, allocation) = buffers.vertex.into_parts();
            self.destroy_queue.add_buffer(handle, allocation);
            let (handle, allocation) = buffers.index.into_parts();
            self.destroy_queue.add_buffer(handle, allocation);
        }
    }

    /// The shared vertex arena buffer.
    #[inline]
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.buffers.as_ref().unwrap().vertex.handle()
    }

    /// The shared index arena buffer.
    #[inline]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.buffers.as_ref().unwrap().index.handle()
    }

    /// Base device address of the vertex arena, when the addressed layout
    /// is in use.
    #[inline]
    pub fn vertex_address(&self) -> Option<vk::DeviceAddress> {
        self.buffers.as_ref().unwrap().vertex_address
    }

    /// The bump-pointer bookkeeping (heads and capacities).
    #[inline]
    pub fn layout(&self) -> &ArenaLayout {
        &self.layout
    }
}

impl Drop for MeshArena {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(100, 16), 112);
        assert_eq!(align_up(40, 4), 40);
        assert_eq!(align_up(41, 4), 44);
    }

    #[test]
    fn test_first_allocation_starts_at_zero() {
        let mut layout = ArenaLayout::new(1024, 512);
        let (v, i) = layout.reserve(100, 40).unwrap();
        assert_eq!((v, i), (0, 0));
        assert_eq!(layout.vertex_head(), 112);
        assert_eq!(layout.index_head(), 40);
    }

    #[test]
    fn test_out_of_space_leaves_heads_unchanged() {
        let mut layout = ArenaLayout::new(1024, 512);
        layout.reserve(100, 40).unwrap();

        // 112 + 1000 > 1024
        let err = layout.reserve(1000, 4).unwrap_err();
        assert!(matches!(err, ArenaError::OutOfSpace { .. }));
        assert_eq!(layout.vertex_head(), 112);
        assert_eq!(layout.index_head(), 40);

        // Index overflow alone also rejects both
        let err = layout.reserve(16, 1000).unwrap_err();
        assert!(matches!(err, ArenaError::OutOfSpace { .. }));
        assert_eq!(layout.vertex_head(), 112);
        assert_eq!(layout.index_head(), 40);
    }

    #[test]
    fn test_offsets_are_aligned_and_non_overlapping() {
        let mut layout = ArenaLayout::new(4096, 4096);
        let mut last_vertex_end = 0;
        let mut last_index_end = 0;

        for (vb, ib) in [(7, 3), (100, 40), (33, 9), (256, 128)] {
            let (v, i) = layout.reserve(vb, ib).unwrap();
            assert_eq!(v % VERTEX_ALIGNMENT, 0);
            assert_eq!(i % INDEX_ALIGNMENT, 0);
            assert!(v >= last_vertex_end);
            assert!(i >= last_index_end);
            last_vertex_end = v + vb;
            last_index_end = i + ib;
        }
    }

    #[test]
    fn test_reset_reproduces_first_offsets() {
        let mut layout = ArenaLayout::new(1024, 512);
        let first = layout.reserve(100, 40).unwrap();
        layout.reserve(64, 16).unwrap();

        layout.reset();
        assert_eq!(layout.vertex_head(), 0);
        assert_eq!(layout.index_head(), 0);

        let again = layout.reserve(100, 40).unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_exact_fit_is_accepted() {
        let mut layout = ArenaLayout::new(128, 64);
        let (v, i) = layout.reserve(128, 64).unwrap();
        assert_eq!((v, i), (0, 0));
        assert!(layout.reserve(1, 0).is_err());
    }

    #[test]
    fn test_mesh_data_byte_sizes() {
        let mesh = MeshData {
            name: "quad".into(),
            vertices: vec![Vertex::default(); 4],
            indices: vec![0, 1, 2, 2, 3, 0],
            ranges: Vec::new(),
        };
        assert_eq!(mesh.vertex_bytes(), 4 * 48);
        assert_eq!(mesh.index_bytes(), 6 * 4);
    }

    #[test]
    fn test_out_of_space_reports_free_bytes() {
        let mut layout = ArenaLayout::new(1024, 512);
        layout.reserve(100, 40).unwrap();

        match layout.reserve(1000, 4) {
            Err(ArenaError::OutOfSpace {
                vertex_free,
                index_free,
                ..
            }) => {
                assert_eq!(vertex_free, 1024 - 112);
                assert_eq!(index_free, 512 - 40);
            }
            other => panic!("expected OutOfSpace, got {:?}", other.map(|_| ())),
        }
    }
}
